//! Bulk catch-up: streams a contiguous run of blocks from an external block
//! store and replays them through a controller until local head reaches a
//! target height.
//!
//! Three stages cooperate over two bounded channels, after the CSP pipeline
//! shape: a request producer plans batches (starting small, doubling up
//! to a cap, so a cold start doesn't demand a huge first batch the store
//! has to assemble before anything can apply), a response consumer performs
//! the blocking RPC call and hands back individual blocks, and an applier
//! feeds each one to the controller. The producer and consumer run on their
//! own threads; the applier runs on the caller's thread, since the
//! controller is a single-writer type and isn't meant to be shared across
//! threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;

use chain_backend::Backend;
use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{Block, BlockReceipt, Hash};
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::controller::Controller;

/// The block-store service's notion of "where the chain currently is",
/// per the `get_highest_block` RPC.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Topology {
    pub id: Hash,
    pub height: u64,
}

/// One block as handed back by `get_blocks_by_height`. `receipt` is only
/// populated when the caller asked for it, which the applier needs for the
/// unverified bulk-replay path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockItem {
    pub block: Block,
    pub receipt: Option<BlockReceipt>,
}

/// The indexer's only external dependency: a client for the block-store
/// service. Lives outside this crate in a real deployment (it is the RPC
/// transport plumbing named in the external-interfaces list); this trait is
/// the seam the indexer calls through.
pub trait BlockStoreClient: Send + Sync {
    fn get_highest_block(&self) -> anyhow::Result<Topology>;

    fn get_blocks_by_height(
        &self,
        head_id: Hash,
        start_height: u64,
        num: u64,
        return_block: bool,
        return_receipt: bool,
    ) -> anyhow::Result<Vec<BlockItem>>;
}

struct BatchRequest {
    start_height: u64,
    count: u64,
}

pub struct Indexer<C: BlockStoreClient> {
    client: Arc<C>,
    config: NetworkConfig,
    stopped: Arc<AtomicBool>,
}

impl<C: BlockStoreClient + 'static> Indexer<C> {
    pub fn new(client: Arc<C>, config: NetworkConfig) -> Self {
        Indexer {
            client,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests the pipeline stop at the next loop turn in each stage.
    /// Idempotent; safe to call from a signal handler.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Streams blocks from `head_id`'s branch, from local head's height up
    /// to `target_height`, applying each one via `controller`.
    ///
    /// Returns `Ok(true)` once local head reaches `target_height`, `Ok(false)`
    /// if the pipeline was stopped before getting there, and `Err` if the
    /// block store or the controller rejected something along the way.
    pub fn index<B: Backend>(
        &self,
        controller: &Controller<B>,
        head_id: Hash,
        target_height: u64,
        verify: bool,
    ) -> Result<bool> {
        let local_height = controller.get_head_info().height;
        if local_height >= target_height {
            return Ok(true);
        }

        let (request_tx, request_rx) = bounded::<BatchRequest>(self.config.indexer_request_queue_depth);
        let (block_tx, block_rx) = bounded::<BlockItem>(self.config.indexer_block_queue_depth);

        let rpc_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

        let producer = {
            let stopped = self.stopped.clone();
            let initial_batch = self.config.indexer_initial_batch_size;
            let max_batch = self.config.indexer_max_batch_size;
            thread::spawn(move || {
                let mut next_height = local_height + 1;
                let mut batch_size = initial_batch;
                while !stopped.load(Ordering::SeqCst) && next_height <= target_height {
                    let count = batch_size.min(max_batch).min(target_height - next_height + 1);
                    if request_tx
                        .send(BatchRequest {
                            start_height: next_height,
                            count,
                        })
                        .is_err()
                    {
                        break;
                    }
                    next_height += count;
                    batch_size = (batch_size * 2).min(max_batch);
                }
            })
        };

        let consumer = {
            let stopped = self.stopped.clone();
            let client = self.client.clone();
            let rpc_error = rpc_error.clone();
            thread::spawn(move || {
                for request in request_rx {
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    match client.get_blocks_by_height(head_id, request.start_height, request.count, true, verify) {
                        Ok(items) => {
                            for item in items {
                                if block_tx.send(item).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            *rpc_error.lock().unwrap() = Some(e);
                            stopped.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            })
        };

        let mut applied_error = None;
        for item in block_rx {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let outcome = if verify {
                controller.submit_block(item.block, Some(target_height)).map(|_| ())
            } else {
                match item.receipt {
                    Some(receipt) => controller.apply_block_delta(item.block, receipt, target_height),
                    None => Err(chain_error!(
                        IndexerFailure;
                        "unverified catch-up requires a precomputed receipt, none returned by the block store"
                    )),
                }
            };

            if let Err(e) = outcome {
                applied_error = Some(e);
                self.stop();
                break;
            }
        }

        producer.join().expect("indexer request-producer thread panicked");
        consumer.join().expect("indexer response-consumer thread panicked");

        if let Some(e) = applied_error {
            return Err(e);
        }
        if let Some(e) = rpc_error.lock().unwrap().take() {
            return Err(chain_error!(IndexerFailure; "block store request failed: {}", e));
        }

        Ok(controller.get_head_info().height >= target_height)
    }
}
