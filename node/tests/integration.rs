//! Cross-module scenarios that exercise the controller together with the
//! mempool and the indexer, the way a single unit test inside one module
//! can't.

use std::sync::Arc;

use chain_backend::MemoryBackend;
use chain_shared::address::{derive_address, privkey_from_seed, sign_digest};
use chain_shared::{
    hash as compute_hash, zero_hash, Address, Block, BlockHeader, ErrorCode, Operation, SupportedHashes, Transaction,
    TransactionHeader,
};
use chain_node::indexer::{BlockItem, BlockStoreClient, Topology};
use chain_node::{Controller, Indexer, Mempool, NetworkConfig};

fn system_authority() -> Address {
    derive_address(&privkey_from_seed("system authority seed"))
}

fn new_controller() -> Controller<MemoryBackend> {
    let chain_id = compute_hash(SupportedHashes::Sha2_256.code(), b"integration test seed").unwrap();
    let genesis = vec![(chain_shared::Space::Metadata, b"chain-id".to_vec(), chain_id.to_bytes())];
    Controller::new(MemoryBackend::new(), genesis, system_authority(), NetworkConfig::default()).unwrap()
}

fn signed_block(height: u64, previous_id: chain_shared::Hash, seed: &str, transactions: Vec<Transaction>) -> Block {
    let sk = privkey_from_seed(seed);
    let signer = derive_address(&sk);
    let merkle_root = {
        use chain_shared::Hash;
        let mut ids: Vec<Hash> = transactions.iter().map(|t| t.id()).collect();
        if ids.is_empty() {
            zero_hash(SupportedHashes::Sha2_256.code()).unwrap()
        } else {
            // A single-leaf tree walker passes the leaf through unchanged
            // (no sibling to reduce against), matching the controller's own
            // transaction_merkle_root; these tests only ever submit zero or
            // one transaction per block, so this is always that leaf's id.
            ids.remove(0)
        }
    };
    let header = BlockHeader {
        height,
        timestamp: height,
        previous_id,
        transaction_merkle_root: merkle_root,
        signer,
    };
    let mut digest = [0u8; 32];
    digest.copy_from_slice(header.id().digest());
    let signature = sign_digest(&sk, &digest);
    Block {
        header,
        signature,
        transactions,
    }
}

#[test]
fn mempool_enforces_payer_budget_and_frees_it_on_prune() {
    let mempool = Mempool::new();
    let payer = derive_address(&privkey_from_seed("budget payer"));

    let make_trx = |nonce: u64, rc_limit: u64| {
        let sk = privkey_from_seed("budget payer");
        let header = TransactionHeader {
            operations: vec![Operation::Nop],
            rc_limit,
            nonce,
            payer,
        };
        let mut digest = [0u8; 32];
        digest.copy_from_slice(header.id().digest());
        let signature = sign_digest(&sk, &digest);
        Transaction { header, signature }
    };

    let first = make_trx(1, 10);
    let first_id = first.id();
    mempool.add_pending_transaction(first_id, first, 1, payer, 25, 10).unwrap();

    let second = make_trx(2, 20);
    let err = mempool
        .add_pending_transaction(second.id(), second, 1, payer, 25, 20)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PendingTransactionExceedsResources);

    mempool.prune(1);
    assert!(!mempool.has_pending_transaction(&first_id));

    let third = make_trx(3, 20);
    mempool.add_pending_transaction(third.id(), third, 2, payer, 25, 20).unwrap();
}

struct ChainFixture {
    blocks: Vec<Block>,
}

impl BlockStoreClient for ChainFixture {
    fn get_highest_block(&self) -> anyhow::Result<Topology> {
        let last = self.blocks.last().unwrap();
        Ok(Topology {
            id: last.id(),
            height: last.header.height,
        })
    }

    fn get_blocks_by_height(
        &self,
        _head_id: chain_shared::Hash,
        start_height: u64,
        num: u64,
        _return_block: bool,
        _return_receipt: bool,
    ) -> anyhow::Result<Vec<BlockItem>> {
        let end = (start_height + num).min(self.blocks.len() as u64 + 1);
        Ok((start_height..end)
            .map(|h| BlockItem {
                block: self.blocks[(h - 1) as usize].clone(),
                receipt: None,
            })
            .collect())
    }
}

#[test]
fn indexer_catches_a_fresh_controller_up_to_the_store_head() {
    const CHAIN_LENGTH: u64 = 12;

    let root_id = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
    let mut blocks = Vec::new();
    let mut previous = root_id;
    for height in 1..=CHAIN_LENGTH {
        let block = signed_block(height, previous, "catch-up chain", vec![]);
        previous = block.id();
        blocks.push(block);
    }
    let head_id = blocks.last().unwrap().id();

    let controller = new_controller();
    let client = Arc::new(ChainFixture { blocks });
    let indexer = Indexer::new(client, NetworkConfig::default());

    let caught_up = indexer.index(&controller, head_id, CHAIN_LENGTH, true).unwrap();

    assert!(caught_up);
    assert_eq!(controller.get_head_info().height, CHAIN_LENGTH);
}

#[test]
fn indexer_stop_flag_prevents_any_block_from_being_applied() {
    const CHAIN_LENGTH: u64 = 20;

    let root_id = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
    let mut blocks = Vec::new();
    let mut previous = root_id;
    for height in 1..=CHAIN_LENGTH {
        let block = signed_block(height, previous, "cancelled chain", vec![]);
        previous = block.id();
        blocks.push(block);
    }
    let head_id = blocks.last().unwrap().id();

    let controller = new_controller();
    let client = Arc::new(ChainFixture { blocks });
    let indexer = Indexer::new(client, NetworkConfig::default());
    indexer.stop();

    let caught_up = indexer.index(&controller, head_id, CHAIN_LENGTH, true).unwrap();

    assert!(!caught_up);
    assert_eq!(controller.get_head_info().height, 0);
}
