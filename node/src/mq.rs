//! Request/response plumbing for the services this core calls out to over a
//! message broker: a service-addressed call carrying an opaque payload, with
//! either a typed reply or an error message coming back, the way
//! `koinos::mq::rpc_call` pairs a `req` with a `resp` xor `err`.
//!
//! The broker connection (AMQP or otherwise) and the wire encoding it uses
//! are a transport concern that lives outside this crate; what's here is
//! the call shape, the block-store service's request/response
//! types, and a default-timeout convention (750 ms, per the miscellaneous
//! RPCs named in the concurrency model).

use std::time::Duration;

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::Hash;
use serde::{Deserialize, Serialize};

use crate::indexer::{BlockItem, BlockStoreClient, Topology};

pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 750;

/// One broker call: addressed to a named service and method, carrying an
/// opaque serialized request body.
#[derive(Clone, Debug)]
pub struct MqRequest {
    pub service: String,
    pub method: String,
    pub payload: Vec<u8>,
    pub timeout: Duration,
}

/// What comes back: the callee's serialized payload, or its error message.
#[derive(Clone, Debug)]
pub enum MqResponse {
    Payload(Vec<u8>),
    Error(String),
}

/// The seam a concrete broker binding implements. `call` blocks the caller
/// until a response arrives or `request.timeout` elapses; a transport-level
/// failure (connection lost, timeout, malformed frame) is an `anyhow::Error`
/// rather than a coded one, since it has no meaning at the protocol level
/// this crate cares about.
pub trait MqClient: Send + Sync {
    fn call(&self, request: MqRequest) -> anyhow::Result<MqResponse>;
}

#[derive(Serialize, Deserialize)]
struct BlocksByHeightRequest {
    head_id: Hash,
    start_height: u64,
    num_blocks: u64,
    return_block: bool,
    return_receipt: bool,
}

/// Adapts a generic [`MqClient`] into the block-store RPC surface the
/// indexer calls through, encoding request bodies and decoding responses
/// with this crate's usual CBOR convention.
pub struct BlockStoreService<'a, M: MqClient> {
    client: &'a M,
    timeout_ms: u64,
}

impl<'a, M: MqClient> BlockStoreService<'a, M> {
    pub fn new(client: &'a M, timeout_ms: u64) -> Self {
        BlockStoreService { client, timeout_ms }
    }

    fn request<T: Serialize, R: for<'de> Deserialize<'de>>(&self, method: &str, body: &T) -> anyhow::Result<R> {
        let payload = serde_cbor::to_vec(body)?;
        let request = MqRequest {
            service: "block_store".to_string(),
            method: method.to_string(),
            payload,
            timeout: Duration::from_millis(self.timeout_ms),
        };
        match self.client.call(request)? {
            MqResponse::Payload(bytes) => Ok(serde_cbor::from_slice(&bytes)?),
            MqResponse::Error(message) => Err(anyhow::anyhow!("block store returned an error: {}", message)),
        }
    }
}

impl<'a, M: MqClient> BlockStoreClient for BlockStoreService<'a, M> {
    fn get_highest_block(&self) -> anyhow::Result<Topology> {
        self.request("get_highest_block", &())
    }

    fn get_blocks_by_height(
        &self,
        head_id: Hash,
        start_height: u64,
        num: u64,
        return_block: bool,
        return_receipt: bool,
    ) -> anyhow::Result<Vec<BlockItem>> {
        self.request(
            "get_blocks_by_height",
            &BlocksByHeightRequest {
                head_id,
                start_height,
                num_blocks: num,
                return_block,
                return_receipt,
            },
        )
    }
}

/// Wraps a generic miscellaneous RPC failure as a coded error for callers
/// that need one, using the 750 ms default timeout convention.
pub fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS)
}

pub fn rpc_failure(service: &str, cause: anyhow::Error) -> chain_shared::ChainError {
    chain_error!(IndexerFailure; "{} request failed: {}", service, cause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_shared::{zero_hash, SupportedHashes};
    use std::sync::Mutex;

    struct EchoClient {
        highest: Topology,
        last_request: Mutex<Option<MqRequest>>,
    }

    impl MqClient for EchoClient {
        fn call(&self, request: MqRequest) -> anyhow::Result<MqResponse> {
            let method = request.method.clone();
            *self.last_request.lock().unwrap() = Some(request);
            match method.as_str() {
                "get_highest_block" => Ok(MqResponse::Payload(serde_cbor::to_vec(&self.highest)?)),
                "get_blocks_by_height" => Ok(MqResponse::Payload(serde_cbor::to_vec::<Vec<BlockItem>>(&Vec::new())?)),
                other => Ok(MqResponse::Error(format!("unknown method {}", other))),
            }
        }
    }

    #[test]
    fn get_highest_block_round_trips_through_cbor() {
        let highest = Topology {
            id: zero_hash(SupportedHashes::Sha2_256.code()).unwrap(),
            height: 42,
        };
        let client = EchoClient {
            highest,
            last_request: Mutex::new(None),
        };
        let service = BlockStoreService::new(&client, DEFAULT_RPC_TIMEOUT_MS);

        let topology = service.get_highest_block().unwrap();
        assert_eq!(topology.height, 42);
    }

    #[test]
    fn get_blocks_by_height_sends_the_requested_range() {
        let client = EchoClient {
            highest: Topology {
                id: zero_hash(SupportedHashes::Sha2_256.code()).unwrap(),
                height: 0,
            },
            last_request: Mutex::new(None),
        };
        let service = BlockStoreService::new(&client, DEFAULT_RPC_TIMEOUT_MS);

        let head_id = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let items = service.get_blocks_by_height(head_id, 5, 10, true, false).unwrap();
        assert!(items.is_empty());

        let sent = client.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.method, "get_blocks_by_height");
        let decoded: BlocksByHeightRequest = serde_cbor::from_slice(&sent.payload).unwrap();
        assert_eq!(decoded.start_height, 5);
        assert_eq!(decoded.num_blocks, 10);
    }
}
