//! Node-level orchestration: the controller that owns the writer and the
//! fork-aware state tree, the catch-up indexer, the mempool, and the thin
//! adapters that let the core call out to its external collaborators (the
//! block store over a message broker).

pub mod config;
pub mod controller;
pub mod indexer;
pub mod mempool;
pub mod mq;
pub mod runner;

pub use config::NetworkConfig;
pub use controller::{Controller, GenesisEntries};
pub use indexer::{BlockItem, BlockStoreClient, Indexer, Topology};
pub use mempool::Mempool;
pub use mq::{BlockStoreService, MqClient, MqRequest, MqResponse};
pub use runner::ContractCallRunner;
