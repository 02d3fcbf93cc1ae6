//! Types shared across the chain-core crates: hashes, addresses, state
//! keys, blocks/transactions and their receipts, and the coded error type.

pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod receipt;
pub mod state_key;
pub mod transaction;

pub use address::Address;
pub use block::{Block, BlockHeader};
pub use error::{ChainError, ErrorClass, ErrorCode, Result};
pub use hash::{hash, zero_hash, Hash, SupportedHashes};
pub use receipt::{BlockReceipt, Event, ResourceUsage, TransactionReceipt};
pub use state_key::{Space, StateKey};
pub use transaction::{ContractCallBundle, Operation, SystemCallTarget, Transaction, TransactionHeader};
