// Receipts record the observable outcome of executing a transaction or
// block: resource consumption, emitted events, and (for transactions) the
// reversion/failure code if execution did not fully succeed.

use crate::error::ErrorCode;
use crate::hash::Hash;
use serde::{Deserialize, Serialize};

/// An event raised by a contract during execution, surfaced to light
/// clients and indexers without requiring them to replay state transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub name: String,
    pub data: Vec<u8>,
    /// Addresses that opted in to receiving this event (empty means "broadcast").
    pub impacted: Vec<crate::address::Address>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub disk_storage_used: u64,
    pub network_bandwidth_used: u64,
    pub compute_bandwidth_used: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub id: Hash,
    pub payer: crate::address::Address,
    pub resources: ResourceUsage,
    pub events: Vec<Event>,
    /// Set when the transaction reverted or failed; `None` means full success.
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl TransactionReceipt {
    pub fn success(id: Hash, payer: crate::address::Address, resources: ResourceUsage) -> Self {
        TransactionReceipt {
            id,
            payer,
            resources,
            events: Vec::new(),
            error_code: None,
            error_message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReceipt {
    pub id: Hash,
    pub transaction_receipts: Vec<TransactionReceipt>,
    pub state_merkle_root: Hash,
    pub disk_storage_used: u64,
    pub network_bandwidth_used: u64,
    pub compute_bandwidth_used: u64,
}
