// Transactions and the operations they carry.

use crate::address::Address;
use crate::hash::{hash, Hash, SupportedHashes};
use serde::{Deserialize, Serialize};
use serde_tuple::{Deserialize_tuple, Serialize_tuple};

/// A system-call override target: either a different native thunk, or a
/// user contract's entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemCallTarget {
    Thunk(u32),
    Contract(ContractCallBundle),
}

/// (contract address, entry point) -- stored in the system-call dispatch
/// space keyed by the system-call id it overrides, and used directly as the
/// `call_contract` operation's target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallBundle {
    pub contract_id: Address,
    pub entry_point: u32,
}

/// A tagged union of the actions a transaction may request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    UploadContract { bytecode: Vec<u8> },
    CallContract(ContractCallBundle, Vec<u8>),
    SetSystemCall { call_id: u32, target: SystemCallTarget },
    Nop,
    /// Always rejected by policy; exists so malformed/placeholder operation
    /// tags have a defined, inert decoding rather than failing to parse.
    Reserved,
}

/// The signed portion of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct TransactionHeader {
    pub operations: Vec<Operation>,
    pub rc_limit: u64,
    pub nonce: u64,
    pub payer: Address,
}

impl TransactionHeader {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("transaction header serialization cannot fail")
    }

    pub fn id(&self) -> Hash {
        hash(SupportedHashes::Sha2_256.code(), &self.canonical_bytes())
            .expect("sha2-256 is always supported")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub header: TransactionHeader,
    /// 65-byte compact recoverable ECDSA signature over `header.id()`'s digest.
    pub signature: [u8; 65],
}

impl Transaction {
    pub fn id(&self) -> Hash {
        self.header.id()
    }
}
