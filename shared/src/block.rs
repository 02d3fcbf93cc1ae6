// Block headers and the Merkle root over their transaction set.

use crate::address::Address;
use crate::hash::{hash, Hash, SupportedHashes};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_tuple::{Deserialize_tuple, Serialize_tuple};

/// The signed portion of a block: everything a signer commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct BlockHeader {
    /// Monotonically increasing block height; genesis is height 1.
    pub height: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Id of the previous block (the all-zero hash for the first block).
    pub previous_id: Hash,
    /// Merkle root over the block's ordered transaction set (see `merkle` crate-internal to `chain-state`).
    pub transaction_merkle_root: Hash,
    /// Address of the block producer.
    pub signer: Address,
}

impl BlockHeader {
    /// Canonical serialization used both to compute the block id and to
    /// feed the signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("block header serialization cannot fail")
    }

    pub fn id(&self) -> Hash {
        hash(SupportedHashes::Sha2_256.code(), &self.canonical_bytes())
            .expect("sha2-256 is always supported")
    }
}

/// A full block: header, detached signature, and the ordered transaction payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// 65-byte compact recoverable ECDSA signature over `header.id()`'s digest.
    pub signature: [u8; 65],
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn id(&self) -> Hash {
        self.header.id()
    }
}
