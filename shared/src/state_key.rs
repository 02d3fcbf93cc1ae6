// The (space, key) addressing scheme for the state database. System spaces
// carry stable integer tags; contract-private spaces are identified by the
// owning contract's address.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// An opaque tag identifying an address-space within the state database.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Space {
    /// Chain-wide metadata: chain-id, head info, genesis markers.
    Metadata,
    /// System-call id -> override entry (thunk id or contract-call bundle).
    SystemCallDispatch,
    /// Contract address -> uploaded bytecode.
    ContractBytecode,
    /// Payer address -> last-used nonce.
    TransactionNonce,
    /// Payer address -> max-rc account record.
    AccountResources,
    /// A contract's own private key/value space.
    Contract(Address),
}

impl Space {
    /// Stable ordinal used when a space needs to sort before its key bytes
    /// (range iteration orders first by space, then by key).
    pub fn tag(&self) -> u32 {
        match self {
            Space::Metadata => 0,
            Space::SystemCallDispatch => 1,
            Space::ContractBytecode => 2,
            Space::TransactionNonce => 3,
            Space::AccountResources => 4,
            Space::Contract(_) => 5,
        }
    }
}

/// A key within a [`Space`]; ordering of the byte sequence defines
/// range-iteration order within that space.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub space: Space,
    pub key: Vec<u8>,
}

impl StateKey {
    pub fn new(space: Space, key: impl Into<Vec<u8>>) -> Self {
        StateKey {
            space,
            key: key.into(),
        }
    }

    /// Canonical ordering key: (space tag, space discriminant bytes, key bytes).
    /// Used by the backend and delta-tree iterators so entries in different
    /// spaces never interleave.
    pub fn sort_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.key.len() + 24);
        out.extend_from_slice(&self.tag_bytes());
        out.extend_from_slice(&self.key);
        out
    }

    fn tag_bytes(&self) -> [u8; 21] {
        let mut out = [0u8; 21];
        out[0] = self.space.tag() as u8;
        if let Space::Contract(addr) = &self.space {
            out[1..21].copy_from_slice(addr.as_bytes());
        }
        out
    }
}
