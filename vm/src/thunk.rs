//! A process-wide registry mapping a native function ("thunk") id to its
//! implementation. Thunks receive the host and a serialized argument blob
//! and return a serialized result.

use std::collections::HashMap;

use chain_shared::chain_error;
use chain_shared::error::Result;

use crate::host::Host;

pub type ThunkId = u32;
pub type ThunkFn = fn(&dyn Host, &[u8]) -> Result<Vec<u8>>;

#[derive(Default)]
pub struct ThunkRegistry {
    thunks: HashMap<ThunkId, ThunkFn>,
}

impl ThunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a duplicate id: registering the same thunk twice is a
    /// programming error, caught at startup rather than handled at runtime.
    pub fn register(&mut self, id: ThunkId, f: ThunkFn) {
        if self.thunks.insert(id, f).is_some() {
            panic!("thunk id {id} registered twice");
        }
    }

    pub fn invoke(&self, id: ThunkId, host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
        let f = self
            .thunks
            .get(&id)
            .ok_or_else(|| chain_error!(UnknownThunk; "no thunk registered for id {}", id))?;
        f(host, args)
    }

    pub fn contains(&self, id: ThunkId) -> bool {
        self.thunks.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::host::TreeHost;
    use chain_backend::MemoryBackend;
    use chain_shared::{zero_hash, SupportedHashes};
    use chain_state::DeltaTree;

    fn echo(_host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
        Ok(args.to_vec())
    }

    #[test]
    fn invoking_an_unregistered_id_fails() {
        let registry = ThunkRegistry::new();
        let ctx = ExecutionContext::new();
        let root = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let tree = DeltaTree::new(MemoryBackend::new(), root);
        let host = TreeHost::new(&tree, &ctx);
        assert!(registry.invoke(1, &host, b"x").is_err());
    }

    #[test]
    #[should_panic]
    fn registering_the_same_id_twice_panics() {
        let mut registry = ThunkRegistry::new();
        registry.register(1, echo);
        registry.register(1, echo);
    }

    #[test]
    fn registered_thunk_is_invoked() {
        let mut registry = ThunkRegistry::new();
        registry.register(1, echo);
        let ctx = ExecutionContext::new();
        let root = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let tree = DeltaTree::new(MemoryBackend::new(), root);
        let host = TreeHost::new(&tree, &ctx);
        assert_eq!(registry.invoke(1, &host, b"hi").unwrap(), b"hi");
    }
}
