//! The seam between thunks and the fork-aware state database: thunks are
//! generic over [`Host`] rather than over a concrete backend, so they don't
//! need to know whether they're running against a [`chain_backend::MemoryBackend`]
//! or something durable.

use chain_backend::{Backend, Direction};
use chain_shared::error::Result;
use chain_shared::{Hash, Space};
use chain_state::DeltaTree;

use crate::context::ExecutionContext;

pub trait Host {
    fn context(&self) -> &ExecutionContext;

    fn state_get(&self, space: &Space, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn state_put(&self, space: &Space, key: &[u8], value: Vec<u8>) -> Result<()>;
    fn state_remove(&self, space: &Space, key: &[u8]) -> Result<()>;
    fn state_range(
        &self,
        space: &Space,
        from_key: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// A [`Host`] bound to one [`DeltaTree`] and the execution context's
/// currently-set state node.
pub struct TreeHost<'a, B: Backend> {
    pub tree: &'a DeltaTree<B>,
    pub ctx: &'a ExecutionContext,
}

impl<'a, B: Backend> TreeHost<'a, B> {
    pub fn new(tree: &'a DeltaTree<B>, ctx: &'a ExecutionContext) -> Self {
        TreeHost { tree, ctx }
    }

    fn node(&self) -> Result<Hash> {
        self.ctx.get_state_node()
    }
}

impl<'a, B: Backend> Host for TreeHost<'a, B> {
    fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    fn state_get(&self, space: &Space, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let node = self.node()?;
        self.tree.get(node, space, key)
    }

    fn state_put(&self, space: &Space, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.ctx.require_writable()?;
        let node = self.node()?;
        self.tree.put(node, space, key, value)
    }

    fn state_remove(&self, space: &Space, key: &[u8]) -> Result<()> {
        self.ctx.require_writable()?;
        let node = self.node()?;
        self.tree.remove(node, space, key)
    }

    fn state_range(
        &self,
        space: &Space,
        from_key: &[u8],
        direction: Direction,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let node = self.node()?;
        self.tree.range(node, space, from_key, direction)
    }
}
