//! The fork-aware, versioned state database: an overlay tree over a
//! key-value backend (see [`delta`]), a block-header index for branch
//! diffing and root selection (see [`fork`]), and the Merkle tree-walker
//! shared by both (see [`merkle`]).

pub mod delta;
pub mod fork;
pub mod merkle;

pub use delta::DeltaTree;
pub use fork::{BlockState, ForkDatabase};
pub use merkle::{MerkleOps, TreeWalker};
