//! Execution context, host/thunk seam, system-call dispatch and the WASM VM
//! adapter that runs contract bytecode against a fork-aware state tree.

pub mod bridge;
pub mod context;
pub mod engine;
pub mod host;
pub mod meter;
pub mod syscall;
pub mod thunk;
pub mod thunks;

pub use context::{ExecutionContext, Frame, Intent, Privilege};
pub use engine::{VmConfig, WasmEngine};
pub use host::{Host, TreeHost};
pub use meter::{RcSession, ResourceLimitData, ResourceMeter};
pub use syscall::{ContractRunner, SyscallDispatcher};
pub use thunk::{ThunkFn, ThunkId, ThunkRegistry};
