//! Wires the system-call dispatcher's `ContractRunner` seam to the WASM
//! engine: resolves a contract's bytecode, pushes a user-mode call frame and
//! runs it. Shared by nested system-call-to-contract dispatch and the
//! top-level `CallContract` operation, so a contract reached either way goes
//! through the same frame/cache-key/fuel plumbing.

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{ContractCallBundle, Space};
use chain_vm::context::Frame;
use chain_vm::engine::cache_key_for;
use chain_vm::{ContractRunner, Host, SyscallDispatcher, ThunkRegistry, WasmEngine};

pub struct ContractCallRunner<'a> {
    pub engine: &'a WasmEngine,
    pub thunks: &'a ThunkRegistry,
}

impl<'a> ContractRunner for ContractCallRunner<'a> {
    fn call_contract(&self, host: &dyn Host, bundle: ContractCallBundle, args: &[u8]) -> Result<Vec<u8>> {
        let bytecode = host
            .state_get(&Space::ContractBytecode, bundle.contract_id.as_bytes())?
            .ok_or_else(|| chain_error!(InvalidContract; "no bytecode uploaded for contract {}", bundle.contract_id))?;

        let cache_key = cache_key_for(&bytecode);
        let dispatcher = SyscallDispatcher::new(self.thunks, self);
        let frame = Frame::user_call(bundle.contract_id, bundle.entry_point, args.to_vec());
        host.context()
            .with_frame(frame, || self.engine.run(host, &dispatcher, &bytecode, Some(cache_key)))
    }
}
