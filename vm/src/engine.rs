//! The WASM VM adapter: parses and runs contract bytecode under wasmtime,
//! wiring the two numbered host imports (`invoke_thunk`, `invoke_system_call`)
//! to the syscall dispatcher, and translating fuel into the resource meter's
//! compute-bandwidth accounting.

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chain_shared::chain_error;
use chain_shared::error::{ChainError, Result};
use chain_shared::{Hash, SupportedHashes};
use lru::LruCache;

use crate::bridge::{write_return, Memory as BridgeMemory, TickBridge};
use crate::host::Host;
use crate::syscall::SyscallDispatcher;

/// Tunables named in `§4.7` as "implementation default".
#[derive(Clone, Copy, Debug)]
pub struct VmConfig {
    pub memory_pages_limit: u32,
    pub max_call_depth: usize,
    pub module_cache_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            memory_pages_limit: 512,
            max_call_depth: 251,
            module_cache_capacity: 256,
        }
    }
}

/// Bytes of native stack budgeted per WASM call-stack frame; translates the
/// spec's depth limit into wasmtime's byte-denominated stack-size knob.
const STACK_BYTES_PER_FRAME: usize = 4096;

#[derive(Clone, Copy)]
enum HostCallKind {
    Thunk,
    SystemCall,
}

/// Per-run store data. Holds raw pointers to the borrowed [`Host`] and
/// [`SyscallDispatcher`] rather than references, because `wasmtime::Store<T>`
/// requires `T: 'static` while `run`'s borrows are scoped to one call --
/// mirrors the original VM backend's own use of raw pointers across the
/// guest/host boundary (`resolve_ptr`, `fizzy_get_execution_context_ticks`).
/// Soundness: the pointers are only dereferenced while `run` is on the stack,
/// and nothing stored here outlives that call.
struct StoreState {
    host: *const dyn Host,
    dispatcher: *const SyscallDispatcher<'static>,
    tick_bridge: RefCell<TickBridge>,
    captured_error: RefCell<Option<ChainError>>,
    limits: wasmtime::StoreLimits,
}

impl wasmtime::ResourceLimiter for StoreState {
    fn memory_growing(&mut self, current: usize, desired: usize, maximum: Option<usize>) -> anyhow::Result<bool> {
        self.limits.memory_growing(current, desired, maximum)
    }

    fn table_growing(&mut self, current: u32, desired: u32, maximum: Option<u32>) -> anyhow::Result<bool> {
        self.limits.table_growing(current, desired, maximum)
    }
}

impl StoreState {
    fn host(&self) -> &dyn Host {
        unsafe { &*self.host }
    }

    fn dispatcher(&self) -> &SyscallDispatcher<'static> {
        unsafe { &*self.dispatcher }
    }
}

pub struct WasmEngine {
    engine: wasmtime::Engine,
    cache: Mutex<LruCache<Hash, Arc<wasmtime::Module>>>,
    memory_pages_limit: u32,
}

impl WasmEngine {
    pub fn new(config: VmConfig) -> Result<Self> {
        let mut wt_config = wasmtime::Config::new();
        wt_config.consume_fuel(true);
        wt_config.max_wasm_stack(config.max_call_depth.saturating_mul(STACK_BYTES_PER_FRAME));
        let engine = wasmtime::Engine::new(&wt_config)
            .map_err(|e| chain_error!(InternalError; "wasmtime engine init failed: {}", e))?;
        let capacity = NonZeroUsize::new(config.module_cache_capacity.max(1)).unwrap();
        Ok(WasmEngine {
            engine,
            cache: Mutex::new(LruCache::new(capacity)),
            memory_pages_limit: config.memory_pages_limit,
        })
    }

    pub fn parse(&self, bytecode: &[u8]) -> Result<Arc<wasmtime::Module>> {
        wasmtime::Module::new(&self.engine, bytecode)
            .map(Arc::new)
            .map_err(|e| chain_error!(ModuleParse; "{}", e))
    }

    fn module_for(&self, bytecode: &[u8], cache_key: Option<Hash>) -> Result<Arc<wasmtime::Module>> {
        if let Some(key) = cache_key {
            if let Some(hit) = self.cache.lock().unwrap().get(&key) {
                return Ok(hit.clone());
            }
            let module = self.parse(bytecode)?;
            self.cache.lock().unwrap().put(key, module.clone());
            return Ok(module);
        }
        self.parse(bytecode)
    }

    /// Runs `bytecode`'s `_start` export with `host`/`dispatcher` reachable
    /// from the two host imports, and returns whatever `set_contract_result`
    /// recorded on the current frame.
    pub fn run(&self, host: &dyn Host, dispatcher: &SyscallDispatcher<'_>, bytecode: &[u8], cache_key: Option<Hash>) -> Result<Vec<u8>> {
        let module = self.module_for(bytecode, cache_key)?;

        // Erase the borrow lifetimes; see `StoreState`'s safety comment.
        let host_ptr: *const dyn Host = host;
        let dispatcher_ptr: *const SyscallDispatcher<'static> =
            unsafe { std::mem::transmute::<*const SyscallDispatcher<'_>, *const SyscallDispatcher<'static>>(dispatcher) };

        let initial_fuel = host.context().meter.compute_bandwidth_remaining().min(i64::MAX as u64);
        let page_bytes = 65536usize.saturating_mul(self.memory_pages_limit as usize);
        let limits = wasmtime::StoreLimitsBuilder::new().memory_size(page_bytes).build();
        let state = StoreState {
            host: host_ptr,
            dispatcher: dispatcher_ptr,
            tick_bridge: RefCell::new(TickBridge::new(&host.context().meter)),
            captured_error: RefCell::new(None),
            limits,
        };
        let mut store = wasmtime::Store::new(&self.engine, state);
        store.limiter(|state| state);
        store
            .set_fuel(initial_fuel)
            .map_err(|e| chain_error!(InternalError; "fuel setup failed: {}", e))?;

        let mut linker: wasmtime::Linker<StoreState> = wasmtime::Linker::new(&self.engine);
        linker
            .func_wrap("env", "invoke_thunk", move |caller: wasmtime::Caller<'_, StoreState>, id: i32, ret_ptr: i32, ret_len: i32, arg_ptr: i32, arg_len: i32, out_written_ptr: i32| {
                host_import_entry(caller, HostCallKind::Thunk, id, ret_ptr, ret_len, arg_ptr, arg_len, out_written_ptr)
            })
            .map_err(|e| chain_error!(InternalError; "linking invoke_thunk failed: {}", e))?;
        linker
            .func_wrap("env", "invoke_system_call", move |caller: wasmtime::Caller<'_, StoreState>, id: i32, ret_ptr: i32, ret_len: i32, arg_ptr: i32, arg_len: i32, out_written_ptr: i32| {
                host_import_entry(caller, HostCallKind::SystemCall, id, ret_ptr, ret_len, arg_ptr, arg_len, out_written_ptr)
            })
            .map_err(|e| chain_error!(InternalError; "linking invoke_system_call failed: {}", e))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| chain_error!(WasmTrap; "module instantiation failed: {}", e))?;

        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|e| chain_error!(ModuleParse; "module has no _start export: {}", e))?;

        let call_result = start.call(&mut store, ());

        let final_fuel = store.get_fuel().unwrap_or(0);
        {
            let mut bridge = store.data().tick_bridge.borrow_mut();
            let _ = bridge.charge_elapsed(&host.context().meter, final_fuel);
        }

        if let Some(captured) = store.data().captured_error.borrow_mut().take() {
            return Err(captured);
        }
        call_result.map_err(|e| chain_error!(WasmTrap; "wasm trap: {}", e))?;

        host.context().top_frame_call_return().or_else(|_| Ok(Vec::new()))
    }
}

#[allow(clippy::too_many_arguments)]
fn host_import_entry(
    mut caller: wasmtime::Caller<'_, StoreState>,
    kind: HostCallKind,
    id: i32,
    ret_ptr: i32,
    ret_len: i32,
    arg_ptr: i32,
    arg_len: i32,
    out_written_ptr: i32,
) -> anyhow::Result<i32> {
    let trap_with = |caller: &wasmtime::Caller<'_, StoreState>, e: ChainError| -> anyhow::Result<i32> {
        let message = e.message.clone();
        *caller.data().captured_error.borrow_mut() = Some(e);
        Err(anyhow::anyhow!(message))
    };

    let current_fuel = caller.get_fuel().unwrap_or(0);
    {
        let state = caller.data();
        let meter = &state.host().context().meter;
        let mut bridge = state.tick_bridge.borrow_mut();
        if let Err(e) = bridge.charge_elapsed(meter, current_fuel) {
            drop(bridge);
            return trap_with(&caller, e);
        }
    }

    let memory = match caller.get_export("memory") {
        Some(wasmtime::Extern::Memory(m)) => m,
        _ => return trap_with(&caller, chain_error!(WasmTrap; "module has no exported memory")),
    };

    let result = (|| -> Result<Vec<u8>> {
        let args = {
            let data = memory.data(&caller);
            data.try_slice(arg_ptr as u32, arg_len as u32)?.to_vec()
        };
        let state = caller.data();
        match kind {
            HostCallKind::Thunk => state.dispatcher().invoke_thunk(id as u32, state.host(), &args),
            HostCallKind::SystemCall => state.dispatcher().invoke_system_call(id as u32, state.host(), &args),
        }
    })();

    let new_fuel = host_remaining_fuel(&caller);
    let _ = caller.set_fuel(new_fuel);

    match result {
        Ok(bytes) => {
            let data = memory.data_mut(&mut caller);
            match write_return(data, ret_ptr as u32, ret_len as u32, out_written_ptr as u32, &bytes) {
                Ok(()) => Ok(0),
                Err(e) => trap_with(&caller, e),
            }
        }
        Err(e) => trap_with(&caller, e),
    }
}

fn host_remaining_fuel(caller: &wasmtime::Caller<'_, StoreState>) -> u64 {
    caller
        .data()
        .host()
        .context()
        .meter
        .compute_bandwidth_remaining()
        .min(i64::MAX as u64)
}

/// Content-addresses bytecode for the module cache key.
pub fn cache_key_for(bytecode: &[u8]) -> Hash {
    chain_shared::hash(SupportedHashes::Sha2_256.code(), bytecode).expect("sha2-256 is always supported")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_implementation_defaults() {
        let config = VmConfig::default();
        assert_eq!(config.memory_pages_limit, 512);
        assert_eq!(config.max_call_depth, 251);
    }

    #[test]
    fn cache_key_is_stable_for_identical_bytecode() {
        let a = cache_key_for(b"same bytes");
        let b = cache_key_for(b"same bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_differs_for_different_bytecode() {
        assert_ne!(cache_key_for(b"one"), cache_key_for(b"two"));
    }
}
