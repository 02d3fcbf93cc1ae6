//! System-call dispatch: for each numbered system call, resolve an override
//! entry stored in the state database to either a thunk or a contract, and
//! invoke it. The VM adapter supplies a [`ContractRunner`] so this module
//! never depends on the wasmtime engine directly.

use std::collections::HashMap;

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{ContractCallBundle, Space, SystemCallTarget};
use lazy_static::lazy_static;

use crate::context::{Frame, Privilege};
use crate::host::Host;
use crate::thunk::{ThunkId, ThunkRegistry};
use crate::thunks::ids;

/// Invoked by the dispatcher when an override resolves to a contract-call
/// bundle. The WASM VM adapter is the only implementor; kept as a trait here
/// so dispatch doesn't depend on the engine crate module.
pub trait ContractRunner {
    fn call_contract(&self, host: &dyn Host, bundle: ContractCallBundle, args: &[u8]) -> Result<Vec<u8>>;
}

lazy_static! {
    /// Compile-time default system-call id -> thunk id map, used when no
    /// override entry is recorded in the dispatch space. System-call ids
    /// mirror the thunk ids they default to.
    static ref DEFAULT_THUNKS: HashMap<u32, ThunkId> = {
        let mut m = HashMap::new();
        m.insert(ids::PRINTS, ids::PRINTS);
        m.insert(ids::GET_OBJECT, ids::GET_OBJECT);
        m.insert(ids::PUT_OBJECT, ids::PUT_OBJECT);
        m.insert(ids::REMOVE_OBJECT, ids::REMOVE_OBJECT);
        m.insert(ids::GET_NEXT_OBJECT, ids::GET_NEXT_OBJECT);
        m.insert(ids::GET_PREV_OBJECT, ids::GET_PREV_OBJECT);
        m.insert(ids::HASH, ids::HASH);
        m.insert(ids::VERIFY_SIGNATURE, ids::VERIFY_SIGNATURE);
        m.insert(ids::GET_TRANSACTION_PAYER, ids::GET_TRANSACTION_PAYER);
        m.insert(ids::GET_TRANSACTION_RC_LIMIT, ids::GET_TRANSACTION_RC_LIMIT);
        m.insert(ids::GET_MAX_ACCOUNT_RC, ids::GET_MAX_ACCOUNT_RC);
        m.insert(ids::GET_CALLER, ids::GET_CALLER);
        m.insert(ids::GET_CONTRACT_ARGUMENTS, ids::GET_CONTRACT_ARGUMENTS);
        m.insert(ids::SET_CONTRACT_RESULT, ids::SET_CONTRACT_RESULT);
        m.insert(ids::EXIT_CONTRACT, ids::EXIT_CONTRACT);
        m
    };
}

fn override_entry(host: &dyn Host, id: u32) -> Result<Option<SystemCallTarget>> {
    host.context().with_frame(Frame::system(Privilege::Kernel), || {
        let raw = host.state_get(&Space::SystemCallDispatch, &id.to_be_bytes())?;
        match raw {
            Some(bytes) => {
                let target: SystemCallTarget = serde_cbor::from_slice(&bytes)
                    .map_err(|e| chain_error!(UnexpectedState; "corrupt system-call override entry: {}", e))?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    })
}

pub struct SyscallDispatcher<'a> {
    pub thunks: &'a ThunkRegistry,
    pub runner: &'a dyn ContractRunner,
}

impl<'a> SyscallDispatcher<'a> {
    pub fn new(thunks: &'a ThunkRegistry, runner: &'a dyn ContractRunner) -> Self {
        SyscallDispatcher { thunks, runner }
    }

    /// Bypasses override resolution; requires the caller be running in a
    /// kernel-mode frame.
    pub fn invoke_thunk(&self, id: ThunkId, host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
        if host.context().get_privilege() != Privilege::Kernel {
            return Err(chain_error!(InsufficientPrivileges; "invoke_thunk requires kernel privilege"));
        }
        self.thunks.invoke(id, host, args)
    }

    pub fn invoke_system_call(&self, id: u32, host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
        let target = match override_entry(host, id)? {
            Some(target) => target,
            None => match DEFAULT_THUNKS.get(&id) {
                Some(thunk_id) => SystemCallTarget::Thunk(*thunk_id),
                None => return Err(chain_error!(UnknownSystemCall; "no override or default thunk for system call {}", id)),
            },
        };

        match target {
            SystemCallTarget::Thunk(thunk_id) => {
                let privilege = host.context().get_privilege();
                host.context()
                    .with_frame(Frame::system(privilege), || self.thunks.invoke(thunk_id, host, args))
            }
            SystemCallTarget::Contract(bundle) => host
                .context()
                .with_frame(Frame::system(Privilege::Kernel), || self.runner.call_contract(host, bundle, args)),
        }
    }
}
