//! Native thunk implementations: the data-access, crypto and accessor
//! primitives contracts reach through `invoke_thunk`/`invoke_system_call`.
//! Each takes a [`Host`] and a serialized (CBOR) argument blob and returns a
//! serialized result, so the glue at the host-call bridge stays uniform
//! regardless of a thunk's actual argument shape.

use chain_backend::Direction;
use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{address, hash as compute_hash, Address, Space};
use serde::{Deserialize, Serialize};

use crate::host::Host;
use crate::thunk::{ThunkId, ThunkRegistry};

pub mod ids {
    use super::ThunkId;

    pub const PRINTS: ThunkId = 1;
    pub const GET_OBJECT: ThunkId = 2;
    pub const PUT_OBJECT: ThunkId = 3;
    pub const REMOVE_OBJECT: ThunkId = 4;
    pub const GET_NEXT_OBJECT: ThunkId = 5;
    pub const GET_PREV_OBJECT: ThunkId = 6;
    pub const HASH: ThunkId = 7;
    pub const VERIFY_SIGNATURE: ThunkId = 8;
    pub const GET_TRANSACTION_PAYER: ThunkId = 9;
    pub const GET_TRANSACTION_RC_LIMIT: ThunkId = 10;
    pub const GET_MAX_ACCOUNT_RC: ThunkId = 11;
    pub const GET_CALLER: ThunkId = 12;
    pub const GET_CONTRACT_ARGUMENTS: ThunkId = 13;
    pub const SET_CONTRACT_RESULT: ThunkId = 14;
    pub const EXIT_CONTRACT: ThunkId = 15;
}

fn decode<T: for<'de> Deserialize<'de>>(args: &[u8]) -> Result<T> {
    serde_cbor::from_slice(args).map_err(|e| chain_error!(MalformedTransaction; "malformed thunk args: {}", e))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_cbor::to_vec(value).map_err(|e| chain_error!(InternalError; "thunk result encoding failed: {}", e))
}

#[derive(Serialize, Deserialize)]
struct ObjectKeyArgs {
    space: Space,
    key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct PutObjectArgs {
    space: Space,
    key: Vec<u8>,
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct PutObjectResult {
    existed: bool,
}

#[derive(Serialize, Deserialize)]
struct NeighborObjectArgs {
    space: Space,
    key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct HashArgs {
    code: u64,
    data: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct VerifySignatureArgs {
    signature: [u8; 65],
    digest: [u8; 32],
    expected_address: Address,
}

fn prints(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let text = String::from_utf8_lossy(args).into_owned();
    host.context().console_append(&text);
    Ok(Vec::new())
}

fn get_object(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: ObjectKeyArgs = decode(args)?;
    Ok(host.state_get(&a.space, &a.key)?.unwrap_or_default())
}

fn put_object(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: PutObjectArgs = decode(args)?;
    let existed = host.state_get(&a.space, &a.key)?.is_some();
    host.context().meter.use_disk_storage(a.value.len() as u64)?;
    host.state_put(&a.space, &a.key, a.value)?;
    encode(&PutObjectResult { existed })
}

fn remove_object(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: ObjectKeyArgs = decode(args)?;
    host.state_remove(&a.space, &a.key)?;
    Ok(Vec::new())
}

fn get_next_object(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: NeighborObjectArgs = decode(args)?;
    let mut items = host.state_range(&a.space, &a.key, Direction::Forward)?;
    items.retain(|(k, _)| k.as_slice() > a.key.as_slice());
    Ok(items.into_iter().next().map(|(_, v)| v).unwrap_or_default())
}

fn get_prev_object(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: NeighborObjectArgs = decode(args)?;
    let mut items = host.state_range(&a.space, &a.key, Direction::Reverse)?;
    items.retain(|(k, _)| k.as_slice() < a.key.as_slice());
    Ok(items.into_iter().next().map(|(_, v)| v).unwrap_or_default())
}

fn hash(_host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: HashArgs = decode(args)?;
    let digest = compute_hash(a.code, &a.data).ok_or_else(|| chain_error!(UnknownHashCode; "unsupported hash code {}", a.code))?;
    Ok(digest.to_bytes())
}

fn verify_signature(_host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let a: VerifySignatureArgs = decode(args)?;
    let ok = address::verify_signature(&a.signature, &a.digest, &a.expected_address);
    encode(&ok)
}

fn get_transaction_payer(host: &dyn Host, _args: &[u8]) -> Result<Vec<u8>> {
    let trx = host.context().get_transaction()?;
    encode(&trx.header.payer)
}

fn get_transaction_rc_limit(host: &dyn Host, _args: &[u8]) -> Result<Vec<u8>> {
    let trx = host.context().get_transaction()?;
    encode(&trx.header.rc_limit)
}

fn get_max_account_rc(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let payer: Address = decode(args)?;
    let raw = host.state_get(&Space::AccountResources, payer.as_bytes())?;
    let rc: u64 = match raw {
        Some(bytes) => decode(&bytes)?,
        None => 0,
    };
    encode(&rc)
}

fn get_caller(host: &dyn Host, _args: &[u8]) -> Result<Vec<u8>> {
    let ctx = host.context();
    #[derive(Serialize)]
    struct Caller {
        contract_id: Address,
        privilege: bool,
    }
    let privilege = matches!(ctx.get_caller_privilege(), crate::context::Privilege::Kernel);
    encode(&Caller {
        contract_id: ctx.get_contract_id(),
        privilege,
    })
}

fn get_contract_arguments(host: &dyn Host, _args: &[u8]) -> Result<Vec<u8>> {
    host.context().top_frame_args()
}

fn set_contract_result(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    host.context().set_call_return(args.to_vec())?;
    Ok(Vec::new())
}

fn exit_contract(host: &dyn Host, args: &[u8]) -> Result<Vec<u8>> {
    let code: i32 = decode(args)?;
    host.context().set_exit_code(code);
    Ok(Vec::new())
}

/// Registers the thunks defined in this module under their stable ids.
pub fn register_builtin_thunks(registry: &mut ThunkRegistry) {
    registry.register(ids::PRINTS, prints);
    registry.register(ids::GET_OBJECT, get_object);
    registry.register(ids::PUT_OBJECT, put_object);
    registry.register(ids::REMOVE_OBJECT, remove_object);
    registry.register(ids::GET_NEXT_OBJECT, get_next_object);
    registry.register(ids::GET_PREV_OBJECT, get_prev_object);
    registry.register(ids::HASH, hash);
    registry.register(ids::VERIFY_SIGNATURE, verify_signature);
    registry.register(ids::GET_TRANSACTION_PAYER, get_transaction_payer);
    registry.register(ids::GET_TRANSACTION_RC_LIMIT, get_transaction_rc_limit);
    registry.register(ids::GET_MAX_ACCOUNT_RC, get_max_account_rc);
    registry.register(ids::GET_CALLER, get_caller);
    registry.register(ids::GET_CONTRACT_ARGUMENTS, get_contract_arguments);
    registry.register(ids::SET_CONTRACT_RESULT, set_contract_result);
    registry.register(ids::EXIT_CONTRACT, exit_contract);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, Frame, Intent};
    use crate::host::TreeHost;
    use chain_backend::MemoryBackend;
    use chain_shared::{zero_hash, SupportedHashes};
    use chain_state::DeltaTree;

    fn new_host_fixture() -> (DeltaTree<MemoryBackend>, ExecutionContext) {
        let root = zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let tree = DeltaTree::new(MemoryBackend::new(), root);
        let ctx = ExecutionContext::new();
        ctx.set_intent(Intent::TransactionApplication);
        ctx.set_state_node(root, None);
        (tree, ctx)
    }

    #[test]
    fn put_then_get_object_round_trips() {
        let (tree, ctx) = new_host_fixture();
        let host = TreeHost::new(&tree, &ctx);
        let put_args = encode(&PutObjectArgs {
            space: Space::Metadata,
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        })
        .unwrap();
        let result = put_object(&host, &put_args).unwrap();
        let decoded: PutObjectResult = decode(&result).unwrap();
        assert!(!decoded.existed);

        let get_args = encode(&ObjectKeyArgs {
            space: Space::Metadata,
            key: b"k".to_vec(),
        })
        .unwrap();
        assert_eq!(get_object(&host, &get_args).unwrap(), b"v".to_vec());
    }

    #[test]
    fn put_object_fails_in_read_only_context() {
        let (tree, ctx) = new_host_fixture();
        ctx.set_intent(Intent::ReadOnly);
        let host = TreeHost::new(&tree, &ctx);
        let put_args = encode(&PutObjectArgs {
            space: Space::Metadata,
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        })
        .unwrap();
        assert!(put_object(&host, &put_args).is_err());
    }

    #[test]
    fn prints_accumulates_into_console() {
        let (tree, ctx) = new_host_fixture();
        let host = TreeHost::new(&tree, &ctx);
        prints(&host, b"hello").unwrap();
        assert_eq!(ctx.drain_console(), "hello");
    }

    #[test]
    fn get_contract_arguments_reads_the_top_frame() {
        let (tree, ctx) = new_host_fixture();
        ctx.push_frame(Frame::user_call(Address::from_bytes([9u8; 20]), 0, b"abc".to_vec()))
            .unwrap();
        let host = TreeHost::new(&tree, &ctx);
        assert_eq!(get_contract_arguments(&host, &[]).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn registering_builtin_thunks_does_not_panic() {
        let mut registry = ThunkRegistry::new();
        register_builtin_thunks(&mut registry);
        assert!(registry.contains(ids::PRINTS));
        assert!(registry.contains(ids::EXIT_CONTRACT));
    }
}
