//! Orchestrates block and transaction application over a fork-aware state
//! tree: owns the single writer, the thunk registry and WASM engine, and
//! the fork-database index of known block headers.
//!
//! Each transaction gets its own child state node chained off the block's
//! own node (see `derive_tx_node_id`), so a transaction's writes can be
//! discarded on its own without touching earlier transactions in the same
//! block -- the delta tree has no primitive for partial rollback within one
//! node, only whole-node discard. Nodes along the chain are left
//! unfinalized until the whole block succeeds; only the terminal node is
//! finalized, which also means no node in the chain can transiently become
//! head before the block is known to succeed (finalizing early would let a
//! later transaction's reversion leave `discard` unable to unwind the
//! checkpoint, since discard refuses to remove an ancestor of head).

use std::cell::RefCell;
use std::collections::HashMap;

use chain_backend::Backend;
use chain_shared::error::Result;
use chain_shared::{
    address, chain_error, hash as compute_hash, Address, Block, BlockHeader, BlockReceipt, ErrorCode, Hash,
    Operation, ResourceUsage, Space, SupportedHashes, SystemCallTarget, Transaction, TransactionReceipt,
};
use chain_state::{BlockState, DeltaTree, ForkDatabase, MerkleOps, TreeWalker};
use chain_vm::meter::ResourceLimitData;
use chain_vm::{ContractRunner, ExecutionContext, Host, Intent, ThunkRegistry, TreeHost, VmConfig, WasmEngine};

use crate::config::NetworkConfig;
use crate::runner::ContractCallRunner;

struct TransactionHashOps;

impl MerkleOps<Hash> for TransactionHashOps {
    fn get_hash(&self, _node_id: u64) -> Option<Hash> {
        None
    }

    fn empty_hash(&self) -> Hash {
        chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).expect("sha2-256 is always supported")
    }

    fn reduce(&self, _node_id: u64, left: Hash, right: Hash) -> Hash {
        let mut buf = left.to_bytes();
        buf.extend_from_slice(&right.to_bytes());
        compute_hash(SupportedHashes::Sha2_256.code(), &buf).expect("sha2-256 is always supported")
    }
}

fn transaction_merkle_root(transactions: &[Transaction]) -> Hash {
    let ops = TransactionHashOps;
    let mut walker = TreeWalker::new(&ops);
    for trx in transactions {
        walker.push_leaf(trx.id());
    }
    walker.close()
}

/// Branch-dependent node id for a transaction's state node -- two forks
/// that happen to include the same transaction get distinct nodes, since
/// the id folds in the state node it's chained off of.
fn derive_tx_node_id(parent: &Hash, trx_id: &Hash) -> Hash {
    let mut buf = parent.to_bytes();
    buf.extend_from_slice(&trx_id.to_bytes());
    compute_hash(SupportedHashes::Sha2_256.code(), &buf).expect("sha2-256 is always supported")
}

fn failed_receipt(trx: &Transaction, code: ErrorCode, message: impl Into<String>) -> TransactionReceipt {
    TransactionReceipt {
        id: trx.id(),
        payer: trx.header.payer,
        resources: ResourceUsage {
            disk_storage_used: 0,
            network_bandwidth_used: 0,
            compute_bandwidth_used: 0,
        },
        events: Vec::new(),
        error_code: Some(code),
        error_message: Some(message.into()),
    }
}

#[derive(Clone, Copy, Debug)]
struct VerifyOptions {
    check_merkle_root: bool,
    check_block_signature: bool,
    check_transaction_signatures: bool,
}

impl VerifyOptions {
    fn full() -> Self {
        VerifyOptions {
            check_merkle_root: true,
            check_block_signature: true,
            check_transaction_signatures: true,
        }
    }

    fn trusted() -> Self {
        VerifyOptions {
            check_merkle_root: false,
            check_block_signature: false,
            check_transaction_signatures: false,
        }
    }
}

/// Genesis data: a map from `(space, key)` to bytes, written directly into
/// the backend before the delta tree is wrapped around it -- the tree's
/// root node is always finalized and cannot accept writes through its own
/// API.
pub type GenesisEntries = Vec<(Space, Vec<u8>, Vec<u8>)>;

pub struct Controller<B: Backend> {
    tree: DeltaTree<B>,
    fork_db: RefCell<ForkDatabase>,
    node_for_block: RefCell<HashMap<Hash, Hash>>,
    children_of: RefCell<HashMap<Hash, Vec<Hash>>>,
    ctx: ExecutionContext,
    thunks: ThunkRegistry,
    engine: WasmEngine,
    config: NetworkConfig,
    system_authority: Address,
}

impl<B: Backend> Controller<B> {
    pub fn new(
        backend: B,
        genesis: GenesisEntries,
        system_authority: Address,
        config: NetworkConfig,
    ) -> Result<Self> {
        for (space, key, value) in genesis {
            backend.put(chain_shared::StateKey::new(space, key), value);
        }

        let root_id =
            chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).expect("sha2-256 is always supported");
        let sentinel_header = BlockHeader {
            height: 0,
            timestamp: 0,
            previous_id: root_id.clone(),
            transaction_merkle_root: root_id.clone(),
            signer: Address::from_bytes([0u8; 20]),
        };
        let root_state = BlockState::new(root_id.clone(), root_id.clone(), 0, sentinel_header);
        let fork_db = ForkDatabase::new(root_state);

        let mut node_for_block = HashMap::new();
        node_for_block.insert(root_id.clone(), root_id.clone());
        let mut children_of = HashMap::new();
        children_of.insert(root_id.clone(), Vec::new());

        let mut thunks = ThunkRegistry::new();
        chain_vm::thunks::register_builtin_thunks(&mut thunks);

        let engine = WasmEngine::new(VmConfig {
            memory_pages_limit: config.memory_pages_limit,
            max_call_depth: config.max_call_depth,
            module_cache_capacity: config.module_cache_capacity,
        })?;

        Ok(Controller {
            tree: DeltaTree::new(backend, root_id),
            fork_db: RefCell::new(fork_db),
            node_for_block: RefCell::new(node_for_block),
            children_of: RefCell::new(children_of),
            ctx: ExecutionContext::new(),
            thunks,
            engine,
            config,
            system_authority,
        })
    }

    /// The console accumulated by the execution context across every
    /// `submit_block`/`submit_transaction` call since the last drain.
    pub fn drain_console(&self) -> String {
        self.ctx.drain_console()
    }

    fn parent_state_node(&self, previous_id: &Hash) -> Result<Hash> {
        self.node_for_block
            .borrow()
            .get(previous_id)
            .cloned()
            .ok_or_else(|| chain_error!(UnexpectedState; "unknown previous block"))
    }

    fn head_state_node(&self) -> Result<Hash> {
        let head_id = self.fork_db.borrow().head().id;
        self.node_for_block
            .borrow()
            .get(&head_id)
            .cloned()
            .ok_or_else(|| chain_error!(UnexpectedState; "no state node recorded for head block"))
    }

    fn record_applied_block(&self, block: &Block, terminal: Hash) -> Result<()> {
        self.fork_db.borrow_mut().add(
            BlockState::new(
                block.id(),
                block.header.previous_id.clone(),
                block.header.height,
                block.header.clone(),
            ),
            false,
        )?;
        self.node_for_block.borrow_mut().insert(block.id(), terminal);
        self.children_of
            .borrow_mut()
            .entry(block.header.previous_id.clone())
            .or_default()
            .push(block.id());
        self.children_of.borrow_mut().entry(block.id()).or_default();
        Ok(())
    }

    /// Locates the parent state node by previous-id, creates a writable
    /// child, binds the execution context and invokes `apply_block`; on
    /// success finalizes the child and updates head, on failure discards it.
    pub fn submit_block(&self, block: Block, target_height: Option<u64>) -> Result<BlockReceipt> {
        let verify = match target_height {
            Some(th) if block.header.height < th => VerifyOptions::trusted(),
            _ => VerifyOptions::full(),
        };
        let parent_node = self.parent_state_node(&block.header.previous_id)?;
        let checkpoint = block.id();
        self.tree.create_child(parent_node, checkpoint.clone(), Some(block.header.clone()))?;

        match self.apply_block(checkpoint.clone(), &block, verify) {
            Ok((terminal, receipt)) => {
                self.record_applied_block(&block, terminal)?;
                log::info!("applied block {} at height {}", block.id(), block.header.height);
                Ok(receipt)
            }
            Err(e) => {
                self.tree.discard(checkpoint)?;
                log::warn!("block application failed: {}", e.message);
                Err(e)
            }
        }
    }

    /// Bulk-replay path for blocks assumed pre-validated (an indexer
    /// catching up below the target height): re-applies with structural
    /// checks relaxed rather than replaying a raw write-log, since the
    /// receipt type carries resource/outcome summaries, not a diff.
    pub fn apply_block_delta(&self, block: Block, receipt: BlockReceipt, _target_height: u64) -> Result<()> {
        let parent_node = self.parent_state_node(&block.header.previous_id)?;
        let checkpoint = block.id();
        self.tree.create_child(parent_node, checkpoint.clone(), Some(block.header.clone()))?;

        match self.apply_block(checkpoint.clone(), &block, VerifyOptions::trusted()) {
            Ok((terminal, computed)) => {
                if computed.id != receipt.id {
                    log::warn!("apply_block_delta: recomputed receipt id differs from the supplied one for block {}", block.id());
                }
                self.record_applied_block(&block, terminal)
            }
            Err(e) => {
                self.tree.discard(checkpoint)?;
                Err(e)
            }
        }
    }

    /// Validates `trx` against head and simulates it for resource usage on
    /// a discarded child node; forwarding the validated transaction into a
    /// mempool is the caller's responsibility.
    pub fn submit_transaction(&self, trx: Transaction) -> Result<TransactionReceipt> {
        let head_node = self.head_state_node()?;
        let sim_node = derive_tx_node_id(&head_node, &trx.id());
        self.tree.create_child(head_node.clone(), sim_node.clone(), None)?;
        self.ctx.set_state_node(sim_node.clone(), Some(head_node));
        self.ctx.set_transaction(trx.clone());
        self.ctx.set_intent(Intent::TransactionApplication);

        let result = self.apply_transaction(&trx, true);

        self.ctx.clear_transaction();
        self.tree.discard(sim_node)?;
        result
    }

    pub fn get_head_info(&self) -> BlockState {
        self.fork_db.borrow().head().clone()
    }

    pub fn get_fork_heads(&self) -> Vec<BlockState> {
        let fork_db = self.fork_db.borrow();
        let children = self.children_of.borrow();
        children
            .iter()
            .filter(|(_, kids)| kids.is_empty())
            .filter_map(|(id, _)| fork_db.fetch(id).ok().cloned())
            .collect()
    }

    pub fn get_account_nonce(&self, payer: &Address) -> Result<u64> {
        let node = self.head_state_node()?;
        match self.tree.get(node, &Space::TransactionNonce, payer.as_bytes())? {
            Some(bytes) => {
                serde_cbor::from_slice(&bytes).map_err(|e| chain_error!(UnexpectedState; "corrupt nonce entry: {}", e))
            }
            None => Ok(0),
        }
    }

    pub fn get_account_rc(&self, payer: &Address) -> Result<u64> {
        let node = self.head_state_node()?;
        match self.tree.get(node, &Space::AccountResources, payer.as_bytes())? {
            Some(bytes) => serde_cbor::from_slice(&bytes)
                .map_err(|e| chain_error!(UnexpectedState; "corrupt account-resources entry: {}", e)),
            None => Ok(0),
        }
    }

    /// Verifies height continuity, the transaction Merkle root and the
    /// block signature, then applies each transaction in order, chaining a
    /// fresh state node per transaction off `checkpoint`. Returns the
    /// terminal node (the block's own node if it had no transactions, or
    /// the last successful transaction's node) and the populated receipt.
    fn apply_block(&self, checkpoint: Hash, block: &Block, verify: VerifyOptions) -> Result<(Hash, BlockReceipt)> {
        let parent_height = self.fork_db.borrow().fetch(&block.header.previous_id)?.height;
        if parent_height == 0 {
            if block.header.height != 1 {
                return Err(chain_error!(MalformedBlock; "First block must have height of 1"));
            }
        } else if block.header.height != parent_height + 1 {
            return Err(chain_error!(
                MalformedBlock;
                "block height {} does not follow parent height {}",
                block.header.height,
                parent_height + 1
            ));
        }

        if verify.check_merkle_root {
            let computed = transaction_merkle_root(&block.transactions);
            if computed != block.header.transaction_merkle_root {
                return Err(chain_error!(StateMerkleMismatch; "transaction merkle root mismatch"));
            }
        }

        if verify.check_block_signature {
            let mut digest = [0u8; 32];
            digest.copy_from_slice(block.id().digest());
            if !address::verify_signature(&block.signature, &digest, &block.header.signer) {
                return Err(chain_error!(InvalidSignature; "block signature does not verify"));
            }
        }

        self.ctx.set_intent(Intent::BlockApplication);
        self.ctx.set_block(block.clone());

        let mut current = checkpoint;
        let mut transaction_receipts = Vec::with_capacity(block.transactions.len());
        for trx in &block.transactions {
            let trx_node = derive_tx_node_id(&current, &trx.id());
            self.tree.create_child(current.clone(), trx_node.clone(), None)?;
            self.ctx.set_state_node(trx_node.clone(), Some(current.clone()));
            self.ctx.set_transaction(trx.clone());
            self.ctx.set_intent(Intent::TransactionApplication);

            let receipt = self.apply_transaction(trx, verify.check_transaction_signatures)?;

            if receipt.is_success() {
                current = trx_node;
            } else {
                self.tree.discard(trx_node)?;
            }
            transaction_receipts.push(receipt);
            self.ctx.clear_transaction();
        }

        self.ctx.set_intent(Intent::BlockApplication);
        self.tree.finalize(current.clone())?;
        self.ctx.clear_block();
        self.ctx.clear_state_node();

        let state_merkle_root = self.tree.merkle_root(current.clone())?;
        let block_receipt = BlockReceipt {
            id: block.id(),
            disk_storage_used: transaction_receipts.iter().map(|r| r.resources.disk_storage_used).sum(),
            network_bandwidth_used: transaction_receipts
                .iter()
                .map(|r| r.resources.network_bandwidth_used)
                .sum(),
            compute_bandwidth_used: transaction_receipts
                .iter()
                .map(|r| r.resources.compute_bandwidth_used)
                .sum(),
            transaction_receipts,
            state_merkle_root,
        };
        Ok((current, block_receipt))
    }

    /// Verifies nonce, signature and rc availability, opens an rc session,
    /// then applies each operation in order. A failure-class error rolls
    /// the transaction back to a recorded failed receipt (the caller
    /// discards this transaction's node); a reversion-class error escapes
    /// to abort the whole block.
    fn apply_transaction(&self, trx: &Transaction, check_signature: bool) -> Result<TransactionReceipt> {
        let payer = trx.header.payer;
        let host = TreeHost::new(&self.tree, &self.ctx);

        let last_nonce = self.read_nonce(&host, &payer)?;
        if trx.header.nonce != last_nonce + 1 {
            return Ok(failed_receipt(
                trx,
                ErrorCode::InvalidNonce,
                format!("expected nonce {}, got {}", last_nonce + 1, trx.header.nonce),
            ));
        }

        if check_signature {
            let mut digest = [0u8; 32];
            digest.copy_from_slice(trx.id().digest());
            if !address::verify_signature(&trx.signature, &digest, &payer) {
                return Ok(failed_receipt(trx, ErrorCode::InvalidSignature, "transaction signature does not verify"));
            }
        }

        let max_rc = self.read_max_rc(&host, &payer)?;
        if trx.header.rc_limit > max_rc {
            return Ok(failed_receipt(
                trx,
                ErrorCode::BlockResourceFailure,
                format!("rc limit {} exceeds account max {}", trx.header.rc_limit, max_rc),
            ));
        }

        self.ctx.meter.set_resource_limit_data(ResourceLimitData {
            disk_storage_limit: u64::MAX,
            disk_storage_cost: self.config.disk_storage_cost,
            network_bandwidth_limit: u64::MAX,
            network_bandwidth_cost: self.config.network_bandwidth_cost,
            compute_bandwidth_limit: self.config.compute_bandwidth_limit,
            compute_bandwidth_cost: self.config.compute_bandwidth_cost,
        });
        self.ctx.make_session(trx.header.rc_limit);

        let mut failure: Option<(ErrorCode, String)> = None;
        for op in &trx.header.operations {
            match self.apply_operation(op) {
                Ok(()) => {}
                Err(e) if e.is_failure() => {
                    failure = Some((e.code, e.message.clone()));
                    break;
                }
                Err(e) => {
                    self.ctx.close_session();
                    return Err(e);
                }
            }
        }

        self.bump_nonce(&host, &payer, trx.header.nonce)?;

        let resources = ResourceUsage {
            disk_storage_used: self.ctx.meter.disk_storage_used(),
            network_bandwidth_used: self.ctx.meter.network_bandwidth_used(),
            compute_bandwidth_used: self.ctx.meter.compute_bandwidth_used(),
        };
        self.ctx.close_session();

        Ok(TransactionReceipt {
            id: trx.id(),
            payer,
            resources,
            events: Vec::new(),
            error_code: failure.as_ref().map(|(c, _)| *c),
            error_message: failure.as_ref().map(|(_, m)| m.clone()),
        })
    }

    fn apply_operation(&self, op: &Operation) -> Result<()> {
        let host = TreeHost::new(&self.tree, &self.ctx);
        match op {
            Operation::Nop => Ok(()),
            Operation::Reserved => Err(chain_error!(UnknownOperation; "reserved operation is never valid")),
            Operation::UploadContract { bytecode } => self.apply_upload_contract_operation(&host, bytecode),
            Operation::CallContract(bundle, args) => {
                let runner = ContractCallRunner {
                    engine: &self.engine,
                    thunks: &self.thunks,
                };
                runner.call_contract(&host, *bundle, args).map(|_| ())
            }
            Operation::SetSystemCall { call_id, target } => self.apply_set_system_call_operation(&host, *call_id, target),
        }
    }

    /// The uploaded contract's address is always the transaction's own
    /// payer -- `UploadContract` carries no separate target address, so
    /// authorization is already covered by the transaction's own signature
    /// check.
    fn apply_upload_contract_operation(&self, host: &dyn Host, bytecode: &[u8]) -> Result<()> {
        let trx = host.context().get_transaction()?;
        let contract_id = trx.header.payer;
        host.context().meter.use_disk_storage(bytecode.len() as u64)?;
        host.state_put(&Space::ContractBytecode, contract_id.as_bytes(), bytecode.to_vec())
    }

    fn apply_set_system_call_operation(&self, host: &dyn Host, call_id: u32, target: &SystemCallTarget) -> Result<()> {
        let trx = host.context().get_transaction()?;
        if trx.header.payer != self.system_authority {
            return Err(chain_error!(
                AuthorizationFailureSystem;
                "payer {} is not the system authority",
                trx.header.payer
            ));
        }
        let encoded = serde_cbor::to_vec(target)
            .map_err(|e| chain_error!(InternalError; "system-call target encoding failed: {}", e))?;
        host.state_put(&Space::SystemCallDispatch, &call_id.to_be_bytes(), encoded)
    }

    fn read_nonce(&self, host: &dyn Host, payer: &Address) -> Result<u64> {
        match host.state_get(&Space::TransactionNonce, payer.as_bytes())? {
            Some(bytes) => {
                serde_cbor::from_slice(&bytes).map_err(|e| chain_error!(UnexpectedState; "corrupt nonce entry: {}", e))
            }
            None => Ok(0),
        }
    }

    fn read_max_rc(&self, host: &dyn Host, payer: &Address) -> Result<u64> {
        match host.state_get(&Space::AccountResources, payer.as_bytes())? {
            Some(bytes) => serde_cbor::from_slice(&bytes)
                .map_err(|e| chain_error!(UnexpectedState; "corrupt account-resources entry: {}", e)),
            None => Ok(0),
        }
    }

    fn bump_nonce(&self, host: &dyn Host, payer: &Address, nonce: u64) -> Result<()> {
        let encoded =
            serde_cbor::to_vec(&nonce).map_err(|e| chain_error!(InternalError; "nonce encoding failed: {}", e))?;
        host.state_put(&Space::TransactionNonce, payer.as_bytes(), encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_backend::MemoryBackend;
    use chain_shared::address::{derive_address, privkey_from_seed, sign_digest};
    use chain_shared::{BlockHeader, TransactionHeader};

    fn chain_id_genesis() -> GenesisEntries {
        let chain_id = compute_hash(SupportedHashes::Sha2_256.code(), b"test seed").unwrap();
        vec![(Space::Metadata, b"chain-id".to_vec(), chain_id.to_bytes())]
    }

    fn new_controller() -> Controller<MemoryBackend> {
        let authority = derive_address(&privkey_from_seed("system authority seed"));
        Controller::new(MemoryBackend::new(), chain_id_genesis(), authority, NetworkConfig::default()).unwrap()
    }

    fn signed_block(height: u64, previous_id: Hash, seed: &str, transactions: Vec<Transaction>) -> Block {
        let sk = privkey_from_seed(seed);
        let signer = derive_address(&sk);
        let header = BlockHeader {
            height,
            timestamp: 0,
            previous_id,
            transaction_merkle_root: transaction_merkle_root(&transactions),
            signer,
        };
        let mut digest = [0u8; 32];
        digest.copy_from_slice(header.id().digest());
        let signature = sign_digest(&sk, &digest);
        Block {
            header,
            signature,
            transactions,
        }
    }

    #[test]
    fn genesis_block_becomes_head() {
        let controller = new_controller();
        let root_id = chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let block = signed_block(1, root_id, "test seed", vec![]);
        let expected_id = block.id();
        controller.submit_block(block, None).unwrap();
        let head = controller.get_head_info();
        assert_eq!(head.height, 1);
        assert_eq!(head.id, expected_id);
    }

    #[test]
    fn non_genesis_first_block_is_rejected() {
        let controller = new_controller();
        let root_id = chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let block = signed_block(2, root_id, "test seed", vec![]);
        let err = controller.submit_block(block, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedBlock);
        assert_eq!(err.message, "First block must have height of 1");
        assert_eq!(controller.get_head_info().height, 0);
    }

    #[test]
    fn fork_head_switches_to_the_longer_branch() {
        let controller = new_controller();
        let root_id = chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let mut previous = root_id;
        for height in 1..=3u64 {
            let block = signed_block(height, previous, "test seed", vec![]);
            previous = block.id();
            controller.submit_block(block, None).unwrap();
        }
        let fork_base = previous.clone();

        let short_tip = {
            let b = signed_block(4, fork_base.clone(), "short fork", vec![]);
            controller.submit_block(b.clone(), None).unwrap();
            b.id()
        };
        assert_eq!(controller.get_head_info().id, short_tip);

        let mut long_previous = fork_base;
        let mut long_tip = None;
        for height in 4..=6u64 {
            let b = signed_block(height, long_previous, "long fork", vec![]);
            long_previous = b.id();
            controller.submit_block(b.clone(), None).unwrap();
            long_tip = Some(b.id());
        }
        assert_eq!(controller.get_head_info().id, long_tip.unwrap());
    }

    #[test]
    fn nonce_mismatch_fails_the_transaction_but_not_the_block() {
        let controller = new_controller();
        let root_id = chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let sk = privkey_from_seed("payer seed");
        let payer = derive_address(&sk);
        let header = TransactionHeader {
            operations: vec![Operation::Nop],
            rc_limit: 10,
            nonce: 5,
            payer,
        };
        let mut digest = [0u8; 32];
        digest.copy_from_slice(header.id().digest());
        let signature = sign_digest(&sk, &digest);
        let trx = Transaction { header, signature };

        let block = signed_block(1, root_id, "test seed", vec![trx]);
        let receipt = controller.submit_block(block, None).unwrap();
        assert_eq!(receipt.transaction_receipts.len(), 1);
        assert!(!receipt.transaction_receipts[0].is_success());
        assert_eq!(receipt.transaction_receipts[0].error_code, Some(ErrorCode::InvalidNonce));
        assert_eq!(controller.get_head_info().height, 1);
    }

    #[test]
    fn funded_payer_transaction_succeeds_end_to_end() {
        let sk = privkey_from_seed("funded payer seed");
        let payer = derive_address(&sk);
        let authority = derive_address(&privkey_from_seed("system authority seed"));
        let mut genesis = chain_id_genesis();
        genesis.push((
            Space::AccountResources,
            payer.as_bytes().to_vec(),
            serde_cbor::to_vec(&100u64).unwrap(),
        ));
        let controller = Controller::new(MemoryBackend::new(), genesis, authority, NetworkConfig::default()).unwrap();

        let root_id = chain_shared::zero_hash(SupportedHashes::Sha2_256.code()).unwrap();
        let header = TransactionHeader {
            operations: vec![Operation::Nop],
            rc_limit: 10,
            nonce: 1,
            payer,
        };
        let mut digest = [0u8; 32];
        digest.copy_from_slice(header.id().digest());
        let signature = sign_digest(&sk, &digest);
        let trx = Transaction { header, signature };

        let block = signed_block(1, root_id, "test seed", vec![trx]);
        let receipt = controller.submit_block(block, None).unwrap();
        assert_eq!(receipt.transaction_receipts.len(), 1);
        assert!(receipt.transaction_receipts[0].is_success());
        assert_eq!(receipt.transaction_receipts[0].error_code, None);
        assert_eq!(controller.get_head_info().height, 1);
    }
}
