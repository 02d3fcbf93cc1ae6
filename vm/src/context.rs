//! The execution context: per-apply mutable state threaded through one
//! block or transaction application -- the frame stack, privilege level,
//! bound state node, block/transaction slots, console buffer and receipt.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{Address, Block, BlockReceipt, Hash, Transaction, TransactionReceipt};
use lazy_static::lazy_static;

use crate::meter::{RcSession, ResourceMeter};

pub const MAX_FRAME_DEPTH: usize = 256;

lazy_static! {
    /// Identity reported by `get_contract_id`/`get_caller` when no frame on
    /// the stack carries one -- the literal "system" identity, ASCII bytes
    /// left-justified and zero-padded to fill the fixed-width address.
    pub static ref SYSTEM_CONTRACT_ID: Address = {
        let mut bytes = [0u8; 20];
        bytes[..6].copy_from_slice(b"system");
        Address::from_bytes(bytes)
    };
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Privilege {
    Kernel,
    User,
}

/// Read-only blocks any write-producing thunk; the other two distinguish
/// which receipt union variant is active.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Intent {
    ReadOnly,
    BlockApplication,
    TransactionApplication,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub contract_id: Option<Address>,
    pub privilege: Privilege,
    /// True for frames pushed by the dispatcher itself (kernel-mode
    /// bookkeeping), as opposed to a contract's own user-mode frame.
    pub system: bool,
    pub args: Vec<u8>,
    pub entry_point: u32,
    pub call_return: Vec<u8>,
}

impl Frame {
    pub fn system(privilege: Privilege) -> Self {
        Frame {
            contract_id: None,
            privilege,
            system: true,
            args: Vec::new(),
            entry_point: 0,
            call_return: Vec::new(),
        }
    }

    pub fn user_call(contract_id: Address, entry_point: u32, args: Vec<u8>) -> Self {
        Frame {
            contract_id: Some(contract_id),
            privilege: Privilege::User,
            system: false,
            args,
            entry_point,
            call_return: Vec::new(),
        }
    }
}

pub enum Receipt {
    None,
    Block(BlockReceipt),
    Transaction(TransactionReceipt),
}

/// One block or transaction application's worth of mutable state. Not
/// `Sync`/`Send`: the controller owns a single writer and runs apply
/// operations on one thread at a time.
pub struct ExecutionContext {
    frames: RefCell<Vec<Frame>>,
    state_node: RefCell<Option<Hash>>,
    parent_node: RefCell<Option<Hash>>,
    block: RefCell<Option<Block>>,
    transaction: RefCell<Option<Transaction>>,
    console: RefCell<String>,
    intent: Cell<Intent>,
    pub meter: ResourceMeter,
    session: RefCell<Option<Rc<RcSession>>>,
    receipt: RefCell<Receipt>,
    exit_code: Cell<Option<i32>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext {
            frames: RefCell::new(Vec::new()),
            state_node: RefCell::new(None),
            parent_node: RefCell::new(None),
            block: RefCell::new(None),
            transaction: RefCell::new(None),
            console: RefCell::new(String::new()),
            intent: Cell::new(Intent::ReadOnly),
            meter: ResourceMeter::default(),
            session: RefCell::new(None),
            receipt: RefCell::new(Receipt::None),
            exit_code: Cell::new(None),
        }
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Frame stack --

    pub fn push_frame(&self, frame: Frame) -> Result<()> {
        let mut frames = self.frames.borrow_mut();
        if frames.len() >= MAX_FRAME_DEPTH {
            return Err(chain_error!(StackOverflow; "execution frame stack exceeded depth {}", MAX_FRAME_DEPTH));
        }
        frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&self) -> Option<Frame> {
        self.frames.borrow_mut().pop()
    }

    /// Pushes `frame`, runs `body`, and pops on every exit path (including
    /// an error return from `body`), so the frame stack never leaks a
    /// dangling entry after a thunk fails partway through.
    pub fn with_frame<T>(&self, frame: Frame, body: impl FnOnce() -> Result<T>) -> Result<T> {
        self.push_frame(frame)?;
        let result = body();
        self.pop_frame();
        result
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Sets the return-value bytes on the current top frame, for
    /// `set_contract_result` to record a contract's output before it exits.
    pub fn set_call_return(&self, bytes: Vec<u8>) -> Result<()> {
        match self.frames.borrow_mut().last_mut() {
            Some(frame) => {
                frame.call_return = bytes;
                Ok(())
            }
            None => Err(chain_error!(UnexpectedAccess; "no active frame")),
        }
    }

    pub fn top_frame_args(&self) -> Result<Vec<u8>> {
        self.frames
            .borrow()
            .last()
            .map(|f| f.args.clone())
            .ok_or_else(|| chain_error!(UnexpectedAccess; "no active frame"))
    }

    pub fn top_frame_call_return(&self) -> Result<Vec<u8>> {
        self.frames
            .borrow()
            .last()
            .map(|f| f.call_return.clone())
            .ok_or_else(|| chain_error!(UnexpectedAccess; "no active frame"))
    }

    // -- Privilege --

    pub fn get_privilege(&self) -> Privilege {
        self.frames
            .borrow()
            .last()
            .map(|f| f.privilege)
            .unwrap_or(Privilege::Kernel)
    }

    pub fn set_privilege(&self, privilege: Privilege) {
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.privilege = privilege;
        }
    }

    /// The first non-system frame below the current top of stack.
    pub fn get_caller_privilege(&self) -> Privilege {
        let frames = self.frames.borrow();
        frames
            .iter()
            .rev()
            .skip(1)
            .find(|f| !f.system)
            .map(|f| f.privilege)
            .unwrap_or(Privilege::Kernel)
    }

    /// The first frame (from the top) carrying a contract id;
    /// `SYSTEM_CONTRACT_ID` means the call originated from the system itself.
    pub fn get_contract_id(&self) -> Address {
        self.frames
            .borrow()
            .iter()
            .rev()
            .find_map(|f| f.contract_id)
            .unwrap_or(*SYSTEM_CONTRACT_ID)
    }

    // -- State binding --

    pub fn set_state_node(&self, current: Hash, parent: Option<Hash>) {
        *self.state_node.borrow_mut() = Some(current);
        *self.parent_node.borrow_mut() = parent;
    }

    pub fn get_state_node(&self) -> Result<Hash> {
        self.state_node
            .borrow()
            .clone()
            .ok_or_else(|| chain_error!(UnexpectedAccess; "no state node bound"))
    }

    pub fn get_parent_node(&self) -> Option<Hash> {
        self.parent_node.borrow().clone()
    }

    pub fn clear_state_node(&self) {
        *self.state_node.borrow_mut() = None;
        *self.parent_node.borrow_mut() = None;
    }

    // -- Block/transaction binding --

    pub fn set_block(&self, block: Block) {
        *self.block.borrow_mut() = Some(block);
    }

    pub fn get_block(&self) -> Result<Block> {
        self.block
            .borrow()
            .clone()
            .ok_or_else(|| chain_error!(UnexpectedAccess; "no block bound"))
    }

    pub fn clear_block(&self) {
        *self.block.borrow_mut() = None;
    }

    pub fn set_transaction(&self, transaction: Transaction) {
        *self.transaction.borrow_mut() = Some(transaction);
    }

    pub fn get_transaction(&self) -> Result<Transaction> {
        self.transaction
            .borrow()
            .clone()
            .ok_or_else(|| chain_error!(UnexpectedAccess; "no transaction bound"))
    }

    pub fn clear_transaction(&self) {
        *self.transaction.borrow_mut() = None;
    }

    // -- Console --

    pub fn console_append(&self, text: &str) {
        self.console.borrow_mut().push_str(text);
    }

    pub fn drain_console(&self) -> String {
        std::mem::take(&mut *self.console.borrow_mut())
    }

    // -- Intent --

    pub fn set_intent(&self, intent: Intent) {
        self.intent.set(intent);
        *self.receipt.borrow_mut() = match intent {
            Intent::ReadOnly => Receipt::None,
            Intent::BlockApplication => Receipt::None,
            Intent::TransactionApplication => Receipt::None,
        };
    }

    pub fn intent(&self) -> Intent {
        self.intent.get()
    }

    pub fn require_writable(&self) -> Result<()> {
        if self.intent() == Intent::ReadOnly {
            return Err(chain_error!(ReadOnlyContext; "write attempted in a read-only context"));
        }
        Ok(())
    }

    // -- Session --

    pub fn make_session(&self, rc: u64) -> Rc<RcSession> {
        let session = self.meter.make_session(rc);
        *self.session.borrow_mut() = Some(session.clone());
        session
    }

    pub fn close_session(&self) -> u64 {
        let session = self.session.borrow_mut().take();
        session.map(|s| s.used_rc()).unwrap_or(0)
    }

    // -- Receipt --

    pub fn set_block_receipt(&self, receipt: BlockReceipt) {
        *self.receipt.borrow_mut() = Receipt::Block(receipt);
    }

    pub fn set_transaction_receipt(&self, receipt: TransactionReceipt) {
        *self.receipt.borrow_mut() = Receipt::Transaction(receipt);
    }

    pub fn with_block_receipt<T>(&self, f: impl FnOnce(&mut BlockReceipt) -> T) -> Result<T> {
        match &mut *self.receipt.borrow_mut() {
            Receipt::Block(r) => Ok(f(r)),
            _ => Err(chain_error!(UnexpectedAccess; "no block receipt bound")),
        }
    }

    pub fn with_transaction_receipt<T>(&self, f: impl FnOnce(&mut TransactionReceipt) -> T) -> Result<T> {
        match &mut *self.receipt.borrow_mut() {
            Receipt::Transaction(r) => Ok(f(r)),
            _ => Err(chain_error!(UnexpectedAccess; "no transaction receipt bound")),
        }
    }

    // -- Exit code --

    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.set(Some(code));
    }

    pub fn take_exit_code(&self) -> Option<i32> {
        self.exit_code.take()
    }
}
