//! An in-memory holding area for transactions that have passed simulation
//! but are not yet in a block: tracks each payer's outstanding resource
//! budget so a flood of cheap transactions from one account can't starve
//! everyone else's, and prunes entries once the chain has moved past the
//! height they were submitted at.
//!
//! Two maps, mirroring the two indices the original kept: one keyed by
//! payer (the resource budget), one keyed by transaction id (the pending
//! entries themselves, plus insertion order for paged listing).

use std::collections::HashMap;
use std::sync::Mutex;

use chain_shared::chain_error;
use chain_shared::error::Result;
use chain_shared::{Address, Hash, Transaction};

/// Upper bound on a single `get_pending_transactions` page.
pub const MAX_PENDING_TRANSACTION_REQUEST: usize = 100;

struct AccountResources {
    resources: u64,
    max_resources: u64,
    last_update: u64,
}

struct PendingTransaction {
    last_update: u64,
    transaction: Transaction,
    payer: Address,
    resource_limit: u64,
}

struct PendingTransactions {
    order: Vec<Hash>,
    by_id: HashMap<Hash, PendingTransaction>,
}

impl PendingTransactions {
    fn new() -> Self {
        PendingTransactions {
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

pub struct Mempool {
    account_resources: Mutex<HashMap<Address, AccountResources>>,
    pending: Mutex<PendingTransactions>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool {
            account_resources: Mutex::new(HashMap::new()),
            pending: Mutex::new(PendingTransactions::new()),
        }
    }

    pub fn has_pending_transaction(&self, id: &Hash) -> bool {
        self.pending.lock().unwrap().by_id.contains_key(id)
    }

    /// Returns up to `limit` transactions after `start` in submission order,
    /// or the first `limit` if `start` is `None` or unknown.
    pub fn get_pending_transactions(&self, start: Option<&Hash>, limit: usize) -> Result<Vec<Transaction>> {
        if limit > MAX_PENDING_TRANSACTION_REQUEST {
            return Err(chain_error!(
                BlockResourceFailure;
                "requested too many pending transactions, max {}",
                MAX_PENDING_TRANSACTION_REQUEST
            ));
        }

        let pending = self.pending.lock().unwrap();
        let begin = match start {
            Some(id) => pending.order.iter().position(|candidate| candidate == id).map(|i| i + 1).unwrap_or(0),
            None => 0,
        };

        Ok(pending.order[begin..]
            .iter()
            .take(limit)
            .filter_map(|id| pending.by_id.get(id).map(|p| p.transaction.clone()))
            .collect())
    }

    /// Admits a transaction, charging `trx_resource_limit` against the
    /// payer's outstanding budget (seeded from `max_payer_resources` the
    /// first time the payer is seen). Fails without touching the pending
    /// index if the charge would exceed the payer's remaining budget.
    pub fn add_pending_transaction(
        &self,
        id: Hash,
        trx: Transaction,
        height: u64,
        payer: Address,
        max_payer_resources: u64,
        trx_resource_limit: u64,
    ) -> Result<()> {
        {
            let mut accounts = self.account_resources.lock().unwrap();
            match accounts.get_mut(&payer) {
                None => {
                    if trx_resource_limit > max_payer_resources {
                        return Err(chain_error!(
                            PendingTransactionExceedsResources;
                            "transaction would exceed maximum resources for account {}",
                            payer
                        ));
                    }
                    accounts.insert(
                        payer,
                        AccountResources {
                            resources: max_payer_resources - trx_resource_limit,
                            max_resources: max_payer_resources,
                            last_update: height,
                        },
                    );
                }
                Some(account) => {
                    if trx_resource_limit > account.resources {
                        return Err(chain_error!(
                            PendingTransactionExceedsResources;
                            "transaction would exceed resources for account {}",
                            payer
                        ));
                    }
                    account.resources -= trx_resource_limit;
                    account.last_update = height;
                }
            }
        }

        let mut pending = self.pending.lock().unwrap();
        if pending.by_id.contains_key(&id) {
            return Err(chain_error!(Reverted; "failed to insert transaction with id {}", id));
        }
        pending.order.push(id);
        pending.by_id.insert(
            id,
            PendingTransaction {
                last_update: height,
                transaction: trx,
                payer,
                resource_limit: trx_resource_limit,
            },
        );

        Ok(())
    }

    pub fn remove_pending_transaction(&self, id: &Hash) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.by_id.remove(id) {
            pending.order.retain(|candidate| candidate != id);
            self.cleanup_account_resources(&entry.payer, entry.resource_limit);
        }
    }

    /// Drops every entry submitted at or before `height`, releasing each
    /// one's share of its payer's budget.
    pub fn prune(&self, height: u64) {
        let mut pending = self.pending.lock().unwrap();
        let mut expired = Vec::new();
        pending.order.retain(|id| {
            let keep = pending.by_id.get(id).map(|p| p.last_update > height).unwrap_or(false);
            if !keep {
                expired.push(*id);
            }
            keep
        });
        for id in expired {
            if let Some(entry) = pending.by_id.remove(&id) {
                self.cleanup_account_resources(&entry.payer, entry.resource_limit);
            }
        }
    }

    pub fn payer_entries_size(&self) -> usize {
        self.account_resources.lock().unwrap().len()
    }

    /// Returns a payer's resource budget to the account entry, dropping the
    /// entry entirely once its ceiling has shrunk to (or below) what's
    /// already in use -- it no longer has room to admit anything.
    fn cleanup_account_resources(&self, payer: &Address, resource_limit: u64) {
        let mut accounts = self.account_resources.lock().unwrap();
        if let Some(account) = accounts.get_mut(payer) {
            let new_max = account.max_resources - resource_limit;
            if new_max <= account.resources {
                accounts.remove(payer);
            } else {
                account.max_resources = new_max;
            }
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_shared::address::{derive_address, privkey_from_seed};
    use chain_shared::{Operation, TransactionHeader};

    fn transaction(payer: Address, nonce: u64, rc_limit: u64) -> Transaction {
        Transaction {
            header: TransactionHeader {
                operations: vec![Operation::Nop],
                rc_limit,
                nonce,
                payer,
            },
            signature: [0u8; 65],
        }
    }

    fn payer(seed: &str) -> Address {
        derive_address(&privkey_from_seed(seed))
    }

    #[test]
    fn admits_transactions_within_budget() {
        let mempool = Mempool::new();
        let acc = payer("alice");
        let trx = transaction(acc, 1, 10);
        let id = trx.id();

        mempool.add_pending_transaction(id, trx, 1, acc, 100, 10).unwrap();

        assert!(mempool.has_pending_transaction(&id));
        assert_eq!(mempool.payer_entries_size(), 1);
    }

    #[test]
    fn rejects_transaction_exceeding_account_budget() {
        let mempool = Mempool::new();
        let acc = payer("bob");
        let trx = transaction(acc, 1, 150);
        let id = trx.id();

        let err = mempool
            .add_pending_transaction(id, trx, 1, acc, 100, 150)
            .unwrap_err();
        assert_eq!(err.code, chain_shared::ErrorCode::PendingTransactionExceedsResources);
        assert!(!mempool.has_pending_transaction(&id));
    }

    #[test]
    fn second_transaction_is_charged_against_remaining_budget_not_the_maximum() {
        let mempool = Mempool::new();
        let acc = payer("carol");

        let t1 = transaction(acc, 1, 60);
        mempool.add_pending_transaction(t1.id(), t1, 1, acc, 100, 60).unwrap();

        let t2 = transaction(acc, 2, 60);
        let err = mempool
            .add_pending_transaction(t2.id(), t2, 1, acc, 100, 60)
            .unwrap_err();
        assert_eq!(err.code, chain_shared::ErrorCode::PendingTransactionExceedsResources);
    }

    #[test]
    fn removing_a_transaction_returns_its_resources() {
        let mempool = Mempool::new();
        let acc = payer("dave");

        let t1 = transaction(acc, 1, 60);
        let id1 = t1.id();
        mempool.add_pending_transaction(id1, t1, 1, acc, 100, 60).unwrap();

        mempool.remove_pending_transaction(&id1);

        let t2 = transaction(acc, 2, 100);
        mempool.add_pending_transaction(t2.id(), t2, 2, acc, 100, 100).unwrap();
        assert!(mempool.has_pending_transaction(&t2.id()));
    }

    #[test]
    fn prune_drops_entries_at_or_below_height_and_keeps_later_ones() {
        let mempool = Mempool::new();
        let acc = payer("erin");

        let t1 = transaction(acc, 1, 10);
        let id1 = t1.id();
        mempool.add_pending_transaction(id1, t1, 1, acc, 100, 10).unwrap();

        let t2 = transaction(acc, 2, 10);
        let id2 = t2.id();
        mempool.add_pending_transaction(id2, t2, 5, acc, 100, 10).unwrap();

        mempool.prune(2);

        assert!(!mempool.has_pending_transaction(&id1));
        assert!(mempool.has_pending_transaction(&id2));
    }

    #[test]
    fn get_pending_transactions_pages_after_start() {
        let mempool = Mempool::new();
        let acc = payer("frank");
        let mut ids = Vec::new();
        for nonce in 0..5 {
            let trx = transaction(acc, nonce, 1);
            let id = trx.id();
            mempool.add_pending_transaction(id, trx, 1, acc, 100, 1).unwrap();
            ids.push(id);
        }

        let first_page = mempool.get_pending_transactions(None, 2).unwrap();
        assert_eq!(first_page.len(), 2);

        let second_page = mempool.get_pending_transactions(Some(&ids[1]), 2).unwrap();
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].header.nonce, 2);
    }

    #[test]
    fn get_pending_transactions_rejects_oversized_limit() {
        let mempool = Mempool::new();
        let err = mempool
            .get_pending_transactions(None, MAX_PENDING_TRANSACTION_REQUEST + 1)
            .unwrap_err();
        assert_eq!(err.code, chain_shared::ErrorCode::BlockResourceFailure);
    }
}
