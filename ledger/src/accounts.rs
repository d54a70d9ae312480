use std::collections::HashMap;

use dashmap::DashMap;
use tracing::debug;

use crate::{LedgerError, Result};

/// Concurrent balance store. Accounts are created implicitly on first
/// credit and never deleted; a missing account reads as zero.
#[derive(Debug, Default)]
pub struct TokenLedger {
    balances: DashMap<String, u64>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
        }
    }

    /// Current balance. Side-effect free; unknown accounts read as zero.
    pub fn balance(&self, account: &str) -> u64 {
        self.balances.get(account).map(|v| *v).unwrap_or(0)
    }

    /// Add purchased tokens. The payment collaborator supplies the amount
    /// (any purchase-time discount already applied) and dedupes retries by
    /// purchase reference; the ledger only does the arithmetic.
    pub fn credit(&self, account: &str, amount: u64) -> Result<()> {
        self.apply_credit(account, amount, "credit")
    }

    /// Compensating credit issued by the admission rollback path. Same
    /// arithmetic as `credit`, logged under a distinct operation label so
    /// reconciliation can tell purchases from rollbacks.
    pub fn refund(&self, account: &str, amount: u64) -> Result<()> {
        self.apply_credit(account, amount, "refund")
    }

    /// Atomic check-and-subtract. Fails if `amount` exceeds the balance at
    /// the instant of the debit; the entry guard is the per-account
    /// serialization point, so two concurrent debits can never jointly
    /// overdraw.
    pub fn debit(&self, account: &str, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut entry = match self.balances.get_mut(account) {
            Some(entry) => entry,
            None => {
                return Err(LedgerError::InsufficientBalance {
                    account: account.to_string(),
                    requested: amount,
                    available: 0,
                })
            }
        };
        let available = *entry;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: account.to_string(),
                requested: amount,
                available,
            });
        }
        *entry = available - amount;
        let balance = *entry;
        drop(entry);
        debug!(target: "ledger", account, amount, balance, "debit");
        Ok(())
    }

    fn apply_credit(&self, account: &str, amount: u64, op: &'static str) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let mut entry = self.balances.entry(account.to_string()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                account: account.to_string(),
            })?;
        let balance = *entry;
        drop(entry);
        debug!(target: "ledger", account, amount, balance, op);
        Ok(())
    }

    /// Point-in-time copy of all balances, for snapshots.
    pub fn export(&self) -> HashMap<String, u64> {
        self.balances
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Rebuild a ledger from exported balances.
    pub fn restore(balances: HashMap<String, u64>) -> Self {
        Self {
            balances: balances.into_iter().collect(),
        }
    }
}
