#![forbid(unsafe_code)]

//! Per-account token ledger with atomic credit and debit.
//!
//! Balances are unsigned and can never go negative: `debit` performs its
//! sufficiency check and the subtraction under a single per-account
//! serialization point, so no interleaving of concurrent debits can
//! overdraw an account.

mod accounts;

pub use accounts::TokenLedger;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Credit/debit amounts must be strictly positive.
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("insufficient balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: String,
        requested: u64,
        available: u64,
    },
    #[error("balance overflow for {account}")]
    Overflow { account: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
