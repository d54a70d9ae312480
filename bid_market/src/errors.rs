use ledger::LedgerError;
use thiserror::Error;

use crate::snapshot::SnapshotError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("listing not found: {0}")]
    ListingNotFound(String),

    /// Terminal for the caller: one bid per agent per listing, ever.
    #[error("agent {agent_id} already has a bid on listing {listing_id}")]
    AlreadyBid {
        listing_id: String,
        agent_id: String,
    },

    #[error("insufficient balance for {agent_id}: requested {requested}, available {available}")]
    InsufficientBalance {
        agent_id: String,
        requested: u64,
        available: u64,
    },

    /// Store failure before any debit. Nothing was mutated; retrying the
    /// whole call is safe.
    #[error("transient bid store conflict, safe to retry: {0}")]
    ConcurrentConflict(#[source] StoreError),

    /// Store failure after the debit. The compensating refund has already
    /// been applied; retrying the whole call is safe.
    #[error("bid persistence failed, {amount} tokens refunded to {agent_id}: {source}")]
    Persistence {
        agent_id: String,
        amount: u64,
        #[source]
        source: StoreError,
    },

    /// The compensating refund itself failed: `amount` tokens were debited
    /// from `agent_id` with no proposal to show for it. Not recoverable
    /// automatically; requires manual reconciliation.
    #[error("refund of {amount} tokens to {agent_id} failed, manual reconciliation required: {source}")]
    RefundFailed {
        agent_id: String,
        amount: u64,
        #[source]
        source: LedgerError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl MarketError {
    /// Stable code for RPC surfaces.
    pub fn code(&self) -> i32 {
        match self {
            MarketError::InsufficientBalance { .. } => -34001,
            MarketError::AlreadyBid { .. } => -34002,
            MarketError::ListingNotFound(_) => -34003,
            MarketError::ConcurrentConflict(_) => -34004,
            MarketError::Persistence { .. } => -34005,
            MarketError::RefundFailed { .. } => -34006,
            MarketError::Snapshot(_) => -34007,
            MarketError::Ledger(_) => -34099,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            MarketError::InsufficientBalance { .. } => "insufficient balance",
            MarketError::AlreadyBid { .. } => "already bid",
            MarketError::ListingNotFound(_) => "listing not found",
            MarketError::ConcurrentConflict(_) => "concurrent conflict",
            MarketError::Persistence { .. } => "persistence failure",
            MarketError::RefundFailed { .. } => "refund failed",
            MarketError::Snapshot(_) => "snapshot error",
            MarketError::Ledger(_) => "ledger error",
        }
    }

    /// Whether retrying the whole `place_bid` call can succeed. Expected
    /// user-facing outcomes and the fatal refund case are not retryable.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            MarketError::ConcurrentConflict(_) | MarketError::Persistence { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
