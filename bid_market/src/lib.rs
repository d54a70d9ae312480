#![forbid(unsafe_code)]

//! Token-metered bid admission for the agent/listing proposal marketplace.
//!
//! Submitting a proposal consumes tokens; extra tokens ("boost") raise a
//! proposal's ranking. This crate owns the pricing function, the bid store
//! seam, the read-side priority view and the admission saga that ties them
//! to the token ledger: duplicate check, commit-time re-quote, atomic
//! debit, store-enforced unique persist, and a compensating refund when the
//! persist step fails after the debit.

pub mod clock;
mod errors;
pub mod listing;
pub mod pricing;
pub mod priority;
pub mod snapshot;
pub mod store;

pub use errors::{MarketError, Result};
pub use listing::{Listing, ListingDirectory, ListingKind, MemoryListingDirectory};
pub use pricing::{PriceFactors, Quote};
pub use snapshot::MarketSnapshot;
pub use store::{BidStore, MemoryBidStore, Proposal, ProposalStatus, StoreError};

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use clock::{Clock, SystemClock};
use ledger::{LedgerError, TokenLedger};

/// The narrow slice of the ledger the market calls. `TokenLedger` is the
/// production implementation; the seam exists for the same reason the store
/// is a trait: admission treats both as independently failable resources.
pub trait LedgerOps: Send + Sync {
    fn balance(&self, account: &str) -> u64;
    fn credit(&self, account: &str, amount: u64) -> ledger::Result<()>;
    fn debit(&self, account: &str, amount: u64) -> ledger::Result<()>;
    fn refund(&self, account: &str, amount: u64) -> ledger::Result<()>;
    /// Point-in-time copy of all balances, for snapshots.
    fn export_balances(&self) -> std::collections::HashMap<String, u64>;
}

impl LedgerOps for TokenLedger {
    fn balance(&self, account: &str) -> u64 {
        TokenLedger::balance(self, account)
    }
    fn credit(&self, account: &str, amount: u64) -> ledger::Result<()> {
        TokenLedger::credit(self, account, amount)
    }
    fn debit(&self, account: &str, amount: u64) -> ledger::Result<()> {
        TokenLedger::debit(self, account, amount)
    }
    fn refund(&self, account: &str, amount: u64) -> ledger::Result<()> {
        TokenLedger::refund(self, account, amount)
    }
    fn export_balances(&self) -> std::collections::HashMap<String, u64> {
        self.export()
    }
}

/// Facade wiring the ledger, bid store and listings directory together.
/// All mutable state lives in the ledger and the store; the facade itself
/// only carries the proposal id counter.
pub struct BidMarket {
    ledger: Arc<dyn LedgerOps>,
    store: Arc<dyn BidStore>,
    listings: Arc<dyn ListingDirectory>,
    clock: Arc<dyn Clock>,
    next_proposal_id: AtomicU64,
}

impl BidMarket {
    /// Market over fresh in-memory state.
    pub fn new(listings: Arc<dyn ListingDirectory>) -> Self {
        Self::with_parts(
            Arc::new(TokenLedger::new()),
            Arc::new(MemoryBidStore::new()),
            listings,
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        ledger: Arc<dyn LedgerOps>,
        store: Arc<dyn BidStore>,
        listings: Arc<dyn ListingDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            store,
            listings,
            clock,
            next_proposal_id: AtomicU64::new(1),
        }
    }

    /// Rebuild a market from a snapshot, with fresh in-memory ledger and
    /// store holding the snapshotted state.
    pub fn from_snapshot(
        snapshot: MarketSnapshot,
        listings: Arc<dyn ListingDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let market = Self::with_parts(
            Arc::new(TokenLedger::restore(snapshot.balances)),
            Arc::new(MemoryBidStore::restore(snapshot.proposals)),
            listings,
            clock,
        );
        market
            .next_proposal_id
            .store(snapshot.next_proposal_id, Ordering::Relaxed);
        market
    }

    /// Current token balance for an agent. Read-only.
    pub fn balance(&self, agent_id: &str) -> u64 {
        self.ledger.balance(agent_id)
    }

    /// Credit purchased tokens. `purchase_ref` identifies the external
    /// payment and is recorded for audit; deduping retries by reference is
    /// the payment collaborator's responsibility.
    pub fn credit(&self, agent_id: &str, amount: u64, purchase_ref: &str) -> Result<()> {
        self.ledger.credit(agent_id, amount)?;
        debug!(target: "bid_market", agent_id, amount, purchase_ref, "tokens credited");
        Ok(())
    }

    /// Read-only pricing preview against current demand. The admission path
    /// recomputes its own quote; a shift in demand between preview and
    /// commit changes the committed price.
    pub fn quote(&self, listing_id: &str) -> Result<Quote> {
        let listing = self.lookup(listing_id)?;
        let count = self
            .store
            .count_bids(listing_id)
            .map_err(MarketError::ConcurrentConflict)?;
        Ok(pricing::quote(listing.kind, listing.verified, count))
    }

    /// Highest committed token amount on a listing, 0 if no proposals.
    pub fn highest_committed(&self, listing_id: &str) -> Result<u64> {
        self.lookup(listing_id)?;
        priority::highest_committed(self.store.as_ref(), listing_id)
            .map_err(MarketError::ConcurrentConflict)
    }

    /// A listing's proposals in display order.
    pub fn ranked_proposals(&self, listing_id: &str) -> Result<Vec<Proposal>> {
        self.lookup(listing_id)?;
        let proposals = self
            .store
            .proposals_for(listing_id)
            .map_err(MarketError::ConcurrentConflict)?;
        Ok(priority::ranked(proposals))
    }

    /// Admit a bid: duplicate check, commit-time quote, atomic debit,
    /// unique persist. A persist failure after the debit triggers a
    /// compensating refund that restores the pre-debit balance exactly; if
    /// that refund fails the error escalates as [`MarketError::RefundFailed`].
    ///
    /// Retries are idempotent from the caller's side: retrying a bid that
    /// already succeeded yields [`MarketError::AlreadyBid`], never a second
    /// debit.
    pub fn place_bid(&self, agent_id: &str, listing_id: &str, boost: u64) -> Result<Proposal> {
        let listing = self.lookup(listing_id)?;

        // Necessary but not sufficient under concurrency; the store's
        // uniqueness constraint in the persist step closes the race.
        if self
            .store
            .exists(listing_id, agent_id)
            .map_err(MarketError::ConcurrentConflict)?
        {
            return Err(MarketError::AlreadyBid {
                listing_id: listing_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }

        let count = self
            .store
            .count_bids(listing_id)
            .map_err(MarketError::ConcurrentConflict)?;
        let quote = pricing::quote(listing.kind, listing.verified, count);
        let total = quote
            .cost
            .checked_add(boost)
            .ok_or(LedgerError::InvalidAmount)?;

        self.ledger.debit(agent_id, total).map_err(|e| match e {
            LedgerError::InsufficientBalance {
                requested,
                available,
                ..
            } => MarketError::InsufficientBalance {
                agent_id: agent_id.to_string(),
                requested,
                available,
            },
            other => MarketError::Ledger(other),
        })?;
        debug!(
            target: "bid_market",
            agent_id,
            listing_id,
            cost = quote.cost,
            boost,
            total,
            "tokens debited for bid"
        );

        let proposal = Proposal {
            id: self.next_proposal_id.fetch_add(1, Ordering::Relaxed),
            listing_id: listing_id.to_string(),
            agent_id: agent_id.to_string(),
            base_cost: quote.cost,
            boost,
            tokens_spent: total,
            created_at: self.clock.now_millis(),
            status: ProposalStatus::Pending,
        };

        match self.store.create_if_absent(proposal.clone()) {
            Ok(true) => Ok(proposal),
            Ok(false) => {
                // Lost the uniqueness race after debiting; undo the debit.
                self.rollback(agent_id, total)?;
                warn!(
                    target: "bid_market",
                    agent_id,
                    listing_id,
                    total,
                    "duplicate bid lost persist race, tokens refunded"
                );
                Err(MarketError::AlreadyBid {
                    listing_id: listing_id.to_string(),
                    agent_id: agent_id.to_string(),
                })
            }
            Err(source) => {
                self.rollback(agent_id, total)?;
                warn!(
                    target: "bid_market",
                    agent_id,
                    listing_id,
                    total,
                    %source,
                    "bid persistence failed, tokens refunded"
                );
                Err(MarketError::Persistence {
                    agent_id: agent_id.to_string(),
                    amount: total,
                    source,
                })
            }
        }
    }

    /// Point-in-time snapshot of balances and proposals.
    pub fn snapshot(&self) -> Result<MarketSnapshot> {
        let proposals = self
            .store
            .all_proposals()
            .map_err(MarketError::ConcurrentConflict)?;
        Ok(MarketSnapshot {
            balances: self.ledger.export_balances(),
            proposals,
            next_proposal_id: self.next_proposal_id.load(Ordering::Relaxed),
        })
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        snapshot::save(path, &snapshot)?;
        Ok(())
    }

    fn lookup(&self, listing_id: &str) -> Result<Listing> {
        self.listings
            .get(listing_id)
            .ok_or_else(|| MarketError::ListingNotFound(listing_id.to_string()))
    }

    fn rollback(&self, agent_id: &str, amount: u64) -> Result<()> {
        self.ledger.refund(agent_id, amount).map_err(|source| {
            error!(
                target: "bid_market",
                agent_id,
                amount,
                %source,
                "refund failed after bid rollback, manual reconciliation required"
            );
            MarketError::RefundFailed {
                agent_id: agent_id.to_string(),
                amount,
                source,
            }
        })
    }
}
