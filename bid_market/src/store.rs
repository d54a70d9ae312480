//! Bid persistence seam. The store owns the uniqueness constraint on
//! `(listing_id, agent_id)`: `create_if_absent` is the atomic primitive the
//! admission saga relies on, so duplicate admission is closed structurally
//! rather than by a check-then-write convention.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

/// An agent's priced submission against a listing. Created exactly once per
/// successful admission and immutable afterwards; status transitions belong
/// to the listing owner's review flow, outside this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub listing_id: String,
    pub agent_id: String,
    /// Quoted cost at commit time, before boost.
    pub base_cost: u64,
    /// Extra tokens voluntarily committed to improve ranking.
    pub boost: u64,
    /// `base_cost + boost`; the amount actually debited.
    pub tokens_spent: u64,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub status: ProposalStatus,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("bid store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence collaborator for bid records. Records are never deleted:
/// "one bid per agent per listing" holds forever, not just while a bid is
/// active.
pub trait BidStore: Send + Sync {
    /// Number of proposals recorded against a listing.
    fn count_bids(&self, listing_id: &str) -> StoreResult<u64>;

    /// Whether `(listing_id, agent_id)` already holds a record.
    fn exists(&self, listing_id: &str, agent_id: &str) -> StoreResult<bool>;

    /// Insert the proposal unless a record for its `(listing_id, agent_id)`
    /// already exists. Returns whether a record was created. This is the
    /// store-enforced uniqueness constraint; a caller that loses the race
    /// observes `false`, never a second record.
    fn create_if_absent(&self, proposal: Proposal) -> StoreResult<bool>;

    fn proposals_for(&self, listing_id: &str) -> StoreResult<Vec<Proposal>>;

    /// Every recorded proposal, for snapshots.
    fn all_proposals(&self) -> StoreResult<Vec<Proposal>>;
}

/// In-memory store keyed on `(listing_id, agent_id)`. The vacant-entry
/// insert gives the same guarantee a unique index would in a backing
/// database.
#[derive(Debug, Default)]
pub struct MemoryBidStore {
    bids: DashMap<(String, String), Proposal>,
}

impl MemoryBidStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from snapshot contents.
    pub fn restore(proposals: Vec<Proposal>) -> Self {
        let store = Self::new();
        for p in proposals {
            store
                .bids
                .insert((p.listing_id.clone(), p.agent_id.clone()), p);
        }
        store
    }
}

impl BidStore for MemoryBidStore {
    fn count_bids(&self, listing_id: &str) -> StoreResult<u64> {
        Ok(self
            .bids
            .iter()
            .filter(|e| e.key().0 == listing_id)
            .count() as u64)
    }

    fn exists(&self, listing_id: &str, agent_id: &str) -> StoreResult<bool> {
        Ok(self
            .bids
            .contains_key(&(listing_id.to_string(), agent_id.to_string())))
    }

    fn create_if_absent(&self, proposal: Proposal) -> StoreResult<bool> {
        let key = (proposal.listing_id.clone(), proposal.agent_id.clone());
        match self.bids.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(proposal);
                Ok(true)
            }
        }
    }

    fn proposals_for(&self, listing_id: &str) -> StoreResult<Vec<Proposal>> {
        Ok(self
            .bids
            .iter()
            .filter(|e| e.key().0 == listing_id)
            .map(|e| e.value().clone())
            .collect())
    }

    fn all_proposals(&self) -> StoreResult<Vec<Proposal>> {
        Ok(self.bids.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn proposal(listing: &str, agent: &str, spent: u64) -> Proposal {
        Proposal {
            id: 0,
            listing_id: listing.to_string(),
            agent_id: agent.to_string(),
            base_cost: spent,
            boost: 0,
            tokens_spent: spent,
            created_at: 0,
            status: ProposalStatus::Pending,
        }
    }

    #[test]
    fn create_if_absent_is_first_writer_wins() {
        let store = MemoryBidStore::new();
        assert!(store.create_if_absent(proposal("l1", "a1", 2)).unwrap());
        assert!(!store.create_if_absent(proposal("l1", "a1", 9)).unwrap());
        let kept = &store.proposals_for("l1").unwrap()[0];
        assert_eq!(kept.tokens_spent, 2);
    }

    #[test]
    fn same_agent_different_listings_allowed() {
        let store = MemoryBidStore::new();
        assert!(store.create_if_absent(proposal("l1", "a1", 1)).unwrap());
        assert!(store.create_if_absent(proposal("l2", "a1", 1)).unwrap());
        assert_eq!(store.count_bids("l1").unwrap(), 1);
        assert_eq!(store.count_bids("l2").unwrap(), 1);
    }

    #[test]
    fn concurrent_create_has_one_winner() {
        let store = Arc::new(MemoryBidStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.create_if_absent(proposal("l1", "a1", i)).unwrap()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.count_bids("l1").unwrap(), 1);
    }

    #[test]
    fn restore_round_trips() {
        let store = MemoryBidStore::new();
        store.create_if_absent(proposal("l1", "a1", 3)).unwrap();
        store.create_if_absent(proposal("l1", "a2", 5)).unwrap();
        let rebuilt = MemoryBidStore::restore(store.all_proposals().unwrap());
        assert_eq!(rebuilt.count_bids("l1").unwrap(), 2);
        assert!(rebuilt.exists("l1", "a2").unwrap());
    }
}
