//! Read-side ranking over committed proposals. Derived entirely from the
//! store at read time; holds no state of its own.

use crate::store::{BidStore, Proposal, StoreResult};

/// Highest `tokens_spent` among a listing's proposals, 0 if none. Used by
/// callers deciding how much boost a competitive bid needs.
pub fn highest_committed(store: &dyn BidStore, listing_id: &str) -> StoreResult<u64> {
    Ok(store
        .proposals_for(listing_id)?
        .iter()
        .map(|p| p.tokens_spent)
        .max()
        .unwrap_or(0))
}

/// Display order for competing proposals: tokens committed descending,
/// earlier submission first on ties.
pub fn ranked(mut proposals: Vec<Proposal>) -> Vec<Proposal> {
    proposals.sort_by(|a, b| {
        b.tokens_spent
            .cmp(&a.tokens_spent)
            .then(a.created_at.cmp(&b.created_at))
    });
    proposals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBidStore, ProposalStatus};

    fn proposal(agent: &str, spent: u64, created_at: u64) -> Proposal {
        Proposal {
            id: 0,
            listing_id: "l1".to_string(),
            agent_id: agent.to_string(),
            base_cost: spent,
            boost: 0,
            tokens_spent: spent,
            created_at,
            status: ProposalStatus::Pending,
        }
    }

    #[test]
    fn empty_listing_reads_zero() {
        let store = MemoryBidStore::new();
        assert_eq!(highest_committed(&store, "l1").unwrap(), 0);
    }

    #[test]
    fn highest_committed_takes_max() {
        let store = MemoryBidStore::new();
        for (agent, spent) in [("a1", 2), ("a2", 2), ("a3", 7), ("a4", 5)] {
            store.create_if_absent(proposal(agent, spent, 0)).unwrap();
        }
        assert_eq!(highest_committed(&store, "l1").unwrap(), 7);
    }

    #[test]
    fn ranked_breaks_ties_by_submission_time() {
        let order = ranked(vec![
            proposal("first", 5, 10),
            proposal("second", 5, 20),
            proposal("third", 3, 5),
        ]);
        let agents: Vec<_> = order.iter().map(|p| p.agent_id.as_str()).collect();
        assert_eq!(agents, ["first", "second", "third"]);
    }
}
