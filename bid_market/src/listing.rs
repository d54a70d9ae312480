use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Whether a listing seeks an agent for a buyer or for a seller. Seller
/// listings carry a higher base bid cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingKind {
    Buyer,
    Seller,
}

/// The slice of a listing this subsystem needs: just enough to price a bid.
/// Listings are owned by the listings collaborator and read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub kind: ListingKind,
    pub verified: bool,
}

/// Read seam onto the listings collaborator.
pub trait ListingDirectory: Send + Sync {
    fn get(&self, listing_id: &str) -> Option<Listing>;
}

/// In-memory directory for embedders and tests.
#[derive(Debug, Default)]
pub struct MemoryListingDirectory {
    listings: DashMap<String, Listing>,
}

impl MemoryListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, listing: Listing) {
        self.listings.insert(listing.id.clone(), listing);
    }
}

impl ListingDirectory for MemoryListingDirectory {
    fn get(&self, listing_id: &str) -> Option<Listing> {
        self.listings.get(listing_id).map(|l| l.value().clone())
    }
}
