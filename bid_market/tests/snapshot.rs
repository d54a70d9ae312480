use std::sync::Arc;

use bid_market::clock::ManualClock;
use bid_market::{snapshot, BidMarket, Listing, ListingKind, MemoryListingDirectory};
use tempfile::tempdir;

fn directory() -> Arc<MemoryListingDirectory> {
    let dir = MemoryListingDirectory::new();
    dir.insert(Listing {
        id: "sell-1".into(),
        kind: ListingKind::Seller,
        verified: false,
    });
    Arc::new(dir)
}

#[test]
fn snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("market.snap");
    let listings = directory();

    let market = BidMarket::new(listings.clone());
    market.credit("a1", 10, "purchase-1").unwrap();
    market.credit("a2", 6, "purchase-2").unwrap();
    market.place_bid("a1", "sell-1", 2).unwrap();
    market.place_bid("a2", "sell-1", 0).unwrap();
    market.save_snapshot(&path).unwrap();

    let restored = BidMarket::from_snapshot(
        snapshot::load(&path).unwrap(),
        listings,
        Arc::new(ManualClock::new(0)),
    );
    assert_eq!(restored.balance("a1"), 6);
    assert_eq!(restored.balance("a2"), 4);
    assert_eq!(restored.ranked_proposals("sell-1").unwrap().len(), 2);
    assert_eq!(restored.highest_committed("sell-1").unwrap(), 4);

    // The one-bid constraint still holds across the restart.
    assert!(restored.place_bid("a1", "sell-1", 0).is_err());
}

#[test]
fn proposal_ids_continue_after_restore() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("market.snap");
    let listings = directory();

    let market = BidMarket::new(listings.clone());
    market.credit("a1", 10, "purchase-1").unwrap();
    let before = market.place_bid("a1", "sell-1", 0).unwrap();
    market.save_snapshot(&path).unwrap();

    let restored = BidMarket::from_snapshot(
        snapshot::load(&path).unwrap(),
        listings,
        Arc::new(ManualClock::new(0)),
    );
    restored.credit("a2", 10, "purchase-2").unwrap();
    let after = restored.place_bid("a2", "sell-1", 0).unwrap();
    assert!(after.id > before.id);
}
