//! Pure bid pricing: listing kind, verification status and current demand
//! in, integer token cost out.

use serde::{Deserialize, Serialize};

use crate::listing::ListingKind;

pub const BASE_COST_BUYER: u64 = 1;
pub const BASE_COST_SELLER: u64 = 2;
pub const VERIFIED_MULTIPLIER: f64 = 1.5;

// Demand tiers, highest first: a listing with 12 bids prices at the x2.0
// tier, not x1.2.
const DEMAND_TIERS: [(u64, f64); 3] = [(10, 2.0), (5, 1.5), (3, 1.2)];

/// Factor breakdown returned alongside the cost for caller display. Carries
/// no authority; only [`Quote::cost`] is debited.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceFactors {
    pub base: u64,
    pub verified: bool,
    pub current_bid_count: u64,
    pub verification_multiplier: f64,
    pub demand_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub cost: u64,
    pub factors: PriceFactors,
}

/// Price a bid. `current_bid_count` is a point-in-time snapshot; the
/// admission path recomputes the quote at commit time rather than trusting
/// an earlier preview, so staleness here is tolerated.
pub fn quote(kind: ListingKind, verified: bool, current_bid_count: u64) -> Quote {
    let base = match kind {
        ListingKind::Buyer => BASE_COST_BUYER,
        ListingKind::Seller => BASE_COST_SELLER,
    };
    let verification_multiplier = if verified { VERIFIED_MULTIPLIER } else { 1.0 };
    let demand_multiplier = DEMAND_TIERS
        .iter()
        .find(|(threshold, _)| current_bid_count >= *threshold)
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(1.0);
    let cost = (base as f64 * verification_multiplier * demand_multiplier).ceil() as u64;
    Quote {
        cost: cost.max(1),
        factors: PriceFactors {
            base,
            verified,
            current_bid_count,
            verification_multiplier,
            demand_multiplier,
        },
    }
}
