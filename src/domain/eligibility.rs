//! Eligibility gate for adding an item to a cart.
//!
//! A buyer's trust tier is derived from completed rentals and the ratings other
//! users gave them. The tier bounds how long and how expensive a rental may be.

use super::money::Money;
use super::party::Review;
use crate::error::Ineligibility;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Basic,
    Standard,
    ExtendedPrivilege,
}

/// What the gate knows about a buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrustSnapshot {
    pub completed_orders: u32,
    /// `None` until the buyer has been reviewed at least once.
    pub average_rating: Option<Decimal>,
    /// Reviews received at the top of the rating scale.
    pub top_reviews: u32,
}

impl TrustSnapshot {
    pub fn from_reviews(completed_orders: u32, reviews: &[Review], top_rating: u8) -> Self {
        let average_rating = if reviews.is_empty() {
            None
        } else {
            let total: u32 = reviews.iter().map(|r| u32::from(r.rating)).sum();
            Some((Decimal::from(total) / Decimal::from(reviews.len() as u64)).round_dp(2))
        };
        let top_reviews = reviews.iter().filter(|r| r.rating >= top_rating).count() as u32;

        Self {
            completed_orders,
            average_rating,
            top_reviews,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityRules {
    /// Minimum average rating to leave the basic tier.
    pub trusted_rating: Decimal,
    /// Rating that counts as a top review.
    pub top_rating: u8,
    /// Top reviews needed, on top of the trusted average, for extended privileges.
    pub extended_min_top_reviews: u32,
    pub basic_max_days: u32,
    pub basic_price_cap: Money,
    /// Durations at or above this need extended privileges.
    pub long_rental_days: u32,
    pub standard_price_cap: Money,
    /// Longest rental anyone may request, whatever their tier.
    pub max_rental_days: u32,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            trusted_rating: dec!(4.0),
            top_rating: 5,
            extended_min_top_reviews: 5,
            basic_max_days: 7,
            basic_price_cap: Money::from(100),
            long_rental_days: 14,
            standard_price_cap: Money::from(500),
            max_rental_days: 365,
        }
    }
}

impl EligibilityRules {
    pub fn tier(&self, trust: &TrustSnapshot) -> TrustTier {
        let trusted = trust.completed_orders > 0
            && trust
                .average_rating
                .is_some_and(|avg| avg >= self.trusted_rating);

        if !trusted {
            TrustTier::Basic
        } else if trust.top_reviews >= self.extended_min_top_reviews {
            TrustTier::ExtendedPrivilege
        } else {
            TrustTier::Standard
        }
    }

    /// Approves or refuses a rental of `duration_days` at `price`.
    pub fn check(
        &self,
        trust: &TrustSnapshot,
        duration_days: u32,
        price: Money,
    ) -> Result<TrustTier, Ineligibility> {
        let tier = self.tier(trust);
        if duration_days > self.max_rental_days {
            return Err(Ineligibility::IneligibleDuration);
        }
        match tier {
            TrustTier::Basic => {
                if duration_days > self.basic_max_days {
                    return Err(Ineligibility::IneligibleDuration);
                }
                if price > self.basic_price_cap {
                    return Err(Ineligibility::IneligiblePrice);
                }
            }
            TrustTier::Standard => {
                if duration_days >= self.long_rental_days || price > self.standard_price_cap {
                    return Err(Ineligibility::ExtendedPrivilegesRequired);
                }
            }
            TrustTier::ExtendedPrivilege => {}
        }
        Ok(tier)
    }
}
