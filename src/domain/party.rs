//! People and things the order core refers to by id: users, reviews, products and carts.
//!
//! These records belong to the identity and catalog collaborators. The core only
//! reads them, except for product availability and cart contents, which checkout
//! and returns update inside their own atomic units.

use super::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(UserId);
string_id!(ProductId);

/// Postal address copied onto an order when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Payment-provider account that receives vendor payouts.
    pub payout_account: Option<String>,
    pub address: Option<ShippingAddress>,
    /// Lifetime count of rentals this user completed as a buyer.
    pub completed_orders: u32,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            email: email.into(),
            payout_account: None,
            address: None,
            completed_orders: 0,
        }
    }
}

/// A rating one user left for another, on a 1..=5 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub reviewer: UserId,
    pub subject: UserId,
    pub rating: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub vendor: UserId,
    pub name: String,
    /// Rental price for one rental period.
    pub price: Money,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: ProductId,
    pub vendor: UserId,
    pub duration_days: u32,
    pub price: Money,
}

/// A buyer's pending selection. Lines keep insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub buyer: UserId,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn empty(buyer: UserId) -> Self {
        Self {
            buyer,
            lines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contains(&self, product: &ProductId) -> bool {
        self.lines.iter().any(|l| &l.product == product)
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.price).sum()
    }
}
