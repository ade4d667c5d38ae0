//! Order lifecycle and payment settlement for a peer-to-peer rental
//! marketplace.
//!
//! One checkout becomes a buyer order holding a single payment authorization
//! and one sub-order per vendor. Each sub-order moves through its own shipping
//! and return state machine, the authorization is captured, released or
//! partially captured once every vendor has decided, and a background sweep
//! marks late rentals overdue so a fine can be charged on return.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
