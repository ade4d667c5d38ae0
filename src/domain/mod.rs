//! Domain layer: the order aggregate and its state machine, money, fines, the
//! eligibility gate, and the ports through which the application talks to
//! storage, payments and messaging.

pub mod eligibility;
pub mod fine;
pub mod money;
pub mod notification;
pub mod order;
pub mod party;
pub mod ports;
