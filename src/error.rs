use crate::domain::order::{EventKind, OrderStatus};
use thiserror::Error;

/// Coarse classification of every failure the engine can report.
///
/// Business kinds (`NotFound`, `Conflict`, `InvalidTransition`) are safe to show to
/// the initiating actor. `ServiceUnavailable` means the action itself succeeded or
/// can be retried once a downstream collaborator recovers. `Internal` is reported
/// generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidTransition,
    ServiceUnavailable,
    Internal,
}

/// Why the eligibility gate refused a cart line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    #[error("requested rental duration exceeds what this buyer may rent")]
    IneligibleDuration,
    #[error("requested price exceeds what this buyer may rent")]
    IneligiblePrice,
    #[error("extended rental privileges are required for this request")]
    ExtendedPrivilegesRequired,
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("order {0} not found")]
    OrderNotFound(u64),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("vendor {0} not found")]
    VendorNotFound(String),
    #[error("product {0} not found")]
    ProductNotFound(String),
    #[error("cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Ineligible(#[from] Ineligibility),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("cannot {event} an order in status {from}")]
    InvalidTransition { from: OrderStatus, event: EventKind },
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(e: rocksdb::Error) -> Self {
        MarketError::InternalError(Box::new(e))
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        MarketError::InternalError(Box::new(e))
    }
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::OrderNotFound(_)
            | MarketError::UserNotFound(_)
            | MarketError::VendorNotFound(_)
            | MarketError::ProductNotFound(_) => ErrorKind::NotFound,
            MarketError::EmptyCart
            | MarketError::Ineligible(_)
            | MarketError::Conflict(_)
            | MarketError::ValidationError(_) => ErrorKind::Conflict,
            MarketError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            MarketError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            MarketError::InternalError(_) | MarketError::CsvError(_) | MarketError::IoError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Keeps business and availability errors as they are and folds everything
    /// else into `InternalError`.
    pub fn escalate(self) -> Self {
        match self.kind() {
            ErrorKind::Internal => match self {
                MarketError::InternalError(_) => self,
                other => MarketError::InternalError(Box::new(other)),
            },
            _ => self,
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        MarketError::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        MarketError::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MarketError::InternalError(Box::new(std::io::Error::other(msg.into())))
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
