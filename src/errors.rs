//! Unified error type for the necessity ledger.
//!
//! Every fallible operation in the crate returns [`Result`]. Insufficient pooled
//! funds or an already fully funded necessity are not errors; they show up as
//! ordinary allocation outcomes.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::entities::ContributionStatus;

/// All errors produced by the necessity ledger.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Error bubbled up from the database layer
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O failure (config file access and similar)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A money amount was zero, negative or unparsable
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The offending amount as text
        amount: String,
    },

    /// No necessity with the given id exists
    #[error("Necessity not found: {id}")]
    NecessityNotFound {
        /// Requested necessity id
        id: i64,
    },

    /// No money contribution with the given id exists
    #[error("Contribution not found: {id}")]
    ContributionNotFound {
        /// Requested contribution id
        id: i64,
    },

    /// The requested lifecycle transition is not allowed
    #[error("Contribution {id} cannot move from {from:?} to {to:?}")]
    InvalidStatusTransition {
        /// Contribution id
        id: i64,
        /// Current status
        from: ContributionStatus,
        /// Requested status
        to: ContributionStatus,
    },

    /// Programmer error: the caller handed the allocator an impossible state
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the broken invariant
        message: String,
    },

    /// The allocation snapshot went stale before it could be applied
    #[error("Necessity {necessity_id} was modified concurrently, retry with fresh state")]
    ConcurrentModification {
        /// Necessity whose state changed underneath the allocation
        necessity_id: i64,
    },
}

impl Error {
    /// Builds an [`Error::InvalidAmount`] from a decimal value.
    #[must_use]
    pub fn invalid_amount(amount: Decimal) -> Self {
        Self::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    /// Whether the caller may re-read state and try the operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
