//! # Services Module
//!
//! This module contains the business logic of the Gold Market backend.
//! Each service owns one concern and receives the shared store handle at
//! construction.
//!
//! ## Services Overview
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | `VaultLedger` | Submitting requests, settling them against user vaults |
//! | `UserRegistry` | Registration, user lookup |
//! | `RateBook` | The buy/sell rate document |
//! | `ReportService` | Transaction history, vault totals |
//!
//! ## Service Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SERVICES LAYER                            │
//! │                                                                  │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐    │
//! │  │VaultLedger │ │UserRegistry│ │  RateBook  │ │  Report    │    │
//! │  │ submit     │ │ register   │ │ current    │ │ history    │    │
//! │  │ approve    │ │ lookup     │ │ update     │ │ totals     │    │
//! │  └────────────┘ └────────────┘ └────────────┘ └────────────┘    │
//! │         │              │              │              │           │
//! │         └──────────────┴──────┬───────┴──────────────┘           │
//! │                               ▼                                  │
//! │                   Arc<dyn GoldStore>                             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod ledger;
pub mod rates;
pub mod registry;
pub mod reporting;

pub use ledger::{ApprovalCommand, Settlement, SubmitRequest, VaultLedger};
pub use rates::RateBook;
pub use registry::{RegisterUser, UserRegistry};
pub use reporting::ReportService;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::{DatabaseError, RequestStatus, AMOUNT_LIMIT, BDT_SCALE, GRAM_SCALE};

/// Errors returned by every service.
///
/// The variants follow the error taxonomy the API exposes: validation,
/// not found, conflict, underflow and store failure.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// Input was missing or malformed.
    #[error("{0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("No rate found")]
    RateNotFound,

    /// An empty history listing.
    #[error("{0}")]
    NoTransactions(String),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// The request is no longer pending.
    #[error("Request {id} is already {status}")]
    AlreadySettled { id: Uuid, status: RequestStatus },

    #[error("A rate document already exists")]
    RateExists,

    /// A sell would take the vault below zero.
    #[error("Insufficient vault: available {available} gm, requested {requested} gm")]
    InsufficientVault { available: Decimal, requested: Decimal },

    /// A buy would take the vault past the storable maximum.
    #[error("Vault limit exceeded: available {available} gm, requested {requested} gm")]
    VaultLimitExceeded { available: Decimal, requested: Decimal },

    /// The store failed. Not retried.
    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Reject negative decimals for `field`.
pub(crate) fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), MarketError> {
    if value < Decimal::ZERO {
        Err(MarketError::Validation(format!("{} must not be negative", field)))
    } else {
        Ok(())
    }
}

/// Reject zero and negative decimals for `field`.
pub(crate) fn ensure_positive(field: &str, value: Decimal) -> Result<(), MarketError> {
    if value <= Decimal::ZERO {
        Err(MarketError::Validation(format!("{} must be greater than 0", field)))
    } else {
        Ok(())
    }
}

/// Reject amounts the store cannot hold exactly: more than `max_scale`
/// decimal places, or a magnitude of [`AMOUNT_LIMIT`] or more.
fn ensure_storable(field: &str, value: Decimal, max_scale: u32) -> Result<(), MarketError> {
    if value.normalize().scale() > max_scale {
        return Err(MarketError::Validation(format!(
            "{} allows at most {} decimal places",
            field, max_scale
        )));
    }
    if value.abs() >= AMOUNT_LIMIT {
        return Err(MarketError::Validation(format!(
            "{} must be less than {}",
            field, AMOUNT_LIMIT
        )));
    }
    Ok(())
}

/// Gram quantities, vaults and rates: 6 decimal places.
pub(crate) fn ensure_grams(field: &str, value: Decimal) -> Result<(), MarketError> {
    ensure_storable(field, value, GRAM_SCALE)
}

/// Taka amounts: 2 decimal places.
pub(crate) fn ensure_bdt(field: &str, value: Decimal) -> Result<(), MarketError> {
    ensure_storable(field, value, BDT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn gram_amounts_keep_six_places() {
        assert!(ensure_grams("amountInGm", dec!(1.234567)).is_ok());
        assert!(ensure_grams("amountInGm", dec!(1.500000000)).is_ok());
        assert!(matches!(
            ensure_grams("amountInGm", dec!(1.2345678)),
            Err(MarketError::Validation(m)) if m == "amountInGm allows at most 6 decimal places"
        ));
        assert!(ensure_grams("amountInGm", dec!(0.0000001)).is_err());
    }

    #[test]
    fn taka_amounts_keep_two_places() {
        assert!(ensure_bdt("amountInBdt", dec!(1.01)).is_ok());
        assert!(ensure_bdt("amountInBdt", dec!(1.005)).is_err());
    }

    #[test]
    fn amounts_stay_below_the_column_range() {
        assert!(ensure_grams("myVault", dec!(99999999999999.999999)).is_ok());
        assert!(ensure_grams("myVault", dec!(100000000000000)).is_err());
        assert!(ensure_bdt("amountInBdt", dec!(100000000000000)).is_err());
    }
}
