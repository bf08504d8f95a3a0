//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//! Each struct represents a row in a table.
//!
//! ## Table Overview
//!
//! | Table | Description |
//! |-------|-------------|
//! | `users` | Registered users and their gold vault balance |
//! | `rates` | The single current buy/sell rate document |
//! | `requests` | Buy and sell requests awaiting or past settlement |
//!
//! ## Relationship Diagram
//!
//! ```text
//! ┌─────────────┐       ┌──────────────────┐
//! │    users    │──────<│     requests     │
//! │             │       │                  │
//! │ id (PK)     │       │ user_id (FK)     │
//! │ email (UQ)  │       │ request_type     │
//! │ my_vault    │       │ amount_in_gm     │
//! │ ...         │       │ status           │
//! └─────────────┘       └──────────────────┘
//!
//! ┌─────────────┐
//! │    rates    │  (one row)
//! └─────────────┘
//! ```
//!
//! ## Note on Types
//!
//! Gold quantities and prices are `rust_decimal::Decimal`, stored as
//! `NUMERIC`. Floats never touch a vault balance.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal places kept by gram and rate columns (`NUMERIC(20, 6)`).
pub const GRAM_SCALE: u32 = 6;

/// Decimal places kept by taka columns (`NUMERIC(20, 2)`).
pub const BDT_SCALE: u32 = 2;

/// Exclusive upper bound for every stored amount: 10^14, the integer
/// range of `NUMERIC(20, 6)`.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(276_447_232, 23_283, 0, false, 0);

/// A registered user.
///
/// `my_vault` is the user's gold balance in grams. It is written at
/// registration and afterwards only by request settlement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    /// Unique user ID (UUID v4).
    pub id: Uuid,

    /// Display name.
    pub name: String,

    /// Email address, trimmed and lower-cased. Unique across users.
    pub email: String,

    pub phone_number: Option<String>,

    /// External reference supplied at registration.
    pub reference_id: Option<String>,

    /// National ID number.
    pub nid: Option<String>,

    /// Gold held for the user, in grams. Never negative.
    pub my_vault: Decimal,

    /// When the user registered.
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub reference_id: Option<String>,
    pub nid: Option<String>,
    pub my_vault: Decimal,
}

/// The current buy/sell rate document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateRecord {
    pub id: Uuid,

    /// Price per gram the market charges a buyer.
    pub user_buy_rate: Decimal,

    /// Price per gram the market pays a seller.
    pub user_sell_rate: Decimal,

    /// Flat delivery charge.
    pub delivery_charge: Decimal,

    pub updated_at: DateTime<Utc>,
}

/// Rate values written by create and update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateValues {
    pub user_buy_rate: Decimal,
    pub user_sell_rate: Decimal,
    pub delivery_charge: Decimal,
}

/// Direction of a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestType {
    /// The user buys gold; approval credits the vault.
    #[serde(alias = "buy", alias = "BUY")]
    Buy,
    /// The user sells gold; approval debits the vault.
    #[serde(alias = "sell", alias = "SELL")]
    Sell,
}

impl RequestType {
    /// Column value stored in `requests.request_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Buy => "buy",
            RequestType::Sell => "sell",
        }
    }

    /// Balance after settling `quantity` grams of this type against `balance`.
    pub fn apply_to(&self, balance: Decimal, quantity: Decimal) -> Result<Decimal, VaultError> {
        match self {
            RequestType::Buy => balance
                .checked_add(quantity)
                .filter(|next| *next < AMOUNT_LIMIT)
                .ok_or(VaultError::LimitExceeded),
            RequestType::Sell => balance
                .checked_sub(quantity)
                .filter(|next| *next >= Decimal::ZERO)
                .ok_or(VaultError::Insufficient),
        }
    }
}

/// Why a vault delta could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultError {
    /// A sell larger than the balance.
    Insufficient,
    /// A buy would push the balance to [`AMOUNT_LIMIT`] or beyond.
    LimitExceeded,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Buy => write!(f, "Buy"),
            RequestType::Sell => write!(f, "Sell"),
        }
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(RequestType::Buy),
            "sell" => Ok(RequestType::Sell),
            other => Err(format!("unknown request type: {}", other)),
        }
    }
}

/// Request lifecycle. `Pending` moves to exactly one of the other two.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "rejected")]
    Rejected,
}

impl RequestStatus {
    /// Column value stored in `requests.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "Pending"),
            RequestStatus::Approved => write!(f, "Approved"),
            RequestStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(format!("unknown request status: {}", other)),
        }
    }
}

/// An administrator's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status the request ends up in.
    pub fn target_status(&self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }
}

/// A buy or sell request.
///
/// `user_email` is not a column on `requests`; it is joined from `users`
/// so history can be served by email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub request_type: RequestType,

    /// Quantity of gold in grams.
    pub amount_in_gm: Decimal,

    /// Price of the request in currency.
    pub amount_in_bdt: Decimal,

    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,

    /// When the request left `Pending`.
    pub settled_at: Option<DateTime<Utc>>,
}

/// Fields needed to insert a request. New requests are always pending.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub user_id: Uuid,
    pub request_type: RequestType,
    pub amount_in_gm: Decimal,
    pub amount_in_bdt: Decimal,
}

/// Result of one attempt to settle a request inside the store.
///
/// Everything except `Settled` means nothing was written.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// The request left `Pending`. `vault_after` is set for approvals.
    Settled {
        request: RequestRecord,
        vault_after: Option<Decimal>,
    },
    RequestNotFound,
    UserNotFound,
    /// The request was already approved or rejected.
    AlreadySettled(RequestStatus),
    /// A sell larger than the vault.
    InsufficientVault {
        available: Decimal,
        requested: Decimal,
    },
    /// A buy that would take the vault to [`AMOUNT_LIMIT`] or beyond.
    VaultLimitExceeded {
        available: Decimal,
        requested: Decimal,
    },
}

impl SettlementOutcome {
    /// Outcome for a vault delta that could not be applied.
    pub fn refused(error: VaultError, available: Decimal, requested: Decimal) -> Self {
        match error {
            VaultError::Insufficient => SettlementOutcome::InsufficientVault { available, requested },
            VaultError::LimitExceeded => SettlementOutcome::VaultLimitExceeded { available, requested },
        }
    }
}

/// Aggregate over all user vaults, for the admin report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VaultTotals {
    pub total_vault: Decimal,
    pub user_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_credits_vault() {
        assert_eq!(RequestType::Buy.apply_to(dec!(10), dec!(5)), Ok(dec!(15)));
    }

    #[test]
    fn sell_debits_vault_down_to_zero() {
        assert_eq!(RequestType::Sell.apply_to(dec!(15), dec!(15)), Ok(dec!(0)));
        assert_eq!(RequestType::Sell.apply_to(dec!(15.5), dec!(0.25)), Ok(dec!(15.25)));
    }

    #[test]
    fn sell_below_zero_is_refused() {
        assert_eq!(RequestType::Sell.apply_to(dec!(15), dec!(20)), Err(VaultError::Insufficient));
        assert_eq!(RequestType::Sell.apply_to(dec!(0), dec!(0.000001)), Err(VaultError::Insufficient));
    }

    #[test]
    fn amount_limit_is_ten_to_the_fourteenth() {
        assert_eq!(AMOUNT_LIMIT, dec!(100000000000000));
    }

    #[test]
    fn buy_past_the_limit_is_not_reported_as_insufficient() {
        let top = AMOUNT_LIMIT - dec!(1);
        assert_eq!(RequestType::Buy.apply_to(top - dec!(1), dec!(1)), Ok(top));
        assert_eq!(RequestType::Buy.apply_to(top, dec!(1)), Err(VaultError::LimitExceeded));
        assert_eq!(RequestType::Buy.apply_to(Decimal::MAX, dec!(1)), Err(VaultError::LimitExceeded));
        assert_eq!(
            SettlementOutcome::refused(VaultError::LimitExceeded, top, dec!(1)),
            SettlementOutcome::VaultLimitExceeded { available: top, requested: dec!(1) }
        );
    }

    #[test]
    fn request_type_parses_any_case() {
        assert_eq!("Buy".parse::<RequestType>().unwrap(), RequestType::Buy);
        assert_eq!("SELL".parse::<RequestType>().unwrap(), RequestType::Sell);
        assert!("swap".parse::<RequestType>().is_err());
    }

    #[test]
    fn status_column_values_round_trip() {
        for status in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!(!RequestStatus::Pending.is_settled());
        assert!(RequestStatus::Rejected.is_settled());
    }

    #[test]
    fn json_accepts_lowercase_aliases() {
        let parsed: RequestType = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(parsed, RequestType::Sell);
        assert_eq!(serde_json::to_string(&RequestType::Buy).unwrap(), "\"Buy\"");
    }
}
