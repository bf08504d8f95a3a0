//! # API Response Models
//!
//! Structures for outgoing API response bodies.
//!
//! Documents are returned as-is (no envelope), with ids under `_id` and
//! camelCase field names. Errors always carry a `message`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{RateRecord, RequestRecord, RequestStatus, RequestType, UserRecord, VaultTotals};
use crate::utils::format_grams;

/// Error body.
///
/// ```json
/// {
///     "message": "Email already registered: rahim@example.com",
///     "code": "DUPLICATE_EMAIL"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,

    /// Error code (e.g., "INSUFFICIENT_VAULT").
    pub code: String,
}

impl ErrorBody {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: code.to_string(),
        }
    }
}

/// A user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub reference_id: Option<String>,
    pub nid: Option<String>,

    /// Vault balance in grams.
    pub my_vault: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            reference_id: user.reference_id,
            nid: user.nid,
            my_vault: user.my_vault,
            created_at: user.created_at,
        }
    }
}

/// Returned by `POST /addUser`.
///
/// ```json
/// {
///     "message": "User registered successfully",
///     "userId": "0b6f7f0e-6c1d-4c52-9a55-3f6f3b1f0a11"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserResponse {
    pub message: String,
    pub user_id: Uuid,
}

/// A buy or sell request document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequestResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub request_type: RequestType,
    pub amount_in_gm: Decimal,
    pub amount_in_bdt: Decimal,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<RequestRecord> for TradeRequestResponse {
    fn from(request: RequestRecord) -> Self {
        Self {
            id: request.id,
            user_id: request.user_id,
            user_email: request.user_email,
            request_type: request.request_type,
            amount_in_gm: request.amount_in_gm,
            amount_in_bdt: request.amount_in_bdt,
            status: request.status,
            created_at: request.created_at,
            settled_at: request.settled_at,
        }
    }
}

/// Returned by `POST /buy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeResponse {
    pub message: String,
    pub id: Uuid,
    pub request: TradeRequestResponse,
}

/// Returned by `PUT /request/{id}`.
///
/// ```json
/// {
///     "message": "Status updated successfully",
///     "request": { "_id": "...", "status": "Approved", ... },
///     "myVault": 15.0
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub message: String,
    pub request: TradeRequestResponse,

    /// Vault after settlement; absent for rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_vault: Option<Decimal>,
}

/// The rate document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_buy_rate: Decimal,
    pub user_sell_rate: Decimal,
    pub delivery_charge: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<RateRecord> for RateResponse {
    fn from(rate: RateRecord) -> Self {
        Self {
            id: rate.id,
            user_buy_rate: rate.user_buy_rate,
            user_sell_rate: rate.user_sell_rate,
            delivery_charge: rate.delivery_charge,
            updated_at: rate.updated_at,
        }
    }
}

/// Returned by `GET /adminReport`.
///
/// ```json
/// {
///     "totalVault": 1234.5,
///     "formattedTotalVault": "1,234.50 gm",
///     "userCount": 42,
///     "timestamp": "2024-01-15T12:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReportResponse {
    pub total_vault: Decimal,
    pub formatted_total_vault: String,
    pub user_count: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<VaultTotals> for AdminReportResponse {
    fn from(totals: VaultTotals) -> Self {
        Self {
            total_vault: totals.total_vault,
            formatted_total_vault: format_grams(totals.total_vault),
            user_count: totals.user_count,
            timestamp: Utc::now(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status: "healthy" or "unhealthy".
    pub status: String,

    /// Store reachable.
    pub store: bool,

    /// Service version.
    pub version: String,

    /// Current timestamp.
    pub timestamp: DateTime<Utc>,
}
