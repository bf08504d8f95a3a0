//! # API Request Models
//!
//! Structures for incoming API request bodies and query strings.
//! Each struct represents the expected JSON body for an endpoint.
//!
//! Required fields are still `Option` here so a missing field produces the
//! service's validation message instead of a generic JSON decode error.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::RequestType;

/// Request to register a new user.
///
/// ## Example JSON
///
/// ```json
/// {
///     "name": "Rahim Uddin",
///     "email": "rahim@example.com",
///     "phoneNumber": "01700000000",
///     "referenceId": "REF-1029",
///     "nid": "1990123456789",
///     "myVault": 0
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub reference_id: Option<String>,

    /// National ID number.
    #[serde(default)]
    pub nid: Option<String>,

    /// Opening vault balance in grams. Defaults to 0.
    #[serde(default)]
    pub my_vault: Option<Decimal>,
}

/// Embedded user reference, as older clients send it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub email: Option<String>,
}

/// Request to buy or sell gold.
///
/// The user is identified by `userId`, or by email through `email` or the
/// embedded `CUser.email`.
///
/// ## Example JSON
///
/// ```json
/// {
///     "userId": "0b6f7f0e-6c1d-4c52-9a55-3f6f3b1f0a11",
///     "requestType": "Buy",
///     "amountInGm": 5,
///     "amountInBdt": 52500
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default, rename = "CUser")]
    pub c_user: Option<UserRef>,

    /// Defaults to `Buy`.
    #[serde(default)]
    pub request_type: Option<RequestType>,

    /// Quantity in grams.
    #[serde(default)]
    pub amount_in_gm: Option<Decimal>,

    /// Price in currency.
    #[serde(default)]
    pub amount_in_bdt: Option<Decimal>,
}

impl CreateTradeRequest {
    /// Email from `email` or `CUser.email`, whichever is set first.
    pub fn owner_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or_else(|| self.c_user.as_ref().and_then(|u| u.email.as_deref()))
    }
}

/// Request to replace the rate document's values.
///
/// ## Example JSON
///
/// ```json
/// {
///     "userBuyRate": 100,
///     "userSellRate": 98,
///     "deliveryCharge": 2
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    #[serde(default)]
    pub user_buy_rate: Option<Decimal>,

    #[serde(default)]
    pub user_sell_rate: Option<Decimal>,

    #[serde(default)]
    pub delivery_charge: Option<Decimal>,
}

/// Administrator decision on a request.
///
/// Only `status` is required. The other fields, when sent, must match the
/// stored request.
///
/// ## Example JSON
///
/// ```json
/// {
///     "status": "Approved",
///     "requestType": "Sell",
///     "amountInGm": 2.5,
///     "amountInBdt": 26000,
///     "userId": "0b6f7f0e-6c1d-4c52-9a55-3f6f3b1f0a11"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// `Approved` or `Rejected`, any case.
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub request_type: Option<RequestType>,

    #[serde(default)]
    pub amount_in_gm: Option<Decimal>,

    /// Accepted for compatibility; the stored amount is authoritative.
    #[serde(default)]
    pub amount_in_bdt: Option<Decimal>,

    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Query string carrying an email.
///
/// ## Example URL
///
/// ```text
/// GET /transaction?email=rahim@example.com
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub email: Option<String>,
}
