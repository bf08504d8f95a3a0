//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Extracts request data
//! 2. Validates input
//! 3. Calls the appropriate service
//! 4. Returns a formatted response
//!
//! ## Error Handling
//!
//! Service errors are mapped to a status code and returned as JSON:
//!
//! | Error | Status |
//! |-------|--------|
//! | Validation | 400 |
//! | User / request / rate not found, empty history | 404 |
//! | Duplicate email, already settled, rate exists | 409 |
//! | Insufficient vault, vault limit exceeded | 422 |
//! | Store failure | 500 |

use std::sync::Arc;
use actix_web::{http::StatusCode, web, HttpResponse};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, error, warn};

use crate::AppState;
use crate::db::{Decision, RateValues, RequestType};
use crate::models::{
    AddUserRequest,
    AdminReportResponse,
    ApprovalRequest,
    ApprovalResponse,
    CreateTradeRequest,
    CreateTradeResponse,
    EmailQuery,
    ErrorBody,
    HealthResponse,
    RateRequest,
    RateResponse,
    RegisterUserResponse,
    TradeRequestResponse,
    UserResponse,
};
use crate::services::{ApprovalCommand, MarketError, RegisterUser, SubmitRequest};
use crate::utils::parse_id;

/// Convert a service error into its HTTP response.
pub(crate) fn error_response(err: &MarketError) -> HttpResponse {
    let (status, code) = match err {
        MarketError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        MarketError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        MarketError::RequestNotFound(_) => (StatusCode::NOT_FOUND, "REQUEST_NOT_FOUND"),
        MarketError::RateNotFound => (StatusCode::NOT_FOUND, "RATE_NOT_FOUND"),
        MarketError::NoTransactions(_) => (StatusCode::NOT_FOUND, "NO_TRANSACTIONS"),
        MarketError::DuplicateEmail(_) => (StatusCode::CONFLICT, "DUPLICATE_EMAIL"),
        MarketError::AlreadySettled { .. } => (StatusCode::CONFLICT, "ALREADY_SETTLED"),
        MarketError::RateExists => (StatusCode::CONFLICT, "RATE_EXISTS"),
        MarketError::InsufficientVault { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_VAULT")
        }
        MarketError::VaultLimitExceeded { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "VAULT_LIMIT_EXCEEDED")
        }
        MarketError::Store(e) => {
            // Never leak SQL details to clients
            error!("Store failure: {}", e);
            return HttpResponse::InternalServerError()
                .json(ErrorBody::new("STORE_ERROR", "Internal Server Error"));
        }
    };

    HttpResponse::build(status).json(ErrorBody::new(code, &err.to_string()))
}

fn bad_request(message: &str) -> HttpResponse {
    error_response(&MarketError::Validation(message.to_string()))
}

/// A required decimal field, or the 400 response naming it.
fn required(field: &str, value: Option<Decimal>) -> Result<Decimal, HttpResponse> {
    value.ok_or_else(|| bad_request(&format!("{} is required", field)))
}

/// Parse the `status` field of an approval.
fn parse_decision(status: Option<&str>) -> Result<Decision, HttpResponse> {
    let status = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("Status is required"))?;

    match status.to_ascii_lowercase().as_str() {
        "approved" => Ok(Decision::Approve),
        "rejected" => Ok(Decision::Reject),
        _ => Err(bad_request(&format!(
            "Invalid status '{}': expected Approved or Rejected",
            status
        ))),
    }
}

/// API information endpoint (root).
///
/// ## Endpoint
///
/// `GET /`
pub async fn api_info(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    let info = json!({
        "name": "Gold Market API",
        "message": "Gold Market is Running!",
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.config.store_backend.as_str(),
        "endpoints": {
            "users": ["POST /addUser", "GET /users", "GET /user?email="],
            "requests": ["POST /buy", "GET /request", "PUT /request/{id}", "GET /transaction?email="],
            "rate": ["GET /buy-sell-rate", "POST /buy-sell-rate", "PUT /buy-sell-rate/{id}"],
            "reporting": ["GET /adminReport"],
            "health": ["GET /health"]
        }
    });

    HttpResponse::Ok().json(info)
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Response
///
/// ```json
/// {
///     "status": "healthy",
///     "store": true,
///     "version": "0.1.0",
///     "timestamp": "2025-12-08T12:00:00Z"
/// }
/// ```
pub async fn health_check(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    let store_healthy = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: store unreachable: {}", e);
            false
        }
    };

    let response = HealthResponse {
        status: if store_healthy { "healthy" } else { "unhealthy" }.to_string(),
        store: store_healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    HttpResponse::build(status_code).json(response)
}

/// Register a new user.
///
/// ## Endpoint
///
/// `POST /addUser`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:5000/addUser \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Rahim Uddin",
///     "email": "rahim@example.com",
///     "phoneNumber": "01700000000",
///     "referenceId": "REF-1029",
///     "nid": "1990123456789"
///   }'
/// ```
///
/// ## Response (201)
///
/// ```json
/// {
///     "message": "User registered successfully",
///     "userId": "0b6f7f0e-6c1d-4c52-9a55-3f6f3b1f0a11"
/// }
/// ```
pub async fn add_user(
    state: web::Data<Arc<AppState>>,
    body: web::Json<AddUserRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    info!("Register request for {:?}", body.email);

    let input = RegisterUser {
        name: body.name.unwrap_or_default(),
        email: body.email.unwrap_or_default(),
        phone_number: body.phone_number,
        reference_id: body.reference_id,
        nid: body.nid,
        my_vault: body.my_vault,
    };

    match state.users.register(input).await {
        Ok(user) => HttpResponse::Created().json(RegisterUserResponse {
            message: "User registered successfully".to_string(),
            user_id: user.id,
        }),
        Err(e) => error_response(&e),
    }
}

/// List all users, newest first.
///
/// `GET /users`
pub async fn list_users(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.users.list_users().await {
        Ok(users) => {
            let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
            HttpResponse::Ok().json(users)
        }
        Err(e) => error_response(&e),
    }
}

/// Get one user by email.
///
/// `GET /user?email=rahim@example.com`
pub async fn get_user(
    state: web::Data<Arc<AppState>>,
    query: web::Query<EmailQuery>,
) -> HttpResponse {
    let Some(email) = query.email.as_deref() else {
        return bad_request("Email query parameter is required");
    };

    match state.users.find_by_email(email).await {
        Ok(user) => HttpResponse::Ok().json(UserResponse::from(user)),
        Err(e) => error_response(&e),
    }
}

/// Submit a buy or sell request.
///
/// The request is stored as `Pending`; nothing touches the vault until an
/// administrator approves it.
///
/// ## Endpoint
///
/// `POST /buy`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:5000/buy \
///   -H "Content-Type: application/json" \
///   -d '{
///     "userId": "0b6f7f0e-6c1d-4c52-9a55-3f6f3b1f0a11",
///     "requestType": "Buy",
///     "amountInGm": 5,
///     "amountInBdt": 52500
///   }'
/// ```
pub async fn create_trade(
    state: web::Data<Arc<AppState>>,
    body: web::Json<CreateTradeRequest>,
) -> HttpResponse {
    let body = body.into_inner();

    let amount_in_gm = match required("amountInGm", body.amount_in_gm) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let amount_in_bdt = match required("amountInBdt", body.amount_in_bdt) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let user_id = match (body.user_id, body.owner_email()) {
        (Some(id), _) => id,
        (None, Some(email)) => match state.users.find_by_email(email).await {
            Ok(user) => user.id,
            Err(e) => return error_response(&e),
        },
        (None, None) => return bad_request("userId or email is required"),
    };

    let request_type = body.request_type.unwrap_or(RequestType::Buy);

    let submit = SubmitRequest {
        user_id,
        request_type,
        amount_in_gm,
        amount_in_bdt,
    };

    match state.ledger.submit_request(submit).await {
        Ok(request) => HttpResponse::Created().json(CreateTradeResponse {
            message: format!("{} operation successful", request.request_type),
            id: request.id,
            request: request.into(),
        }),
        Err(e) => error_response(&e),
    }
}

/// List every request, newest first.
///
/// `GET /request`. An empty list answers 404.
pub async fn list_requests(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.reports.all_requests().await {
        Ok(requests) => {
            let body: Vec<TradeRequestResponse> = requests.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(body)
        }
        Err(e) => error_response(&e),
    }
}

/// Transaction history of one user.
///
/// `GET /transaction?email=rahim@example.com`
pub async fn transaction_history(
    state: web::Data<Arc<AppState>>,
    query: web::Query<EmailQuery>,
) -> HttpResponse {
    let Some(email) = query.email.as_deref().filter(|e| !e.trim().is_empty()) else {
        return bad_request("Email query parameter is required");
    };

    match state.reports.history_for_email(email).await {
        Ok(history) => {
            let body: Vec<TradeRequestResponse> = history.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(body)
        }
        Err(e) => error_response(&e),
    }
}

/// Approve or reject a pending request.
///
/// Approval of a `Buy` credits the owner's vault, approval of a `Sell`
/// debits it. Both happen atomically with the status change, exactly once.
///
/// ## Endpoint
///
/// `PUT /request/{id}`
///
/// ## Example
///
/// ```bash
/// curl -X PUT http://127.0.0.1:5000/request/5f0c... \
///   -H "Content-Type: application/json" \
///   -d '{ "status": "Approved" }'
/// ```
///
/// ## Errors
///
/// - 400 - missing/invalid status, or echoed details that do not match
/// - 404 - unknown request or user
/// - 409 - request already approved or rejected
/// - 422 - sell larger than the vault
pub async fn update_request_status(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<ApprovalRequest>,
) -> HttpResponse {
    let request_id = match parse_id(&path) {
        Ok(id) => id,
        Err(message) => return bad_request(&message),
    };

    let decision = match parse_decision(body.status.as_deref()) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    info!(
        "Decision {:?} on request {} (type {:?}, {:?} gm, {:?} bdt, user {:?})",
        decision, request_id, body.request_type, body.amount_in_gm, body.amount_in_bdt, body.user_id
    );

    let command = ApprovalCommand {
        request_id,
        decision,
        request_type: body.request_type,
        quantity: body.amount_in_gm,
        user_id: body.user_id,
    };

    match state.ledger.apply_approval(command).await {
        Ok(settlement) => HttpResponse::Ok().json(ApprovalResponse {
            message: "Status updated successfully".to_string(),
            request: settlement.request.into(),
            my_vault: settlement.vault_after,
        }),
        Err(e) => error_response(&e),
    }
}

/// Current buy/sell rate.
///
/// `GET /buy-sell-rate`. 404 when no rate document exists.
pub async fn get_rate(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.rates.current().await {
        Ok(rate) => HttpResponse::Ok().json(RateResponse::from(rate)),
        Err(e) => error_response(&e),
    }
}

fn rate_values(body: &RateRequest) -> Result<RateValues, HttpResponse> {
    Ok(RateValues {
        user_buy_rate: required("userBuyRate", body.user_buy_rate)?,
        user_sell_rate: required("userSellRate", body.user_sell_rate)?,
        delivery_charge: required("deliveryCharge", body.delivery_charge)?,
    })
}

/// Create the rate document.
///
/// `POST /buy-sell-rate`. 409 if one already exists.
pub async fn create_rate(
    state: web::Data<Arc<AppState>>,
    body: web::Json<RateRequest>,
) -> HttpResponse {
    let values = match rate_values(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.rates.create(values).await {
        Ok(rate) => HttpResponse::Created().json(RateResponse::from(rate)),
        Err(e) => error_response(&e),
    }
}

/// Replace the rate values.
///
/// ## Endpoint
///
/// `PUT /buy-sell-rate/{id}`
///
/// ## Example
///
/// ```bash
/// curl -X PUT http://127.0.0.1:5000/buy-sell-rate/9d1c... \
///   -H "Content-Type: application/json" \
///   -d '{ "userBuyRate": 100, "userSellRate": 98, "deliveryCharge": 2 }'
/// ```
///
/// Returns the full updated document.
pub async fn update_rate(
    state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<RateRequest>,
) -> HttpResponse {
    let id = match parse_id(&path) {
        Ok(id) => id,
        Err(message) => return bad_request(&message),
    };

    let values = match rate_values(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.rates.update(id, values).await {
        Ok(rate) => HttpResponse::Ok().json(RateResponse::from(rate)),
        Err(e) => error_response(&e),
    }
}

/// Sum of all vaults.
///
/// ## Endpoint
///
/// `GET /adminReport`
///
/// ## Response
///
/// ```json
/// {
///     "totalVault": 1234.5,
///     "formattedTotalVault": "1,234.50 gm",
///     "userCount": 42,
///     "timestamp": "2025-12-08T12:00:00Z"
/// }
/// ```
pub async fn admin_report(
    state: web::Data<Arc<AppState>>,
) -> HttpResponse {
    match state.reports.vault_totals().await {
        Ok(totals) => HttpResponse::Ok().json(AdminReportResponse::from(totals)),
        Err(e) => error_response(&e),
    }
}
