//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::{error, web, HttpResponse};

use super::handlers;
use crate::models::ErrorBody;

/// Configure all API routes.
///
/// This function is called from main.rs to set up
/// all the endpoint routes.
///
/// ## Route Structure
///
/// ```text
/// /
/// ├── /health                  GET  - Health check
/// ├── /addUser                 POST - Register user
/// ├── /users                   GET  - List users
/// ├── /user?email=             GET  - User by email
/// ├── /buy                     POST - Submit buy/sell request
/// ├── /buy-sell-rate           GET  - Current rate
/// │                            POST - Create rate
/// ├── /buy-sell-rate/{id}      PUT  - Update rate
/// ├── /transaction?email=      GET  - User history
/// ├── /request                 GET  - All requests
/// ├── /request/{id}            PUT  - Approve / reject
/// └── /adminReport             GET  - Vault totals
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Malformed bodies and query strings answer with the JSON error shape
        .app_data(json_config())
        .app_data(query_config())

        .route("/", web::get().to(handlers::api_info))
        .route("/health", web::get().to(handlers::health_check))

        // Users
        .route("/addUser", web::post().to(handlers::add_user))
        .route("/users", web::get().to(handlers::list_users))
        .route("/user", web::get().to(handlers::get_user))

        // Buy/sell requests
        .route("/buy", web::post().to(handlers::create_trade))
        .route("/request", web::get().to(handlers::list_requests))
        .route("/request/{id}", web::put().to(handlers::update_request_status))
        .route("/transaction", web::get().to(handlers::transaction_history))

        // Rate document
        .route("/buy-sell-rate", web::get().to(handlers::get_rate))
        .route("/buy-sell-rate", web::post().to(handlers::create_rate))
        .route("/buy-sell-rate/{id}", web::put().to(handlers::update_rate))

        // Reporting
        .route("/adminReport", web::get().to(handlers::admin_report));
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let body = ErrorBody::new("INVALID_JSON", &err.to_string());
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let body = ErrorBody::new("INVALID_QUERY", &err.to_string());
        error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}
