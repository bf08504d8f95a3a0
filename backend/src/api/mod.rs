//! # REST API Module
//!
//! This module defines all HTTP endpoints for the Gold Market API.
//!
//! ## Endpoint Overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/addUser` | Register a user |
//! | GET | `/users` | All users, newest first |
//! | GET | `/user?email=` | One user by email |
//! | POST | `/buy` | Submit a buy or sell request |
//! | GET | `/buy-sell-rate` | Current rate |
//! | POST | `/buy-sell-rate` | Create the rate document |
//! | PUT | `/buy-sell-rate/{id}` | Replace rate values |
//! | GET | `/transaction?email=` | A user's requests |
//! | GET | `/request` | All requests, newest first |
//! | PUT | `/request/{id}` | Approve or reject a request |
//! | GET | `/adminReport` | Vault totals |
//! | GET | `/health` | Health check |
//!
//! ## Request/Response Format
//!
//! All requests and responses use JSON. Errors look like:
//!
//! ```json
//! {
//!     "message": "Human readable message",
//!     "code": "ERROR_CODE"
//! }
//! ```

pub mod routes;
pub mod handlers;

pub use routes::configure_routes;
