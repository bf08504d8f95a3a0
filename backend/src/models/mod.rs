//! # HTTP Documents
//!
//! JSON bodies accepted and returned by the marketplace endpoints. The
//! store records in `crate::db` never reach the wire directly; each has a
//! document type here with its own `From` conversion.
//!
//! ## Shapes
//!
//! ```text
//! request bodies (requests.rs)          documents (responses.rs)
//! ───────────────────────────           ─────────────────────────
//! AddUserRequest    POST /addUser  ──▶  RegisterUserResponse
//! CreateTradeRequest POST /buy     ──▶  CreateTradeResponse
//! ApprovalRequest   PUT /request   ──▶  ApprovalResponse
//! RateRequest       /buy-sell-rate ──▶  RateResponse
//! EmailQuery        ?email=        ──▶  UserResponse, TradeRequestResponse
//! ```
//!
//! Ids go out as `_id`, every other field is camelCase (`myVault`,
//! `amountInGm`, `userBuyRate`). Decimal amounts serialize as JSON numbers.
//! Every request field is optional at the serde level, so a missing field
//! becomes a 400 naming it rather than a generic parse failure.

pub mod requests;
pub mod responses;

pub use requests::*;
pub use responses::*;
