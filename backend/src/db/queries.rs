//! # Database Queries
//!
//! This module contains all the SQL queries for interacting with the database.
//! Each function performs a specific database operation.
//!
//! ## Query Organization
//!
//! Queries are grouped by the table they operate on:
//! - `*_user*` - Users table operations
//! - `*_rate*` - Rate table operations
//! - `*_request*` - Request table operations
//! - `settle_request` - The one multi-table write, run in a transaction
//!
//! ## Error Handling
//!
//! All queries return `Result<T, DatabaseError>`. Lookups that can miss
//! return `Option`; a unique-constraint failure comes back as
//! `DatabaseError::UniqueViolation`.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use rust_decimal::Decimal;
use tokio_postgres::Row;
use uuid::Uuid;
use tracing::{debug, info, warn};

use super::models::*;
use super::DatabaseError;

const SELECT_REQUESTS: &str = r#"
    SELECT
        r.id, r.user_id, u.email AS user_email,
        r.request_type, r.amount_in_gm, r.amount_in_bdt,
        r.status, r.created_at, r.settled_at
    FROM requests r
    JOIN users u ON u.id = r.user_id
"#;

// ============================================
// HELPER FUNCTIONS
// ============================================

/// Helper to convert a database row to UserRecord
fn row_to_user(row: &Row) -> Result<UserRecord, DatabaseError> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        reference_id: row.try_get("reference_id")?,
        nid: row.try_get("nid")?,
        my_vault: row.try_get("my_vault")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Helper to convert a database row to RateRecord
fn row_to_rate(row: &Row) -> Result<RateRecord, DatabaseError> {
    Ok(RateRecord {
        id: row.try_get("id")?,
        user_buy_rate: row.try_get("user_buy_rate")?,
        user_sell_rate: row.try_get("user_sell_rate")?,
        delivery_charge: row.try_get("delivery_charge")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Helper to convert a database row to RequestRecord
fn row_to_request(row: &Row) -> Result<RequestRecord, DatabaseError> {
    let request_type: String = row.try_get("request_type")?;
    let status: String = row.try_get("status")?;

    Ok(RequestRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        user_email: row.try_get("user_email")?,
        request_type: request_type.parse().map_err(DatabaseError::InvalidRow)?,
        amount_in_gm: row.try_get("amount_in_gm")?,
        amount_in_bdt: row.try_get("amount_in_bdt")?,
        status: status.parse().map_err(DatabaseError::InvalidRow)?,
        created_at: row.try_get("created_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

fn rows_to_requests(rows: &[Row]) -> Result<Vec<RequestRecord>, DatabaseError> {
    rows.iter().map(row_to_request).collect()
}

// ============================================
// USER QUERIES
// ============================================

/// Insert a new user.
///
/// A duplicate email fails with `UniqueViolation("users_email_unique")`.
pub async fn insert_user(
    pool: &Pool,
    user: &NewUser,
) -> Result<UserRecord, DatabaseError> {
    debug!("Inserting user: {}", user.email);

    let client = pool.get().await?;

    let record = UserRecord {
        id: Uuid::new_v4(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone_number: user.phone_number.clone(),
        reference_id: user.reference_id.clone(),
        nid: user.nid.clone(),
        my_vault: user.my_vault,
        created_at: Utc::now(),
    };

    client.execute(
        r#"
        INSERT INTO users (
            id, name, email, phone_number,
            reference_id, nid, my_vault, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
        &[
            &record.id,
            &record.name,
            &record.email,
            &record.phone_number,
            &record.reference_id,
            &record.nid,
            &record.my_vault,
            &record.created_at,
        ],
    ).await?;

    info!("User created: {} ({})", record.id, record.email);
    Ok(record)
}

/// Get a user by email.
pub async fn get_user_by_email(
    pool: &Pool,
    email: &str,
) -> Result<Option<UserRecord>, DatabaseError> {
    debug!("Fetching user by email: {}", email);

    let client = pool.get().await?;

    let row = client.query_opt(
        r#"
        SELECT
            id, name, email, phone_number,
            reference_id, nid, my_vault, created_at
        FROM users
        WHERE email = $1
        "#,
        &[&email],
    ).await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Get a user by id.
pub async fn get_user_by_id(
    pool: &Pool,
    id: Uuid,
) -> Result<Option<UserRecord>, DatabaseError> {
    let client = pool.get().await?;

    let row = client.query_opt(
        r#"
        SELECT
            id, name, email, phone_number,
            reference_id, nid, my_vault, created_at
        FROM users
        WHERE id = $1
        "#,
        &[&id],
    ).await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Get all users, newest first.
pub async fn get_all_users(pool: &Pool) -> Result<Vec<UserRecord>, DatabaseError> {
    let client = pool.get().await?;

    let rows = client.query(
        r#"
        SELECT
            id, name, email, phone_number,
            reference_id, nid, my_vault, created_at
        FROM users
        ORDER BY created_at DESC, id DESC
        "#,
        &[],
    ).await?;

    rows.iter().map(row_to_user).collect()
}

/// Sum of every vault plus the number of users.
pub async fn get_vault_totals(pool: &Pool) -> Result<VaultTotals, DatabaseError> {
    let client = pool.get().await?;

    let row = client.query_one(
        r#"
        SELECT
            COALESCE(SUM(my_vault), 0)::NUMERIC AS total_vault,
            COUNT(*) AS user_count
        FROM users
        "#,
        &[],
    ).await?;

    Ok(VaultTotals {
        total_vault: row.try_get("total_vault")?,
        user_count: row.try_get("user_count")?,
    })
}

// ============================================
// RATE QUERIES
// ============================================

/// Get the current rate document, if one exists.
pub async fn get_current_rate(pool: &Pool) -> Result<Option<RateRecord>, DatabaseError> {
    let client = pool.get().await?;

    let row = client.query_opt(
        r#"
        SELECT id, user_buy_rate, user_sell_rate, delivery_charge, updated_at
        FROM rates
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
        &[],
    ).await?;

    row.as_ref().map(row_to_rate).transpose()
}

/// Insert the rate document.
///
/// The `rates_singleton` constraint rejects a second row with
/// `UniqueViolation`.
pub async fn insert_rate(
    pool: &Pool,
    values: &RateValues,
) -> Result<RateRecord, DatabaseError> {
    let client = pool.get().await?;

    let row = client.query_one(
        r#"
        INSERT INTO rates (id, user_buy_rate, user_sell_rate, delivery_charge, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING id, user_buy_rate, user_sell_rate, delivery_charge, updated_at
        "#,
        &[
            &Uuid::new_v4(),
            &values.user_buy_rate,
            &values.user_sell_rate,
            &values.delivery_charge,
        ],
    ).await?;

    let rate = row_to_rate(&row)?;
    info!("Rate created: {}", rate.id);
    Ok(rate)
}

/// Replace the three rate values of the document with `id`.
///
/// Returns `None` when no document has that id.
pub async fn update_rate(
    pool: &Pool,
    id: Uuid,
    values: &RateValues,
) -> Result<Option<RateRecord>, DatabaseError> {
    debug!("Updating rate {}", id);

    let client = pool.get().await?;

    let row = client.query_opt(
        r#"
        UPDATE rates
        SET
            user_buy_rate = $2,
            user_sell_rate = $3,
            delivery_charge = $4,
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, user_buy_rate, user_sell_rate, delivery_charge, updated_at
        "#,
        &[
            &id,
            &values.user_buy_rate,
            &values.user_sell_rate,
            &values.delivery_charge,
        ],
    ).await?;

    row.as_ref().map(row_to_rate).transpose()
}

// ============================================
// REQUEST QUERIES
// ============================================

/// Record a new pending request.
///
/// The caller is expected to have checked that the user exists.
pub async fn insert_request(
    pool: &Pool,
    request: &NewRequest,
) -> Result<RequestRecord, DatabaseError> {
    debug!(
        "Creating {} request for user {}",
        request.request_type, request.user_id
    );

    let client = pool.get().await?;

    let id = Uuid::new_v4();
    let created_at: DateTime<Utc> = Utc::now();

    client.execute(
        r#"
        INSERT INTO requests (
            id, user_id, request_type, amount_in_gm,
            amount_in_bdt, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        &[
            &id,
            &request.user_id,
            &request.request_type.as_str(),
            &request.amount_in_gm,
            &request.amount_in_bdt,
            &RequestStatus::Pending.as_str(),
            &created_at,
        ],
    ).await?;

    let row = client.query_one(&format!("{} WHERE r.id = $1", SELECT_REQUESTS), &[&id]).await?;

    info!("Request created: {}", id);
    row_to_request(&row)
}

/// Get a request by id.
pub async fn get_request(
    pool: &Pool,
    id: Uuid,
) -> Result<Option<RequestRecord>, DatabaseError> {
    let client = pool.get().await?;

    let row = client.query_opt(&format!("{} WHERE r.id = $1", SELECT_REQUESTS), &[&id]).await?;

    row.as_ref().map(row_to_request).transpose()
}

/// Get all requests, newest first.
pub async fn get_all_requests(pool: &Pool) -> Result<Vec<RequestRecord>, DatabaseError> {
    let client = pool.get().await?;

    let rows = client.query(
        &format!("{} ORDER BY r.created_at DESC, r.id DESC", SELECT_REQUESTS),
        &[],
    ).await?;

    rows_to_requests(&rows)
}

/// Get the requests of the user with `email`, newest first.
pub async fn get_requests_by_email(
    pool: &Pool,
    email: &str,
) -> Result<Vec<RequestRecord>, DatabaseError> {
    debug!("Fetching requests for: {}", email);

    let client = pool.get().await?;

    let rows = client.query(
        &format!("{} WHERE u.email = $1 ORDER BY r.created_at DESC, r.id DESC", SELECT_REQUESTS),
        &[&email],
    ).await?;

    rows_to_requests(&rows)
}

// ============================================
// SETTLEMENT
// ============================================

/// Settle a pending request in one transaction.
///
/// Both the request row and (for approvals) the user row are locked with
/// `FOR UPDATE`, so a concurrent settlement of the same request waits and
/// then observes the new status. The final status update is conditional on
/// `status = 'pending'`. Any outcome other than `Settled` rolls back.
pub async fn settle_request(
    pool: &Pool,
    request_id: Uuid,
    decision: Decision,
) -> Result<SettlementOutcome, DatabaseError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx.query_opt(
        r#"
        SELECT user_id, request_type, amount_in_gm, status
        FROM requests
        WHERE id = $1
        FOR UPDATE
        "#,
        &[&request_id],
    ).await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(SettlementOutcome::RequestNotFound);
    };

    let user_id: Uuid = row.try_get("user_id")?;
    let request_type: RequestType = row
        .try_get::<_, String>("request_type")?
        .parse()
        .map_err(DatabaseError::InvalidRow)?;
    let quantity: Decimal = row.try_get("amount_in_gm")?;
    let status: RequestStatus = row
        .try_get::<_, String>("status")?
        .parse()
        .map_err(DatabaseError::InvalidRow)?;

    if status.is_settled() {
        tx.rollback().await?;
        return Ok(SettlementOutcome::AlreadySettled(status));
    }

    let mut vault_after = None;

    if decision == Decision::Approve {
        let user_row = tx.query_opt(
            "SELECT my_vault FROM users WHERE id = $1 FOR UPDATE",
            &[&user_id],
        ).await?;

        let Some(user_row) = user_row else {
            tx.rollback().await?;
            return Ok(SettlementOutcome::UserNotFound);
        };

        let available: Decimal = user_row.try_get("my_vault")?;
        let next = match request_type.apply_to(available, quantity) {
            Ok(next) => next,
            Err(refusal) => {
                tx.rollback().await?;
                return Ok(SettlementOutcome::refused(refusal, available, quantity));
            }
        };

        tx.execute(
            "UPDATE users SET my_vault = $2 WHERE id = $1",
            &[&user_id, &next],
        ).await?;

        vault_after = Some(next);
    }

    let updated = tx.execute(
        r#"
        UPDATE requests
        SET status = $2, settled_at = NOW()
        WHERE id = $1 AND status = 'pending'
        "#,
        &[&request_id, &decision.target_status().as_str()],
    ).await?;

    if updated == 0 {
        // Unreachable while the row lock is held; kept as the CAS guard.
        warn!("Request {} left pending concurrently, rolling back", request_id);
        tx.rollback().await?;
        return Ok(SettlementOutcome::AlreadySettled(status));
    }

    let settled = tx.query_one(&format!("{} WHERE r.id = $1", SELECT_REQUESTS), &[&request_id]).await?;
    let request = row_to_request(&settled)?;

    tx.commit().await?;

    Ok(SettlementOutcome::Settled { request, vault_after })
}
