//! # Store Seam
//!
//! `GoldStore` is the one handle every service receives at construction.
//! `main` opens it at startup and closes it after the HTTP server stops.
//!
//! Implementations must uphold two guarantees:
//!
//! 1. `insert_user` rejects a duplicate email even when two inserts race.
//! 2. `settle_request` applies the status change and the vault delta as one
//!    unit, and only while the request is still pending.

use async_trait::async_trait;
use uuid::Uuid;

use super::models::*;
use super::queries;
use super::{Database, DatabaseError};

/// Persistence for users, the rate document and requests.
#[async_trait]
pub trait GoldStore: Send + Sync {
    /// Cheap liveness check used by `/health`.
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Release underlying resources.
    async fn close(&self);

    // Users

    /// Insert a user. A taken email is `DatabaseError::UniqueViolation`.
    async fn insert_user(&self, user: &NewUser) -> Result<UserRecord, DatabaseError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError>;
    /// All users, newest first.
    async fn list_users(&self) -> Result<Vec<UserRecord>, DatabaseError>;
    async fn vault_totals(&self) -> Result<VaultTotals, DatabaseError>;

    // Rate

    async fn current_rate(&self) -> Result<Option<RateRecord>, DatabaseError>;
    /// Insert the rate document. A second one is `DatabaseError::UniqueViolation`.
    async fn insert_rate(&self, values: &RateValues) -> Result<RateRecord, DatabaseError>;
    async fn update_rate(&self, id: Uuid, values: &RateValues) -> Result<Option<RateRecord>, DatabaseError>;

    // Requests

    async fn insert_request(&self, request: &NewRequest) -> Result<RequestRecord, DatabaseError>;
    async fn find_request(&self, id: Uuid) -> Result<Option<RequestRecord>, DatabaseError>;
    /// All requests, newest first.
    async fn list_requests(&self) -> Result<Vec<RequestRecord>, DatabaseError>;
    /// Requests owned by the user with `email`, newest first.
    async fn list_requests_by_email(&self, email: &str) -> Result<Vec<RequestRecord>, DatabaseError>;

    /// Atomically settle a pending request.
    async fn settle_request(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<SettlementOutcome, DatabaseError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GoldStore for PgStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.db.ping().await
    }

    async fn close(&self) {
        self.db.close();
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserRecord, DatabaseError> {
        queries::insert_user(self.db.pool(), user).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        queries::get_user_by_id(self.db.pool(), id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        queries::get_user_by_email(self.db.pool(), email).await
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        queries::get_all_users(self.db.pool()).await
    }

    async fn vault_totals(&self) -> Result<VaultTotals, DatabaseError> {
        queries::get_vault_totals(self.db.pool()).await
    }

    async fn current_rate(&self) -> Result<Option<RateRecord>, DatabaseError> {
        queries::get_current_rate(self.db.pool()).await
    }

    async fn insert_rate(&self, values: &RateValues) -> Result<RateRecord, DatabaseError> {
        queries::insert_rate(self.db.pool(), values).await
    }

    async fn update_rate(&self, id: Uuid, values: &RateValues) -> Result<Option<RateRecord>, DatabaseError> {
        queries::update_rate(self.db.pool(), id, values).await
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<RequestRecord, DatabaseError> {
        queries::insert_request(self.db.pool(), request).await
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<RequestRecord>, DatabaseError> {
        queries::get_request(self.db.pool(), id).await
    }

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, DatabaseError> {
        queries::get_all_requests(self.db.pool()).await
    }

    async fn list_requests_by_email(&self, email: &str) -> Result<Vec<RequestRecord>, DatabaseError> {
        queries::get_requests_by_email(self.db.pool(), email).await
    }

    async fn settle_request(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<SettlementOutcome, DatabaseError> {
        queries::settle_request(self.db.pool(), request_id, decision).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Runs against a live database:
    /// `DATABASE_URL=postgres://... cargo test -- --ignored`
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL pointing at a disposable PostgreSQL database"]
    async fn concurrent_approvals_settle_once_in_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = Database::connect(&url, 4).await.unwrap();
        db.run_migrations().await.unwrap();
        let store = std::sync::Arc::new(PgStore::new(db));

        let user = store
            .insert_user(&NewUser {
                name: "Concurrent".to_string(),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone_number: None,
                reference_id: None,
                nid: None,
                my_vault: dec!(10),
            })
            .await
            .unwrap();

        let request = store
            .insert_request(&NewRequest {
                user_id: user.id,
                request_type: RequestType::Buy,
                amount_in_gm: dec!(5),
                amount_in_bdt: dec!(500),
            })
            .await
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.settle_request(request.id, Decision::Approve).await })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            if let SettlementOutcome::Settled { .. } = handle.await.unwrap().unwrap() {
                settled += 1;
            }
        }

        assert_eq!(settled, 1);
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.my_vault, dec!(15));

        let duplicate = store
            .insert_user(&NewUser {
                name: "Again".to_string(),
                email: user.email.clone(),
                phone_number: None,
                reference_id: None,
                nid: None,
                my_vault: dec!(0),
            })
            .await;
        assert!(matches!(duplicate, Err(DatabaseError::UniqueViolation(_))));

        store.close().await;
    }

    /// Every refused settlement rolls back: the vault and the request are
    /// exactly as they were, and the request can still be decided.
    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at a disposable PostgreSQL database"]
    async fn refused_settlements_leave_request_pending_in_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = Database::connect(&url, 2).await.unwrap();
        db.run_migrations().await.unwrap();
        let store = PgStore::new(db);

        let near_limit = AMOUNT_LIMIT - dec!(1);
        let user = store
            .insert_user(&NewUser {
                name: "Whale".to_string(),
                email: format!("{}@example.com", Uuid::new_v4()),
                phone_number: None,
                reference_id: None,
                nid: None,
                my_vault: near_limit,
            })
            .await
            .unwrap();

        let buy = store
            .insert_request(&NewRequest {
                user_id: user.id,
                request_type: RequestType::Buy,
                amount_in_gm: dec!(5),
                amount_in_bdt: dec!(500),
            })
            .await
            .unwrap();
        let sell = store
            .insert_request(&NewRequest {
                user_id: user.id,
                request_type: RequestType::Sell,
                amount_in_gm: near_limit,
                amount_in_bdt: dec!(1),
            })
            .await
            .unwrap();

        assert_eq!(
            store.settle_request(buy.id, Decision::Approve).await.unwrap(),
            SettlementOutcome::VaultLimitExceeded { available: near_limit, requested: dec!(5) }
        );
        let buy = store.find_request(buy.id).await.unwrap().unwrap();
        assert_eq!(buy.status, RequestStatus::Pending);
        assert!(buy.settled_at.is_none());
        assert_eq!(store.find_user(user.id).await.unwrap().unwrap().my_vault, near_limit);

        // The rolled-back request is still open for a decision.
        let rejected = store.settle_request(buy.id, Decision::Reject).await.unwrap();
        assert!(matches!(
            rejected,
            SettlementOutcome::Settled { ref request, vault_after: None }
                if request.status == RequestStatus::Rejected
        ));

        // Sell the whole vault, then the same quantity again.
        assert!(matches!(
            store.settle_request(sell.id, Decision::Approve).await.unwrap(),
            SettlementOutcome::Settled { vault_after: Some(v), .. } if v == dec!(0)
        ));
        let second_sell = store
            .insert_request(&NewRequest {
                user_id: user.id,
                request_type: RequestType::Sell,
                amount_in_gm: dec!(1),
                amount_in_bdt: dec!(1),
            })
            .await
            .unwrap();
        assert!(matches!(
            store.settle_request(second_sell.id, Decision::Approve).await.unwrap(),
            SettlementOutcome::InsufficientVault { .. }
        ));
        let second_sell = store.find_request(second_sell.id).await.unwrap().unwrap();
        assert_eq!(second_sell.status, RequestStatus::Pending);

        store.close().await;
    }
}
