//! In-memory `GoldStore`.
//!
//! Backs the test suite and `STORE_BACKEND=memory`. All state sits behind one
//! `RwLock`; every write, including settlement, runs under the write guard, which
//! gives the same all-or-nothing behaviour as the Postgres transaction.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::store::GoldStore;
use super::DatabaseError;

#[derive(Default)]
struct MemoryState {
    /// Insertion order; newest last.
    users: Vec<UserRecord>,
    rate: Option<RateRecord>,
    /// Insertion order; newest last.
    requests: Vec<RequestRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::ConnectionError("store is closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GoldStore for MemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        info!("In-memory store closed");
    }

    async fn insert_user(&self, user: &NewUser) -> Result<UserRecord, DatabaseError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        if state.users.iter().any(|u| u.email == user.email) {
            return Err(DatabaseError::UniqueViolation("users_email_unique".to_string()));
        }

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
        state.users.push(record.clone());

        debug!("User created: {} ({})", record.id, record.email);
        Ok(record)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.users.iter().rev().cloned().collect())
    }

    async fn vault_totals(&self) -> Result<VaultTotals, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(VaultTotals {
            total_vault: state.users.iter().map(|u| u.my_vault).sum(),
            user_count: state.users.len() as i64,
        })
    }

    async fn current_rate(&self) -> Result<Option<RateRecord>, DatabaseError> {
        self.ensure_open()?;
        Ok(self.state.read().await.rate.clone())
    }

    async fn insert_rate(&self, values: &RateValues) -> Result<RateRecord, DatabaseError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        if state.rate.is_some() {
            return Err(DatabaseError::UniqueViolation("rates_singleton".to_string()));
        }

        let rate = RateRecord {
            id: Uuid::new_v4(),
            user_buy_rate: values.user_buy_rate,
            user_sell_rate: values.user_sell_rate,
            delivery_charge: values.delivery_charge,
            updated_at: Utc::now(),
        };
        state.rate = Some(rate.clone());
        Ok(rate)
    }

    async fn update_rate(&self, id: Uuid, values: &RateValues) -> Result<Option<RateRecord>, DatabaseError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        match state.rate.as_mut() {
            Some(rate) if rate.id == id => {
                rate.user_buy_rate = values.user_buy_rate;
                rate.user_sell_rate = values.user_sell_rate;
                rate.delivery_charge = values.delivery_charge;
                rate.updated_at = Utc::now();
                Ok(Some(rate.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_request(&self, request: &NewRequest) -> Result<RequestRecord, DatabaseError> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        // Mirrors the foreign key on requests.user_id.
        let user_email = state
            .users
            .iter()
            .find(|u| u.id == request.user_id)
            .map(|u| u.email.clone())
            .ok_or_else(|| DatabaseError::InvalidRow(format!("unknown user {}", request.user_id)))?;

        let record = RequestRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            user_email,
            request_type: request.request_type,
            amount_in_gm: request.amount_in_gm,
            amount_in_bdt: request.amount_in_bdt,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        };
        state.requests.push(record.clone());
        Ok(record)
    }

    async fn find_request(&self, id: Uuid) -> Result<Option<RequestRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state.requests.iter().rev().cloned().collect())
    }

    async fn list_requests_by_email(&self, email: &str) -> Result<Vec<RequestRecord>, DatabaseError> {
        self.ensure_open()?;
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .rev()
            .filter(|r| r.user_email == email)
            .cloned()
            .collect())
    }

    async fn settle_request(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> Result<SettlementOutcome, DatabaseError> {
        self.ensure_open()?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(request_idx) = state.requests.iter().position(|r| r.id == request_id) else {
            return Ok(SettlementOutcome::RequestNotFound);
        };

        let (user_id, request_type, quantity, status) = {
            let r = &state.requests[request_idx];
            (r.user_id, r.request_type, r.amount_in_gm, r.status)
        };

        if status.is_settled() {
            return Ok(SettlementOutcome::AlreadySettled(status));
        }

        let mut vault_after = None;

        if decision == Decision::Approve {
            let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) else {
                return Ok(SettlementOutcome::UserNotFound);
            };

            let next = match request_type.apply_to(user.my_vault, quantity) {
                Ok(next) => next,
                Err(refusal) => {
                    return Ok(SettlementOutcome::refused(refusal, user.my_vault, quantity));
                }
            };

            user.my_vault = next;
            vault_after = Some(next);
        }

        let request = &mut state.requests[request_idx];
        request.status = decision.target_status();
        request.settled_at = Some(Utc::now());

        Ok(SettlementOutcome::Settled {
            request: request.clone(),
            vault_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            phone_number: None,
            reference_id: None,
            nid: None,
            my_vault: dec!(10),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = MemoryStore::new();
        store.insert_user(&new_user("a@example.com")).await.unwrap();

        let err = store.insert_user(&new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(c) if c == "users_email_unique"));
    }

    #[tokio::test]
    async fn lists_are_newest_first() {
        let store = MemoryStore::new();
        let first = store.insert_user(&new_user("first@example.com")).await.unwrap();
        let second = store.insert_user(&new_user("second@example.com")).await.unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users[0].id, second.id);
        assert_eq!(users[1].id, first.id);
    }

    #[tokio::test]
    async fn request_for_unknown_user_is_refused() {
        let store = MemoryStore::new();
        let result = store
            .insert_request(&NewRequest {
                user_id: Uuid::new_v4(),
                request_type: RequestType::Buy,
                amount_in_gm: dec!(1),
                amount_in_bdt: dec!(100),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn second_rate_document_is_refused() {
        let store = MemoryStore::new();
        let values = RateValues {
            user_buy_rate: dec!(100),
            user_sell_rate: dec!(98),
            delivery_charge: dec!(2),
        };
        store.insert_rate(&values).await.unwrap();
        assert!(matches!(
            store.insert_rate(&values).await,
            Err(DatabaseError::UniqueViolation(_))
        ));
    }

    #[tokio::test]
    async fn insufficient_vault_leaves_everything_untouched() {
        let store = MemoryStore::new();
        let user = store.insert_user(&new_user("seller@example.com")).await.unwrap();
        let request = store
            .insert_request(&NewRequest {
                user_id: user.id,
                request_type: RequestType::Sell,
                amount_in_gm: dec!(11),
                amount_in_bdt: dec!(1000),
            })
            .await
            .unwrap();

        let outcome = store.settle_request(request.id, Decision::Approve).await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::InsufficientVault {
                available: dec!(10),
                requested: dec!(11),
            }
        );

        let request = store.find_request(request.id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.settled_at.is_none());
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.my_vault, dec!(10));
    }

    #[tokio::test]
    async fn buy_past_the_vault_limit_stays_pending() {
        let store = MemoryStore::new();
        let near_limit = AMOUNT_LIMIT - dec!(1);
        let user = store
            .insert_user(&NewUser { my_vault: near_limit, ..new_user("whale@example.com") })
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

        let outcome = store.settle_request(request.id, Decision::Approve).await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::VaultLimitExceeded {
                available: near_limit,
                requested: dec!(5),
            }
        );

        let request = store.find_request(request.id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        let user = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.my_vault, near_limit);
    }

    #[tokio::test]
    async fn closed_store_refuses_work() {
        let store = MemoryStore::new();
        store.close().await;
        assert!(store.ping().await.is_err());
        assert!(store.list_users().await.is_err());
    }
}
