//! # Vault Ledger Service
//!
//! The VaultLedger owns every change to a user's gold vault. Requests are
//! submitted as pending, and an administrator's decision settles them.
//!
//! ## Flow: Approval
//!
//! ```text
//! 1. Admin calls PUT /request/{id} with a status
//!                ↓
//! 2. VaultLedger.apply_approval() validates the command
//!                ↓
//! 3. Optional caller-supplied details are checked against the stored request
//!                ↓
//! 4. GoldStore.settle_request() runs in one transaction:
//!      lock request → must be pending
//!      lock user    → apply Buy/Sell delta, refuse underflow
//!      status → Approved/Rejected (only if still pending)
//!                ↓
//! 5. The outcome is mapped to a MarketError or a Settlement
//! ```
//!
//! A second approval of the same request, sequential or concurrent, finds the
//! request settled and returns `AlreadySettled`; the delta is never applied
//! twice.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{
    Decision, GoldStore, NewRequest, RequestRecord, RequestType, SettlementOutcome,
};
use crate::utils::{format_grams, format_timestamp};

use super::{ensure_bdt, ensure_grams, ensure_non_negative, ensure_positive, MarketError};

/// A new buy or sell request from a user.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user_id: Uuid,
    pub request_type: RequestType,
    pub amount_in_gm: Decimal,
    pub amount_in_bdt: Decimal,
}

/// An administrator's decision on a request.
///
/// `request_type`, `quantity` and `user_id` are optional echoes of the
/// request being decided. When present they must match what is stored.
#[derive(Debug, Clone)]
pub struct ApprovalCommand {
    pub request_id: Uuid,
    pub decision: Decision,
    pub request_type: Option<RequestType>,
    pub quantity: Option<Decimal>,
    pub user_id: Option<Uuid>,
}

/// A successfully settled request.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub request: RequestRecord,

    /// Vault balance after the delta. `None` for rejections.
    pub vault_after: Option<Decimal>,
}

#[derive(Clone)]
pub struct VaultLedger {
    store: Arc<dyn GoldStore>,
}

impl VaultLedger {
    pub fn new(store: Arc<dyn GoldStore>) -> Self {
        Self { store }
    }

    /// Record a pending request for an existing user.
    pub async fn submit_request(&self, request: SubmitRequest) -> Result<RequestRecord, MarketError> {
        ensure_positive("amountInGm", request.amount_in_gm)?;
        ensure_grams("amountInGm", request.amount_in_gm)?;
        ensure_non_negative("amountInBdt", request.amount_in_bdt)?;
        ensure_bdt("amountInBdt", request.amount_in_bdt)?;

        if self.store.find_user(request.user_id).await?.is_none() {
            return Err(MarketError::UserNotFound(request.user_id.to_string()));
        }

        let record = self
            .store
            .insert_request(&NewRequest {
                user_id: request.user_id,
                request_type: request.request_type,
                amount_in_gm: request.amount_in_gm,
                amount_in_bdt: request.amount_in_bdt,
            })
            .await?;

        info!(
            "{} request {} submitted by {} for {}",
            record.request_type,
            record.id,
            record.user_email,
            format_grams(record.amount_in_gm)
        );

        Ok(record)
    }

    /// Settle a pending request.
    ///
    /// ## Returns
    ///
    /// * `Ok(Settlement)` - Request approved or rejected; vault updated on approval
    /// * `Err(MarketError::RequestNotFound)` - No such request
    /// * `Err(MarketError::AlreadySettled)` - Request is no longer pending
    /// * `Err(MarketError::UserNotFound)` - Owning user is gone
    /// * `Err(MarketError::InsufficientVault)` - Sell larger than the vault
    /// * `Err(MarketError::VaultLimitExceeded)` - Buy past the storable vault maximum
    /// * `Err(MarketError::Validation)` - Echoed details disagree with the request
    pub async fn apply_approval(&self, command: ApprovalCommand) -> Result<Settlement, MarketError> {
        if let Some(quantity) = command.quantity {
            ensure_positive("amountInGm", quantity)?;
            ensure_grams("amountInGm", quantity)?;
        }

        if command.request_type.is_some() || command.quantity.is_some() || command.user_id.is_some() {
            self.check_echoed_details(&command).await?;
        }

        let outcome = self
            .store
            .settle_request(command.request_id, command.decision)
            .await?;

        match outcome {
            SettlementOutcome::Settled { request, vault_after } => {
                match vault_after {
                    Some(balance) => info!(
                        "Request {} {} at {}: {} {} for {}, vault now {}",
                        request.id,
                        request.status,
                        request.settled_at.map(format_timestamp).unwrap_or_default(),
                        request.request_type,
                        format_grams(request.amount_in_gm),
                        request.user_email,
                        format_grams(balance)
                    ),
                    None => info!(
                        "Request {} {} for {}, vault unchanged",
                        request.id, request.status, request.user_email
                    ),
                }
                Ok(Settlement { request, vault_after })
            }
            SettlementOutcome::RequestNotFound => {
                Err(MarketError::RequestNotFound(command.request_id))
            }
            SettlementOutcome::UserNotFound => Err(MarketError::UserNotFound(
                command
                    .user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| format!("owner of request {}", command.request_id)),
            )),
            SettlementOutcome::AlreadySettled(status) => {
                warn!("Request {} already {}, nothing applied", command.request_id, status);
                Err(MarketError::AlreadySettled {
                    id: command.request_id,
                    status,
                })
            }
            SettlementOutcome::InsufficientVault { available, requested } => {
                warn!(
                    "Sell request {} refused: vault {} < {}",
                    command.request_id,
                    format_grams(available),
                    format_grams(requested)
                );
                Err(MarketError::InsufficientVault { available, requested })
            }
            SettlementOutcome::VaultLimitExceeded { available, requested } => {
                warn!(
                    "Buy request {} refused: vault {} + {} exceeds the storable maximum",
                    command.request_id,
                    format_grams(available),
                    format_grams(requested)
                );
                Err(MarketError::VaultLimitExceeded { available, requested })
            }
        }
    }

    /// Compare caller-supplied details with the stored request.
    ///
    /// Stored requests never change type, quantity or owner, so checking
    /// outside the settlement transaction is safe.
    async fn check_echoed_details(&self, command: &ApprovalCommand) -> Result<(), MarketError> {
        let stored = self
            .store
            .find_request(command.request_id)
            .await?
            .ok_or(MarketError::RequestNotFound(command.request_id))?;

        debug!("Checking approval details for request {}", stored.id);

        if let Some(request_type) = command.request_type {
            if request_type != stored.request_type {
                return Err(MarketError::Validation(format!(
                    "requestType {} does not match request ({})",
                    request_type, stored.request_type
                )));
            }
        }
        if let Some(quantity) = command.quantity {
            if quantity != stored.amount_in_gm {
                return Err(MarketError::Validation(format!(
                    "amountInGm {} does not match request ({})",
                    quantity, stored.amount_in_gm
                )));
            }
        }
        if let Some(user_id) = command.user_id {
            if user_id != stored.user_id {
                return Err(MarketError::Validation(format!(
                    "userId {} does not own request {}",
                    user_id, stored.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, NewUser, RequestStatus};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    async fn setup(vault: Decimal) -> (Arc<MemoryStore>, VaultLedger, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user(&NewUser {
                name: "U".to_string(),
                email: "u@example.com".to_string(),
                phone_number: None,
                reference_id: None,
                nid: None,
                my_vault: vault,
            })
            .await
            .unwrap();
        let ledger = VaultLedger::new(store.clone());
        (store, ledger, user.id)
    }

    async fn submit(ledger: &VaultLedger, user_id: Uuid, request_type: RequestType, grams: Decimal) -> Uuid {
        ledger
            .submit_request(SubmitRequest {
                user_id,
                request_type,
                amount_in_gm: grams,
                amount_in_bdt: grams * dec!(100),
            })
            .await
            .unwrap()
            .id
    }

    fn approve(request_id: Uuid) -> ApprovalCommand {
        ApprovalCommand {
            request_id,
            decision: Decision::Approve,
            request_type: None,
            quantity: None,
            user_id: None,
        }
    }

    async fn vault_of(store: &MemoryStore, user_id: Uuid) -> Decimal {
        store.find_user(user_id).await.unwrap().unwrap().my_vault
    }

    #[tokio::test]
    async fn buy_then_oversized_sell() {
        let (store, ledger, user_id) = setup(dec!(10)).await;

        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(5)).await;
        let settlement = ledger.apply_approval(approve(buy)).await.unwrap();
        assert_eq!(settlement.vault_after, Some(dec!(15)));
        assert_eq!(settlement.request.status, RequestStatus::Approved);
        assert_eq!(vault_of(&store, user_id).await, dec!(15));

        let sell = submit(&ledger, user_id, RequestType::Sell, dec!(20)).await;
        let err = ledger.apply_approval(approve(sell)).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientVault { available, requested }
                if available == dec!(15) && requested == dec!(20)
        ));
        assert_eq!(vault_of(&store, user_id).await, dec!(15));

        let still_pending = store.find_request(sell).await.unwrap().unwrap();
        assert_eq!(still_pending.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn second_approval_is_already_settled() {
        let (store, ledger, user_id) = setup(dec!(10)).await;
        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(5)).await;

        ledger.apply_approval(approve(buy)).await.unwrap();
        let err = ledger.apply_approval(approve(buy)).await.unwrap_err();

        assert!(matches!(
            err,
            MarketError::AlreadySettled { status: RequestStatus::Approved, .. }
        ));
        assert_eq!(vault_of(&store, user_id).await, dec!(15));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_apply_once() {
        let (store, ledger, user_id) = setup(dec!(10)).await;
        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(5)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.apply_approval(approve(buy)).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let settled = results
            .iter()
            .filter(|r| matches!(r, Ok(Ok(_))))
            .count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Ok(Err(MarketError::AlreadySettled { .. }))))
            .count();

        assert_eq!(settled, 1);
        assert_eq!(already, 15);
        assert_eq!(vault_of(&store, user_id).await, dec!(15));
    }

    #[tokio::test]
    async fn rejection_never_touches_the_vault() {
        let (store, ledger, user_id) = setup(dec!(10)).await;
        let sell = submit(&ledger, user_id, RequestType::Sell, dec!(50)).await;

        let settlement = ledger
            .apply_approval(ApprovalCommand {
                decision: Decision::Reject,
                ..approve(sell)
            })
            .await
            .unwrap();

        assert_eq!(settlement.request.status, RequestStatus::Rejected);
        assert_eq!(settlement.vault_after, None);
        assert_eq!(vault_of(&store, user_id).await, dec!(10));

        // A rejected request cannot be approved afterwards.
        let err = ledger.apply_approval(approve(sell)).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::AlreadySettled { status: RequestStatus::Rejected, .. }
        ));
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let (_store, ledger, _user_id) = setup(dec!(10)).await;
        let missing = Uuid::new_v4();

        let err = ledger.apply_approval(approve(missing)).await.unwrap_err();
        assert!(matches!(err, MarketError::RequestNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn mismatched_details_are_rejected_before_settling() {
        let (store, ledger, user_id) = setup(dec!(10)).await;
        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(5)).await;

        let wrong_type = ApprovalCommand {
            request_type: Some(RequestType::Sell),
            ..approve(buy)
        };
        assert!(matches!(
            ledger.apply_approval(wrong_type).await,
            Err(MarketError::Validation(_))
        ));

        let wrong_quantity = ApprovalCommand {
            quantity: Some(dec!(500)),
            ..approve(buy)
        };
        assert!(matches!(
            ledger.apply_approval(wrong_quantity).await,
            Err(MarketError::Validation(_))
        ));

        let wrong_user = ApprovalCommand {
            user_id: Some(Uuid::new_v4()),
            ..approve(buy)
        };
        assert!(matches!(
            ledger.apply_approval(wrong_user).await,
            Err(MarketError::Validation(_))
        ));

        let non_positive = ApprovalCommand {
            quantity: Some(dec!(0)),
            ..approve(buy)
        };
        assert!(matches!(
            ledger.apply_approval(non_positive).await,
            Err(MarketError::Validation(_))
        ));

        assert_eq!(vault_of(&store, user_id).await, dec!(10));

        let matching = ApprovalCommand {
            request_type: Some(RequestType::Buy),
            quantity: Some(dec!(5)),
            user_id: Some(user_id),
            ..approve(buy)
        };
        assert!(ledger.apply_approval(matching).await.is_ok());
        assert_eq!(vault_of(&store, user_id).await, dec!(15));
    }

    #[tokio::test]
    async fn submit_validates_amounts_and_owner() {
        let (_store, ledger, user_id) = setup(dec!(0)).await;

        let zero = ledger
            .submit_request(SubmitRequest {
                user_id,
                request_type: RequestType::Buy,
                amount_in_gm: dec!(0),
                amount_in_bdt: dec!(0),
            })
            .await;
        assert!(matches!(zero, Err(MarketError::Validation(_))));

        let negative_price = ledger
            .submit_request(SubmitRequest {
                user_id,
                request_type: RequestType::Buy,
                amount_in_gm: dec!(1),
                amount_in_bdt: dec!(-1),
            })
            .await;
        assert!(matches!(negative_price, Err(MarketError::Validation(_))));

        let stranger = ledger
            .submit_request(SubmitRequest {
                user_id: Uuid::new_v4(),
                request_type: RequestType::Buy,
                amount_in_gm: dec!(1),
                amount_in_bdt: dec!(100),
            })
            .await;
        assert!(matches!(stranger, Err(MarketError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn amounts_the_store_would_round_are_refused() {
        let (store, ledger, user_id) = setup(dec!(10)).await;

        let cases = [
            (dec!(1.2345678), dec!(100), "amountInGm allows at most 6 decimal places"),
            (dec!(0.0000001), dec!(100), "amountInGm allows at most 6 decimal places"),
            (dec!(1), dec!(1.005), "amountInBdt allows at most 2 decimal places"),
            (dec!(100000000000000), dec!(100), "amountInGm must be less than 100000000000000"),
        ];
        for (grams, taka, message) in cases {
            let result = ledger
                .submit_request(SubmitRequest {
                    user_id,
                    request_type: RequestType::Buy,
                    amount_in_gm: grams,
                    amount_in_bdt: taka,
                })
                .await;
            assert!(matches!(result, Err(MarketError::Validation(m)) if m == message));
        }
        assert!(store.list_requests().await.unwrap().is_empty());

        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(1.234568)).await;
        let over_precise_echo = ApprovalCommand {
            quantity: Some(dec!(1.2345678)),
            ..approve(buy)
        };
        assert!(matches!(
            ledger.apply_approval(over_precise_echo).await,
            Err(MarketError::Validation(m)) if m.contains("decimal places")
        ));
        assert_eq!(vault_of(&store, user_id).await, dec!(10));
    }

    #[tokio::test]
    async fn buy_past_the_vault_limit_is_its_own_error() {
        let near_limit = crate::db::AMOUNT_LIMIT - dec!(1);
        let (store, ledger, user_id) = setup(near_limit).await;
        let buy = submit(&ledger, user_id, RequestType::Buy, dec!(5)).await;

        let err = ledger.apply_approval(approve(buy)).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::VaultLimitExceeded { available, requested }
                if available == near_limit && requested == dec!(5)
        ));
        assert_eq!(vault_of(&store, user_id).await, near_limit);

        let request = store.find_request(buy).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }

    fn arb_grams() -> impl Strategy<Value = Decimal> {
        (1i64..=50_000i64).prop_map(|milligrams| Decimal::new(milligrams, 3))
    }

    fn arb_step() -> impl Strategy<Value = (bool, Decimal, bool, u8)> {
        // (is_buy, grams, approve, extra approval attempts)
        (any::<bool>(), arb_grams(), any::<bool>(), 0u8..3)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Net approved grams always equal the change in the vault, no matter
        /// how many times each request is retried.
        #[test]
        fn vault_delta_matches_approved_requests(
            initial in arb_grams(),
            steps in prop::collection::vec(arb_step(), 1..20),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (expected, actual, vault) = runtime.block_on(async {
                let (store, ledger, user_id) = setup(initial).await;
                let mut expected = Decimal::ZERO;

                for (is_buy, grams, approve_it, retries) in &steps {
                    let request_type = if *is_buy { RequestType::Buy } else { RequestType::Sell };
                    let id = submit(&ledger, user_id, request_type, *grams).await;
                    let decision = if *approve_it { Decision::Approve } else { Decision::Reject };

                    for _ in 0..=*retries {
                        let result = ledger
                            .apply_approval(ApprovalCommand { decision, ..approve(id) })
                            .await;
                        if let Ok(settlement) = result {
                            if settlement.request.status == RequestStatus::Approved {
                                match request_type {
                                    RequestType::Buy => expected += *grams,
                                    RequestType::Sell => expected -= *grams,
                                }
                            }
                        }
                    }
                }

                let vault = vault_of(&store, user_id).await;
                (expected, vault - initial, vault)
            });

            prop_assert_eq!(expected, actual);
            prop_assert!(vault >= Decimal::ZERO);
        }
    }
}
