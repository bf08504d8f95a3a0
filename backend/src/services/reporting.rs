//! # Report Service
//!
//! Read-only views: per-user transaction history, the global request list,
//! and vault totals for the admin report. Nothing here writes.

use std::sync::Arc;

use tracing::debug;

use crate::db::{GoldStore, RequestRecord, VaultTotals};
use crate::utils::{format_grams, normalize_email};

use super::MarketError;

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn GoldStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn GoldStore>) -> Self {
        Self { store }
    }

    /// Requests of the user with `email`, newest first.
    ///
    /// An empty history is `NoTransactions`, not an empty list.
    pub async fn history_for_email(&self, email: &str) -> Result<Vec<RequestRecord>, MarketError> {
        let email = normalize_email(email).map_err(MarketError::Validation)?;

        let history = self.store.list_requests_by_email(&email).await?;
        if history.is_empty() {
            return Err(MarketError::NoTransactions(
                "No transactions found for this email".to_string(),
            ));
        }

        debug!("{} requests found for {}", history.len(), email);
        Ok(history)
    }

    /// Every request, newest first. Empty is `NoTransactions`.
    pub async fn all_requests(&self) -> Result<Vec<RequestRecord>, MarketError> {
        let requests = self.store.list_requests().await?;
        if requests.is_empty() {
            return Err(MarketError::NoTransactions("No requests found".to_string()));
        }
        Ok(requests)
    }

    /// Sum of every user's vault.
    pub async fn vault_totals(&self) -> Result<VaultTotals, MarketError> {
        let totals = self.store.vault_totals().await?;
        debug!(
            "Vault totals: {} across {} users",
            format_grams(totals.total_vault),
            totals.user_count
        );
        Ok(totals)
    }
}
