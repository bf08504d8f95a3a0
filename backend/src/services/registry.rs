//! # User Registry Service
//!
//! Registration and lookup. Email uniqueness is enforced by the store; the
//! lookup before insert only gives a quicker answer in the common case.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::db::{DatabaseError, GoldStore, NewUser, UserRecord};
use crate::utils::{clean_optional, normalize_email};

use super::{ensure_grams, ensure_non_negative, MarketError};

/// Registration input, as received from the API.
#[derive(Debug, Clone, Default)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub reference_id: Option<String>,
    pub nid: Option<String>,
    /// Opening vault balance in grams. Defaults to zero.
    pub my_vault: Option<Decimal>,
}

#[derive(Clone)]
pub struct UserRegistry {
    store: Arc<dyn GoldStore>,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn GoldStore>) -> Self {
        Self { store }
    }

    /// Register a user.
    ///
    /// ## Returns
    ///
    /// * `Ok(UserRecord)` - The stored user
    /// * `Err(MarketError::DuplicateEmail)` - Email taken, including by a concurrent registration
    /// * `Err(MarketError::Validation)` - Missing name, bad email or negative vault
    pub async fn register(&self, input: RegisterUser) -> Result<UserRecord, MarketError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(MarketError::Validation("Name is required".to_string()));
        }

        let email = normalize_email(&input.email).map_err(MarketError::Validation)?;

        let my_vault = input.my_vault.unwrap_or(Decimal::ZERO);
        ensure_non_negative("myVault", my_vault)?;
        ensure_grams("myVault", my_vault)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(MarketError::DuplicateEmail(email));
        }

        let new_user = NewUser {
            name,
            email,
            phone_number: clean_optional(input.phone_number),
            reference_id: clean_optional(input.reference_id),
            nid: clean_optional(input.nid),
            my_vault,
        };

        let inserted = self.store.insert_user(&new_user).await;
        match inserted {
            Ok(user) => {
                info!("User registered: {} ({})", user.id, user.email);
                Ok(user)
            }
            Err(DatabaseError::UniqueViolation(constraint)) => {
                warn!(
                    "Registration for {} lost a race on {}",
                    new_user.email, constraint
                );
                Err(MarketError::DuplicateEmail(new_user.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All users, newest first.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>, MarketError> {
        Ok(self.store.list_users().await?)
    }

    /// Look up one user by email.
    pub async fn find_by_email(&self, email: &str) -> Result<UserRecord, MarketError> {
        let email = normalize_email(email).map_err(MarketError::Validation)?;

        self.store
            .find_user_by_email(&email)
            .await?
            .ok_or(MarketError::UserNotFound(email))
    }
}
