//! # Rate Book Service
//!
//! The single buy/sell rate document. No history is kept; updates replace
//! all three values in place.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::db::{DatabaseError, GoldStore, RateRecord, RateValues};

use super::{ensure_grams, ensure_non_negative, MarketError};

#[derive(Clone)]
pub struct RateBook {
    store: Arc<dyn GoldStore>,
}

impl RateBook {
    pub fn new(store: Arc<dyn GoldStore>) -> Self {
        Self { store }
    }

    /// The current rate document, or `RateNotFound` if none was created.
    pub async fn current(&self) -> Result<RateRecord, MarketError> {
        self.store
            .current_rate()
            .await?
            .ok_or(MarketError::RateNotFound)
    }

    /// Create the rate document. Fails with `RateExists` if there already is one.
    pub async fn create(&self, values: RateValues) -> Result<RateRecord, MarketError> {
        validate(&values)?;

        let inserted = self.store.insert_rate(&values).await;
        match inserted {
            Ok(rate) => {
                info!(
                    "Rate {} created: buy {}, sell {}, delivery {}",
                    rate.id, rate.user_buy_rate, rate.user_sell_rate, rate.delivery_charge
                );
                Ok(rate)
            }
            Err(DatabaseError::UniqueViolation(_)) => Err(MarketError::RateExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the values of the rate document with `id`.
    pub async fn update(&self, id: Uuid, values: RateValues) -> Result<RateRecord, MarketError> {
        validate(&values)?;

        let rate = self
            .store
            .update_rate(id, &values)
            .await?
            .ok_or(MarketError::RateNotFound)?;

        info!(
            "Rate {} updated: buy {}, sell {}, delivery {}",
            rate.id, rate.user_buy_rate, rate.user_sell_rate, rate.delivery_charge
        );
        Ok(rate)
    }
}

fn validate(values: &RateValues) -> Result<(), MarketError> {
    for (field, value) in [
        ("userBuyRate", values.user_buy_rate),
        ("userSellRate", values.user_sell_rate),
        ("deliveryCharge", values.delivery_charge),
    ] {
        ensure_non_negative(field, value)?;
        ensure_grams(field, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use rust_decimal_macros::dec;

    fn values() -> RateValues {
        RateValues {
            user_buy_rate: dec!(100),
            user_sell_rate: dec!(98),
            delivery_charge: dec!(2),
        }
    }

    #[tokio::test]
    async fn empty_book_has_no_rate() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        assert!(matches!(book.current().await, Err(MarketError::RateNotFound)));
    }

    #[tokio::test]
    async fn update_replaces_all_values() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        let created = book.create(values()).await.unwrap();

        let updated = book
            .update(
                created.id,
                RateValues {
                    user_buy_rate: dec!(110.5),
                    user_sell_rate: dec!(105),
                    delivery_charge: dec!(0),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.user_buy_rate, dec!(110.5));
        assert_eq!(updated.user_sell_rate, dec!(105));
        assert_eq!(updated.delivery_charge, dec!(0));
        assert_eq!(book.current().await.unwrap(), updated);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        book.create(values()).await.unwrap();

        assert!(matches!(
            book.update(Uuid::new_v4(), values()).await,
            Err(MarketError::RateNotFound)
        ));
    }

    #[tokio::test]
    async fn only_one_rate_document() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        book.create(values()).await.unwrap();
        assert!(matches!(book.create(values()).await, Err(MarketError::RateExists)));
    }

    #[tokio::test]
    async fn negative_values_are_rejected() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        let bad = RateValues { delivery_charge: dec!(-2), ..values() };
        assert!(matches!(book.create(bad).await, Err(MarketError::Validation(_))));
    }

    #[tokio::test]
    async fn rates_beyond_six_places_are_rejected() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));
        let created = book.create(values()).await.unwrap();

        let over_precise = RateValues { user_buy_rate: dec!(100.0000001), ..values() };
        assert!(matches!(
            book.update(created.id, over_precise).await,
            Err(MarketError::Validation(m)) if m == "userBuyRate allows at most 6 decimal places"
        ));
        assert_eq!(book.current().await.unwrap().user_buy_rate, dec!(100));
    }
}
