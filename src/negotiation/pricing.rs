//! Price mutations and the other item-level transitions
//!
//! Every operation here holds the item's write lock, so a price change,
//! a purchase and a draft approval on the same item never interleave.

use super::authz::{self, Capability};
use super::NegotiationEngine;
use crate::domain::{
    ActorId, Item, ItemStatus, Money, NegotiationError, NegotiationResult, NewItem,
};

/// Whether `price` may become the listed price of `item`
pub fn validate_price(item: &Item, price: Money) -> NegotiationResult<()> {
    if price <= 0 {
        return Err(NegotiationError::InvalidPrice(format!(
            "price must be positive, got {}",
            price
        )));
    }
    if let Some(min_price) = item.min_price {
        if price < min_price {
            return Err(NegotiationError::InvalidPrice(format!(
                "price {} is below the minimum {} for item {}",
                price, min_price, item.id
            )));
        }
    }
    Ok(())
}

fn ensure_on_sale(item: &Item) -> NegotiationResult<()> {
    if item.is_on_sale() {
        Ok(())
    } else {
        Err(NegotiationError::ItemNotAvailable(item.id.clone()))
    }
}

impl NegotiationEngine {
    /// Register an item listed by `seller_id`
    pub async fn register_item(&self, seller_id: &str, new_item: NewItem) -> NegotiationResult<Item> {
        let id = new_item.id.trim().to_string();
        if id.is_empty() {
            return Err(NegotiationError::InvalidInput("item id must not be empty".to_string()));
        }
        let seller_id: ActorId = seller_id.to_string();
        let item = NewItem {
            id,
            seller_id,
            name: new_item.name.trim().to_string(),
            ..new_item
        }
        .into_item(chrono::Utc::now());

        if item.price <= 0 {
            return Err(NegotiationError::InvalidPrice(format!(
                "price must be positive, got {}",
                item.price
            )));
        }
        validate_min_price(&item, item.min_price)?;

        let _guard = self.locks.write(&item.id).await;
        let stored = self.store.insert_item(&item).await?;
        tracing::info!(
            item_id = %stored.id,
            actor_id = %stored.seller_id,
            price = stored.price,
            negotiation_enabled = stored.negotiation_enabled,
            "Item registered"
        );
        Ok(stored)
    }

    /// Set the listed price directly
    pub async fn apply_price(
        &self,
        item_id: &str,
        new_price: Money,
        actor_id: &str,
    ) -> NegotiationResult<Item> {
        let _guard = self.locks.write(item_id).await;
        let mut item = self.load_item(item_id).await?;
        authz::check(actor_id, &item, Capability::SetPrice)?;
        ensure_on_sale(&item)?;
        validate_price(&item, new_price)?;

        let previous = item.price;
        item.price = new_price;
        let item = self.store.update_item(&item).await?;

        self.record(|m| m.price_mutations.with_label_values(&["direct"]).inc());
        tracing::info!(item_id, actor_id, previous, price = new_price, "Price changed");
        Ok(item)
    }

    /// Buy the item at its current price
    ///
    /// When `expected_price` is given the purchase only goes through if the
    /// price has not changed since the buyer last saw it.
    pub async fn purchase(
        &self,
        item_id: &str,
        buyer_id: &str,
        expected_price: Option<Money>,
    ) -> NegotiationResult<Item> {
        let _guard = self.locks.write(item_id).await;
        let mut item = self.load_item(item_id).await?;
        authz::check(buyer_id, &item, Capability::Purchase)?;
        ensure_on_sale(&item)?;

        if let Some(expected) = expected_price {
            if expected != item.price {
                return Err(NegotiationError::InvalidState(format!(
                    "price of item {} changed from {} to {}",
                    item_id, expected, item.price
                )));
            }
        }

        item.status = ItemStatus::Sold;
        item.buyer_id = Some(buyer_id.to_string());
        let item = self.store.update_item(&item).await?;

        self.record(|m| m.record_transition("purchase", true));
        tracing::info!(item_id, actor_id = buyer_id, price = item.price, "Item sold");
        Ok(item)
    }

    /// Turn AI negotiation on or off and set the floor price
    pub async fn configure_negotiation(
        &self,
        item_id: &str,
        actor_id: &str,
        enabled: bool,
        min_price: Option<Money>,
    ) -> NegotiationResult<Item> {
        let _guard = self.locks.write(item_id).await;
        let mut item = self.load_item(item_id).await?;
        authz::check(actor_id, &item, Capability::ConfigureNegotiation)?;
        ensure_on_sale(&item)?;
        validate_min_price(&item, min_price)?;

        item.negotiation_enabled = enabled;
        item.min_price = min_price;
        let item = self.store.update_item(&item).await?;

        tracing::info!(
            item_id,
            actor_id,
            enabled,
            min_price = ?min_price,
            "Negotiation settings changed"
        );
        Ok(item)
    }
}

fn validate_min_price(item: &Item, min_price: Option<Money>) -> NegotiationResult<()> {
    match min_price {
        Some(min_price) if min_price <= 0 => Err(NegotiationError::InvalidPrice(format!(
            "minimum price must be positive, got {}",
            min_price
        ))),
        Some(min_price) if min_price > item.price => Err(NegotiationError::InvalidPrice(format!(
            "minimum price {} exceeds the listed price {}",
            min_price, item.price
        ))),
        _ => Ok(()),
    }
}
