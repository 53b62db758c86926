//! Capability checks shared by every transition

use crate::domain::{Affordances, Item, Message, NegotiationError, NegotiationResult};

/// Something an actor may try to do to an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Approve or reject a draft
    ResolveDraft,
    /// Ask the agent for a revised draft
    RequestRevision,
    /// Change the listed price directly
    SetPrice,
    /// Toggle AI negotiation or change the floor price
    ConfigureNegotiation,
    /// Buy the item
    Purchase,
}

impl Capability {
    fn describe(&self) -> &'static str {
        match self {
            Capability::ResolveDraft => "resolve drafts for",
            Capability::RequestRevision => "request a revised draft for",
            Capability::SetPrice => "change the price of",
            Capability::ConfigureNegotiation => "configure negotiation for",
            Capability::Purchase => "purchase",
        }
    }
}

/// Whether `actor_id` holds `capability` on `item`
pub fn check(actor_id: &str, item: &Item, capability: Capability) -> NegotiationResult<()> {
    let allowed = match capability {
        Capability::ResolveDraft
        | Capability::RequestRevision
        | Capability::SetPrice
        | Capability::ConfigureNegotiation => item.is_seller(actor_id),
        Capability::Purchase => !item.is_seller(actor_id),
    };

    if allowed {
        Ok(())
    } else {
        Err(NegotiationError::Unauthorized(format!(
            "{} may not {} item {}",
            actor_id,
            capability.describe(),
            item.id
        )))
    }
}

/// Transitions the viewer may currently start
pub fn affordances(viewer_id: &str, item: &Item, messages: &[Message]) -> Affordances {
    if !item.is_seller(viewer_id) || !item.is_on_sale() {
        return Affordances::default();
    }

    let has_buyer_message = messages.iter().any(|m| !item.is_seller(&m.sender_id));
    Affordances {
        resolve_draft: messages.iter().rev().find(|m| m.is_draft()).map(|m| m.id),
        retry: item.negotiation_enabled && has_buyer_message,
        set_price: true,
    }
}
