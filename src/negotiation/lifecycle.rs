//! Draft lifecycle: approve, reject, request a revision
//!
//! ```text
//! draft ──approve──▶ approved
//!   │ └───reject───▶ rejected
//!   └──new draft───▶ superseded
//! ```
//!
//! All three targets are terminal. Approving a draft that carries a
//! suggested price writes that price to the item in the same commit.

use serde::{Deserialize, Serialize};

use super::authz::{self, Capability};
use super::conversation::last_buyer_seq;
use super::pricing::validate_price;
use super::{normalize_text, NegotiationEngine};
use crate::domain::{
    DraftState, Item, Message, MessageId, NegotiationError, NegotiationResult, NewMessage,
};

/// Result of approving or rejecting a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub message: Message,
    pub item: Item,
}

/// Result of asking for a revised draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionOutcome {
    pub draft: Message,
    pub superseded: Vec<MessageId>,
}

impl NegotiationEngine {
    /// Approve a draft, applying its suggested price if it has one
    pub async fn approve(
        &self,
        message_id: MessageId,
        actor_id: &str,
    ) -> NegotiationResult<ResolutionOutcome> {
        let result = self.resolve(message_id, actor_id, DraftState::Approved).await;
        self.record(|m| m.record_transition("approve", result.is_ok()));
        if let Ok(outcome) = &result {
            if outcome.message.suggested_price.is_some() {
                self.record(|m| m.price_mutations.with_label_values(&["approval"]).inc());
            }
        }
        result
    }

    /// Reject a draft; the item is left untouched
    pub async fn reject(
        &self,
        message_id: MessageId,
        actor_id: &str,
    ) -> NegotiationResult<ResolutionOutcome> {
        let result = self.resolve(message_id, actor_id, DraftState::Rejected).await;
        self.record(|m| m.record_transition("reject", result.is_ok()));
        result
    }

    async fn resolve(
        &self,
        message_id: MessageId,
        actor_id: &str,
        target: DraftState,
    ) -> NegotiationResult<ResolutionOutcome> {
        let item_id = self.load_message(message_id).await?.item_id;
        let _guard = self.locks.write(&item_id).await;

        // Re-read under the lock; a racing transition may have won
        let message = self.load_message(message_id).await?;
        let item = self.load_item(&item_id).await?;
        authz::check(actor_id, &item, Capability::ResolveDraft)?;

        if !message.is_draft() {
            let state = message
                .draft_state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "a participant message".to_string());
            return Err(NegotiationError::InvalidState(format!(
                "message {} is {}, not a draft",
                message_id, state
            )));
        }

        let price = match target {
            DraftState::Approved => {
                if !item.is_on_sale() {
                    return Err(NegotiationError::ItemNotAvailable(item.id.clone()));
                }
                if let Some(price) = message.suggested_price {
                    validate_price(&item, price)?;
                }
                message.suggested_price
            }
            _ => None,
        };

        let resolved = self.store.resolve_draft(message_id, target, price).await?;
        tracing::info!(
            item_id = %item_id,
            message_id = %message_id,
            actor_id,
            state = %target,
            price = ?price,
            "Draft resolved"
        );

        Ok(ResolutionOutcome {
            message: resolved.message,
            item: resolved.item,
        })
    }

    /// Replace the current draft with one produced under `instruction`
    ///
    /// The agent is called first; if it fails nothing changes and the
    /// current draft, if any, stays open.
    pub async fn retry(
        &self,
        item_id: &str,
        actor_id: &str,
        instruction: Option<&str>,
    ) -> NegotiationResult<RevisionOutcome> {
        let result = self.revise(item_id, actor_id, instruction).await;
        self.record(|m| m.record_transition("retry", result.is_ok()));
        if result.is_ok() {
            self.record(|m| m.drafts_created.with_label_values(&["retry"]).inc());
        }
        result
    }

    async fn revise(
        &self,
        item_id: &str,
        actor_id: &str,
        instruction: Option<&str>,
    ) -> NegotiationResult<RevisionOutcome> {
        let instruction = match instruction.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => Some(normalize_text(
                "instruction",
                text,
                self.settings.max_message_chars,
            )?),
            None => None,
        };

        let item = self.load_item(item_id).await?;
        ensure_revisable(actor_id, &item)?;
        let messages = self.store.list_messages(item_id).await?;
        if !messages.iter().any(|m| !item.is_seller(&m.sender_id)) {
            return Err(NegotiationError::NoActiveNegotiation(format!(
                "no buyer has written about item {} yet",
                item_id
            )));
        }

        let proposal = self
            .gateway
            .propose(&item, &messages, instruction.clone())
            .await?;

        let _guard = self.locks.write(item_id).await;
        let item = self.load_item(item_id).await?;
        ensure_revisable(actor_id, &item)?;

        let installed = self
            .store
            .install_draft(NewMessage::draft(
                &item,
                proposal.content,
                proposal.suggested_price,
                proposal.reasoning,
            )
            .replying_to(last_buyer_seq(&item, &messages)))
            .await?;

        tracing::info!(
            item_id,
            actor_id,
            message_id = %installed.draft.id,
            superseded = installed.superseded.len(),
            instruction = instruction.as_deref().unwrap_or(""),
            "Revised draft installed"
        );

        Ok(RevisionOutcome {
            draft: installed.draft,
            superseded: installed.superseded,
        })
    }
}

fn ensure_revisable(actor_id: &str, item: &Item) -> NegotiationResult<()> {
    authz::check(actor_id, item, Capability::RequestRevision)?;
    if !item.is_on_sale() {
        return Err(NegotiationError::ItemNotAvailable(item.id.clone()));
    }
    if !item.negotiation_enabled {
        return Err(NegotiationError::NoActiveNegotiation(format!(
            "AI negotiation is disabled for item {}",
            item.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RuleBasedAgent;
    use crate::domain::{DraftingOutcome, NewItem};
    use crate::negotiation::NegotiationSettings;
    use crate::persistence::InMemoryStore;
    use std::sync::Arc;

    async fn engine() -> NegotiationEngine {
        let engine = NegotiationEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(RuleBasedAgent::default()),
            NegotiationSettings::default(),
        );
        engine
            .register_item(
                "seller",
                NewItem {
                    id: "item-1".to_string(),
                    seller_id: String::new(),
                    name: "Tent".to_string(),
                    price: 10_000,
                    min_price: Some(8_000),
                    negotiation_enabled: true,
                },
            )
            .await
            .unwrap();
        engine
    }

    async fn draft(engine: &NegotiationEngine, content: &str) -> MessageId {
        match engine
            .append("item-1", "buyer", content, None)
            .await
            .unwrap()
            .drafting
        {
            DraftingOutcome::Drafted { draft_id } => draft_id,
            other => panic!("expected draft, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approve_applies_suggested_price() {
        let engine = engine().await;
        let draft_id = draft(&engine, "9000?").await;

        let outcome = engine.approve(draft_id, "seller").await.unwrap();
        assert!(outcome.message.is_approved());
        assert_eq!(Some(outcome.item.price), outcome.message.suggested_price);
    }

    #[tokio::test]
    async fn test_buyer_cannot_approve() {
        let engine = engine().await;
        let draft_id = draft(&engine, "9000?").await;

        let result = engine.approve(draft_id, "buyer").await;
        assert!(matches!(result, Err(NegotiationError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_reject_then_approve_is_invalid_state() {
        let engine = engine().await;
        let draft_id = draft(&engine, "9000?").await;

        let rejected = engine.reject(draft_id, "seller").await.unwrap();
        assert_eq!(rejected.message.draft_state, Some(DraftState::Rejected));
        assert_eq!(rejected.item.price, 10_000);

        let again = engine.approve(draft_id, "seller").await;
        assert!(matches!(again, Err(NegotiationError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_participant_message_cannot_be_approved() {
        let engine = engine().await;
        let outcome = engine
            .append("item-1", "seller", "hello", None)
            .await
            .unwrap();
        let result = engine.approve(outcome.message.id, "seller").await;
        assert!(matches!(result, Err(NegotiationError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_retry_supersedes_current_draft() {
        let engine = engine().await;
        let first = draft(&engine, "9000?").await;

        let revised = engine
            .retry("item-1", "seller", Some("offer 9300"))
            .await
            .unwrap();
        assert_eq!(revised.superseded, vec![first]);
        assert_eq!(revised.draft.suggested_price, Some(9_300));

        let old = engine.approve(first, "seller").await;
        assert!(matches!(old, Err(NegotiationError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_retry_without_buyer_message() {
        let engine = engine().await;
        let result = engine.retry("item-1", "seller", None).await;
        assert!(matches!(result, Err(NegotiationError::NoActiveNegotiation(_))));
    }

    #[tokio::test]
    async fn test_retry_by_buyer_is_unauthorized() {
        let engine = engine().await;
        draft(&engine, "9000?").await;
        let result = engine.retry("item-1", "buyer", None).await;
        assert!(matches!(result, Err(NegotiationError::Unauthorized(_))));
    }
}
