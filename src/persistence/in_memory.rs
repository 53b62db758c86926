//! In-memory negotiation store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    next_timestamp, Appended, InstalledDraft, NegotiationStore, PersistenceError, ResolvedDraft,
    StoreResult,
};
use crate::domain::{DraftState, Item, ItemId, Message, MessageId, Money, NewMessage};

#[derive(Default)]
struct Inner {
    items: HashMap<ItemId, Item>,
    conversations: HashMap<ItemId, Vec<Message>>,
    /// message id -> (item id, position in the conversation)
    index: HashMap<MessageId, (ItemId, usize)>,
}

impl Inner {
    fn item_mut(&mut self, item_id: &str) -> StoreResult<&mut Item> {
        self.items
            .get_mut(item_id)
            .ok_or_else(|| PersistenceError::not_found("item", item_id))
    }

    fn touch_item(&mut self, item_id: &str) -> StoreResult<Item> {
        let item = self.item_mut(item_id)?;
        item.revision += 1;
        item.updated_at = chrono::Utc::now();
        Ok(item.clone())
    }

    fn push_message(&mut self, new: NewMessage, draft_state: Option<DraftState>) -> Message {
        let conversation = self.conversations.entry(new.item_id.clone()).or_default();
        let last = conversation.last();
        let message = Message {
            id: Uuid::new_v4(),
            seq: last.map(|m| m.seq + 1).unwrap_or(1),
            item_id: new.item_id,
            sender_id: new.sender_id,
            content: new.content,
            is_ai_response: new.is_ai_response,
            draft_state,
            ai_reasoning: new.ai_reasoning,
            suggested_price: new.suggested_price,
            reply_to_seq: new.reply_to_seq,
            request_id: new.request_id,
            created_at: next_timestamp(last.map(|m| m.created_at)),
        };
        conversation.push(message.clone());
        self.index.insert(
            message.id,
            (message.item_id.clone(), conversation.len() - 1),
        );
        message
    }

    fn message(&self, message_id: MessageId) -> Option<&Message> {
        let (item_id, position) = self.index.get(&message_id)?;
        self.conversations
            .get(item_id)
            .and_then(|conversation| conversation.get(*position))
    }

    fn message_mut(&mut self, message_id: MessageId) -> Option<&mut Message> {
        let (item_id, position) = self.index.get(&message_id)?.clone();
        self.conversations
            .get_mut(&item_id)
            .and_then(|conversation| conversation.get_mut(position))
    }
}

/// In-memory negotiation store
///
/// A single lock guards items and conversations, so every multi-row write
/// is atomic with respect to readers.
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn insert_item(&self, item: &Item) -> StoreResult<Item> {
        let mut inner = self.inner.write().await;
        if inner.items.contains_key(&item.id) {
            return Err(PersistenceError::Duplicate {
                entity_type: "item".to_string(),
                identifier: item.id.clone(),
            });
        }
        inner.items.insert(item.id.clone(), item.clone());
        Ok(item.clone())
    }

    async fn get_item(&self, item_id: &str) -> StoreResult<Option<Item>> {
        let inner = self.inner.read().await;
        Ok(inner.items.get(item_id).cloned())
    }

    async fn update_item(&self, item: &Item) -> StoreResult<Item> {
        let mut inner = self.inner.write().await;
        let stored = inner.item_mut(&item.id)?;
        stored.price = item.price;
        stored.min_price = item.min_price;
        stored.negotiation_enabled = item.negotiation_enabled;
        stored.status = item.status;
        stored.buyer_id = item.buyer_id.clone();
        stored.revision += 1;
        stored.updated_at = chrono::Utc::now();
        Ok(stored.clone())
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Appended> {
        let mut inner = self.inner.write().await;
        inner.item_mut(&message.item_id)?;

        if let Some(request_id) = message.request_id.as_deref() {
            let existing = inner.conversations.get(&message.item_id).and_then(|c| {
                c.iter().find(|m| {
                    m.sender_id == message.sender_id && m.request_id.as_deref() == Some(request_id)
                })
            });
            if let Some(existing) = existing {
                return Ok(Appended {
                    message: existing.clone(),
                    duplicate: true,
                });
            }
        }

        let draft_state = message.is_ai_response.then_some(DraftState::Draft);
        let item_id = message.item_id.clone();
        let stored = inner.push_message(message, draft_state);
        inner.touch_item(&item_id)?;
        Ok(Appended {
            message: stored,
            duplicate: false,
        })
    }

    async fn get_message(&self, message_id: MessageId) -> StoreResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.message(message_id).cloned())
    }

    async fn list_messages(&self, item_id: &str) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.conversations.get(item_id).cloned().unwrap_or_default())
    }

    async fn current_draft(&self, item_id: &str) -> StoreResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .get(item_id)
            .and_then(|c| c.iter().rev().find(|m| m.is_draft()).cloned()))
    }

    async fn install_draft(&self, draft: NewMessage) -> StoreResult<InstalledDraft> {
        let mut inner = self.inner.write().await;
        inner.item_mut(&draft.item_id)?;

        let mut superseded = Vec::new();
        if let Some(conversation) = inner.conversations.get_mut(&draft.item_id) {
            for message in conversation.iter_mut().filter(|m| m.is_draft()) {
                message.draft_state = Some(DraftState::Superseded);
                superseded.push(message.id);
            }
        }

        let item_id = draft.item_id.clone();
        let stored = inner.push_message(draft, Some(DraftState::Draft));
        let item = inner.touch_item(&item_id)?;
        Ok(InstalledDraft {
            draft: stored,
            superseded,
            item,
        })
    }

    async fn resolve_draft(
        &self,
        message_id: MessageId,
        state: DraftState,
        price: Option<Money>,
    ) -> StoreResult<ResolvedDraft> {
        if state == DraftState::Draft {
            return Err(PersistenceError::Internal(
                "resolve_draft requires a terminal state".to_string(),
            ));
        }

        let mut inner = self.inner.write().await;
        let message = inner
            .message_mut(message_id)
            .ok_or_else(|| PersistenceError::not_found("message", message_id))?;
        if !message.is_draft() {
            return Err(PersistenceError::StateConflict(format!(
                "message {} is not a draft",
                message_id
            )));
        }
        let item_id = message.item_id.clone();

        // Validate the item before touching anything so a failure writes nothing
        if price.is_some() && !inner.item_mut(&item_id)?.is_on_sale() {
            return Err(PersistenceError::StateConflict(format!(
                "item {} is no longer on sale",
                item_id
            )));
        }

        let message = match inner.message_mut(message_id) {
            Some(message) => {
                message.draft_state = Some(state);
                message.clone()
            }
            None => return Err(PersistenceError::not_found("message", message_id)),
        };
        if let Some(price) = price {
            inner.item_mut(&item_id)?.price = price;
        }
        let item = inner.touch_item(&item_id)?;
        Ok(ResolvedDraft { message, item })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
