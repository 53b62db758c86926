//! Core domain types for the negotiation workflow
//!
//! Items are owned by the catalog collaborator and mirrored here with the
//! fields the negotiation core reads and writes. Messages form the
//! append-only conversation attached to an item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod auth;
pub mod error;

pub use error::{NegotiationError, NegotiationResult};

/// Opaque identity of an authenticated participant
pub type ActorId = String;

/// Catalog identifier of an item
pub type ItemId = String;

/// Identifier of a message in a conversation
pub type MessageId = Uuid;

/// Integral amount in the minor currency unit (e.g. yen)
pub type Money = i64;

/// Sale status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    OnSale,
    Sold,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::OnSale => "on_sale",
            ItemStatus::Sold => "sold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on_sale" => Some(ItemStatus::OnSale),
            "sold" => Some(ItemStatus::Sold),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item record as seen by the negotiation core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub seller_id: ActorId,
    pub name: String,
    /// Current listed price
    pub price: Money,
    /// Floor for negotiated prices, only meaningful when negotiation is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Money>,
    pub negotiation_enabled: bool,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<ActorId>,
    /// Bumped by every write that touches the item or its conversation
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    pub fn is_seller(&self, actor_id: &str) -> bool {
        self.seller_id == actor_id
    }

    pub fn is_on_sale(&self) -> bool {
        self.status == ItemStatus::OnSale
    }

    /// Whether a buyer message on this item should produce an AI draft
    pub fn accepts_drafting(&self) -> bool {
        self.negotiation_enabled && self.is_on_sale()
    }
}

/// Input for registering an item with the negotiation core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub id: ItemId,
    pub seller_id: ActorId,
    #[serde(default)]
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub min_price: Option<Money>,
    #[serde(default)]
    pub negotiation_enabled: bool,
}

impl NewItem {
    pub fn into_item(self, now: DateTime<Utc>) -> Item {
        Item {
            id: self.id,
            seller_id: self.seller_id,
            name: self.name,
            price: self.price,
            min_price: self.min_price,
            negotiation_enabled: self.negotiation_enabled,
            status: ItemStatus::OnSale,
            buyer_id: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle state of an AI-authored message
///
/// `Draft` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftState {
    Draft,
    Approved,
    Rejected,
    Superseded,
}

impl DraftState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DraftState::Draft)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DraftState::Draft => "draft",
            DraftState::Approved => "approved",
            DraftState::Rejected => "rejected",
            DraftState::Superseded => "superseded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DraftState::Draft),
            "approved" => Some(DraftState::Approved),
            "rejected" => Some(DraftState::Rejected),
            "superseded" => Some(DraftState::Superseded),
            _ => None,
        }
    }
}

impl std::fmt::Display for DraftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in an item's conversation
///
/// Content and suggested price never change after creation. Only
/// `draft_state` transitions, and only on AI-authored messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Per-item insertion sequence, breaks ties between equal timestamps
    pub seq: i64,
    pub item_id: ItemId,
    pub sender_id: ActorId,
    pub content: String,
    pub is_ai_response: bool,
    /// Present iff `is_ai_response`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_state: Option<DraftState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<Money>,
    /// For drafts, seq of the latest buyer message the proposal was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_seq: Option<i64>,
    /// Client-supplied idempotency key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_approved(&self) -> bool {
        self.draft_state == Some(DraftState::Approved)
    }

    pub fn is_draft(&self) -> bool {
        self.draft_state == Some(DraftState::Draft)
    }

    /// Rejected and superseded drafts are kept for the record but carry no
    /// weight in further negotiation.
    pub fn is_discarded(&self) -> bool {
        matches!(
            self.draft_state,
            Some(DraftState::Rejected) | Some(DraftState::Superseded)
        )
    }
}

/// Input for appending a message; the store assigns id, seq and timestamp
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub item_id: ItemId,
    pub sender_id: ActorId,
    pub content: String,
    pub is_ai_response: bool,
    pub ai_reasoning: Option<String>,
    pub suggested_price: Option<Money>,
    pub reply_to_seq: Option<i64>,
    pub request_id: Option<String>,
}

impl NewMessage {
    pub fn human(
        item_id: impl Into<ItemId>,
        sender_id: impl Into<ActorId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            is_ai_response: false,
            ai_reasoning: None,
            suggested_price: None,
            reply_to_seq: None,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// AI draft authored on behalf of the seller
    pub fn draft(
        item: &Item,
        content: impl Into<String>,
        suggested_price: Option<Money>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item.id.clone(),
            sender_id: item.seller_id.clone(),
            content: content.into(),
            is_ai_response: true,
            ai_reasoning: Some(reasoning.into()),
            suggested_price,
            reply_to_seq: None,
            request_id: None,
        }
    }

    pub fn replying_to(mut self, seq: Option<i64>) -> Self {
        self.reply_to_seq = seq;
        self
    }
}

/// Viewer-dependent projection of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub seq: i64,
    pub item_id: ItemId,
    pub sender_id: ActorId,
    pub content: String,
    pub is_ai_response: bool,
    pub is_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DraftState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    /// Reasoning is the seller's private context and is withheld from
    /// everyone else.
    pub fn project(message: &Message, viewer_is_seller: bool) -> Self {
        Self {
            id: message.id,
            seq: message.seq,
            item_id: message.item_id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            is_ai_response: message.is_ai_response,
            is_approved: message.is_approved(),
            state: message.draft_state,
            ai_reasoning: if viewer_is_seller {
                message.ai_reasoning.clone()
            } else {
                None
            },
            suggested_price: message.suggested_price,
            created_at: message.created_at,
        }
    }
}

/// Transition affordances offered to the viewer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordances {
    /// The live draft the viewer may approve or reject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_draft: Option<MessageId>,
    /// Whether the viewer may request a revised draft
    pub retry: bool,
    /// Whether the viewer may change the price directly
    pub set_price: bool,
}

/// Snapshot returned to polling clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationView {
    pub item: Item,
    pub messages: Vec<MessageView>,
    pub viewer_is_seller: bool,
    pub can: Affordances,
    pub revision: u64,
    pub poll_interval_ms: u64,
}

/// How a buyer message was followed up by the agent gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DraftingOutcome {
    /// No drafting applies (seller message, negotiation disabled, sold, duplicate)
    NotApplicable,
    /// A new draft was installed
    Drafted { draft_id: MessageId },
    /// The proposal was dropped because a newer draft already exists
    Skipped { reason: String },
    /// The agent failed or timed out; the message itself was recorded
    AgentUnavailable { reason: String },
    /// A proposal was produced but could not be stored
    StorageUnavailable { reason: String },
}

/// Result of appending a participant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOutcome {
    pub message: Message,
    /// True when the request id matched an earlier append
    pub duplicate: bool,
    pub drafting: DraftingOutcome,
}
