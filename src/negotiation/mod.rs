//! Negotiation workflow engine
//!
//! [`NegotiationEngine`] is the single entry point for every operation on an
//! item's negotiation. Its operations are split by concern:
//!
//! - `conversation`: appending and listing messages, triggering drafts
//! - `lifecycle`: approving, rejecting and revising drafts
//! - `pricing`: direct price changes, purchase, negotiation settings
//! - `sync`: viewer-dependent snapshots for polling clients
//!
//! Every read-modify-write on an item runs under that item's write lock
//! (see [`locks::ItemLocks`]); calls into the agent never hold it.

pub mod authz;
pub mod conversation;
pub mod gateway;
pub mod lifecycle;
pub mod locks;
pub mod pricing;
pub mod sync;

pub use gateway::AgentGateway;
pub use lifecycle::{ResolutionOutcome, RevisionOutcome};
pub use locks::ItemLocks;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::metrics_handler::MetricsCollector;
use crate::agents::NegotiationAgent;
use crate::domain::{Item, Message, MessageId, NegotiationError, NegotiationResult};
use crate::persistence::NegotiationStore;

/// `[negotiation]` section of the configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NegotiationSettings {
    /// Most recent messages passed to the agent
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,

    /// Deadline for a single agent attempt
    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,

    /// Attempts per proposal, including the first
    #[serde(default = "default_agent_max_attempts")]
    pub agent_max_attempts: u32,

    #[serde(default = "default_agent_initial_backoff_ms")]
    pub agent_initial_backoff_ms: u64,

    #[serde(default = "default_agent_max_backoff_ms")]
    pub agent_max_backoff_ms: u64,

    /// Upper bound on message and instruction length, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Polling interval advertised to clients
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_history_messages() -> usize {
    20
}

fn default_agent_timeout_ms() -> u64 {
    15_000
}

fn default_agent_max_attempts() -> u32 {
    3
}

fn default_agent_initial_backoff_ms() -> u64 {
    250
}

fn default_agent_max_backoff_ms() -> u64 {
    2_000
}

fn default_max_message_chars() -> usize {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            max_history_messages: default_max_history_messages(),
            agent_timeout_ms: default_agent_timeout_ms(),
            agent_max_attempts: default_agent_max_attempts(),
            agent_initial_backoff_ms: default_agent_initial_backoff_ms(),
            agent_max_backoff_ms: default_agent_max_backoff_ms(),
            max_message_chars: default_max_message_chars(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

pub struct NegotiationEngine {
    store: Arc<dyn NegotiationStore>,
    gateway: AgentGateway,
    locks: ItemLocks,
    settings: NegotiationSettings,
    metrics: Option<Arc<MetricsCollector>>,
}

impl NegotiationEngine {
    pub fn new(
        store: Arc<dyn NegotiationStore>,
        agent: Arc<dyn NegotiationAgent>,
        settings: NegotiationSettings,
    ) -> Self {
        Self {
            store,
            gateway: AgentGateway::new(agent, &settings),
            locks: ItemLocks::new(),
            settings,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.gateway = self.gateway.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn settings(&self) -> &NegotiationSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn NegotiationStore> {
        &self.store
    }

    pub fn agent_name(&self) -> &str {
        self.gateway.agent_name()
    }

    pub async fn health_check(&self) -> NegotiationResult<()> {
        Ok(self.store.health_check().await?)
    }

    async fn load_item(&self, item_id: &str) -> NegotiationResult<Item> {
        self.store
            .get_item(item_id)
            .await?
            .ok_or_else(|| NegotiationError::ItemNotFound(item_id.to_string()))
    }

    async fn load_message(&self, message_id: MessageId) -> NegotiationResult<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| NegotiationError::MessageNotFound(message_id.to_string()))
    }

    fn record(&self, f: impl FnOnce(&MetricsCollector)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

/// Trim free text and enforce the configured bounds
pub(crate) fn normalize_text(
    field: &str,
    text: &str,
    max_chars: usize,
) -> NegotiationResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(NegotiationError::InvalidInput(format!(
            "{} must not be empty",
            field
        )));
    }
    if text.chars().count() > max_chars {
        return Err(NegotiationError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max_chars
        )));
    }
    Ok(text.to_string())
}
