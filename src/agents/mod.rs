//! Proposal capability behind the negotiation gateway
//!
//! The negotiation core treats proposal generation as an opaque
//! `propose(...)` call. Two implementations are provided:
//!
//! - [`RuleBasedAgent`]: a deterministic concession strategy that needs no
//!   network access, the default
//! - [`LlmNegotiationAgent`]: a chat model (OpenAI, Anthropic or Ollama)
//!   prompted with the item constraints and conversation
//!
//! ## Architecture
//!
//! - `llm/` - LLM provider implementations
//! - `prompt` - Tera-rendered system prompt and response parsing
//! - `rule_based` - offline strategy

pub mod config;
pub mod error;
pub mod llm;
pub mod llm_agent;
pub mod prompt;
pub mod rule_based;

pub use config::{AgentKind, AgentSettings, LlmProviderConfig, LlmProviderType, RuleBasedConfig};
pub use error::{AgentError, AgentResult, LlmError, LlmResult};
pub use llm_agent::LlmNegotiationAgent;
pub use rule_based::RuleBasedAgent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{ItemId, Money};

/// Who said something in the conversation, from the agent's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Buyer,
    Seller,
}

/// One message of the bounded history handed to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub speaker: Speaker,
    pub content: String,
    /// Seller-side message that was authored by the agent and approved
    #[serde(default)]
    pub is_ai_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<Money>,
}

/// Price bounds the proposal should respect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceConstraints {
    pub listed_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Money>,
}

impl PriceConstraints {
    /// Lowest price the seller has said they would take
    pub fn floor(&self) -> Money {
        self.min_price.unwrap_or(self.listed_price)
    }
}

/// Input of a single proposal call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub item_id: ItemId,
    #[serde(default)]
    pub item_name: String,
    /// Oldest first
    pub history: Vec<HistoryEntry>,
    pub constraints: PriceConstraints,
    /// Seller guidance for a revised draft
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl ProposalRequest {
    /// Most recent buyer message in the history
    pub fn last_buyer_message(&self) -> Option<&HistoryEntry> {
        self.history
            .iter()
            .rev()
            .find(|entry| entry.speaker == Speaker::Buyer)
    }
}

/// What the agent suggests the seller send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<Money>,
    /// Shown to the seller only
    #[serde(default)]
    pub reasoning: String,
}

/// The opaque proposal capability
#[async_trait]
pub trait NegotiationAgent: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &str;

    async fn propose(&self, request: &ProposalRequest) -> AgentResult<Proposal>;
}

/// Build the configured agent
pub fn create_agent(settings: &AgentSettings) -> AgentResult<Arc<dyn NegotiationAgent>> {
    match settings.kind {
        AgentKind::RuleBased => {
            tracing::info!("Using rule-based negotiation agent");
            Ok(Arc::new(RuleBasedAgent::new(settings.rule_based.clone())))
        }
        AgentKind::Llm => {
            let llm = settings.llm.as_ref().ok_or_else(|| {
                AgentError::Configuration("agent.kind = \"llm\" requires an [agent.llm] section".to_string())
            })?;
            let provider = llm::create_provider(llm)?;
            tracing::info!(
                provider = provider.name(),
                model = provider.model(),
                "Using LLM negotiation agent"
            );
            let agent = LlmNegotiationAgent::new(provider, settings.system_prompt.clone())?;
            Ok(Arc::new(agent))
        }
    }
}
