//! Configuration types for the negotiation agents

use serde::{Deserialize, Serialize};

/// Which proposal capability backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Deterministic offline concession strategy
    #[default]
    RuleBased,
    /// Chat-completion model behind an HTTP API
    Llm,
}

/// `[agent]` section of the configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub kind: AgentKind,

    /// Required when `kind = "llm"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmProviderConfig>,

    /// Tera template overriding the built-in system prompt
    ///
    /// Available variables: `item_name`, `listed_price`, `min_price`,
    /// `instruction`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub rule_based: RuleBasedConfig,
}

/// Tuning for the rule-based agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleBasedConfig {
    /// Share of the gap to the buyer's offer conceded in one round
    #[serde(default = "default_concession_ratio")]
    pub concession_ratio: f64,

    /// Offers within this share of the last asking price are accepted as-is
    #[serde(default = "default_acceptance_margin")]
    pub acceptance_margin: f64,
}

fn default_concession_ratio() -> f64 {
    0.5
}

fn default_acceptance_margin() -> f64 {
    0.02
}

impl Default for RuleBasedConfig {
    fn default() -> Self {
        Self {
            concession_ratio: default_concession_ratio(),
            acceptance_margin: default_acceptance_margin(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmProviderConfig {
    /// Provider type
    pub provider: LlmProviderType,
    /// Model name/identifier
    pub model: String,
    /// Environment variable containing the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Custom base URL (for self-hosted or proxied endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Default temperature for completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Default max tokens for completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderType {
    /// OpenAI-compatible chat completions
    #[default]
    OpenAI,
    /// Anthropic messages API
    Anthropic,
    /// Ollama (local models)
    Ollama,
}

impl LlmProviderType {
    /// Environment variable read when `api_key_env` is not set
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProviderType::OpenAI => Some("OPENAI_API_KEY"),
            LlmProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProviderType::Ollama => None,
        }
    }
}

impl std::fmt::Display for LlmProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderType::OpenAI => write!(f, "openai"),
            LlmProviderType::Anthropic => write!(f, "anthropic"),
            LlmProviderType::Ollama => write!(f, "ollama"),
        }
    }
}
