//! Negotiation agent backed by a chat model

use async_trait::async_trait;
use std::sync::Arc;

use super::error::{AgentError, AgentResult};
use super::llm::{CompletionRequest, FinishReason, LlmProvider};
use super::prompt::{build_messages, parse_proposal, render_system_prompt, DEFAULT_SYSTEM_PROMPT};
use super::{NegotiationAgent, Proposal, ProposalRequest};

pub struct LlmNegotiationAgent {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
}

impl LlmNegotiationAgent {
    /// `system_prompt` overrides the built-in template; it is checked for
    /// syntax up front so a typo fails at startup rather than per call.
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: Option<String>) -> AgentResult<Self> {
        let system_prompt = system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        tera::Tera::default()
            .add_raw_template("system_prompt", &system_prompt)
            .map_err(|e| AgentError::Configuration(format!("invalid system prompt: {}", e)))?;

        Ok(Self {
            provider,
            system_prompt,
        })
    }
}

#[async_trait]
impl NegotiationAgent for LlmNegotiationAgent {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn propose(&self, request: &ProposalRequest) -> AgentResult<Proposal> {
        let system_prompt = render_system_prompt(&self.system_prompt, request)?;
        let completion = CompletionRequest {
            messages: build_messages(system_prompt, request),
            json_output: true,
            ..Default::default()
        };

        let response = self.provider.complete(completion).await?;
        if let Some(usage) = &response.usage {
            tracing::debug!(
                item_id = %request.item_id,
                provider = self.provider.name(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM proposal completed"
            );
        }
        if response.finish_reason == FinishReason::Length {
            return Err(AgentError::InvalidProposal(
                "response was cut off at the token limit".to_string(),
            ));
        }

        parse_proposal(&response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::error::LlmResult;
    use crate::agents::llm::{CompletionResponse, Role};
    use crate::agents::{HistoryEntry, PriceConstraints, Speaker};
    use std::sync::Mutex;

    struct ScriptedProvider {
        reply: String,
        finish_reason: FinishReason,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.reply.clone(),
                finish_reason: self.finish_reason,
                usage: None,
            })
        }
    }

    fn provider(reply: &str, finish_reason: FinishReason) -> Arc<ScriptedProvider> {
        Arc::new(ScriptedProvider {
            reply: reply.to_string(),
            finish_reason,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn request() -> ProposalRequest {
        ProposalRequest {
            item_id: "item-1".to_string(),
            item_name: "Desk lamp".to_string(),
            history: vec![HistoryEntry {
                speaker: Speaker::Buyer,
                content: "3000 yen?".to_string(),
                is_ai_response: false,
                suggested_price: None,
            }],
            constraints: PriceConstraints {
                listed_price: 4_000,
                min_price: Some(3_200),
            },
            instruction: None,
        }
    }

    #[tokio::test]
    async fn test_proposal_from_json_reply() {
        let provider = provider(
            r#"{"content": "Could you do 3400?", "suggested_price": 3400, "reasoning": "close to floor"}"#,
            FinishReason::Stop,
        );
        let agent = LlmNegotiationAgent::new(provider.clone(), None).unwrap();

        let proposal = agent.propose(&request()).await.unwrap();
        assert_eq!(proposal.suggested_price, Some(3_400));

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].json_output);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert!(seen[0].messages[0].content.contains("3200"));
    }

    #[tokio::test]
    async fn test_truncated_reply_is_rejected() {
        let agent =
            LlmNegotiationAgent::new(provider("{\"content\": \"Cou", FinishReason::Length), None)
                .unwrap();
        let result = agent.propose(&request()).await;
        assert!(matches!(result, Err(AgentError::InvalidProposal(_))));
    }

    #[test]
    fn test_invalid_template_fails_at_construction() {
        let result = LlmNegotiationAgent::new(
            provider("{}", FinishReason::Stop),
            Some("{{ unclosed".to_string()),
        );
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }
}
