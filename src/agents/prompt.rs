//! Prompt construction and response parsing for chat-model agents

use serde::Deserialize;
use tera::{Context, Tera};

use super::error::{AgentError, AgentResult};
use super::llm::ChatMessage;
use super::{Proposal, ProposalRequest, Speaker};
use crate::domain::Money;

/// Built-in system prompt, rendered with Tera
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You negotiate the price of "{{ item_name }}" on behalf of its seller at a flea market.
The listed price is {{ listed_price }}.
{% if min_price %}Never propose less than {{ min_price }}.{% else %}Do not go below the listed price.{% endif %}
Be polite and concise, and write in the language the buyer uses.
{% if instruction %}The seller asked you to revise your last draft: {{ instruction }}
{% endif %}
Reply with a single JSON object and nothing else:
{"content": "<message to the buyer>", "suggested_price": <integer or null>, "reasoning": "<private note for the seller>"}"#;

/// Render a system prompt template for a proposal request
pub fn render_system_prompt(template: &str, request: &ProposalRequest) -> AgentResult<String> {
    let mut context = Context::new();
    context.insert("item_id", &request.item_id);
    context.insert("item_name", &request.item_name);
    context.insert("listed_price", &request.constraints.listed_price);
    context.insert("min_price", &request.constraints.min_price);
    context.insert("instruction", &request.instruction);

    Ok(Tera::one_off(template, &context, false)?)
}

/// System prompt followed by the conversation, buyer as user and seller as
/// assistant
pub fn build_messages(system_prompt: String, request: &ProposalRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 1);
    messages.push(ChatMessage::system(system_prompt));

    for entry in &request.history {
        messages.push(match entry.speaker {
            Speaker::Buyer => ChatMessage::user(entry.content.clone()),
            Speaker::Seller => ChatMessage::assistant(entry.content.clone()),
        });
    }

    // Chat APIs expect the last turn to be the user's
    if request.history.last().map(|e| e.speaker) != Some(Speaker::Buyer) {
        messages.push(ChatMessage::user("(no new buyer message; revise your last proposal)"));
    }

    messages
}

#[derive(Debug, Deserialize)]
struct RawProposal {
    content: String,
    #[serde(default)]
    suggested_price: Option<serde_json::Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Parse a model reply into a proposal
///
/// Tolerates Markdown code fences and prose around the JSON object.
pub fn parse_proposal(text: &str) -> AgentResult<Proposal> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(AgentError::InvalidProposal(
                "response contains no JSON object".to_string(),
            ))
        }
    };

    let raw: RawProposal = serde_json::from_str(json)?;

    Ok(Proposal {
        content: raw.content.trim().to_string(),
        suggested_price: raw.suggested_price.as_ref().and_then(price_from_json),
        reasoning: raw.reasoning.unwrap_or_default(),
    })
}

/// Models return prices as numbers or strings; fractions are truncated
fn price_from_json(value: &serde_json::Value) -> Option<Money> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as Money)),
        serde_json::Value::String(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{HistoryEntry, PriceConstraints};
    use crate::agents::llm::Role;

    fn request(instruction: Option<&str>) -> ProposalRequest {
        ProposalRequest {
            item_id: "item-1".to_string(),
            item_name: "Film camera".to_string(),
            history: vec![HistoryEntry {
                speaker: Speaker::Buyer,
                content: "Would you take 7000?".to_string(),
                is_ai_response: false,
                suggested_price: None,
            }],
            constraints: PriceConstraints {
                listed_price: 10_000,
                min_price: Some(8_000),
            },
            instruction: instruction.map(String::from),
        }
    }

    #[test]
    fn test_default_prompt_renders_constraints() {
        let prompt = render_system_prompt(DEFAULT_SYSTEM_PROMPT, &request(None)).unwrap();
        assert!(prompt.contains("Film camera"));
        assert!(prompt.contains("10000"));
        assert!(prompt.contains("Never propose less than 8000"));
        assert!(!prompt.contains("revise"));
    }

    #[test]
    fn test_prompt_includes_instruction() {
        let prompt =
            render_system_prompt(DEFAULT_SYSTEM_PROMPT, &request(Some("hold at 9500"))).unwrap();
        assert!(prompt.contains("hold at 9500"));
    }

    #[test]
    fn test_broken_template_is_prompt_error() {
        let result = render_system_prompt("{% if %}", &request(None));
        assert!(matches!(result, Err(AgentError::Prompt(_))));
    }

    #[test]
    fn test_build_messages_maps_roles() {
        let messages = build_messages("sys".to_string(), &request(None));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"content\": \" How about 9000? \", \"suggested_price\": 9000, \"reasoning\": \"meet halfway\"}\n```";
        let proposal = parse_proposal(text).unwrap();
        assert_eq!(proposal.content, "How about 9000?");
        assert_eq!(proposal.suggested_price, Some(9_000));
        assert_eq!(proposal.reasoning, "meet halfway");
    }

    #[test]
    fn test_parse_string_price_and_missing_reasoning() {
        let proposal = parse_proposal(r#"{"content": "ok", "suggested_price": "¥8,500"}"#).unwrap();
        assert_eq!(proposal.suggested_price, Some(8_500));
        assert_eq!(proposal.reasoning, "");
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(matches!(
            parse_proposal("I think 9000 is fair"),
            Err(AgentError::InvalidProposal(_))
        ));
    }
}
