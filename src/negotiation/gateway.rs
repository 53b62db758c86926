//! Bounded, retried calls into the proposal capability

use backoff::ExponentialBackoffBuilder;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::NegotiationSettings;
use crate::adapters::metrics_handler::MetricsCollector;
use crate::agents::{
    AgentError, HistoryEntry, NegotiationAgent, PriceConstraints, Proposal, ProposalRequest,
    Speaker,
};
use crate::domain::{Item, Message, NegotiationError, NegotiationResult};

/// Most recent messages the buyer has actually seen, oldest first
///
/// Unresolved, rejected and superseded drafts never reached the buyer and
/// are left out.
pub fn bounded_history(item: &Item, messages: &[Message], limit: usize) -> Vec<HistoryEntry> {
    let visible: Vec<&Message> = messages
        .iter()
        .filter(|m| !m.is_draft() && !m.is_discarded())
        .collect();
    let skip = visible.len().saturating_sub(limit);

    visible[skip..]
        .iter()
        .map(|m| HistoryEntry {
            speaker: if item.is_seller(&m.sender_id) {
                Speaker::Seller
            } else {
                Speaker::Buyer
            },
            content: m.content.clone(),
            is_ai_response: m.is_ai_response,
            suggested_price: m.suggested_price,
        })
        .collect()
}

/// Reject proposals that cannot become a draft
fn validate(proposal: Proposal) -> Result<Proposal, AgentError> {
    let content = proposal.content.trim();
    if content.is_empty() {
        return Err(AgentError::InvalidProposal("empty content".to_string()));
    }
    if let Some(price) = proposal.suggested_price {
        if price <= 0 {
            return Err(AgentError::InvalidProposal(format!(
                "non-positive suggested price {}",
                price
            )));
        }
    }
    Ok(Proposal {
        content: content.to_string(),
        ..proposal
    })
}

pub struct AgentGateway {
    agent: Arc<dyn NegotiationAgent>,
    max_history_messages: usize,
    attempt_timeout: Duration,
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl AgentGateway {
    pub fn new(agent: Arc<dyn NegotiationAgent>, settings: &NegotiationSettings) -> Self {
        Self {
            agent,
            max_history_messages: settings.max_history_messages,
            attempt_timeout: Duration::from_millis(settings.agent_timeout_ms),
            max_attempts: settings.agent_max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.agent_initial_backoff_ms),
            max_backoff: Duration::from_millis(
                settings
                    .agent_max_backoff_ms
                    .max(settings.agent_initial_backoff_ms),
            ),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    /// Ask the agent for a proposal on `item` given its conversation
    ///
    /// Each attempt is cut off after the configured timeout; failed attempts
    /// are retried with exponential backoff up to the attempt bound, after
    /// which the last error is reported as `AgentUnavailable`.
    pub async fn propose(
        &self,
        item: &Item,
        messages: &[Message],
        instruction: Option<String>,
    ) -> NegotiationResult<Proposal> {
        if !item.accepts_drafting() {
            return Err(NegotiationError::NoActiveNegotiation(format!(
                "item {} is not open for negotiation",
                item.id
            )));
        }

        let request = ProposalRequest {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            history: bounded_history(item, messages, self.max_history_messages),
            constraints: PriceConstraints {
                listed_price: item.price,
                min_price: item.min_price,
            },
            instruction,
        };

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let started = Instant::now();
        let request = &request;

        let result = backoff::future::retry(policy, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                let outcome =
                    match tokio::time::timeout(self.attempt_timeout, self.agent.propose(request))
                        .await
                    {
                        Ok(Ok(proposal)) => validate(proposal),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(AgentError::Timeout(self.attempt_timeout.as_millis() as u64)),
                    };

                outcome.map_err(|e| {
                    tracing::warn!(
                        item_id = %request.item_id,
                        agent = self.agent.name(),
                        attempt,
                        error = %e,
                        "Proposal attempt failed"
                    );
                    if e.is_permanent() || attempt >= self.max_attempts {
                        backoff::Error::permanent(e)
                    } else {
                        backoff::Error::transient(e)
                    }
                })
            }
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        if let Some(metrics) = &self.metrics {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            metrics
                .agent_calls
                .with_label_values(&[self.agent.name(), outcome])
                .inc();
            metrics
                .agent_latency
                .with_label_values(&[self.agent.name()])
                .observe(started.elapsed().as_secs_f64());
        }

        match result {
            Ok(proposal) => {
                tracing::debug!(
                    item_id = %request.item_id,
                    attempts,
                    suggested_price = ?proposal.suggested_price,
                    "Proposal received"
                );
                Ok(proposal)
            }
            Err(e) => Err(NegotiationError::AgentUnavailable(format!(
                "{} (after {} attempt{})",
                e,
                attempts,
                if attempts == 1 { "" } else { "s" }
            ))),
        }
    }
}
