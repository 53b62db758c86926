#![allow(dead_code)]

use async_trait::async_trait;
use smartnego::agents::{AgentError, AgentResult, NegotiationAgent, Proposal, ProposalRequest};
use smartnego::domain::{DraftState, MessageId, NewItem};
use smartnego::negotiation::{NegotiationEngine, NegotiationSettings};
use smartnego::persistence::{InMemoryStore, NegotiationStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const ITEM: &str = "item-1";
pub const SELLER: &str = "seller";
pub const BUYER: &str = "buyer";

/// Agent that returns queued proposals in order and records every request
#[derive(Default)]
pub struct ScriptedAgent {
    proposals: Mutex<VecDeque<Proposal>>,
    pub requests: Mutex<Vec<ProposalRequest>>,
}

impl ScriptedAgent {
    pub fn new(prices: &[i64]) -> Self {
        let proposals = prices
            .iter()
            .map(|&price| Proposal {
                content: format!("How about ¥{}?", price),
                suggested_price: Some(price),
                reasoning: format!("countering at {}", price),
            })
            .collect();
        Self {
            proposals: Mutex::new(proposals),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn instructions(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.instruction.clone())
            .collect()
    }
}

#[async_trait]
impl NegotiationAgent for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn propose(&self, request: &ProposalRequest) -> AgentResult<Proposal> {
        self.requests.lock().unwrap().push(request.clone());
        self.proposals
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::InvalidProposal("script exhausted".to_string()))
    }
}

/// Agent whose first call blocks until released
#[derive(Default)]
pub struct GatedAgent {
    calls: AtomicUsize,
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl NegotiationAgent for GatedAgent {
    fn name(&self) -> &str {
        "gated"
    }

    async fn propose(&self, _request: &ProposalRequest) -> AgentResult<Proposal> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(Proposal {
            content: format!("reply {}", call),
            suggested_price: Some(9_000 + call as i64 * 100),
            reasoning: String::new(),
        })
    }
}

/// Agent whose first calls each block until their own gate opens
pub struct SequencedAgent {
    calls: AtomicUsize,
    pub entered: Vec<Notify>,
    pub gates: Vec<Notify>,
}

impl SequencedAgent {
    pub fn new(gated_calls: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            entered: (0..gated_calls).map(|_| Notify::new()).collect(),
            gates: (0..gated_calls).map(|_| Notify::new()).collect(),
        }
    }
}

#[async_trait]
impl NegotiationAgent for SequencedAgent {
    fn name(&self) -> &str {
        "sequenced"
    }

    async fn propose(&self, request: &ProposalRequest) -> AgentResult<Proposal> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.gates.len() {
            self.entered[call].notify_one();
            self.gates[call].notified().await;
        }
        let answering = request
            .last_buyer_message()
            .map(|entry| entry.content.clone())
            .unwrap_or_default();
        Ok(Proposal {
            content: format!("reply to {}", answering),
            suggested_price: Some(9_500),
            reasoning: String::new(),
        })
    }
}

/// Agent that never answers in time
pub struct StalledAgent;

#[async_trait]
impl NegotiationAgent for StalledAgent {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn propose(&self, _request: &ProposalRequest) -> AgentResult<Proposal> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Err(AgentError::Timeout(60_000))
    }
}

pub fn fast_settings() -> NegotiationSettings {
    NegotiationSettings {
        agent_timeout_ms: 200,
        agent_max_attempts: 2,
        agent_initial_backoff_ms: 1,
        agent_max_backoff_ms: 5,
        ..Default::default()
    }
}

pub fn listing(price: i64, min_price: Option<i64>) -> NewItem {
    NewItem {
        id: ITEM.to_string(),
        seller_id: SELLER.to_string(),
        name: "Camera".to_string(),
        price,
        min_price,
        negotiation_enabled: true,
    }
}

pub async fn engine_with(
    store: Arc<dyn NegotiationStore>,
    agent: Arc<dyn NegotiationAgent>,
    item: NewItem,
) -> Arc<NegotiationEngine> {
    let engine = NegotiationEngine::new(store, agent, fast_settings());
    engine.register_item(SELLER, item).await.unwrap();
    Arc::new(engine)
}

pub async fn engine(agent: Arc<dyn NegotiationAgent>, item: NewItem) -> Arc<NegotiationEngine> {
    engine_with(Arc::new(InMemoryStore::new()), agent, item).await
}

/// Ids of messages currently in `state`, as the seller sees them
pub async fn ids_in_state(engine: &NegotiationEngine, state: DraftState) -> Vec<MessageId> {
    engine
        .list(ITEM, SELLER)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.state == Some(state))
        .map(|m| m.id)
        .collect()
}
