use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

pub struct MetricsCollector {
    registry: Registry,

    // Request metrics
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,
    pub requests_in_flight: Gauge,

    // Conversation metrics
    pub messages_appended: CounterVec,
    pub drafts_created: CounterVec,
    pub draft_transitions: CounterVec,

    // Agent metrics
    pub agent_calls: CounterVec,
    pub agent_latency: HistogramVec,

    // Item metrics
    pub price_mutations: CounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Request metrics
        let requests_total = CounterVec::new(
            Opts::new("smartnego_requests_total", "Total number of requests"),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "smartnego_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let requests_in_flight = Gauge::new(
            "smartnego_requests_in_flight",
            "Number of requests currently being processed",
        )?;
        registry.register(Box::new(requests_in_flight.clone()))?;

        // Conversation metrics
        let messages_appended = CounterVec::new(
            Opts::new(
                "smartnego_messages_appended_total",
                "Participant messages appended to conversations",
            ),
            &["role"],
        )?;
        registry.register(Box::new(messages_appended.clone()))?;

        let drafts_created = CounterVec::new(
            Opts::new("smartnego_drafts_created_total", "AI drafts installed"),
            &["trigger"],
        )?;
        registry.register(Box::new(drafts_created.clone()))?;

        let draft_transitions = CounterVec::new(
            Opts::new(
                "smartnego_draft_transitions_total",
                "Draft lifecycle transitions by kind and outcome",
            ),
            &["transition", "outcome"],
        )?;
        registry.register(Box::new(draft_transitions.clone()))?;

        // Agent metrics
        let agent_calls = CounterVec::new(
            Opts::new("smartnego_agent_calls_total", "Proposal calls by outcome"),
            &["agent", "outcome"],
        )?;
        registry.register(Box::new(agent_calls.clone()))?;

        let agent_latency = HistogramVec::new(
            HistogramOpts::new(
                "smartnego_agent_latency_seconds",
                "Proposal latency including retries",
            ),
            &["agent"],
        )?;
        registry.register(Box::new(agent_latency.clone()))?;

        // Item metrics
        let price_mutations = CounterVec::new(
            Opts::new("smartnego_price_mutations_total", "Item price changes"),
            &["source"],
        )?;
        registry.register(Box::new(price_mutations.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            requests_in_flight,
            messages_appended,
            drafts_created,
            draft_transitions,
            agent_calls,
            agent_latency,
            price_mutations,
        })
    }

    /// Count a lifecycle transition attempt
    pub fn record_transition(&self, transition: &str, succeeded: bool) {
        let outcome = if succeeded { "ok" } else { "error" };
        self.draft_transitions
            .with_label_values(&[transition, outcome])
            .inc();
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub async fn metrics(&self) -> String {
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}

/// Records request count, latency and in-flight gauge per matched route
pub async fn track_requests(
    State(collector): State<Arc<MetricsCollector>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    collector.requests_in_flight.inc();
    let started = Instant::now();
    let response = next.run(request).await;
    collector.requests_in_flight.dec();

    collector
        .request_duration
        .with_label_values(&[&method, &endpoint])
        .observe(started.elapsed().as_secs_f64());
    collector
        .requests_total
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}
