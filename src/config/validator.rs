use thiserror::Error;

use crate::agents::config::AgentKind;
use crate::config::Settings;
use crate::domain::auth::AuthMode;
use crate::persistence::{DatabaseBackend, StoreBackend};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Checks a loaded configuration, collecting every problem instead of
/// stopping at the first
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(settings, &mut errors);
        Self::validate_auth(settings, &mut errors);
        Self::validate_negotiation(settings, &mut errors);
        Self::validate_agent(settings, &mut errors);
        Self::validate_persistence(settings, &mut errors);
        Self::validate_rate_limit(settings, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(settings: &Settings, errors: &mut Vec<ValidationError>) {
        if settings.server.host.is_empty() {
            errors.push(ValidationError::MissingField("server.host".to_string()));
        }
        if settings.server.port == 0 {
            errors.push(invalid("server.port", "Port must be greater than 0"));
        }
    }

    fn validate_auth(settings: &Settings, errors: &mut Vec<ValidationError>) {
        let auth = &settings.auth;
        match auth.mode {
            AuthMode::Header => {
                if auth.identity_header.trim().is_empty() {
                    errors.push(ValidationError::MissingField(
                        "auth.identity_header".to_string(),
                    ));
                }
            }
            AuthMode::BearerToken => {
                if auth.jwt_secret.as_deref().map_or(true, str::is_empty) {
                    errors.push(ValidationError::MissingField("auth.jwt_secret".to_string()));
                }
                if let Some(alg) = auth.jwt_algorithm.as_deref() {
                    if !matches!(alg, "HS256" | "HS384" | "HS512") {
                        errors.push(invalid(
                            "auth.jwt_algorithm",
                            format!("unsupported algorithm '{}'", alg),
                        ));
                    }
                }
            }
        }
    }

    fn validate_negotiation(settings: &Settings, errors: &mut Vec<ValidationError>) {
        let n = &settings.negotiation;
        if n.max_history_messages == 0 {
            errors.push(invalid("negotiation.max_history_messages", "must be at least 1"));
        }
        if n.agent_timeout_ms == 0 {
            errors.push(invalid("negotiation.agent_timeout_ms", "must be greater than 0"));
        }
        if n.agent_max_attempts == 0 {
            errors.push(invalid("negotiation.agent_max_attempts", "must be at least 1"));
        }
        if n.agent_initial_backoff_ms > n.agent_max_backoff_ms {
            errors.push(invalid(
                "negotiation.agent_initial_backoff_ms",
                "must not exceed agent_max_backoff_ms",
            ));
        }
        if n.max_message_chars == 0 {
            errors.push(invalid("negotiation.max_message_chars", "must be at least 1"));
        }
        if n.poll_interval_ms == 0 {
            errors.push(invalid("negotiation.poll_interval_ms", "must be greater than 0"));
        }
    }

    fn validate_agent(settings: &Settings, errors: &mut Vec<ValidationError>) {
        let agent = &settings.agent;
        match agent.kind {
            AgentKind::RuleBased => {
                let ratio = agent.rule_based.concession_ratio;
                if !(ratio > 0.0 && ratio <= 1.0) {
                    errors.push(invalid(
                        "agent.rule_based.concession_ratio",
                        "must be in (0, 1]",
                    ));
                }
                let margin = agent.rule_based.acceptance_margin;
                if !(0.0..1.0).contains(&margin) {
                    errors.push(invalid(
                        "agent.rule_based.acceptance_margin",
                        "must be in [0, 1)",
                    ));
                }
            }
            AgentKind::Llm => match &agent.llm {
                None => errors.push(ValidationError::MissingField("agent.llm".to_string())),
                Some(llm) => {
                    if llm.model.trim().is_empty() {
                        errors.push(ValidationError::MissingField("agent.llm.model".to_string()));
                    }
                    if let Some(t) = llm.temperature {
                        if !(0.0..=2.0).contains(&t) {
                            errors.push(invalid("agent.llm.temperature", "must be in [0, 2]"));
                        }
                    }
                }
            },
        }

        if let Some(template) = &agent.system_prompt {
            if let Err(e) = tera::Tera::default().add_raw_template("system_prompt", template) {
                errors.push(invalid("agent.system_prompt", e.to_string()));
            }
        }
    }

    fn validate_persistence(settings: &Settings, errors: &mut Vec<ValidationError>) {
        let p = &settings.persistence;
        if p.backend == StoreBackend::Database {
            if let Err(e) = DatabaseBackend::from_url(&p.url) {
                errors.push(invalid("persistence.url", e.to_string()));
            }
            if p.max_connections == 0 {
                errors.push(invalid("persistence.max_connections", "must be at least 1"));
            }
        }
    }

    fn validate_rate_limit(settings: &Settings, errors: &mut Vec<ValidationError>) {
        if let Some(rl) = settings.rate_limit.as_ref().filter(|rl| rl.enabled) {
            if rl.requests_per_second == 0 {
                errors.push(invalid("rate_limit.requests_per_second", "must be at least 1"));
            }
            if rl.burst_size == 0 {
                errors.push(invalid("rate_limit.burst_size", "must be at least 1"));
            }
        }
    }
}
