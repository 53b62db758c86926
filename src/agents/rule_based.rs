//! Deterministic offline negotiation strategy
//!
//! Each round concedes a fixed share of the gap between the seller's last
//! asking price and the buyer's latest offer, never going below the floor.
//! A seller instruction containing an amount pins the next proposal to it;
//! one asking to hold firm repeats the current asking price.

use async_trait::async_trait;

use super::config::RuleBasedConfig;
use super::error::AgentResult;
use super::{NegotiationAgent, Proposal, ProposalRequest, Speaker};
use crate::domain::Money;

/// Counter offers are rounded up to this step
const PRICE_STEP: Money = 10;

pub struct RuleBasedAgent {
    config: RuleBasedConfig,
}

impl RuleBasedAgent {
    pub fn new(config: RuleBasedConfig) -> Self {
        Self { config }
    }

    /// Price the seller currently stands by: the last proposed price, or the
    /// listed price before any proposal
    fn asking_price(request: &ProposalRequest) -> Money {
        request
            .history
            .iter()
            .rev()
            .filter(|entry| entry.speaker == Speaker::Seller)
            .find_map(|entry| entry.suggested_price)
            .unwrap_or(request.constraints.listed_price)
    }

    fn counter(&self, asking: Money, offer: Money, floor: Money) -> Money {
        let gap = (asking - offer).max(0) as f64;
        let conceded = (gap * self.config.concession_ratio).round() as Money;
        let counter = round_up(asking - conceded);
        counter.clamp(floor, asking.max(floor))
    }
}

impl Default for RuleBasedAgent {
    fn default() -> Self {
        Self::new(RuleBasedConfig::default())
    }
}

#[async_trait]
impl NegotiationAgent for RuleBasedAgent {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn propose(&self, request: &ProposalRequest) -> AgentResult<Proposal> {
        let listed = request.constraints.listed_price;
        let floor = request.constraints.floor().min(listed);
        let asking = Self::asking_price(request).clamp(floor, listed);

        if let Some(instruction) = request.instruction.as_deref() {
            if let Some(target) = extract_amount(instruction) {
                return Ok(Proposal {
                    content: format!(
                        "Thank you for waiting. I can offer it for {} yen.",
                        target
                    ),
                    suggested_price: Some(target),
                    reasoning: format!("Price set by seller instruction: {}", instruction),
                });
            }
            if holds_firm(instruction) {
                return Ok(Proposal {
                    content: format!(
                        "Thank you for the offer. {} yen is the best I can do.",
                        asking
                    ),
                    suggested_price: Some(asking),
                    reasoning: format!("Holding at {} per seller instruction: {}", asking, instruction),
                });
            }
        }

        let offer = request
            .last_buyer_message()
            .and_then(|entry| extract_amount(&entry.content));

        let proposal = match offer {
            None => Proposal {
                content: format!(
                    "Thank you for your interest! It is currently {} yen. Let me know what price you had in mind.",
                    asking
                ),
                suggested_price: None,
                reasoning: "No amount in the buyer's message; restated the asking price.".to_string(),
            },
            Some(offer) if offer >= asking => Proposal {
                content: format!("Deal! I can sell it for {} yen.", asking),
                suggested_price: Some(asking),
                reasoning: format!("Offer {} meets the asking price {}.", offer, asking),
            },
            Some(offer)
                if offer >= floor
                    && (asking - offer) as f64 <= asking as f64 * self.config.acceptance_margin =>
            {
                Proposal {
                    content: format!("Deal! {} yen works for me.", offer),
                    suggested_price: Some(offer),
                    reasoning: format!(
                        "Offer {} is within the acceptance margin of {}.",
                        offer, asking
                    ),
                }
            }
            Some(offer) => {
                let counter = self.counter(asking, offer, floor);
                let reasoning = if counter == floor && offer < floor {
                    format!(
                        "Offer {} is below the floor {}; countered at the floor.",
                        offer, floor
                    )
                } else {
                    format!(
                        "Conceded {:.0}% of the gap between {} and {}.",
                        self.config.concession_ratio * 100.0,
                        asking,
                        offer
                    )
                };
                Proposal {
                    content: format!("Thanks for the offer. How about {} yen?", counter),
                    suggested_price: Some(counter),
                    reasoning,
                }
            }
        };

        Ok(proposal)
    }
}

fn round_up(price: Money) -> Money {
    price.saturating_add(PRICE_STEP - 1).div_euclid(PRICE_STEP) * PRICE_STEP
}

fn holds_firm(instruction: &str) -> bool {
    let lower = instruction.to_lowercase();
    ["firm", "hold", "no discount", "don't lower", "do not lower"]
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Largest amount mentioned in free text
///
/// Accepts thousands separators and full-width digits ("７，０００円").
pub fn extract_amount(text: &str) -> Option<Money> {
    let mut best: Option<Money> = None;
    let mut digits = String::new();

    for c in text.chars().chain(std::iter::once(' ')) {
        let c = match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' => ',',
            other => other,
        };

        if c.is_ascii_digit() {
            digits.push(c);
        } else if c == ',' && !digits.is_empty() {
            continue;
        } else if !digits.is_empty() {
            if let Ok(value) = digits.parse::<Money>() {
                best = Some(best.map_or(value, |b| b.max(value)));
            }
            digits.clear();
        }
    }

    best.filter(|value| *value > 0)
}
