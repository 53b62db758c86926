//! Appending participant messages and triggering drafts

use super::{normalize_text, NegotiationEngine};
use crate::agents::Proposal;
use crate::domain::{
    AppendOutcome, DraftingOutcome, Item, Message, MessageView, NegotiationResult, NewMessage,
};

impl NegotiationEngine {
    /// Append a participant message to an item's conversation
    ///
    /// A fresh buyer message on an item open for negotiation is followed by
    /// a proposal call; the resulting draft is installed before this returns.
    /// Agent failure is reported in [`AppendOutcome::drafting`], the message
    /// itself stays recorded.
    pub async fn append(
        &self,
        item_id: &str,
        sender_id: &str,
        content: &str,
        request_id: Option<String>,
    ) -> NegotiationResult<AppendOutcome> {
        let content = normalize_text("content", content, self.settings.max_message_chars)?;
        let request_id = request_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let (item, appended) = {
            let _guard = self.locks.write(item_id).await;
            let item = self.load_item(item_id).await?;
            let appended = self
                .store
                .append_message(
                    NewMessage::human(item_id, sender_id, content).with_request_id(request_id),
                )
                .await?;
            (item, appended)
        };

        if appended.duplicate {
            tracing::debug!(
                item_id,
                actor_id = sender_id,
                message_id = %appended.message.id,
                "Duplicate append ignored"
            );
            return Ok(AppendOutcome {
                message: appended.message,
                duplicate: true,
                drafting: DraftingOutcome::NotApplicable,
            });
        }

        let from_seller = item.is_seller(sender_id);
        self.record(|m| {
            m.messages_appended
                .with_label_values(&[if from_seller { "seller" } else { "buyer" }])
                .inc()
        });
        tracing::info!(
            item_id,
            actor_id = sender_id,
            message_id = %appended.message.id,
            "Message appended"
        );

        let drafting = if !from_seller && item.accepts_drafting() {
            self.draft_reply(item_id, &appended.message).await
        } else {
            DraftingOutcome::NotApplicable
        };

        Ok(AppendOutcome {
            message: appended.message,
            duplicate: false,
            drafting,
        })
    }

    /// Messages of an item as seen by `viewer_id`, in conversation order
    pub async fn list(&self, item_id: &str, viewer_id: &str) -> NegotiationResult<Vec<MessageView>> {
        let _guard = self.locks.read(item_id).await;
        let item = self.load_item(item_id).await?;
        let viewer_is_seller = item.is_seller(viewer_id);
        let messages = self.store.list_messages(item_id).await?;
        Ok(messages
            .iter()
            .map(|m| MessageView::project(m, viewer_is_seller))
            .collect())
    }

    /// Produce and install a draft answering `trigger`
    ///
    /// The proposal is requested without holding the item lock; installation
    /// re-checks the item and drops the proposal if the current draft was
    /// already built from this message or a later one.
    async fn draft_reply(&self, item_id: &str, trigger: &Message) -> DraftingOutcome {
        let (item, messages) = match self.load_conversation(item_id).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(item_id, error = %e, "Could not load conversation for drafting");
                return DraftingOutcome::StorageUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        let proposal = match self.gateway.propose(&item, &messages, None).await {
            Ok(proposal) => proposal,
            Err(e) => {
                tracing::warn!(
                    item_id,
                    trigger_id = %trigger.id,
                    error = %e,
                    "No draft produced"
                );
                return DraftingOutcome::AgentUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        let reply_to = last_buyer_seq(&item, &messages);
        match self.install_reply(item_id, trigger, reply_to, proposal).await {
            Ok(outcome) => {
                match &outcome {
                    DraftingOutcome::Drafted { .. } => self.record(|m| {
                        m.drafts_created.with_label_values(&["buyer_message"]).inc()
                    }),
                    DraftingOutcome::Skipped { reason } => tracing::info!(
                        item_id,
                        trigger_id = %trigger.id,
                        reason = %reason,
                        "Stale draft discarded"
                    ),
                    _ => {}
                }
                outcome
            }
            Err(e) => {
                tracing::error!(item_id, error = %e, "Could not install draft");
                DraftingOutcome::StorageUnavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn load_conversation(&self, item_id: &str) -> NegotiationResult<(Item, Vec<Message>)> {
        let item = self.load_item(item_id).await?;
        let messages = self.store.list_messages(item_id).await?;
        Ok((item, messages))
    }

    async fn install_reply(
        &self,
        item_id: &str,
        trigger: &Message,
        reply_to: Option<i64>,
        proposal: Proposal,
    ) -> NegotiationResult<DraftingOutcome> {
        let _guard = self.locks.write(item_id).await;

        let item = self.load_item(item_id).await?;
        if !item.accepts_drafting() {
            return Ok(DraftingOutcome::Skipped {
                reason: "item is no longer open for negotiation".to_string(),
            });
        }
        if let Some(current) = self.store.current_draft(item_id).await? {
            if let Some(answered) = current.reply_to_seq {
                if answered >= trigger.seq {
                    return Ok(DraftingOutcome::Skipped {
                        reason: format!(
                            "draft {} already answers message #{}",
                            current.id, answered
                        ),
                    });
                }
            }
        }

        let installed = self
            .store
            .install_draft(NewMessage::draft(
                &item,
                proposal.content,
                proposal.suggested_price,
                proposal.reasoning,
            )
            .replying_to(reply_to))
            .await?;
        tracing::info!(
            item_id,
            message_id = %installed.draft.id,
            superseded = installed.superseded.len(),
            suggested_price = ?installed.draft.suggested_price,
            "Draft installed"
        );

        Ok(DraftingOutcome::Drafted {
            draft_id: installed.draft.id,
        })
    }
}

/// Seq of the latest buyer message in `messages`
pub(super) fn last_buyer_seq(item: &Item, messages: &[Message]) -> Option<i64> {
    messages
        .iter()
        .filter(|m| !m.is_ai_response && !item.is_seller(&m.sender_id))
        .map(|m| m.seq)
        .max()
}
