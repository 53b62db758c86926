//! Snapshots for polling clients

use super::authz;
use super::NegotiationEngine;
use crate::domain::{MessageView, NegotiationResult, NegotiationView};

impl NegotiationEngine {
    /// Item and conversation as seen by `viewer_id`
    ///
    /// Taken under the item's read lock, so it never shows a transition
    /// half-applied. `revision` changes whenever the item or its
    /// conversation does.
    pub async fn view(&self, item_id: &str, viewer_id: &str) -> NegotiationResult<NegotiationView> {
        let _guard = self.locks.read(item_id).await;
        let item = self.load_item(item_id).await?;
        let messages = self.store.list_messages(item_id).await?;

        let viewer_is_seller = item.is_seller(viewer_id);
        let can = authz::affordances(viewer_id, &item, &messages);

        Ok(NegotiationView {
            revision: item.revision,
            messages: messages
                .iter()
                .map(|m| MessageView::project(m, viewer_is_seller))
                .collect(),
            viewer_is_seller,
            can,
            poll_interval_ms: self.settings.poll_interval_ms,
            item,
        })
    }
}
