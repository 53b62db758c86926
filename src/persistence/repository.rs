//! SQLx-backed implementation of the negotiation store

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Row};
use uuid::Uuid;

use crate::domain::{
    DraftState, Item, ItemStatus, Message, MessageId, Money, NewMessage,
};
use crate::persistence::pool::{ConnectionPool, DatabaseBackend};
use crate::persistence::{
    next_timestamp, Appended, InstalledDraft, NegotiationStore, PersistenceError, ResolvedDraft,
    StoreResult,
};

const ITEM_COLUMNS: &str = "id, seller_id, name, price, min_price, negotiation_enabled, \
     status, buyer_id, revision, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, item_id, seq, sender_id, content, is_ai_response, \
     draft_state, ai_reasoning, suggested_price, reply_to_seq, request_id, created_at";

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn item_from_row(row: &AnyRow) -> StoreResult<Item> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let revision: i64 = row.try_get("revision")?;
    let negotiation_enabled: i64 = row.try_get("negotiation_enabled")?;

    Ok(Item {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        name: row.try_get("name")?,
        price: row.try_get("price")?,
        min_price: row.try_get("min_price")?,
        negotiation_enabled: negotiation_enabled != 0,
        status: ItemStatus::parse(&status).ok_or_else(|| {
            PersistenceError::Serialization(format!("unknown item status '{}'", status))
        })?,
        buyer_id: row.try_get("buyer_id")?,
        revision: revision.max(0) as u64,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn message_from_row(row: &AnyRow) -> StoreResult<Message> {
    let id: String = row.try_get("id")?;
    let draft_state: Option<String> = row.try_get("draft_state")?;
    let is_ai_response: i64 = row.try_get("is_ai_response")?;
    let created_at: String = row.try_get("created_at")?;

    let draft_state = match draft_state {
        Some(value) => Some(DraftState::parse(&value).ok_or_else(|| {
            PersistenceError::Serialization(format!("unknown draft state '{}'", value))
        })?),
        None => None,
    };

    Ok(Message {
        id: Uuid::parse_str(&id)
            .map_err(|e| PersistenceError::Serialization(format!("bad message id: {}", e)))?,
        seq: row.try_get("seq")?,
        item_id: row.try_get("item_id")?,
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        is_ai_response: is_ai_response != 0,
        draft_state,
        ai_reasoning: row.try_get("ai_reasoning")?,
        suggested_price: row.try_get("suggested_price")?,
        reply_to_seq: row.try_get("reply_to_seq")?,
        request_id: row.try_get("request_id")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

async fn fetch_item(
    conn: &mut AnyConnection,
    backend: DatabaseBackend,
    item_id: &str,
) -> StoreResult<Option<Item>> {
    let sql = format!("SELECT {} FROM items WHERE id = ?", ITEM_COLUMNS);
    let row = sqlx::query(&backend.bind_params(&sql))
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(item_from_row).transpose()
}

async fn require_item(
    conn: &mut AnyConnection,
    backend: DatabaseBackend,
    item_id: &str,
) -> StoreResult<Item> {
    fetch_item(conn, backend, item_id)
        .await?
        .ok_or_else(|| PersistenceError::not_found("item", item_id))
}

async fn fetch_message(
    conn: &mut AnyConnection,
    backend: DatabaseBackend,
    message_id: MessageId,
) -> StoreResult<Option<Message>> {
    let row = sqlx::query(&backend.bind_params(&format!(
        "SELECT {} FROM messages WHERE id = ?",
        MESSAGE_COLUMNS
    )))
    .bind(message_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(message_from_row).transpose()
}

async fn touch_item(
    conn: &mut AnyConnection,
    backend: DatabaseBackend,
    item_id: &str,
) -> StoreResult<()> {
    sqlx::query(&backend.bind_params(
        "UPDATE items SET revision = revision + 1, updated_at = ? WHERE id = ?",
    ))
    .bind(format_timestamp(&Utc::now()))
    .bind(item_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_message(
    conn: &mut AnyConnection,
    backend: DatabaseBackend,
    new: NewMessage,
    draft_state: Option<DraftState>,
) -> StoreResult<Message> {
    let last = sqlx::query(&backend.bind_params(
        "SELECT seq, created_at FROM messages WHERE item_id = ? ORDER BY seq DESC LIMIT 1",
    ))
    .bind(&new.item_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (seq, previous) = match last {
        Some(row) => {
            let seq: i64 = row.try_get("seq")?;
            let created_at: String = row.try_get("created_at")?;
            (seq + 1, Some(parse_timestamp(&created_at)?))
        }
        None => (1, None),
    };

    let message = Message {
        id: Uuid::new_v4(),
        seq,
        item_id: new.item_id,
        sender_id: new.sender_id,
        content: new.content,
        is_ai_response: new.is_ai_response,
        draft_state,
        ai_reasoning: new.ai_reasoning,
        suggested_price: new.suggested_price,
        reply_to_seq: new.reply_to_seq,
        request_id: new.request_id,
        created_at: next_timestamp(previous),
    };

    sqlx::query(&backend.bind_params(&format!(
        "INSERT INTO messages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        MESSAGE_COLUMNS
    )))
    .bind(message.id.to_string())
    .bind(&message.item_id)
    .bind(message.seq)
    .bind(&message.sender_id)
    .bind(&message.content)
    .bind(message.is_ai_response as i64)
    .bind(message.draft_state.map(|s| s.as_str()))
    .bind(message.ai_reasoning.as_deref())
    .bind(message.suggested_price)
    .bind(message.reply_to_seq)
    .bind(message.request_id.as_deref())
    .bind(format_timestamp(&message.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(message)
}

/// SQLx-based implementation of [`NegotiationStore`]
pub struct SqlxNegotiationStore {
    pool: ConnectionPool,
}

impl SqlxNegotiationStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait]
impl NegotiationStore for SqlxNegotiationStore {
    async fn insert_item(&self, item: &Item) -> StoreResult<Item> {
        let backend = self.pool.backend();
        let mut tx = self.pool.pool().begin().await?;

        if fetch_item(&mut tx, backend, &item.id).await?.is_some() {
            return Err(PersistenceError::Duplicate {
                entity_type: "item".to_string(),
                identifier: item.id.clone(),
            });
        }

        sqlx::query(&backend.bind_params(&format!(
            "INSERT INTO items ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ITEM_COLUMNS
        )))
        .bind(&item.id)
        .bind(&item.seller_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(item.min_price)
        .bind(item.negotiation_enabled as i64)
        .bind(item.status.as_str())
        .bind(item.buyer_id.as_deref())
        .bind(item.revision as i64)
        .bind(format_timestamp(&item.created_at))
        .bind(format_timestamp(&item.updated_at))
        .execute(&mut *tx)
        .await?;

        let stored = require_item(&mut tx, backend, &item.id).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_item(&self, item_id: &str) -> StoreResult<Option<Item>> {
        let backend = self.pool.backend();
        let mut conn = self.pool.pool().acquire().await?;
        fetch_item(&mut conn, backend, item_id).await
    }

    async fn update_item(&self, item: &Item) -> StoreResult<Item> {
        let backend = self.pool.backend();
        let mut tx = self.pool.pool().begin().await?;

        let result = sqlx::query(&backend.bind_params(
            "UPDATE items SET price = ?, min_price = ?, negotiation_enabled = ?, status = ?, \
             buyer_id = ?, revision = revision + 1, updated_at = ? WHERE id = ?",
        ))
        .bind(item.price)
        .bind(item.min_price)
        .bind(item.negotiation_enabled as i64)
        .bind(item.status.as_str())
        .bind(item.buyer_id.as_deref())
        .bind(format_timestamp(&Utc::now()))
        .bind(&item.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::not_found("item", &item.id));
        }

        let stored = require_item(&mut tx, backend, &item.id).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Appended> {
        let backend = self.pool.backend();
        let mut tx = self.pool.pool().begin().await?;
        require_item(&mut tx, backend, &message.item_id).await?;

        if let Some(request_id) = message.request_id.as_deref() {
            let existing = sqlx::query(&backend.bind_params(&format!(
                "SELECT {} FROM messages WHERE item_id = ? AND sender_id = ? AND request_id = ?",
                MESSAGE_COLUMNS
            )))
            .bind(&message.item_id)
            .bind(&message.sender_id)
            .bind(request_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = existing {
                return Ok(Appended {
                    message: message_from_row(&row)?,
                    duplicate: true,
                });
            }
        }

        let draft_state = message.is_ai_response.then_some(DraftState::Draft);
        let item_id = message.item_id.clone();
        let stored = insert_message(&mut tx, backend, message, draft_state).await?;
        touch_item(&mut tx, backend, &item_id).await?;
        tx.commit().await?;

        Ok(Appended {
            message: stored,
            duplicate: false,
        })
    }

    async fn get_message(&self, message_id: MessageId) -> StoreResult<Option<Message>> {
        let backend = self.pool.backend();
        let mut conn = self.pool.pool().acquire().await?;
        fetch_message(&mut conn, backend, message_id).await
    }

    async fn list_messages(&self, item_id: &str) -> StoreResult<Vec<Message>> {
        let backend = self.pool.backend();
        let rows = sqlx::query(&backend.bind_params(&format!(
            "SELECT {} FROM messages WHERE item_id = ? ORDER BY created_at, seq",
            MESSAGE_COLUMNS
        )))
        .bind(item_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn current_draft(&self, item_id: &str) -> StoreResult<Option<Message>> {
        let backend = self.pool.backend();
        let row = sqlx::query(&backend.bind_params(&format!(
            "SELECT {} FROM messages WHERE item_id = ? AND draft_state = 'draft' \
             ORDER BY seq DESC LIMIT 1",
            MESSAGE_COLUMNS
        )))
        .bind(item_id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn install_draft(&self, draft: NewMessage) -> StoreResult<InstalledDraft> {
        let backend = self.pool.backend();
        let mut tx = self.pool.pool().begin().await?;
        require_item(&mut tx, backend, &draft.item_id).await?;

        let rows = sqlx::query(&backend.bind_params(
            "SELECT id FROM messages WHERE item_id = ? AND draft_state = 'draft'",
        ))
            .bind(&draft.item_id)
            .fetch_all(&mut *tx)
            .await?;
        let mut superseded = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            superseded.push(Uuid::parse_str(&id).map_err(|e| {
                PersistenceError::Serialization(format!("bad message id: {}", e))
            })?);
        }

        sqlx::query(&backend.bind_params(
            "UPDATE messages SET draft_state = 'superseded' \
             WHERE item_id = ? AND draft_state = 'draft'",
        ))
        .bind(&draft.item_id)
        .execute(&mut *tx)
        .await?;

        let item_id = draft.item_id.clone();
        let stored = insert_message(&mut tx, backend, draft, Some(DraftState::Draft)).await?;
        touch_item(&mut tx, backend, &item_id).await?;
        let item = require_item(&mut tx, backend, &item_id).await?;
        tx.commit().await?;

        Ok(InstalledDraft {
            draft: stored,
            superseded,
            item,
        })
    }

    async fn resolve_draft(
        &self,
        message_id: MessageId,
        state: DraftState,
        price: Option<Money>,
    ) -> StoreResult<ResolvedDraft> {
        let backend = self.pool.backend();
        if state == DraftState::Draft {
            return Err(PersistenceError::Internal(
                "resolve_draft requires a terminal state".to_string(),
            ));
        }

        // Any early return drops the transaction, which rolls it back
        let mut tx = self.pool.pool().begin().await?;

        let message = fetch_message(&mut tx, backend, message_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found("message", message_id))?;

        let transitioned = sqlx::query(&backend.bind_params(
            "UPDATE messages SET draft_state = ? WHERE id = ? AND draft_state = 'draft'",
        ))
        .bind(state.as_str())
        .bind(message_id.to_string())
        .execute(&mut *tx)
        .await?;
        if transitioned.rows_affected() == 0 {
            return Err(PersistenceError::StateConflict(format!(
                "message {} is not a draft",
                message_id
            )));
        }

        match price {
            Some(price) => {
                let updated = sqlx::query(&backend.bind_params(
                    "UPDATE items SET price = ?, revision = revision + 1, updated_at = ? \
                     WHERE id = ? AND status = 'on_sale'",
                ))
                .bind(price)
                .bind(format_timestamp(&Utc::now()))
                .bind(&message.item_id)
                .execute(&mut *tx)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(PersistenceError::StateConflict(format!(
                        "item {} is no longer on sale",
                        message.item_id
                    )));
                }
            }
            None => touch_item(&mut tx, backend, &message.item_id).await?,
        }

        let message = fetch_message(&mut tx, backend, message_id)
            .await?
            .ok_or_else(|| PersistenceError::not_found("message", message_id))?;
        let item = require_item(&mut tx, backend, &message.item_id).await?;
        tx.commit().await?;

        Ok(ResolvedDraft { message, item })
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.pool.health_check().await
    }
}
