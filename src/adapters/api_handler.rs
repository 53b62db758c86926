//! REST API handlers for the negotiation workflow
//!
//! Every handler resolves the acting user from the [`AuthContext`] placed in
//! the request extensions by the auth middleware and delegates to
//! [`NegotiationEngine`]. Errors are rendered as an [`ApiResponse`] with a
//! stable `code` next to the message.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapters::auth_middleware::AuthError;
use crate::domain::auth::AuthContext;
use crate::domain::{
    ActorId, AppendOutcome, Item, MessageId, MessageView, Money, NegotiationError,
    NegotiationView, NewItem,
};
use crate::negotiation::{NegotiationEngine, ResolutionOutcome, RevisionOutcome};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<NegotiationEngine>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: None,
        }
    }
}

/// A failed negotiation operation, rendered with its HTTP status
#[derive(Debug)]
pub struct ApiError(pub NegotiationError);

impl From<NegotiationError> for ApiError {
    fn from(err: NegotiationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }
        let body = ApiResponse::<()> {
            code: Some(self.0.code()),
            ..ApiResponse::error(self.0.to_string())
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// The authenticated user acting on a request
#[derive(Debug, Clone)]
pub struct Actor(pub ActorId);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .filter(|ctx| ctx.authenticated)
            .and_then(|ctx| ctx.user_id.clone())
            .map(Actor)
            .ok_or(AuthError::MissingCredentials)
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub min_price: Option<Money>,
    #[serde(default)]
    pub negotiation_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryRequest {
    #[serde(default)]
    pub instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: Money,
}

#[derive(Debug, Deserialize)]
pub struct NegotiationConfigRequest {
    pub enabled: bool,
    #[serde(default)]
    pub min_price: Option<Money>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseRequest {
    #[serde(default)]
    pub expected_price: Option<Money>,
}

// ============================================================================
// Item Handlers
// ============================================================================

/// POST /api/items - Register an item; the caller becomes its seller
pub async fn register_item(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Json(req): Json<RegisterItemRequest>,
) -> ApiResult<Item> {
    let item = state
        .engine
        .register_item(
            &actor,
            NewItem {
                id: req.id,
                seller_id: actor.clone(),
                name: req.name,
                price: req.price,
                min_price: req.min_price,
                negotiation_enabled: req.negotiation_enabled,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}

/// GET /api/items/:id/view - Polling snapshot for the caller
pub async fn get_view(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
) -> ApiResult<NegotiationView> {
    ok(state.engine.view(&item_id, &actor).await?)
}

/// GET /api/items/:id/messages - Conversation as seen by the caller
pub async fn list_messages(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
) -> ApiResult<Vec<MessageView>> {
    ok(state.engine.list(&item_id, &actor).await?)
}

/// POST /api/items/:id/messages - Append a message
///
/// Answers 201 for a new message and 200 when `request_id` matched an
/// earlier append.
pub async fn append_message(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> ApiResult<AppendOutcome> {
    let outcome = state
        .engine
        .append(&item_id, &actor, &req.content, req.request_id)
        .await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::success(outcome))))
}

/// POST /api/items/:id/retry - Ask the agent for a revised draft
pub async fn retry_draft(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    body: Option<Json<RetryRequest>>,
) -> ApiResult<RevisionOutcome> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let outcome = state
        .engine
        .retry(&item_id, &actor, req.instruction.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

/// PUT /api/items/:id/price - Change the listed price directly
pub async fn update_price(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(req): Json<PriceRequest>,
) -> ApiResult<Item> {
    ok(state.engine.apply_price(&item_id, req.price, &actor).await?)
}

/// PUT /api/items/:id/negotiation - Toggle AI negotiation and the floor price
pub async fn update_negotiation(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    Json(req): Json<NegotiationConfigRequest>,
) -> ApiResult<Item> {
    ok(state
        .engine
        .configure_negotiation(&item_id, &actor, req.enabled, req.min_price)
        .await?)
}

/// PUT /api/items/:id/buy - Purchase at the current price
pub async fn purchase_item(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(item_id): Path<String>,
    body: Option<Json<PurchaseRequest>>,
) -> ApiResult<Item> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    ok(state
        .engine
        .purchase(&item_id, &actor, req.expected_price)
        .await?)
}

// ============================================================================
// Draft Handlers
// ============================================================================

/// PUT /api/messages/:id/approve
pub async fn approve_message(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(message_id): Path<MessageId>,
) -> ApiResult<ResolutionOutcome> {
    ok(state.engine.approve(message_id, &actor).await?)
}

/// PUT /api/messages/:id/reject
pub async fn reject_message(
    State(state): State<ApiState>,
    Actor(actor): Actor,
    Path(message_id): Path<MessageId>,
) -> ApiResult<ResolutionOutcome> {
    ok(state.engine.reject(message_id, &actor).await?)
}
