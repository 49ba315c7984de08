//! HTTP intake server
//!
//! Vote submission and the poll registry endpoints. The caller identity
//! arrives in the `X-User-Id` header, injected by the authenticating edge
//! in front of this service.

use crate::{IntakeError, PollRegistry, VoteIntake};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;
use vote_events::{OptionId, PollId, UserId};

/// Shared state for HTTP handlers
pub struct GatewayContext {
    pub intake: VoteIntake,
    pub polls: PollRegistry,
}

/// API errors mapped onto HTTP statuses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid X-User-Id header")]
    InvalidUserId,

    #[error("poll not found")]
    PollNotFound,

    /// Transient: the client should retry
    #[error("event bus unavailable")]
    BusUnavailable,
}

impl From<IntakeError> for ApiError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::BusUnavailable(_) => ApiError::BusUnavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            ApiError::InvalidUserId => (StatusCode::BAD_REQUEST, "invalid_user_id"),
            ApiError::PollNotFound => (StatusCode::NOT_FOUND, "poll_not_found"),
            ApiError::BusUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "bus_unavailable"),
        };
        (status, Json(json!({ "error": code }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub poll_id: PollId,
    pub option_id: OptionId,
}

#[derive(Debug, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub options: Vec<String>,
}

/// HTTP intake server
pub struct HttpServer {
    context: Arc<GatewayContext>,
}

impl HttpServer {
    pub fn new(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        Router::new()
            .route("/votes", post(submit_vote))
            .route("/api/polls", post(create_poll).get(list_polls))
            .route("/api/polls/:id", get(get_poll))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP intake server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Accept a vote: publish and acknowledge, never wait for the tally
async fn submit_vote(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = caller_identity(&headers)?;
    let event = ctx.intake.submit(req.poll_id, req.option_id, caller)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "voteId": event.vote_id })),
    ))
}

async fn create_poll(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    Json(req): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created_by = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let poll = ctx.polls.create(req.title, req.options, created_by)?;
    Ok(Json(poll))
}

async fn get_poll(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    ctx.polls.get(&id).map(Json).ok_or(ApiError::PollNotFound)
}

async fn list_polls(State(ctx): State<Arc<GatewayContext>>) -> impl IntoResponse {
    Json(ctx.polls.list())
}

/// Parse the trusted identity header; absence is fine, garbage is not
fn caller_identity(headers: &HeaderMap) -> Result<Option<UserId>, ApiError> {
    match headers.get("x-user-id") {
        None => Ok(None),
        Some(value) => {
            let text = value.to_str().map_err(|_| ApiError::InvalidUserId)?;
            Uuid::parse_str(text)
                .map(Some)
                .map_err(|_| ApiError::InvalidUserId)
        }
    }
}
