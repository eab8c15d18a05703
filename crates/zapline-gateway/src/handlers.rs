// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the session API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zapline_core::{
    InboundMessage, MessageId, OutboundMessage, SessionState, SessionStatus, TenantId,
};
use zapline_session::IngestOutcome;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Response body for POST /v1/sessions/{tenant}/initialize.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub already_connected: bool,
    pub created: bool,
}

/// Query string for POST /v1/sessions/{tenant}/disconnect.
#[derive(Debug, Default, Deserialize)]
pub struct DisconnectParams {
    /// Unlink the device and forget its credentials instead of pausing.
    #[serde(default)]
    pub logout: bool,
}

/// Request body for POST /v1/sessions/{tenant}/messages.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Phone number or full JID.
    pub to: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message_id: MessageId,
}

/// A message delivered by an external webhook rather than the gateway.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMessage {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Request body for POST /v1/inbound.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    /// The business number the message was sent to.
    pub business_phone: String,
    pub message: ExternalMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResponse {
    pub tenant_id: TenantId,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionStatus>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub connected: usize,
}

/// POST /v1/sessions/{tenant}/initialize
pub async fn initialize_session(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
) -> Result<Json<InitializeResponse>, ApiError> {
    let tenant_id = TenantId::parse(&tenant)?;
    let outcome = state.manager.initialize_session(&tenant_id).await?;
    Ok(Json(InitializeResponse {
        status: outcome.status,
        already_connected: outcome.already_connected,
        created: outcome.created,
    }))
}

/// GET /v1/sessions/{tenant}/status
pub async fn get_session_status(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let tenant_id = TenantId::parse(&tenant)?;
    Ok(Json(state.manager.get_session_status(&tenant_id).await))
}

/// GET /v1/sessions
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.manager.list_sessions().await,
    })
}

/// POST /v1/sessions/{tenant}/disconnect[?logout=true]
pub async fn disconnect_session(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    Query(params): Query<DisconnectParams>,
) -> Result<Json<SessionStatus>, ApiError> {
    let tenant_id = TenantId::parse(&tenant)?;
    let status = state
        .manager
        .disconnect_session(&tenant_id, params.logout)
        .await?;
    Ok(Json(status))
}

/// POST /v1/sessions/{tenant}/messages
pub async fn send_message(
    State(state): State<GatewayState>,
    Path(tenant): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let tenant_id = TenantId::parse(&tenant)?;
    let message = OutboundMessage {
        recipient: body.to,
        text: body.text,
        media_url: body.media_url,
    };
    let message_id = state.manager.send_message(&tenant_id, message).await?;
    Ok(Json(SendMessageResponse { message_id }))
}

/// DELETE /v1/sessions/{tenant}/contexts/{sender}
pub async fn clear_sender_context(
    State(state): State<GatewayState>,
    Path((tenant, sender)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let tenant_id = TenantId::parse(&tenant)?;
    state
        .manager
        .clear_sender_context(&tenant_id, &sender)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/inbound
///
/// Routes a message to the tenant owning `businessPhone`. The tenant must be
/// CONNECTED so replies have a socket to go out on.
pub async fn post_inbound(
    State(state): State<GatewayState>,
    Json(body): Json<InboundRequest>,
) -> Result<Response, ApiError> {
    let ExternalMessage {
        id,
        from,
        text,
        from_me,
        push_name,
        timestamp,
    } = body.message;
    let message = InboundMessage {
        id: MessageId(id),
        sender: from,
        text,
        from_me,
        push_name,
        timestamp: timestamp.unwrap_or_else(Utc::now),
    };

    let (tenant_id, outcome) = state
        .manager
        .ingest_external(&body.business_phone, message)
        .await?;
    let (label, pending) = describe(outcome);
    let status = match outcome {
        IngestOutcome::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::ACCEPTED,
    };
    let response = InboundResponse {
        tenant_id,
        outcome: label,
        pending,
    };
    Ok((status, Json(response)).into_response())
}

fn describe(outcome: IngestOutcome) -> (&'static str, Option<usize>) {
    match outcome {
        IngestOutcome::Ignored => ("ignored", None),
        IngestOutcome::RateLimited => ("rate_limited", None),
        IngestOutcome::Duplicate => ("duplicate", None),
        IngestOutcome::Buffered { pending } => ("buffered", Some(pending)),
        IngestOutcome::ProcessedImmediately => ("processed", None),
    }
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let sessions = state.manager.list_sessions().await;
    let connected = sessions
        .iter()
        .filter(|s| s.status == SessionState::Connected)
        .count();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: sessions.len(),
        connected,
    })
}
