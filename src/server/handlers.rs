//! Route handlers. Each one decodes its body, forwards to the broker and maps
//! the outcome onto the JSON shapes the CLI expects.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use super::ServerState;
use super::types::*;
use crate::broker::{StatusSnapshot, WalletCreated};
use crate::error::BrokerError;
use crate::relay::RelayEvent;

/// A broker error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::NotInitialized(_) | BrokerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        BrokerError::NotFound(_) => StatusCode::NOT_FOUND,
        BrokerError::AlreadyInProgress(_) => StatusCode::CONFLICT,
        BrokerError::UnsupportedOperation(_)
        | BrokerError::UnsupportedMethod(_)
        | BrokerError::NonConformingNamespaces(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BrokerError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        BrokerError::CollaboratorFailure(_) => StatusCode::BAD_GATEWAY,
        BrokerError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BrokerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let payload = self.0.to_payload();
        (
            status,
            Json(ErrorResponse {
                error: payload.message,
                code: payload.code,
                retryable: payload.retryable,
            }),
        )
            .into_response()
    }
}

/// Decode an optional JSON body. An empty body yields the default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(BrokerError::InvalidRequest(format!("malformed JSON body: {e}"))))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "walletbridge",
    })
}

pub async fn create_wallet_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<WalletCreated>, ApiError> {
    let request: CreateWalletRequest = parse_body(&body)?;
    let created = state
        .broker
        .create_wallet(request.mnemonic, request.address)
        .await?;
    Ok(Json(created))
}

pub async fn connect_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<ConnectResponse>, ApiError> {
    let request: ConnectRequest = parse_body(&body)?;
    let connection = state.broker.pair(request.uri.unwrap_or_default()).await?;
    Ok(Json(ConnectResponse {
        success: true,
        connection,
    }))
}

pub async fn approve_session_handler(
    State(state): State<ServerState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.broker.approve_session().await?;
    Ok(Json(SessionResponse {
        success: true,
        session,
    }))
}

pub async fn reject_session_handler(
    State(state): State<ServerState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.broker.reject_session().await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn approve_request_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<RequestResultResponse>, ApiError> {
    let selector: RequestSelector = parse_body(&body)?;
    let signed = state.broker.approve_request(selector.request_id).await?;
    Ok(Json(RequestResultResponse {
        success: true,
        request_id: signed.request_id,
        method: signed.method,
        result: signed.result,
    }))
}

pub async fn reject_request_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let selector: RequestSelector = parse_body(&body)?;
    state.broker.reject_request(selector.request_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

pub async fn status_handler(
    State(state): State<ServerState>,
) -> Result<Json<StatusSnapshot>, ApiError> {
    Ok(Json(state.broker.status().await?))
}

/// Inbound events pushed by the relay bridge.
pub async fn relay_events_handler(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    let event: RelayEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Discarding malformed relay event");
        ApiError(BrokerError::InvalidRequest(format!("malformed relay event: {e}")))
    })?;
    tracing::debug!(?event, "Relay event received");
    state.broker.on_relay_event(event).await?;
    Ok((StatusCode::ACCEPTED, Json(SuccessResponse::ok())))
}
