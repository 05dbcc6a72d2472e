//! Operator-facing JSON API for placing calls and sending texts.

use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::rate_limit::RateLimitExceeded,
    WebhookService,
};

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub to: String,
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_sid: String,
}

/// POST /api/calls
pub async fn start_call(
    State(service): State<Arc<WebhookService>>,
    Json(request): Json<StartCallRequest>,
) -> Response {
    if !service.outgoing_voice_limit().try_consume().await {
        return RateLimitExceeded.into_response();
    }
    if request.to.trim().is_empty() {
        return ApiError::BadRequest("Missing destination number".to_string()).into_response();
    }

    match service
        .voice()
        .initiate_call(&request.to, request.topic.as_deref(), service.runtime())
        .await
    {
        Ok(call_sid) => Json(StartCallResponse { call_sid }).into_response(),
        Err(err) => ApiError::Telephony(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub to: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SendSmsResponse {
    pub message_sid: String,
}

/// POST /api/sms
pub async fn send_sms(
    State(service): State<Arc<WebhookService>>,
    Json(request): Json<SendSmsRequest>,
) -> Response {
    if !service.sms_limit().try_consume().await {
        return RateLimitExceeded.into_response();
    }
    if request.to.trim().is_empty() || request.body.trim().is_empty() {
        return ApiError::BadRequest("Missing destination or body".to_string()).into_response();
    }

    match service.sms().send_sms(&request.to, &request.body).await {
        Ok(message_sid) => Json(SendSmsResponse { message_sid }).into_response(),
        Err(err) => ApiError::Telephony(err).into_response(),
    }
}
