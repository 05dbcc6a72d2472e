//! Twilio webhook signature verification.
//!
//! Twilio signs each webhook with HMAC-SHA1 over the public URL plus the
//! sorted form parameters, keyed by the account's auth token. The middleware
//! buffers the body to recompute the signature, then hands the request on
//! with the body restored so extractors still work.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use switchboard::signature::validate_signature;

use crate::WebhookService;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Webhook bodies are small form posts; anything bigger is not Twilio
const MAX_WEBHOOK_BODY: usize = 64 * 1024;

pub async fn verify_twilio_signature(
    State(service): State<Arc<WebhookService>>,
    request: Request,
    next: Next,
) -> Response {
    let config = service.config();
    if !config.is_configured() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Twilio is not configured").into_response();
    }

    let signature = match request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
    {
        Some(signature) => signature,
        None => {
            tracing::warn!("Rejected webhook without a signature header");
            return (StatusCode::FORBIDDEN, "Missing webhook signature").into_response();
        }
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_WEBHOOK_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, "Unreadable webhook body").into_response(),
    };

    // Twilio signs the public URL it posted to, query string included.
    let url = format!(
        "{}{}",
        config.webhook_base_url,
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    );
    let params: HashMap<String, String> =
        serde_urlencoded::from_bytes(&bytes).unwrap_or_default();

    if !validate_signature(&config.auth_token, &signature, &url, &params) {
        tracing::warn!("Rejected webhook with invalid signature for {}", url);
        return (StatusCode::FORBIDDEN, "Invalid webhook signature").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
