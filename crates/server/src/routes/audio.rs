//! Cached synthesized audio, fetched by Twilio when playing `<Play>` URLs.
//!
//! Media fetches carry the same signature header as webhooks but sign the
//! bare URL; there is no form body. Responses are marked no-store since
//! entries expire out of the cache on their own schedule.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};
use switchboard::signature::validate_signature;

use crate::{error::ApiError, middleware::signature::SIGNATURE_HEADER, WebhookService};

/// GET /audio/{id}
pub async fn fetch(
    State(service): State<Arc<WebhookService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let config = service.config();
    if !config.is_configured() {
        return Err(ApiError::NotConfigured);
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let url = config.audio_url(&id);
    if !validate_signature(&config.auth_token, signature, &url, &HashMap::new()) {
        return Err(ApiError::Unauthorized);
    }

    match service.audio_cache().get(&id).await {
        Some(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "audio/mpeg"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )),
        None => Err(ApiError::NotFound),
    }
}
