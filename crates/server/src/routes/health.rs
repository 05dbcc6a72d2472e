//! Health and status reporting.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::WebhookService;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub configured: bool,
    pub active_calls: usize,
    pub active_sms_threads: usize,
    pub cached_audio_bytes: usize,
    pub tts_degraded: bool,
    pub uptime_seconds: i64,
}

/// GET /health
pub async fn health(State(service): State<Arc<WebhookService>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        configured: service.config().is_configured(),
        active_calls: service.voice().active_calls().await,
        active_sms_threads: service.sms().active_threads().await,
        cached_audio_bytes: service.audio_cache().total_bytes().await,
        tts_degraded: service.tts().is_degraded(),
        uptime_seconds: (chrono::Utc::now() - service.started_at()).num_seconds(),
    })
}
