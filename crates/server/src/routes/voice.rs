//! Voice webhook endpoints.
//!
//! Twilio expects a 200 with a TwiML document on every callback, so these
//! handlers never surface an error status; the session handler turns
//! failures into a spoken apology.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
    Form,
};
use serde::Deserialize;
use switchboard::VoiceWebhook;

use crate::{twiml_response, WebhookService};

#[derive(Debug, Deserialize)]
pub struct OutgoingQuery {
    pub topic: Option<String>,
}

/// POST /webhook/voice
pub async fn incoming(
    State(service): State<Arc<WebhookService>>,
    Form(request): Form<VoiceWebhook>,
) -> Response {
    if !service.incoming_voice_limit().try_consume().await {
        tracing::warn!("Incoming voice webhook rate limited");
        return twiml_response(service.busy_twiml());
    }

    let twiml = service
        .voice()
        .handle_voice_webhook(request, None, false, service.runtime())
        .await;
    twiml_response(twiml)
}

/// POST /webhook/voice/outgoing
pub async fn outgoing(
    State(service): State<Arc<WebhookService>>,
    Query(query): Query<OutgoingQuery>,
    Form(request): Form<VoiceWebhook>,
) -> Response {
    if !service.outgoing_voice_limit().try_consume().await {
        tracing::warn!("Outgoing voice webhook rate limited");
        return twiml_response(service.busy_twiml());
    }

    let twiml = service
        .voice()
        .handle_voice_webhook(request, query.topic.as_deref(), true, service.runtime())
        .await;
    twiml_response(twiml)
}
