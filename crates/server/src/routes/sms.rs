//! SMS webhook endpoint.

use std::sync::Arc;

use axum::{extract::State, response::Response, Form};
use switchboard::SmsWebhook;

use crate::{twiml_response, WebhookService};

/// POST /webhook/sms
pub async fn incoming(
    State(service): State<Arc<WebhookService>>,
    Form(request): Form<SmsWebhook>,
) -> Response {
    if !service.sms_limit().try_consume().await {
        tracing::warn!("SMS webhook rate limited");
        return twiml_response(switchboard::TwimlBuilder::empty());
    }

    let twiml = service
        .sms()
        .handle_sms_webhook(request, service.runtime())
        .await;
    twiml_response(twiml)
}
