use std::sync::Arc;

use anyhow::anyhow;
use server::{router, WebhookService};
use switchboard::{AgentRuntime, StaticRuntime, SwitchboardConfig};
use thiserror::Error;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Load environment variables from `.env` if present so local development picks up credentials
    dotenv::dotenv().ok();

    let config = SwitchboardConfig::from_env().ok_or_else(|| {
        anyhow!(
            "Twilio is not configured; set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN, \
             TWILIO_PHONE_NUMBER and TWILIO_WEBHOOK_BASE_URL"
        )
    })?;

    let default_level = if config.debug_logging { "debug" } else { "info" };
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let filter_string = format!(
        "warn,server={level},switchboard={level}",
        level = log_level
    );
    let env_filter =
        EnvFilter::try_new(filter_string).map_err(|e| anyhow!("Invalid tracing filter: {e}"))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    if config.elevenlabs_api_key.is_none() {
        tracing::warn!("ELEVENLABS_API_KEY not set, calls will use the built-in Twilio voice");
    }

    // Stand-in text source until a language backend is plugged in.
    let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply(
        "Thanks for reaching out. I'm listening.",
    ));

    let service = WebhookService::get_or_create(config, runtime).await;
    let app = router(service.clone());

    let listener = bind_listener(service.config()).await?;
    tracing::info!(
        "Webhook server listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind the preferred port, then scan the fallback range
async fn bind_listener(config: &SwitchboardConfig) -> std::io::Result<tokio::net::TcpListener> {
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    match tokio::net::TcpListener::bind((host.as_str(), config.port)).await {
        Ok(listener) => return Ok(listener),
        Err(e) => {
            tracing::warn!(
                "Port {} unavailable ({}), scanning fallback range",
                config.port,
                e
            );
        }
    }

    let (low, high) = config.port_fallback;
    for port in low..=high {
        if let Ok(listener) = tokio::net::TcpListener::bind((host.as_str(), port)).await {
            tracing::info!("Fell back to port {}", port);
            return Ok(listener);
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        format!("no free port between {low} and {high}"),
    ))
}
