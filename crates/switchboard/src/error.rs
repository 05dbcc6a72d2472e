//! Error taxonomy for the gateway.
//!
//! Configuration, authentication, session, and backend failures are kept as
//! distinct variants so callers can react differently: session errors can
//! trigger a session rebuild, quota errors flip the TTS degraded path, and
//! everything that reaches a webhook boundary is converted into TwiML.

use crate::tts::TtsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("Twilio not configured")]
    NotConfigured,

    #[error("Invalid request signature")]
    InvalidSignature,

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Text generation failed: {0}")]
    GenerationFailed(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(#[from] TtsError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Twilio API error (status {status}): {body}")]
    ProviderApi { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type TelephonyResult<T> = Result<T, TelephonyError>;
