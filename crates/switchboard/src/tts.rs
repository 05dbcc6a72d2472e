//! Text-to-speech service with retry, timeout, and quota handling.
//!
//! The service wraps a [`SpeechSynthesizer`] backend (ElevenLabs in
//! production) with a per-attempt timeout and a bounded retry policy for
//! transient faults. Quota exhaustion is different: it is reported once,
//! never retried, and flips a standing degraded flag so later calls fail
//! fast and the caller can route to Twilio's built-in `<Say>` voice
//! instead.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::text::truncate_to_sentence;

/// Per-attempt synthesis timeout
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total attempts before a terminal failure
pub const MAX_ATTEMPTS: u32 = 3;
/// Backoff unit; attempt n waits n times this
pub const BASE_BACKOFF: Duration = Duration::from_millis(500);
/// Character budget submitted to the backend
pub const MAX_INPUT_CHARS: usize = 600;

/// TTS failures, split so callers can tell transient faults from quota
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Synthesis quota exhausted")]
    QuotaExhausted,

    #[error("Synthesis backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Synthesis failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl TtsError {
    /// Quota faults swap the backend; everything else is retried locally
    pub fn is_quota(&self) -> bool {
        matches!(self, TtsError::QuotaExhausted)
    }
}

/// Speech synthesis backend seam
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Convert text to an audio buffer (MP3 bytes)
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError>;
}

/// ElevenLabs synthesis backend
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsTts {
    pub fn new(api_key: String, voice_id: String, model_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model_id,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let payload = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.8,
            }
        });

        let response = self
            .client
            .post(format!(
                "https://api.elevenlabs.io/v1/text-to-speech/{}",
                self.voice_id
            ))
            .header("Accept", "audio/mpeg")
            .header("Content-Type", "application/json")
            .header("xi-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 429 is always quota; some plans report exhaustion as 401 with
            // a quota_exceeded status in the body.
            if status.as_u16() == 429 || body.contains("quota_exceeded") {
                return Err(TtsError::QuotaExhausted);
            }
            return Err(TtsError::Backend(format!(
                "ElevenLabs API error (status {}): {}",
                status, body
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Retry policy knobs; the defaults match production behavior
#[derive(Debug, Clone)]
pub struct TtsPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_input_chars: usize,
}

impl Default for TtsPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: ATTEMPT_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
            base_backoff: BASE_BACKOFF,
            max_input_chars: MAX_INPUT_CHARS,
        }
    }
}

/// Synthesis front end used by the call and SMS handlers
pub struct TtsService {
    backend: Arc<dyn SpeechSynthesizer>,
    policy: TtsPolicy,
    quota_exhausted: AtomicBool,
}

impl TtsService {
    pub fn new(backend: Arc<dyn SpeechSynthesizer>) -> Self {
        Self::with_policy(backend, TtsPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn SpeechSynthesizer>, policy: TtsPolicy) -> Self {
        Self {
            backend,
            policy,
            quota_exhausted: AtomicBool::new(false),
        }
    }

    /// Whether the primary backend has reported quota exhaustion
    pub fn is_degraded(&self) -> bool {
        self.quota_exhausted.load(Ordering::Relaxed)
    }

    /// Synthesize speech for `text`.
    ///
    /// Input is truncated to the character budget on a sentence boundary.
    /// Transient faults (timeouts, backend errors) are retried with linearly
    /// increasing backoff; quota exhaustion short-circuits and degrades the
    /// service.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        if self.is_degraded() {
            return Err(TtsError::QuotaExhausted);
        }

        let text = truncate_to_sentence(text, self.policy.max_input_chars);
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.backend.synthesize(&text),
            )
            .await
            {
                Ok(Ok(bytes)) => {
                    info!(
                        "Synthesized {} bytes on attempt {}/{}",
                        bytes.len(),
                        attempt,
                        self.policy.max_attempts
                    );
                    return Ok(bytes);
                }
                Ok(Err(err)) if err.is_quota() => {
                    warn!("TTS backend reported quota exhaustion; degrading to fallback voice");
                    self.quota_exhausted.store(true, Ordering::Relaxed);
                    return Err(err);
                }
                Ok(Err(err)) => {
                    warn!(
                        "TTS attempt {}/{} failed: {}",
                        attempt, self.policy.max_attempts, err
                    );
                    last_error = err.to_string();
                }
                Err(_) => {
                    warn!(
                        "TTS attempt {}/{} timed out after {:?}",
                        attempt, self.policy.max_attempts, self.policy.attempt_timeout
                    );
                    last_error = TtsError::Timeout(self.policy.attempt_timeout).to_string();
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.base_backoff * attempt).await;
            }
        }

        Err(TtsError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_policy() -> TtsPolicy {
        TtsPolicy {
            attempt_timeout: Duration::from_millis(50),
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            max_input_chars: MAX_INPUT_CHARS,
        }
    }

    struct HangingBackend {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SpeechSynthesizer for HangingBackend {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, TtsError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            // Never completes within any test timeout.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    struct QuotaBackend;

    #[async_trait]
    impl SpeechSynthesizer for QuotaBackend {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, TtsError> {
            Err(TtsError::QuotaExhausted)
        }
    }

    struct FlakyBackend {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SpeechSynthesizer for FlakyBackend {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, TtsError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < 1 {
                Err(TtsError::Backend("hiccup".to_string()))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_retries_then_terminal_failure() {
        let backend = Arc::new(HangingBackend {
            attempts: AtomicU32::new(0),
        });
        let service = TtsService::with_policy(backend.clone(), fast_policy());

        let err = service.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, TtsError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
        assert!(!service.is_degraded());
    }

    #[tokio::test]
    async fn test_quota_is_not_retried_and_degrades() {
        let service = TtsService::with_policy(Arc::new(QuotaBackend), fast_policy());

        let err = service.synthesize("hello").await.unwrap_err();
        assert!(err.is_quota());
        assert!(service.is_degraded());

        // Subsequent calls fail fast without touching the backend.
        let err = service.synthesize("hello again").await.unwrap_err();
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_transient_fault_retried_to_success() {
        let backend = Arc::new(FlakyBackend {
            attempts: AtomicU32::new(0),
        });
        let service = TtsService::with_policy(backend.clone(), fast_policy());

        let bytes = service.synthesize("hello").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
    }
}
