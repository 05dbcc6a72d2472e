//! HTTP surface for the Twilio gateway: webhook routes, signature
//! verification, cached-audio serving, and a small operator API.

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::header,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;

use switchboard::{
    audio_cache, memory, AgentRuntime, AudioCache, CallBindings, ConversationMemory,
    ElevenLabsTts, SmsHandler, SpeechSynthesizer, SwitchboardConfig, TtsService, TwimlBuilder,
    VoiceSessionHandler,
};

use crate::middleware::rate_limit::TokenBucket;

static WEBHOOK_SERVICE: OnceCell<Arc<WebhookService>> = OnceCell::const_new();

/// Shared state behind every route: the voice and SMS handlers plus the
/// stores they lean on. One instance per process.
pub struct WebhookService {
    config: SwitchboardConfig,
    voice: Arc<VoiceSessionHandler>,
    sms: Arc<SmsHandler>,
    audio_cache: Arc<AudioCache>,
    voice_memory: Arc<ConversationMemory>,
    sms_threads: Arc<ConversationMemory>,
    tts: Arc<TtsService>,
    runtime: Arc<dyn AgentRuntime>,
    incoming_voice_limit: TokenBucket,
    outgoing_voice_limit: TokenBucket,
    sms_limit: TokenBucket,
    started_at: DateTime<Utc>,
    sweepers: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WebhookService {
    /// Process-wide instance; the first caller's config and runtime win
    pub async fn get_or_create(
        config: SwitchboardConfig,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Arc<Self> {
        WEBHOOK_SERVICE
            .get_or_init(|| async move { Self::start(config, runtime) })
            .await
            .clone()
    }

    /// Build an instance and spawn its background sweeps
    pub fn start(config: SwitchboardConfig, runtime: Arc<dyn AgentRuntime>) -> Arc<Self> {
        let service = Arc::new(Self::new(config, runtime));
        service.spawn_sweepers();
        service
    }

    fn new(config: SwitchboardConfig, runtime: Arc<dyn AgentRuntime>) -> Self {
        let voice_memory = Arc::new(ConversationMemory::new("voice"));
        let sms_threads = Arc::new(ConversationMemory::new("sms"));
        let audio_cache = Arc::new(AudioCache::new());

        // The backend is only exercised when an API key is configured; the
        // voice handler sticks to <Say> otherwise.
        let backend: Arc<dyn SpeechSynthesizer> = Arc::new(ElevenLabsTts::new(
            config.elevenlabs_api_key.clone().unwrap_or_default(),
            config.elevenlabs_voice_id.clone(),
            config.elevenlabs_model_id.clone(),
        ));
        let tts = Arc::new(TtsService::new(backend));

        let voice = Arc::new(VoiceSessionHandler::new(
            config.clone(),
            voice_memory.clone(),
            tts.clone(),
            audio_cache.clone(),
            Arc::new(CallBindings::new()),
        ));
        let sms = Arc::new(SmsHandler::new(config.clone(), sms_threads.clone()));

        Self {
            config,
            voice,
            sms,
            audio_cache,
            voice_memory,
            sms_threads,
            tts,
            runtime,
            incoming_voice_limit: TokenBucket::new(30.0, 0.5),
            outgoing_voice_limit: TokenBucket::new(10.0, 0.2),
            sms_limit: TokenBucket::new(30.0, 0.5),
            started_at: Utc::now(),
            sweepers: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn spawn_sweepers(&self) {
        let mut handles = Vec::with_capacity(3);

        let cache = self.audio_cache.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(audio_cache::SWEEP_PERIOD);
            loop {
                ticker.tick().await;
                cache.sweep_expired().await;
            }
        }));

        for sessions in [self.voice_memory.clone(), self.sms_threads.clone()] {
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(memory::SWEEP_PERIOD);
                loop {
                    ticker.tick().await;
                    sessions.sweep_idle().await;
                }
            }));
        }

        if let Ok(mut sweepers) = self.sweepers.lock() {
            *sweepers = handles;
        }
    }

    /// Stop the background sweeps; state drains on its own after this
    pub fn shutdown(&self) {
        if let Ok(mut sweepers) = self.sweepers.lock() {
            for handle in sweepers.drain(..) {
                handle.abort();
            }
        }
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    pub fn voice(&self) -> &VoiceSessionHandler {
        &self.voice
    }

    pub fn sms(&self) -> &SmsHandler {
        &self.sms
    }

    pub fn audio_cache(&self) -> &AudioCache {
        &self.audio_cache
    }

    pub fn tts(&self) -> &TtsService {
        &self.tts
    }

    pub fn runtime(&self) -> Arc<dyn AgentRuntime> {
        self.runtime.clone()
    }

    pub fn incoming_voice_limit(&self) -> &TokenBucket {
        &self.incoming_voice_limit
    }

    pub fn outgoing_voice_limit(&self) -> &TokenBucket {
        &self.outgoing_voice_limit
    }

    pub fn sms_limit(&self) -> &TokenBucket {
        &self.sms_limit
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// TwiML returned when a rate limit trips mid-call
    pub fn busy_twiml(&self) -> String {
        TwimlBuilder::spoken_error(
            "I'm handling a lot of calls right now. Please try again in a moment.",
            &self.config.say_voice,
            &self.config.speech_language,
        )
    }
}

pub fn router(service: Arc<WebhookService>) -> Router {
    let webhooks = Router::new()
        .route("/webhook/voice", post(routes::voice::incoming))
        .route("/webhook/voice/outgoing", post(routes::voice::outgoing))
        .route("/webhook/sms", post(routes::sms::incoming))
        .layer(axum_middleware::from_fn_with_state(
            service.clone(),
            middleware::signature::verify_twilio_signature,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/audio/{id}", get(routes::audio::fetch))
        .route("/api/calls", post(routes::api::start_call))
        .route("/api/sms", post(routes::api::send_sms))
        .merge(webhooks)
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub(crate) fn twiml_response(twiml: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], twiml).into_response()
}
