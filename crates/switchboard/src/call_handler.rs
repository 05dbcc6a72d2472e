//! Voice call session handling.
//!
//! Drives one phone call through its lifecycle: greeting on first contact,
//! speech-turn handling with goodbye detection, silence timeout, and
//! cleanup. Every externally observable failure becomes a spoken apology
//! followed by a clean hangup; Twilio never sees a raw protocol error from
//! this path.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    audio_cache::AudioCache,
    config::SwitchboardConfig,
    error::{TelephonyError, TelephonyResult},
    memory::{ConversationMemory, Role},
    runtime::{AgentRuntime, CallBindings},
    text::{redact_phone, truncate_to_sentence},
    tts::TtsService,
    twilio_client::{TelephonyProvider, TwilioClient},
    twiml::TwimlBuilder,
};

/// Seconds Twilio waits for speech before posting back without a result
pub const GATHER_TIMEOUT_SECS: u32 = 5;
/// Character budget for spoken replies
pub const REPLY_MAX_CHARS: usize = 250;

/// Fixed phrases that end the call; matched case-insensitively as substrings
pub const GOODBYE_PHRASES: [&str; 10] = [
    "goodbye",
    "bye",
    "bye bye",
    "hang up",
    "see you",
    "talk to you later",
    "have a good day",
    "good bye",
    "end call",
    "that will be all",
];

const SILENCE_MESSAGE: &str =
    "I haven't heard from you, so I'll let you go for now. Call back any time!";
const APOLOGY_MESSAGE: &str =
    "I apologize, I'm having technical difficulties right now. Please call back later.";

/// Check a transcription against the goodbye phrase list
pub fn is_goodbye(text: &str) -> bool {
    let lower = text.to_lowercase();
    GOODBYE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Twilio voice webhook form body
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    pub call_sid: String,
    pub speech_result: Option<String>,
    pub call_status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// What a turn sounds like: cached premium audio or Twilio's built-in voice
enum Spoken {
    Play(String),
    Say(String),
}

/// Orchestrates live phone calls
pub struct VoiceSessionHandler {
    config: SwitchboardConfig,
    memory: Arc<ConversationMemory>,
    tts: Arc<TtsService>,
    cache: Arc<AudioCache>,
    bindings: Arc<CallBindings>,
    client: Arc<dyn TelephonyProvider>,
}

impl VoiceSessionHandler {
    pub fn new(
        config: SwitchboardConfig,
        memory: Arc<ConversationMemory>,
        tts: Arc<TtsService>,
        cache: Arc<AudioCache>,
        bindings: Arc<CallBindings>,
    ) -> Self {
        let client = Arc::new(TwilioClient::new(
            config.account_sid.clone(),
            config.auth_token.clone(),
        ));
        Self::with_provider(config, memory, tts, cache, bindings, client)
    }

    pub fn with_provider(
        config: SwitchboardConfig,
        memory: Arc<ConversationMemory>,
        tts: Arc<TtsService>,
        cache: Arc<AudioCache>,
        bindings: Arc<CallBindings>,
        client: Arc<dyn TelephonyProvider>,
    ) -> Self {
        Self {
            config,
            memory,
            tts,
            cache,
            bindings,
            client,
        }
    }

    pub fn config(&self) -> &SwitchboardConfig {
        &self.config
    }

    /// Number of live call sessions
    pub async fn active_calls(&self) -> usize {
        self.memory.len().await
    }

    /// Start an outbound call and bind its runtime handle.
    ///
    /// The greeting happens when Twilio posts the first webhook for the new
    /// CallSid; the optional topic rides along on the callback URL.
    pub async fn initiate_call(
        &self,
        to: &str,
        topic: Option<&str>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        if self.config.phone_number.is_empty() {
            return Err(TelephonyError::Config(
                "No originating phone number configured".to_string(),
            ));
        }

        let callback_url = self.config.outgoing_action_url(topic);
        let call_sid = self
            .client
            .start_call(&self.config.phone_number, to, &callback_url)
            .await?;
        self.bindings.bind(&call_sid, runtime).await;
        Ok(call_sid)
    }

    /// Handle one voice webhook callback, always producing valid TwiML
    pub async fn handle_voice_webhook(
        &self,
        request: VoiceWebhook,
        topic: Option<&str>,
        outgoing: bool,
        default_runtime: Arc<dyn AgentRuntime>,
    ) -> String {
        let call_sid = request.call_sid.clone();
        match self
            .process_webhook(request, topic, outgoing, default_runtime)
            .await
        {
            Ok(twiml) => twiml,
            Err(err) => {
                error!("Voice webhook failed for call {}: {}", call_sid, err);
                self.cleanup_call(&call_sid).await;
                TwimlBuilder::spoken_error(
                    APOLOGY_MESSAGE,
                    &self.config.say_voice,
                    &self.config.speech_language,
                )
            }
        }
    }

    async fn process_webhook(
        &self,
        request: VoiceWebhook,
        topic: Option<&str>,
        outgoing: bool,
        default_runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        // Provider-reported terminal states end the session outright.
        if let Some(status) = request.call_status.as_deref() {
            if status == "completed" || status == "failed" {
                info!("Call {} reported status {}", request.call_sid, status);
                self.cleanup_call(&request.call_sid).await;
                return Ok(TwimlBuilder::empty());
            }
        }

        let runtime = match self.bindings.get(&request.call_sid).await {
            Some(runtime) => runtime,
            None => {
                self.bindings
                    .bind(&request.call_sid, default_runtime.clone())
                    .await;
                default_runtime
            }
        };

        if let Some(from) = request.from.as_deref() {
            info!(
                "Voice webhook for call {} from {}",
                request.call_sid,
                redact_phone(from)
            );
        }

        let action_url = if outgoing {
            self.config.outgoing_action_url(topic)
        } else {
            self.config.voice_action_url()
        };

        match self.memory.get_session(&request.call_sid).await {
            None => {
                self.greeting_turn(&request.call_sid, topic, &action_url, runtime)
                    .await
            }
            Some(_) => match request.speech_result.as_deref() {
                None => self.silence_turn(&request.call_sid).await,
                Some(text) if is_goodbye(text) => {
                    self.farewell_turn(&request.call_sid, runtime).await
                }
                Some(text) => {
                    self.reply_turn(&request.call_sid, text, &action_url, runtime)
                        .await
                }
            },
        }
    }

    /// First contact: greet, open the session, start gathering speech
    async fn greeting_turn(
        &self,
        call_sid: &str,
        topic: Option<&str>,
        action_url: &str,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        let greeting = match runtime.generate_text(&self.greeting_prompt(topic)).await {
            Ok(text) => truncate_to_sentence(&text, REPLY_MAX_CHARS),
            Err(err) => {
                warn!("Greeting generation failed for call {}: {}", call_sid, err);
                format!(
                    "Hello! This is {}. How can I help you today?",
                    self.config.character_name
                )
            }
        };

        let spoken = self.speak(&greeting).await;

        self.memory
            .create_session(call_sid, &self.config.character_name)
            .await;
        self.memory
            .append_message(call_sid, Role::Assistant, &greeting)
            .await?;

        info!("Greeted call {}", call_sid);
        Ok(self.gather_twiml(spoken, action_url))
    }

    /// Gather timed out with no speech: say goodbye and hang up
    async fn silence_turn(&self, call_sid: &str) -> TelephonyResult<String> {
        info!("Silence timeout on call {}", call_sid);
        let spoken = self.speak(SILENCE_MESSAGE).await;
        self.cleanup_call(call_sid).await;
        Ok(self.final_twiml(spoken))
    }

    /// Caller said a goodbye phrase: farewell and hang up
    async fn farewell_turn(
        &self,
        call_sid: &str,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        let farewell = match runtime.generate_text(&self.farewell_prompt()).await {
            Ok(text) => truncate_to_sentence(&text, REPLY_MAX_CHARS),
            Err(err) => {
                warn!("Farewell generation failed for call {}: {}", call_sid, err);
                "Goodbye! It was lovely talking with you.".to_string()
            }
        };

        let spoken = self.speak(&farewell).await;
        info!("Ending call {} on goodbye", call_sid);
        self.cleanup_call(call_sid).await;
        Ok(self.final_twiml(spoken))
    }

    /// Normal conversational turn: generate, remember, speak, keep gathering
    async fn reply_turn(
        &self,
        call_sid: &str,
        user_text: &str,
        action_url: &str,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        self.memory
            .append_message(call_sid, Role::User, user_text)
            .await?;

        let session = self
            .memory
            .get_session(call_sid)
            .await
            .ok_or_else(|| TelephonyError::SessionNotFound(call_sid.to_string()))?;

        let reply = runtime
            .generate_text(&self.reply_prompt(&session.transcript(), user_text))
            .await
            .map_err(|err| TelephonyError::GenerationFailed(err.to_string()))?;
        let reply = truncate_to_sentence(&reply, REPLY_MAX_CHARS);

        self.memory
            .append_message(call_sid, Role::Assistant, &reply)
            .await?;

        let spoken = self.speak(&reply).await;
        Ok(self.gather_twiml(spoken, action_url))
    }

    /// Drop call-scoped state: memory session and runtime binding
    pub async fn cleanup_call(&self, call_sid: &str) {
        self.memory.clear_session(call_sid).await;
        self.bindings.remove(call_sid).await;
    }

    /// Synthesize `text`, falling back to Twilio `<Say>` when the premium
    /// backend is unconfigured, degraded, or fails outright.
    async fn speak(&self, text: &str) -> Spoken {
        if self.config.elevenlabs_api_key.is_none() || self.tts.is_degraded() {
            return Spoken::Say(text.to_string());
        }

        match self.tts.synthesize(text).await {
            Ok(bytes) => {
                let id = self.cache.put(bytes).await;
                Spoken::Play(self.config.audio_url(&id))
            }
            Err(err) => {
                warn!("Falling back to built-in voice: {}", err);
                Spoken::Say(text.to_string())
            }
        }
    }

    fn gather_twiml(&self, spoken: Spoken, action_url: &str) -> String {
        let builder = match spoken {
            Spoken::Play(url) => TwimlBuilder::new().gather_speech_with_audio(
                &url,
                action_url,
                GATHER_TIMEOUT_SECS,
                &self.config.speech_language,
            ),
            Spoken::Say(text) => TwimlBuilder::new().gather_speech(
                action_url,
                GATHER_TIMEOUT_SECS,
                &self.config.speech_language,
                Some((&text, &self.config.say_voice)),
            ),
        };
        // Gather timeouts fall through here and post back without a
        // SpeechResult, which is the silence path.
        builder.redirect(action_url).build()
    }

    fn final_twiml(&self, spoken: Spoken) -> String {
        let builder = match spoken {
            Spoken::Play(url) => TwimlBuilder::new().play(&url, 1),
            Spoken::Say(text) => {
                TwimlBuilder::new().say(&text, &self.config.say_voice, &self.config.speech_language)
            }
        };
        builder.pause(1).hangup().build()
    }

    fn greeting_prompt(&self, topic: Option<&str>) -> String {
        match topic {
            Some(topic) => format!(
                "You are {} on a phone call you placed to discuss: {}. \
                 Greet the person warmly in one or two short sentences and \
                 bring up the topic.",
                self.config.character_name, topic
            ),
            None => format!(
                "You are {} answering a phone call. Greet the caller warmly \
                 in one or two short sentences and ask how you can help.",
                self.config.character_name
            ),
        }
    }

    fn reply_prompt(&self, transcript: &str, user_text: &str) -> String {
        format!(
            "You are {} on a phone call. Keep your reply conversational and \
             under two sentences, since it will be spoken aloud.\n\
             Conversation so far:\n{}\nCaller just said: {}\nYour reply:",
            self.config.character_name, transcript, user_text
        )
    }

    fn farewell_prompt(&self) -> String {
        format!(
            "You are {} ending a pleasant phone call. Say a warm goodbye in \
             one short sentence.",
            self.config.character_name
        )
    }
}
