//! Twilio phone and SMS gateway for conversational agents
//!
//! Adapts a host agent runtime to Twilio's webhook surface: inbound and
//! outgoing voice calls with speech gathering, premium TTS playback with a
//! Twilio `<Say>` fallback, and single-turn SMS replies. All state is
//! in-memory and call-scoped; nothing here persists across restarts.

pub mod audio_cache;
pub mod call_handler;
pub mod config;
pub mod error;
pub mod memory;
pub mod runtime;
pub mod signature;
pub mod sms;
pub mod text;
pub mod tts;
pub mod twilio_client;
pub mod twiml;

pub use audio_cache::AudioCache;
pub use call_handler::{VoiceSessionHandler, VoiceWebhook};
pub use config::SwitchboardConfig;
pub use error::{TelephonyError, TelephonyResult};
pub use memory::{ConversationMemory, MessageTurn, Role, Session};
pub use runtime::{AgentRuntime, CallBindings, StaticRuntime};
pub use sms::{SmsHandler, SmsWebhook};
pub use tts::{ElevenLabsTts, SpeechSynthesizer, TtsError, TtsService};
pub use twilio_client::{TelephonyProvider, TwilioClient};
pub use twiml::TwimlBuilder;
