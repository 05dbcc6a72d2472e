//! Environment-derived configuration for the Twilio gateway.

use serde::{Deserialize, Serialize};

/// Configuration for the Twilio gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchboardConfig {
    /// Twilio Account SID
    pub account_sid: String,
    /// Twilio Auth Token (also the webhook signature secret)
    pub auth_token: String,
    /// Twilio phone number used as the originating number
    pub phone_number: String,
    /// Base URL for webhooks (the server's public URL, no trailing slash)
    pub webhook_base_url: String,
    /// Preferred listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Inclusive port range scanned when the preferred port is taken
    #[serde(default = "default_port_fallback")]
    pub port_fallback: (u16, u16),
    /// ElevenLabs API key; absent means Twilio `<Say>` only
    pub elevenlabs_api_key: Option<String>,
    /// ElevenLabs voice id for synthesis
    #[serde(default = "default_voice_id")]
    pub elevenlabs_voice_id: String,
    /// ElevenLabs model id
    #[serde(default = "default_model_id")]
    pub elevenlabs_model_id: String,
    /// Twilio built-in voice used on the `<Say>` fallback path
    #[serde(default = "default_say_voice")]
    pub say_voice: String,
    /// Speech recognition language tag
    #[serde(default = "default_speech_language")]
    pub speech_language: String,
    /// Display label for the responding persona
    #[serde(default = "default_character_name")]
    pub character_name: String,
    /// Verbose request logging
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_port() -> u16 {
    3004
}

fn default_port_fallback() -> (u16, u16) {
    (3005, 3010)
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string() // Rachel
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}

fn default_say_voice() -> String {
    "Polly.Joanna".to_string()
}

fn default_speech_language() -> String {
    "en-US".to_string()
}

fn default_character_name() -> String {
    "Ava".to_string()
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
            webhook_base_url: String::new(),
            port: default_port(),
            port_fallback: default_port_fallback(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: default_voice_id(),
            elevenlabs_model_id: default_model_id(),
            say_voice: default_say_voice(),
            speech_language: default_speech_language(),
            character_name: default_character_name(),
            debug_logging: false,
        }
    }
}

impl SwitchboardConfig {
    /// Check whether the mandatory Twilio credentials are present
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty()
            && !self.auth_token.is_empty()
            && !self.phone_number.is_empty()
            && !self.webhook_base_url.is_empty()
    }

    /// Create config from environment variables
    ///
    /// Returns `None` when any of the mandatory Twilio settings is missing;
    /// optional settings fall back to their defaults.
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").ok()?;
        let phone_number = std::env::var("TWILIO_PHONE_NUMBER").ok()?;
        let webhook_base_url = std::env::var("TWILIO_WEBHOOK_BASE_URL").ok()?;

        let get_env_or_default = |key: &str, default: String| -> String {
            std::env::var(key)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(default)
        };

        let port = std::env::var("WEBHOOK_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_port);

        Some(Self {
            account_sid,
            auth_token,
            phone_number,
            webhook_base_url: webhook_base_url.trim_end_matches('/').to_string(),
            port,
            port_fallback: default_port_fallback(),
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            elevenlabs_voice_id: get_env_or_default("ELEVENLABS_VOICE_ID", default_voice_id()),
            elevenlabs_model_id: get_env_or_default("ELEVENLABS_MODEL_ID", default_model_id()),
            say_voice: get_env_or_default("TWILIO_SAY_VOICE", default_say_voice()),
            speech_language: get_env_or_default("TWILIO_SPEECH_LANGUAGE", default_speech_language()),
            character_name: get_env_or_default("CHARACTER_NAME", default_character_name()),
            debug_logging: std::env::var("TWILIO_DEBUG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    /// URL Twilio fetches cached audio from
    pub fn audio_url(&self, audio_id: &str) -> String {
        format!("{}/audio/{}", self.webhook_base_url, audio_id)
    }

    /// Action URL for incoming-call speech gathering
    pub fn voice_action_url(&self) -> String {
        format!("{}/webhook/voice", self.webhook_base_url)
    }

    /// Action URL for outgoing calls, carrying the optional topic
    pub fn outgoing_action_url(&self, topic: Option<&str>) -> String {
        match topic {
            Some(t) if !t.is_empty() => format!(
                "{}/webhook/voice/outgoing?topic={}",
                self.webhook_base_url,
                urlencoding::encode(t)
            ),
            _ => format!("{}/webhook/voice/outgoing", self.webhook_base_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_not_configured() {
        let config = SwitchboardConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.port, 3004);
        assert_eq!(config.speech_language, "en-US");
    }

    #[test]
    fn test_outgoing_action_url_encodes_topic() {
        let config = SwitchboardConfig {
            webhook_base_url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.outgoing_action_url(Some("quarterly results")),
            "https://example.com/webhook/voice/outgoing?topic=quarterly%20results"
        );
        assert_eq!(
            config.outgoing_action_url(None),
            "https://example.com/webhook/voice/outgoing"
        );
    }
}
