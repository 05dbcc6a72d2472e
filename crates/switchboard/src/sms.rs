//! SMS message handling.
//!
//! Inbound texts flow through per-sender conversation threads keyed by the
//! sender's phone number; replies go out over the Twilio REST API and the
//! webhook itself answers with an empty TwiML document.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::SwitchboardConfig,
    error::{TelephonyError, TelephonyResult},
    memory::{ConversationMemory, Role},
    runtime::AgentRuntime,
    text::{redact_phone, truncate_to_sentence},
    twilio_client::{TelephonyProvider, TwilioClient},
    twiml::TwimlBuilder,
};

/// Character budget for a single outbound SMS segment
pub const SMS_MAX_CHARS: usize = 160;

const APOLOGY_MESSAGE: &str =
    "Sorry, I'm having trouble responding right now. Please try again later.";

/// Twilio SMS webhook form body
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmsWebhook {
    pub message_sid: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub body: Option<String>,
}

/// Handles inbound SMS webhooks and outbound sends
pub struct SmsHandler {
    config: SwitchboardConfig,
    threads: Arc<ConversationMemory>,
    client: Arc<dyn TelephonyProvider>,
}

impl SmsHandler {
    pub fn new(config: SwitchboardConfig, threads: Arc<ConversationMemory>) -> Self {
        let client = Arc::new(TwilioClient::new(
            config.account_sid.clone(),
            config.auth_token.clone(),
        ));
        Self::with_provider(config, threads, client)
    }

    pub fn with_provider(
        config: SwitchboardConfig,
        threads: Arc<ConversationMemory>,
        client: Arc<dyn TelephonyProvider>,
    ) -> Self {
        Self {
            config,
            threads,
            client,
        }
    }

    /// Number of live SMS conversation threads
    pub async fn active_threads(&self) -> usize {
        self.threads.len().await
    }

    /// Handle one SMS webhook callback, always producing valid TwiML
    pub async fn handle_sms_webhook(
        &self,
        request: SmsWebhook,
        runtime: Arc<dyn AgentRuntime>,
    ) -> String {
        let from = request.from.clone();
        match self.process_webhook(request, runtime).await {
            Ok(twiml) => twiml,
            Err(err) => {
                error!("SMS webhook failed for {}: {}", redact_phone(&from), err);
                TwimlBuilder::new().message(APOLOGY_MESSAGE).build()
            }
        }
    }

    async fn process_webhook(
        &self,
        request: SmsWebhook,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        let body = request.body.as_deref().unwrap_or("").trim().to_string();
        if body.is_empty() {
            warn!("Empty SMS body from {}", redact_phone(&request.from));
            return Ok(TwimlBuilder::empty());
        }

        info!("SMS from {}", redact_phone(&request.from));

        // One thread per sender, created on first contact.
        if self.threads.get_session(&request.from).await.is_none() {
            self.threads
                .create_session(&request.from, &self.config.character_name)
                .await;
        }
        self.threads
            .append_message(&request.from, Role::User, &body)
            .await?;

        let reply = self
            .generate_reply(&request.from, &body, runtime)
            .await?;

        self.threads
            .append_message(&request.from, Role::Assistant, &reply)
            .await?;

        self.send_sms(&request.from, &reply).await?;

        // Reply already went out over the REST API; acknowledge with an
        // empty document so Twilio doesn't send a second message.
        Ok(TwimlBuilder::empty())
    }

    async fn generate_reply(
        &self,
        from: &str,
        body: &str,
        runtime: Arc<dyn AgentRuntime>,
    ) -> TelephonyResult<String> {
        let transcript = self
            .threads
            .get_session(from)
            .await
            .map(|s| s.transcript())
            .unwrap_or_default();

        let prompt = format!(
            "You are {} texting with someone. Keep your reply under 160 \
             characters so it fits one SMS segment.\n\
             Conversation so far:\n{}\nThey just wrote: {}\nYour reply:",
            self.config.character_name, transcript, body
        );

        let reply = runtime
            .generate_text(&prompt)
            .await
            .map_err(|err| TelephonyError::GenerationFailed(err.to_string()))?;
        Ok(truncate_to_sentence(&reply, SMS_MAX_CHARS))
    }

    /// Send one text to `to` and return the body that went out.
    ///
    /// With `direct` set, `prompt_or_message` is sent verbatim after
    /// truncation. Otherwise it is treated as a prompt for the runtime and
    /// the generated reply is sent.
    pub async fn reply(
        &self,
        to: &str,
        prompt_or_message: &str,
        runtime: Arc<dyn AgentRuntime>,
        direct: bool,
    ) -> TelephonyResult<String> {
        let body = if direct {
            truncate_to_sentence(prompt_or_message, SMS_MAX_CHARS)
        } else {
            let generated = runtime
                .generate_text(prompt_or_message)
                .await
                .map_err(|err| TelephonyError::GenerationFailed(err.to_string()))?;
            truncate_to_sentence(&generated, SMS_MAX_CHARS)
        };
        self.send_sms(to, &body).await?;
        Ok(body)
    }

    /// Send an SMS verbatim, truncated at a sentence boundary to one segment
    pub async fn send_sms(&self, to: &str, body: &str) -> TelephonyResult<String> {
        if self.config.phone_number.is_empty() {
            return Err(TelephonyError::Config(
                "No originating phone number configured".to_string(),
            ));
        }
        let body = truncate_to_sentence(body, SMS_MAX_CHARS);
        self.client
            .send_sms(&self.config.phone_number, to, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StaticRuntime;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingProvider {
        sms_sends: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl TelephonyProvider for RecordingProvider {
        async fn start_call(
            &self,
            _from: &str,
            _to: &str,
            _callback_url: &str,
        ) -> TelephonyResult<String> {
            Ok("CA999".to_string())
        }

        async fn send_sms(&self, from: &str, to: &str, body: &str) -> TelephonyResult<String> {
            self.sms_sends
                .lock()
                .await
                .push((from.to_string(), to.to_string(), body.to_string()));
            Ok("SM999".to_string())
        }
    }

    fn test_config() -> SwitchboardConfig {
        SwitchboardConfig {
            account_sid: "AC-test".to_string(),
            auth_token: "token".to_string(),
            phone_number: "+15005550006".to_string(),
            webhook_base_url: "https://example.com".to_string(),
            ..Default::default()
        }
    }

    fn test_handler() -> SmsHandler {
        SmsHandler::new(test_config(), Arc::new(ConversationMemory::new("sms")))
    }

    fn handler_with_provider(provider: Arc<RecordingProvider>) -> SmsHandler {
        SmsHandler::with_provider(
            test_config(),
            Arc::new(ConversationMemory::new("sms")),
            provider,
        )
    }

    fn webhook(from: &str, body: Option<&str>) -> SmsWebhook {
        SmsWebhook {
            message_sid: Some("SM123".to_string()),
            from: from.to_string(),
            to: Some("+15005550006".to_string()),
            body: body.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_acknowledged_without_a_thread() {
        let handler = test_handler();
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply("hi"));

        let twiml = handler
            .handle_sms_webhook(webhook("+14155550123", Some("   ")), runtime)
            .await;
        assert_eq!(twiml, TwimlBuilder::empty());
        assert_eq!(handler.active_threads().await, 0);
    }

    #[tokio::test]
    async fn test_inbound_sms_sends_one_reply_and_records_both_turns() {
        let provider = Arc::new(RecordingProvider::default());
        let handler = handler_with_provider(provider.clone());
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply("Hello there."));

        let twiml = handler
            .handle_sms_webhook(webhook("+14155550123", Some("hello?")), runtime)
            .await;
        assert_eq!(twiml, TwimlBuilder::empty());

        let sends = provider.sms_sends.lock().await;
        assert_eq!(sends.len(), 1);
        let (from, to, body) = &sends[0];
        assert_eq!(from, "+15005550006");
        assert_eq!(to, "+14155550123");
        assert_eq!(body, "Hello there.");
        drop(sends);

        let session = handler.threads.get_session("+14155550123").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[0].content, "hello?");
        assert_eq!(session.messages[1].role, Role::Assistant);
        assert_eq!(session.messages[1].content, "Hello there.");
    }

    #[tokio::test]
    async fn test_followup_sms_reuses_the_thread() {
        let provider = Arc::new(RecordingProvider::default());
        let handler = handler_with_provider(provider.clone());
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply("Sure."));

        handler
            .handle_sms_webhook(webhook("+14155550123", Some("first")), runtime.clone())
            .await;
        handler
            .handle_sms_webhook(webhook("+14155550123", Some("second")), runtime)
            .await;

        assert_eq!(handler.active_threads().await, 1);
        assert_eq!(provider.sms_sends.lock().await.len(), 2);
        let session = handler.threads.get_session("+14155550123").await.unwrap();
        assert_eq!(session.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_reply_without_origin_number_is_config_error() {
        let config = SwitchboardConfig {
            account_sid: "AC-test".to_string(),
            auth_token: "token".to_string(),
            webhook_base_url: "https://example.com".to_string(),
            ..Default::default()
        };
        let handler = SmsHandler::new(config, Arc::new(ConversationMemory::new("sms")));
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply("hi"));

        let err = handler
            .reply("+14155550123", "Direct message.", runtime, true)
            .await
            .unwrap_err();
        assert!(matches!(err, TelephonyError::Config(_)));
    }

    #[tokio::test]
    async fn test_generated_reply_fits_one_segment() {
        let handler = test_handler();
        let long = "This is a sentence. ".repeat(30);
        let runtime: Arc<dyn AgentRuntime> = Arc::new(StaticRuntime::with_reply(long.clone()));

        handler.threads.create_session("+14155550123", "Ava").await;
        let reply = handler
            .generate_reply("+14155550123", "tell me everything", runtime)
            .await
            .unwrap();
        assert!(reply.len() <= SMS_MAX_CHARS);
        assert!(reply.ends_with('.'));
    }
}
