//! Thin client for the Twilio REST API (call initiation, SMS sending).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{TelephonyError, TelephonyResult},
    text::redact_phone,
};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// Outbound telephony seam; [`TwilioClient`] is the production backend
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Place an outbound call and return the new CallSid
    async fn start_call(&self, from: &str, to: &str, callback_url: &str)
        -> TelephonyResult<String>;

    /// Send a single SMS and return the new MessageSid
    async fn send_sms(&self, from: &str, to: &str, body: &str) -> TelephonyResult<String>;
}

#[derive(Debug, Deserialize)]
struct ResourceCreated {
    sid: String,
}

/// Basic-auth REST client scoped to one Twilio account
#[derive(Debug, Clone)]
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
        }
    }
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    /// Initiate an outbound call; Twilio fetches call-control TwiML from
    /// `callback_url` once the callee answers.
    async fn start_call(
        &self,
        from: &str,
        to: &str,
        callback_url: &str,
    ) -> TelephonyResult<String> {
        let response = self
            .client
            .post(format!(
                "{}/Accounts/{}/Calls.json",
                TWILIO_API_BASE, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", from),
                ("Url", callback_url),
                ("Method", "POST"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::ProviderApi {
                status: status.as_u16(),
                body,
            });
        }

        let created: ResourceCreated = response.json().await?;
        info!(
            "Started outbound call {} to {}",
            created.sid,
            redact_phone(to)
        );
        Ok(created.sid)
    }

    async fn send_sms(&self, from: &str, to: &str, body: &str) -> TelephonyResult<String> {
        let response = self
            .client
            .post(format!(
                "{}/Accounts/{}/Messages.json",
                TWILIO_API_BASE, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::ProviderApi {
                status: status.as_u16(),
                body,
            });
        }

        let created: ResourceCreated = response.json().await?;
        info!("Sent SMS to {} ({} chars)", redact_phone(to), body.len());
        Ok(created.sid)
    }
}
