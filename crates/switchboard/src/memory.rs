//! Per-session conversation memory with idle eviction.
//!
//! Two instances of this component run in the process: one keyed by Twilio
//! CallSid for voice calls, one keyed by sender phone number for SMS
//! threads. The policy is identical, the keyspaces are disjoint.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{TelephonyError, TelephonyResult};

/// How long a session may sit idle before the sweep removes it
pub const IDLE_TTL: Duration = Duration::from_secs(30 * 60);
/// How often the idle sweep runs
pub const SWEEP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Who produced a message turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation
#[derive(Debug, Clone)]
pub struct MessageTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// State for one conversation (a live call or an SMS thread)
#[derive(Debug, Clone)]
pub struct Session {
    /// Display label for the responding persona
    pub character_name: String,
    /// Turns in insertion order
    pub messages: Vec<MessageTurn>,
    /// Refreshed on every append
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Render the conversation as prompt context
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.messages {
            let speaker = match turn.role {
                Role::User => "Caller",
                Role::Assistant => self.character_name.as_str(),
            };
            out.push_str(speaker);
            out.push_str(": ");
            out.push_str(&turn.content);
            out.push('\n');
        }
        out
    }
}

/// Session store with idle-TTL eviction
pub struct ConversationMemory {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    idle_ttl: Duration,
    /// Appears in logs to tell the voice and SMS instances apart
    label: &'static str,
}

impl ConversationMemory {
    pub fn new(label: &'static str) -> Self {
        Self::with_ttl(label, IDLE_TTL)
    }

    pub fn with_ttl(label: &'static str, idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl,
            label,
        }
    }

    /// Initialize an empty session, replacing any existing one for `id`
    pub async fn create_session(&self, id: &str, character_name: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.to_string(),
            Session {
                character_name: character_name.to_string(),
                messages: Vec::new(),
                last_activity: Utc::now(),
            },
        );
        debug!("Created {} session {}", self.label, id);
    }

    /// Append a turn, refreshing the session's activity timestamp
    ///
    /// Blank content is dropped with a log line; appending to an unknown id
    /// is a [`TelephonyError::SessionNotFound`] so the caller can decide to
    /// recreate the session rather than treat it as fatal.
    pub async fn append_message(&self, id: &str, role: Role, content: &str) -> TelephonyResult<()> {
        if content.trim().is_empty() {
            warn!("Ignoring empty {:?} message for {} session {}", role, self.label, id);
            return Ok(());
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| TelephonyError::SessionNotFound(id.to_string()))?;

        session.messages.push(MessageTurn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        session.last_activity = Utc::now();
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Explicit removal (call cleanup)
    pub async fn clear_session(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(id).is_some() {
            debug!("Cleared {} session {}", self.label, id);
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove every session idle longer than the TTL; returns how many went
    pub async fn sweep_idle(&self) -> usize {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(self.idle_ttl).unwrap_or_default();
        let mut sessions = self.sessions.write().await;

        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.last_activity < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            sessions.remove(id);
        }

        if !stale.is_empty() {
            info!("Swept {} idle {} session(s)", stale.len(), self.label);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order_and_activity() {
        let memory = ConversationMemory::new("voice");
        memory.create_session("CA123", "Ava").await;

        let created = memory.get_session("CA123").await.unwrap().last_activity;

        memory
            .append_message("CA123", Role::Assistant, "Hello, how can I help?")
            .await
            .unwrap();
        memory
            .append_message("CA123", Role::User, "Tell me about the weather")
            .await
            .unwrap();

        let session = memory.get_session("CA123").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::Assistant);
        assert_eq!(session.messages[1].role, Role::User);
        assert!(session.messages[0].timestamp <= session.messages[1].timestamp);
        assert!(session.last_activity >= created);
    }

    #[tokio::test]
    async fn test_append_without_session_fails() {
        let memory = ConversationMemory::new("voice");
        memory.create_session("CA-other", "Ava").await;

        let err = memory
            .append_message("CA404", Role::User, "hello?")
            .await
            .unwrap_err();
        assert!(matches!(err, TelephonyError::SessionNotFound(_)));

        // No other session was touched.
        let other = memory.get_session("CA-other").await.unwrap();
        assert!(other.messages.is_empty());
    }

    #[tokio::test]
    async fn test_blank_content_is_dropped() {
        let memory = ConversationMemory::new("sms");
        memory.create_session("+14155550123", "Ava").await;
        memory
            .append_message("+14155550123", Role::User, "   ")
            .await
            .unwrap();
        let session = memory.get_session("+14155550123").await.unwrap();
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn test_create_overwrites_existing() {
        let memory = ConversationMemory::new("voice");
        memory.create_session("CA123", "Ava").await;
        memory
            .append_message("CA123", Role::User, "first call")
            .await
            .unwrap();

        memory.create_session("CA123", "Ava").await;
        let session = memory.get_session("CA123").await.unwrap();
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn test_idle_sweep_evicts_only_stale_sessions() {
        let memory = ConversationMemory::with_ttl("voice", Duration::from_millis(50));
        memory.create_session("stale", "Ava").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        memory.create_session("fresh", "Ava").await;

        let removed = memory.sweep_idle().await;
        assert_eq!(removed, 1);
        assert!(memory.get_session("stale").await.is_none());
        assert!(memory.get_session("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_transcript_labels_speakers() {
        let memory = ConversationMemory::new("voice");
        memory.create_session("CA123", "Ava").await;
        memory
            .append_message("CA123", Role::Assistant, "Hello!")
            .await
            .unwrap();
        memory
            .append_message("CA123", Role::User, "Hi Ava")
            .await
            .unwrap();

        let transcript = memory.get_session("CA123").await.unwrap().transcript();
        assert_eq!(transcript, "Ava: Hello!\nCaller: Hi Ava\n");
    }
}
