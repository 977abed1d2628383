//! Outbound mail for negotiation messages.
//!
//! The only shipped channel is [`DraftMailer`], which records drafts
//! in memory instead of delivering them. It keeps the full channel
//! contract (message ids, thread ids, reply polling) so the rest of
//! the system is written against [`MailChannel`] and a real provider
//! can slot in later.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use haggler_core::config::MailConfig;
use haggler_core::domain::outcome::ThreadId;

#[derive(Debug, Error)]
pub enum MailError {
    /// The channel is configured off; callers should treat this as a
    /// deliberate dry run, not an outage.
    #[error("mail channel is disabled")]
    Disabled,
    #[error("mail channel is misconfigured: {0}")]
    Misconfigured(String),
    #[error("unknown thread `{0}`")]
    UnknownThread(String),
}

/// Receipt for one sent message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    pub message_id: String,
    pub thread_id: ThreadId,
}

/// A vendor reply observed on a thread.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub thread_id: ThreadId,
    pub from_address: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait MailChannel: Send + Sync {
    /// Send a message, opening a new thread when `thread_id` is `None`
    /// and continuing the existing one otherwise.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        thread_id: Option<&ThreadId>,
    ) -> Result<MessageHandle, MailError>;

    /// Replies that arrived on a thread since the last poll.
    async fn poll(&self, thread_id: &ThreadId) -> Result<Vec<InboundMessage>, MailError>;
}

/// A recorded outbound draft, retained for inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundDraft {
    pub message_id: String,
    pub thread_id: ThreadId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
struct DraftState {
    drafts: Vec<OutboundDraft>,
    pending_replies: HashMap<String, Vec<InboundMessage>>,
}

/// In-memory channel: records drafts, appends the configured signature,
/// and never talks to a provider.
pub struct DraftMailer {
    from_address: String,
    signature: String,
    state: RwLock<DraftState>,
}

impl DraftMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        if !config.enabled {
            return Err(MailError::Disabled);
        }
        let from_address = config
            .from_address
            .clone()
            .ok_or_else(|| MailError::Misconfigured("mail.from_address is not set".into()))?;

        Ok(Self {
            from_address,
            signature: config.signature.clone(),
            state: RwLock::new(DraftState::default()),
        })
    }

    /// All drafts recorded so far, oldest first.
    pub async fn drafts(&self) -> Vec<OutboundDraft> {
        self.state.read().await.drafts.clone()
    }

    /// Queue a reply that the next `poll` on the thread will return.
    pub async fn inject_reply(&self, thread_id: &ThreadId, from_address: &str, body: &str) {
        let mut state = self.state.write().await;
        state.pending_replies.entry(thread_id.0.clone()).or_default().push(InboundMessage {
            thread_id: thread_id.clone(),
            from_address: from_address.to_string(),
            body: body.to_string(),
            received_at: Utc::now(),
        });
    }

    fn compose(&self, body: &str) -> String {
        if self.signature.is_empty() {
            body.to_string()
        } else {
            format!("{body}\n\n{}", self.signature)
        }
    }
}

#[async_trait]
impl MailChannel for DraftMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        thread_id: Option<&ThreadId>,
    ) -> Result<MessageHandle, MailError> {
        let thread_id = match thread_id {
            Some(existing) => {
                let state = self.state.read().await;
                let known = state.drafts.iter().any(|draft| draft.thread_id == *existing);
                if !known {
                    return Err(MailError::UnknownThread(existing.0.clone()));
                }
                existing.clone()
            }
            None => ThreadId(Uuid::new_v4().to_string()),
        };

        let draft = OutboundDraft {
            message_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.clone(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: self.compose(body),
            sent_at: Utc::now(),
        };

        info!(
            from = %self.from_address,
            recipient,
            subject,
            thread_id = %thread_id,
            "recorded outbound draft"
        );

        let handle =
            MessageHandle { message_id: draft.message_id.clone(), thread_id: thread_id.clone() };
        self.state.write().await.drafts.push(draft);
        Ok(handle)
    }

    async fn poll(&self, thread_id: &ThreadId) -> Result<Vec<InboundMessage>, MailError> {
        let mut state = self.state.write().await;
        let known = state.drafts.iter().any(|draft| draft.thread_id == *thread_id);
        if !known {
            return Err(MailError::UnknownThread(thread_id.0.clone()));
        }
        Ok(state.pending_replies.remove(&thread_id.0).unwrap_or_default())
    }
}
