//! In-process direct messaging between two accounts.
//!
//! Each participant keeps their own view of a conversation (unread counter,
//! last message) so one side can delete it without touching the other's list.
//! State lives as long as the [`Messenger`] handle and its clones.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::{Account, AccountSummary},
    store::{Store, StoreError},
    validation::{FieldErrors, validate},
};

pub const MAX_MESSAGE_LEN: usize = 1000;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<FieldErrors> for MessagingError {
    fn from(errors: FieldErrors) -> Self {
        MessagingError::Validation(errors)
    }
}

impl From<StoreError> for MessagingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, .. } => {
                MessagingError::NotFound(format!("{entity} not found"))
            }
            other => MessagingError::Store(other.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: String,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SendMessageInput {
    pub recipient_id: Uuid,
    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StartConversationInput {
    pub recipient_id: Uuid,
    #[serde(default)]
    #[validate(length(max = 1000, message = "Message cannot exceed 1000 characters"))]
    pub initial_message: Option<String>,
}

/// One participant's view of a conversation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub id: String,
    pub other: AccountSummary,
    pub last_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub unread: bool,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartedConversation {
    pub conversation_id: String,
    pub message: Option<Message>,
}

#[derive(Debug, Clone)]
struct Participation {
    conversation_id: String,
    other_id: Uuid,
    last_message: Option<String>,
    timestamp: DateTime<Utc>,
    unread_count: u32,
}

#[derive(Default)]
struct State {
    inboxes: HashMap<Uuid, Vec<Participation>>,
    messages: HashMap<String, Vec<Message>>,
}

impl State {
    fn participation_mut(&mut self, account_id: Uuid, conversation_id: &str) -> Option<&mut Participation> {
        self.inboxes
            .get_mut(&account_id)?
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id)
    }

    /// Creates the participation if missing and records `content` as the latest message.
    fn touch(
        &mut self,
        account_id: Uuid,
        other_id: Uuid,
        conversation_id: &str,
        content: Option<&str>,
        at: DateTime<Utc>,
        incoming: bool,
    ) {
        let inbox = self.inboxes.entry(account_id).or_default();
        let participation = match inbox
            .iter()
            .position(|p| p.conversation_id == conversation_id)
        {
            Some(index) => &mut inbox[index],
            None => {
                inbox.push(Participation {
                    conversation_id: conversation_id.to_owned(),
                    other_id,
                    last_message: None,
                    timestamp: at,
                    unread_count: 0,
                });
                let last = inbox.len() - 1;
                &mut inbox[last]
            }
        };
        if let Some(content) = content {
            participation.last_message = Some(content.to_owned());
            participation.timestamp = at;
            if incoming {
                participation.unread_count += 1;
            }
        }
    }

    fn push_message(&mut self, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Message {
        let conversation_id = conversation_id(sender_id, recipient_id);
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.clone(),
            sender_id,
            recipient_id,
            content: content.to_owned(),
            sent_at: Utc::now(),
            read: false,
        };
        self.touch(sender_id, recipient_id, &conversation_id, Some(content), message.sent_at, false);
        self.touch(recipient_id, sender_id, &conversation_id, Some(content), message.sent_at, true);
        self.messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        message
    }

    fn mark_read(&mut self, account_id: Uuid, conversation_id: &str) {
        if let Some(participation) = self.participation_mut(account_id, conversation_id) {
            participation.unread_count = 0;
        }
        if let Some(messages) = self.messages.get_mut(conversation_id) {
            for message in messages.iter_mut().filter(|m| m.recipient_id == account_id) {
                message.read = true;
            }
        }
    }
}

/// Conversation ids are the two account ids, sorted, joined with `_`.
pub fn conversation_id(a: Uuid, b: Uuid) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    format!("{first}_{second}")
}

fn participants(conversation_id: &str) -> Option<(Uuid, Uuid)> {
    let (first, second) = conversation_id.split_once('_')?;
    Some((first.parse().ok()?, second.parse().ok()?))
}

fn ensure_participant(account_id: Uuid, conversation_id: &str) -> Result<(), MessagingError> {
    match participants(conversation_id) {
        Some((a, b)) if a == account_id || b == account_id => Ok(()),
        Some(_) => Err(MessagingError::Forbidden(
            "You are not a participant in this conversation".into(),
        )),
        None => Err(MessagingError::NotFound("Conversation not found".into())),
    }
}

#[derive(Clone)]
pub struct Messenger {
    state: Arc<RwLock<State>>,
    store: Arc<dyn Store>,
}

impl Messenger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            state: Arc::default(),
            store,
        }
    }

    async fn recipient(&self, sender_id: Uuid, recipient_id: Uuid) -> Result<Account, MessagingError> {
        if sender_id == recipient_id {
            return Err(FieldErrors::single("recipient_id", "Cannot message yourself").into());
        }
        match self.store.fetch_account(recipient_id).await {
            Ok(account) if account.is_active => Ok(account),
            Ok(_) | Err(StoreError::NotFound { .. }) => {
                Err(MessagingError::NotFound("Recipient not found".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn send(&self, sender_id: Uuid, input: SendMessageInput) -> Result<Message, MessagingError> {
        validate(&input)?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(FieldErrors::single("content", "Message cannot be empty").into());
        }
        self.recipient(sender_id, input.recipient_id).await?;

        let message = self
            .state
            .write()
            .push_message(sender_id, input.recipient_id, content);
        info!(conversation_id = %message.conversation_id, %sender_id, "Message sent");
        Ok(message)
    }

    /// Fails with [`MessagingError::Conflict`] if the sender already has this conversation.
    pub async fn start_conversation(
        &self,
        sender_id: Uuid,
        input: StartConversationInput,
    ) -> Result<StartedConversation, MessagingError> {
        validate(&input)?;
        self.recipient(sender_id, input.recipient_id).await?;
        let id = conversation_id(sender_id, input.recipient_id);
        let initial = input
            .initial_message
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty());

        let mut state = self.state.write();
        if state.participation_mut(sender_id, &id).is_some() {
            return Err(MessagingError::Conflict(format!(
                "Conversation {id} already exists"
            )));
        }
        let message = match initial {
            Some(content) => Some(state.push_message(sender_id, input.recipient_id, content)),
            None => {
                let now = Utc::now();
                state.touch(sender_id, input.recipient_id, &id, None, now, false);
                state.touch(input.recipient_id, sender_id, &id, None, now, false);
                None
            }
        };
        drop(state);

        info!(conversation_id = %id, %sender_id, "Conversation started");
        Ok(StartedConversation {
            conversation_id: id,
            message,
        })
    }

    /// Most recent activity first.
    pub async fn list_conversations(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        let mut inbox = self
            .state
            .read()
            .inboxes
            .get(&account_id)
            .cloned()
            .unwrap_or_default();
        inbox.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut summaries = Vec::with_capacity(inbox.len());
        for participation in inbox {
            let other = self.store.fetch_account(participation.other_id).await?;
            summaries.push(ConversationSummary {
                id: participation.conversation_id,
                other: other.summary(),
                last_message: participation.last_message,
                timestamp: participation.timestamp,
                unread: participation.unread_count > 0,
                unread_count: participation.unread_count,
            });
        }
        Ok(summaries)
    }

    /// Returns the messages oldest first and marks the caller's side as read.
    pub fn get_messages(
        &self,
        account_id: Uuid,
        conversation_id: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        ensure_participant(account_id, conversation_id)?;
        let mut state = self.state.write();
        let messages = state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        state.mark_read(account_id, conversation_id);
        Ok(messages)
    }

    pub fn mark_read(&self, account_id: Uuid, conversation_id: &str) -> Result<(), MessagingError> {
        ensure_participant(account_id, conversation_id)?;
        self.state.write().mark_read(account_id, conversation_id);
        Ok(())
    }

    /// Removes the conversation from the caller's list and drops its messages.
    pub fn delete_conversation(
        &self,
        account_id: Uuid,
        conversation_id: &str,
    ) -> Result<(), MessagingError> {
        ensure_participant(account_id, conversation_id)?;
        let mut state = self.state.write();
        if let Some(inbox) = state.inboxes.get_mut(&account_id) {
            inbox.retain(|p| p.conversation_id != conversation_id);
        }
        state.messages.remove(conversation_id);
        info!(%conversation_id, %account_id, "Conversation deleted");
        Ok(())
    }

    pub fn unread_count(&self, account_id: Uuid) -> u32 {
        self.state
            .read()
            .inboxes
            .get(&account_id)
            .map(|inbox| inbox.iter().map(|p| p.unread_count).sum())
            .unwrap_or_default()
    }
}
