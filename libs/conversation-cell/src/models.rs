use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::{tables, Entity, StoreError, StoreSource};

pub const PLACEHOLDER_PATIENT_NAME: &str = "Patient";
pub const PLACEHOLDER_DOCTOR_NAME: &str = "Doctor";
pub const PLACEHOLDER_AVATAR_URL: &str = "/images/default-avatar.png";

pub const DEFAULT_MESSAGE_PAGE: usize = 50;
pub const MAX_MESSAGE_PAGE: usize = 100;

// ==============================================================================
// CONVERSATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Patient,
    VerifiedDoctor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub username: String,
    pub avatar_url: String,
    pub role: ParticipantRole,
}

/// Chat thread derived from an approved appointment. Exactly one per appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub participants: Vec<Participant>,
    /// Empty when derived. Messages are stored in their own table and only
    /// attached when a conversation is read with its latest page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Conversation {
    const TABLE: &'static str = tables::CONVERSATIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Conversation {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// The appointment fields a conversation is derived from.
#[derive(Debug, Clone, Default)]
pub struct AppointmentParties {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub patient_name: Option<String>,
    pub doctor_name: Option<String>,
    pub patient_avatar: Option<String>,
    pub doctor_avatar: Option<String>,
}

/// One row of a user's inbox.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub last_message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<StoreSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl ConversationSummary {
    /// When the conversation last saw a message, or its own `updated_at`.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|message| message.created_at)
            .unwrap_or(self.conversation.updated_at)
    }
}

// ==============================================================================
// MESSAGES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Message {
    const TABLE: &'static str = tables::MESSAGES;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePageQuery {
    pub limit: Option<usize>,
    /// Exclusive upper bound on `created_at`.
    pub before: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conversation not found")]
    NotFound,

    #[error("Not a participant in this conversation")]
    NotParticipant,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
