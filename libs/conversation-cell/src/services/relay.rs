// libs/conversation-cell/src/services/relay.rs
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::{AppState, Direction, DualPathStore, Filter, ReadPolicy, Sourced};

use crate::models::{
    Conversation, ConversationError, Message, MessagePageQuery, MessageType, SendMessageRequest,
    DEFAULT_MESSAGE_PAGE, MAX_MESSAGE_PAGE,
};

/// Stores and pages chat messages. Reads always merge both stores so that
/// messages written during a primary outage stay visible after it recovers.
pub struct MessageRelay {
    messages: DualPathStore<Message>,
    conversations: DualPathStore<Conversation>,
}

impl MessageRelay {
    pub fn new(state: &AppState) -> Self {
        Self::with_stores(state.store::<Message>(), state.store::<Conversation>())
    }

    pub fn with_stores(messages: DualPathStore<Message>, conversations: DualPathStore<Conversation>) -> Self {
        Self {
            messages: messages.with_read_policy(ReadPolicy::AlwaysMerge),
            conversations,
        }
    }

    pub async fn send(
        &self,
        conversation_id: &str,
        sender_id: &str,
        request: SendMessageRequest,
    ) -> Result<Sourced<Message>, ConversationError> {
        validate_message(&request)?;

        let conversation = self.conversations
            .get(conversation_id)
            .await?
            .ok_or(ConversationError::NotFound)?;

        if !conversation.value.is_participant(sender_id) {
            return Err(ConversationError::NotParticipant);
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: request.content,
            message_type: request.message_type,
            attachment: request.attachment,
            created_at: Utc::now(),
        };

        let stored = self.messages.put(message).await?;
        info!("Message {} sent in {} ({:?})", stored.value.id, conversation_id, stored.source);

        Ok(stored)
    }

    /// A page of messages in ascending `created_at` order: the newest `limit`
    /// messages strictly older than `before`.
    pub async fn list(
        &self,
        conversation_id: &str,
        page: &MessagePageQuery,
    ) -> Result<Vec<Message>, ConversationError> {
        let limit = page.limit.unwrap_or(DEFAULT_MESSAGE_PAGE).clamp(1, MAX_MESSAGE_PAGE);

        let mut filter = Filter::new().eq("conversation_id", conversation_id);
        if let Some(before) = page.before {
            filter = filter.lt_time("created_at", before);
        }
        let filter = filter.order_by("created_at", Direction::Desc).limit(limit);

        let mut messages = self.messages.list_values(&filter).await?;
        messages.reverse();

        debug!("Listed {} messages for {}", messages.len(), conversation_id);
        Ok(messages)
    }

    pub async fn latest(&self, conversation_id: &str) -> Result<Option<Message>, ConversationError> {
        let filter = Filter::new()
            .eq("conversation_id", conversation_id)
            .order_by("created_at", Direction::Desc)
            .limit(1);

        Ok(self.messages.list_values(&filter).await?.into_iter().next())
    }
}

fn validate_message(request: &SendMessageRequest) -> Result<(), ConversationError> {
    match request.message_type {
        MessageType::Text if request.content.trim().is_empty() => Err(ConversationError::ValidationError(
            "Text messages require content".to_string(),
        )),
        MessageType::Image | MessageType::File if request.attachment.is_none() => {
            Err(ConversationError::ValidationError(format!(
                "{:?} messages require an attachment",
                request.message_type
            )))
        }
        _ => Ok(()),
    }
}
