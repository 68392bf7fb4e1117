// libs/conversation-cell/src/services/conversation.rs
use std::collections::HashMap;

use chrono::Utc;
use futures::future::try_join_all;
use tracing::{debug, info};

use shared_database::{AppState, DualPathStore, Filter, Listing, ReadPolicy, Sourced};

use crate::models::{Conversation, ConversationError, ConversationSummary};
use crate::services::relay::MessageRelay;

pub const PLACEHOLDER_CONVERSATION_ID: &str = "conv-placeholder";

pub struct ConversationService {
    conversations: DualPathStore<Conversation>,
    relay: MessageRelay,
}

impl ConversationService {
    pub fn new(state: &AppState) -> Self {
        Self {
            conversations: state.store::<Conversation>().with_read_policy(ReadPolicy::AlwaysMerge),
            relay: MessageRelay::new(state),
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Sourced<Conversation>, ConversationError> {
        self.conversations
            .get(conversation_id)
            .await?
            .ok_or(ConversationError::NotFound)
    }

    /// Every conversation the user takes part in, each with its latest message,
    /// ordered by the newest message (or `updated_at` when there is none). Falls back to a single explanatory placeholder.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Listing<ConversationSummary>, ConversationError> {
        debug!("Listing conversations for user: {}", user_id);

        let as_patient = self.conversations.list(&Filter::new().eq("patient_id", user_id)).await?;
        let as_doctor = self.conversations.list(&Filter::new().eq("doctor_id", user_id)).await?;

        let mut by_id: HashMap<String, Sourced<Conversation>> = HashMap::new();
        for conversation in as_patient.into_iter().chain(as_doctor) {
            by_id.entry(conversation.value.id.clone()).or_insert(conversation);
        }

        if by_id.is_empty() {
            info!("No conversations for user {}, returning placeholder", user_id);
            return Ok(Listing::placeholder(placeholder_summary(user_id)));
        }

        let mut summaries = try_join_all(by_id.into_values().map(|conversation| async move {
            let last_message = self.relay.latest(&conversation.value.id).await?;
            Ok::<_, ConversationError>(ConversationSummary {
                conversation: conversation.value,
                last_message,
                source: Some(conversation.source),
                notice: None,
            })
        }))
        .await?;

        summaries.sort_by(|a, b| b.last_activity().cmp(&a.last_activity())
            .then_with(|| a.conversation.id.cmp(&b.conversation.id)));

        Ok(Listing::records(summaries))
    }
}

fn placeholder_summary(user_id: &str) -> ConversationSummary {
    let now = Utc::now();
    ConversationSummary {
        conversation: Conversation {
            id: PLACEHOLDER_CONVERSATION_ID.to_string(),
            appointment_id: String::new(),
            patient_id: user_id.to_string(),
            doctor_id: String::new(),
            participants: Vec::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        },
        last_message: None,
        source: None,
        notice: Some(
            "No conversations yet. A conversation opens when a doctor approves one of your appointments."
                .to_string(),
        ),
    }
}
