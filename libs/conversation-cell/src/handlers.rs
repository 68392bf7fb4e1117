use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use shared_database::AppState;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Conversation, ConversationError, MessagePageQuery, SendMessageRequest};
use crate::services::{ConversationService, MessageRelay};

#[derive(Debug, Deserialize)]
pub struct ConversationListQuery {
    pub user_id: Option<String>,
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::ValidationError(msg) => AppError::ValidationError(msg),
            ConversationError::NotFound => AppError::NotFound("Conversation not found".to_string()),
            ConversationError::NotParticipant => {
                AppError::Forbidden("Not a participant in this conversation".to_string())
            }
            ConversationError::Store(store_error) => {
                warn!("Conversation storage failure: {}", store_error);
                AppError::Database(store_error.to_string())
            }
        }
    }
}

fn ensure_can_read(conversation: &Conversation, user: &User) -> Result<(), AppError> {
    if conversation.is_participant(&user.id) || user.is_admin() {
        Ok(())
    } else {
        Err(ConversationError::NotParticipant.into())
    }
}

#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConversationListQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = query.user_id.unwrap_or_else(|| user.id.clone());
    if !user.acts_for(&user_id) {
        return Err(AppError::Forbidden("Not authorized to view these conversations".to_string()));
    }

    let listing = ConversationService::new(&state).list_for_user(&user_id).await?;

    Ok(Json(json!({
        "conversations": listing.items,
        "total": listing.records_only().len(),
        "placeholder": listing.placeholder
    })))
}

#[axum::debug_handler]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let mut conversation = ConversationService::new(&state).get(&conversation_id).await?;
    ensure_can_read(&conversation.value, &user)?;

    conversation.value.messages = MessageRelay::new(&state)
        .list(&conversation_id, &MessagePageQuery::default())
        .await?;

    Ok(Json(json!({
        "conversation": conversation.value,
        "source": conversation.source
    })))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(page): Query<MessagePageQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let conversation = ConversationService::new(&state).get(&conversation_id).await?;
    ensure_can_read(&conversation.value, &user)?;

    let messages = MessageRelay::new(&state).list(&conversation_id, &page).await?;

    Ok(Json(json!({
        "conversation_id": conversation_id,
        "messages": messages,
        "total": messages.len()
    })))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let stored = MessageRelay::new(&state)
        .send(&conversation_id, &user.id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": stored.value,
        "source": stored.source
    })))
}
