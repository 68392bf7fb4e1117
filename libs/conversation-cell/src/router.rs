use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn conversation_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::list_conversations))
        .route("/{conversation_id}", get(handlers::get_conversation))
        .route(
            "/{conversation_id}/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
