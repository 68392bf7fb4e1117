use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use shared_database::AppState;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AvailabilityError, CreateAvailabilityRequest};
use crate::services::AvailabilityService;

impl From<AvailabilityError> for AppError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
            AvailabilityError::NotFound => AppError::NotFound("Availability slot not found".to_string()),
            AvailabilityError::Store(store_error) => {
                warn!("Availability storage failure: {}", store_error);
                AppError::Database(store_error.to_string())
            }
        }
    }
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let availability = availability_service
        .get_availability(&doctor_id, Utc::now().date_naive())
        .await?;

    Ok(Json(json!({
        "doctor_id": availability.doctor_id,
        "slots": availability.slots,
        "total_slots": availability.slots.len(),
        "synthesized": availability.synthesized,
        "source": availability.source
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.acts_for(&doctor_id) {
        return Err(AppError::Forbidden(
            "Not authorized to manage this doctor's availability".to_string(),
        ));
    }

    let availability_service = AvailabilityService::new(&state);
    let slot = availability_service.create_availability(&doctor_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "slot": slot
    })))
}
