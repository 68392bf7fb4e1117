// libs/appointment-cell/src/handlers.rs
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

use crate::models::{
    Appointment, AppointmentError, AppointmentRole, BookAppointmentRequest,
    UpdateAppointmentStatusRequest,
};
use crate::services::AppointmentBookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub user_id: Option<String>,
    pub role: Option<AppointmentRole>,
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
            AppointmentError::NotAssignedDoctor => AppError::Forbidden(e.to_string()),
            AppointmentError::Store(store_error) => {
                warn!("Appointment storage failure: {}", store_error);
                AppError::Database(store_error.to_string())
            }
            AppointmentError::Conversation(conversation_error) => conversation_error.into(),
        }
    }
}

fn ensure_party(appointment: &Appointment, user: &User) -> Result<(), AppError> {
    if user.acts_for(&appointment.patient_id) || user.acts_for(&appointment.doctor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not authorized to view this appointment".to_string()))
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(mut request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; admins may book for anyone.
    let patient_id = request.patient_id.get_or_insert_with(|| user.id.clone());
    if !user.acts_for(patient_id.as_str()) {
        return Err(AppError::Forbidden("Patients can only book appointments for themselves".to_string()));
    }

    let booked = AppointmentBookingService::new(&state).book(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": booked.value,
        "source": booked.source
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state).get(&appointment_id).await?;
    ensure_party(&appointment.value, &user)?;

    Ok(Json(json!({
        "appointment": appointment.value,
        "source": appointment.source
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<String>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = match request.doctor_id {
        Some(doctor_id) if user.acts_for(&doctor_id) => doctor_id,
        Some(_) => {
            return Err(AppError::Forbidden("Doctors can only act on their own appointments".to_string()));
        }
        None if user.is_admin() => {
            return Err(AppError::BadRequest("doctor_id is required when acting as admin".to_string()));
        }
        None => user.id.clone(),
    };

    let change = AppointmentBookingService::new(&state)
        .set_status(&appointment_id, &doctor_id, request.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "changed": change.changed,
        "appointment": change.appointment.value,
        "source": change.appointment.source,
        "conversation": change.conversation.map(|c| c.value)
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppointmentListQuery>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let user_id = query.user_id.unwrap_or_else(|| user.id.clone());
    if !user.acts_for(&user_id) {
        return Err(AppError::Forbidden("Not authorized to view these appointments".to_string()));
    }

    let role = query.role.unwrap_or(if user.has_role("doctor") {
        AppointmentRole::Doctor
    } else {
        AppointmentRole::Patient
    });

    let listing = AppointmentBookingService::new(&state)
        .list_for_user(&user_id, role)
        .await?;

    Ok(Json(json!({
        "appointments": listing.items,
        "total": listing.records_only().len(),
        "placeholder": listing.placeholder
    })))
}
