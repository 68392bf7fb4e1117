use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conversation_cell::{AppointmentParties, ConversationError};
use shared_database::{tables, Entity, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    // Display fields, denormalized only on records written to the fallback store.
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub patient_avatar: Option<String>,
    #[serde(default)]
    pub doctor_avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Appointment {
    const TABLE: &'static str = tables::APPOINTMENTS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl From<&Appointment> for AppointmentParties {
    fn from(appointment: &Appointment) -> Self {
        AppointmentParties {
            appointment_id: appointment.id.clone(),
            patient_id: appointment.patient_id.clone(),
            doctor_id: appointment.doctor_id.clone(),
            patient_name: appointment.patient_name.clone(),
            doctor_name: appointment.doctor_name.clone(),
            patient_avatar: appointment.patient_avatar.clone(),
            doctor_avatar: appointment.doctor_avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "rejected")]
    Rejected,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppointmentStatus::Pending)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::Approved => write!(f, "APPROVED"),
            AppointmentStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentRole {
    Patient,
    Doctor,
}

impl AppointmentRole {
    pub fn id_field(&self) -> &'static str {
        match self {
            AppointmentRole::Patient => "patient_id",
            AppointmentRole::Doctor => "doctor_id",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Availability slot this booking takes; synthesized slot ids are accepted and ignored.
    pub slot_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
    /// Acting doctor; defaults to the authenticated user.
    pub doctor_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Only the assigned doctor may change this appointment")]
    NotAssignedDoctor,

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
}

impl From<StoreError> for AppointmentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppointmentError::NotFound,
            other => AppointmentError::Store(other),
        }
    }
}
