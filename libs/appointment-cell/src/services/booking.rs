// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use conversation_cell::{
    Conversation, ConversationDeriver, PLACEHOLDER_DOCTOR_NAME, PLACEHOLDER_PATIENT_NAME,
};
use doctor_cell::services::AvailabilityService;
use shared_database::{
    AppState, Direction, DualPathStore, Filter, IdentityLookup, Listing, ReadPolicy, Sourced,
    StoreError,
};

use crate::models::{
    Appointment, AppointmentError, AppointmentRole, AppointmentStatus, BookAppointmentRequest,
};
use crate::services::lifecycle::{AppointmentLifecycleService, Transition};

pub const PLACEHOLDER_APPOINTMENT_ID: &str = "appointment-placeholder";

/// Outcome of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub appointment: Sourced<Appointment>,
    /// Set whenever the new status derives a conversation.
    pub conversation: Option<Sourced<Conversation>>,
    /// False when the appointment already held the requested terminal status.
    pub changed: bool,
}

pub struct AppointmentBookingService {
    store: DualPathStore<Appointment>,
    identity: Arc<dyn IdentityLookup>,
    lifecycle_service: AppointmentLifecycleService,
    deriver: ConversationDeriver,
    availability_service: AvailabilityService,
}

impl AppointmentBookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store::<Appointment>(),
            identity: Arc::clone(&state.identity),
            lifecycle_service: AppointmentLifecycleService::new(),
            deriver: ConversationDeriver::new(state),
            availability_service: AvailabilityService::new(state),
        }
    }

    /// Create a PENDING appointment.
    ///
    /// When the primary store rejects the write, display names and avatars are
    /// resolved before the record lands in the fallback store.
    #[instrument(skip_all)]
    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Sourced<Appointment>, AppointmentError> {
        let (patient_id, doctor_id, start_time, end_time) = validate_booking(&request)?;
        info!("Booking appointment for patient {} with doctor {}", patient_id, doctor_id);

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            patient_id,
            doctor_id,
            start_time,
            end_time,
            reason: request.reason.filter(|r| !r.trim().is_empty()),
            status: AppointmentStatus::Pending,
            patient_name: None,
            doctor_name: None,
            patient_avatar: None,
            doctor_avatar: None,
            created_at: now,
            updated_at: now,
        };

        let identity = Arc::clone(&self.identity);
        let stored = self.store
            .put_with(appointment, move |appointment| denormalize(identity, appointment))
            .await?;

        info!("Appointment {} created ({:?})", stored.value.id, stored.source);

        if let Some(slot_id) = request.slot_id.as_deref() {
            if let Err(e) = self.availability_service.mark_booked(slot_id).await {
                warn!("Appointment {} booked but slot {} was not marked: {}", stored.value.id, slot_id, e);
            }
        }

        Ok(stored)
    }

    pub async fn get(&self, appointment_id: &str) -> Result<Sourced<Appointment>, AppointmentError> {
        Ok(self.store.require(appointment_id).await?)
    }

    /// Move an appointment out of PENDING on behalf of its doctor.
    ///
    /// The record is updated in the store it was found in. Approval derives
    /// the appointment's conversation, also when repeated.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        appointment_id: &str,
        doctor_id: &str,
        status: AppointmentStatus,
    ) -> Result<StatusChange, AppointmentError> {
        let located = self.store.require(appointment_id).await?;

        if located.value.doctor_id != doctor_id {
            warn!("Doctor {} attempted to change appointment {} owned by {}",
                  doctor_id, appointment_id, located.value.doctor_id);
            return Err(AppointmentError::NotAssignedDoctor);
        }

        let (appointment, changed) = match self.lifecycle_service.plan_transition(&located.value.status, &status)? {
            Transition::AlreadyApplied => {
                debug!("Appointment {} is already {}", appointment_id, status);
                (located, false)
            }
            Transition::Apply => {
                let mut updated = located.value.clone();
                updated.status = status;
                updated.updated_at = Utc::now();

                // Only lands while the record still holds the status it was planned from.
                let planned_from = serde_json::to_value(located.value.status).map_err(StoreError::from)?;
                let guard = Filter::new().eq("status", planned_from);

                match self.store.update_in_where(located.source, &updated, &guard).await {
                    Ok(stored) => {
                        info!("Appointment {} is now {} ({:?})", appointment_id, status, stored.source);
                        (stored, true)
                    }
                    Err(conflict @ StoreError::Conflict { .. }) => {
                        let current = self.store.require(appointment_id).await?;
                        warn!("Appointment {} changed to {} concurrently", appointment_id, current.value.status);
                        match self.lifecycle_service.plan_transition(&current.value.status, &status)? {
                            Transition::AlreadyApplied => (current, false),
                            Transition::Apply => return Err(conflict.into()),
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let conversation = if self.lifecycle_service.derives_conversation(&appointment.value.status) {
            let (conversation, _) = self.deriver.create(&(&appointment.value).into()).await?;
            Some(conversation)
        } else {
            None
        };

        Ok(StatusChange { appointment, conversation, changed })
    }

    /// Appointments where the user holds `role`, from both stores, earliest first.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        role: AppointmentRole,
    ) -> Result<Listing<Appointment>, AppointmentError> {
        debug!("Listing appointments for {:?} {}", role, user_id);

        let filter = Filter::new()
            .eq(role.id_field(), user_id)
            .order_by("start_time", Direction::Asc);

        let appointments = self.store
            .clone()
            .with_read_policy(ReadPolicy::AlwaysMerge)
            .list_values(&filter)
            .await?;

        if appointments.is_empty() {
            info!("No appointments for {} in either store, returning placeholder", user_id);
            return Ok(Listing::placeholder(placeholder_appointment(user_id, role)));
        }

        Ok(Listing::records(appointments))
    }
}

fn validate_booking(
    request: &BookAppointmentRequest,
) -> Result<(String, String, DateTime<Utc>, DateTime<Utc>), AppointmentError> {
    fn required(value: &Option<String>, field: &str) -> Result<String, AppointmentError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppointmentError::ValidationError(format!("{} is required", field)))
    }

    let patient_id = required(&request.patient_id, "patient_id")?;
    let doctor_id = required(&request.doctor_id, "doctor_id")?;

    let (start_time, end_time) = match (request.start_time, request.end_time) {
        (Some(start), Some(end)) => (start, end),
        _ => {
            return Err(AppointmentError::ValidationError(
                "start_time and end_time are required".to_string(),
            ))
        }
    };

    if start_time >= end_time {
        return Err(AppointmentError::ValidationError(
            "Start time must be before end time".to_string(),
        ));
    }

    if patient_id == doctor_id {
        return Err(AppointmentError::ValidationError(
            "Patient and doctor must be different users".to_string(),
        ));
    }

    Ok((patient_id, doctor_id, start_time, end_time))
}

/// Best-effort display names for a fallback record. Lookup failures become placeholders.
async fn denormalize(identity: Arc<dyn IdentityLookup>, mut appointment: Appointment) -> Appointment {
    let (patient, doctor) = tokio::join!(
        identity.lookup(&appointment.patient_id),
        identity.lookup(&appointment.doctor_id),
    );

    match patient {
        Ok(Some(found)) => {
            appointment.patient_name = Some(found.display_name);
            appointment.patient_avatar = found.avatar_url;
        }
        Ok(None) => appointment.patient_name = Some(PLACEHOLDER_PATIENT_NAME.to_string()),
        Err(e) => {
            warn!("Identity lookup for patient {} failed: {}", appointment.patient_id, e);
            appointment.patient_name = Some(PLACEHOLDER_PATIENT_NAME.to_string());
        }
    }

    match doctor {
        Ok(Some(found)) => {
            appointment.doctor_name = Some(found.display_name);
            appointment.doctor_avatar = found.avatar_url;
        }
        Ok(None) => appointment.doctor_name = Some(PLACEHOLDER_DOCTOR_NAME.to_string()),
        Err(e) => {
            warn!("Identity lookup for doctor {} failed: {}", appointment.doctor_id, e);
            appointment.doctor_name = Some(PLACEHOLDER_DOCTOR_NAME.to_string());
        }
    }

    appointment
}

fn placeholder_appointment(user_id: &str, role: AppointmentRole) -> Appointment {
    let now = Utc::now();
    let (patient_id, doctor_id) = match role {
        AppointmentRole::Patient => (user_id.to_string(), String::new()),
        AppointmentRole::Doctor => (String::new(), user_id.to_string()),
    };

    Appointment {
        id: PLACEHOLDER_APPOINTMENT_ID.to_string(),
        patient_id,
        doctor_id,
        start_time: now,
        end_time: now,
        reason: Some("No appointments yet. Booked appointments will appear here.".to_string()),
        status: AppointmentStatus::Pending,
        patient_name: None,
        doctor_name: None,
        patient_avatar: None,
        doctor_avatar: None,
        created_at: now,
        updated_at: now,
    }
}
