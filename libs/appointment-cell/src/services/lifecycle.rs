// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// What a requested status change amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changes and the record is written.
    Apply,
    /// Repeat of the transition that produced the current terminal state.
    AlreadyApplied,
}

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Approved,
                AppointmentStatus::Rejected,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Approved => vec![],
            AppointmentStatus::Rejected => vec![],
        }
    }

    /// Classify a requested transition. Terminal states are final: asking for
    /// the state an appointment already holds is a no-op, anything else is rejected.
    pub fn plan_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<Transition, AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if current_status.is_terminal() && current_status == new_status {
            return Ok(Transition::AlreadyApplied);
        }

        if !self.get_valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: *current_status,
                to: *new_status,
            });
        }

        Ok(Transition::Apply)
    }

    /// Whether entering `status` derives a conversation.
    pub fn derives_conversation(&self, status: &AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::Approved)
    }
}
