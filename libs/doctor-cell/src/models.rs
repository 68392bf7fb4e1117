use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared_database::{tables, Entity, StoreError, StoreSource};

/// Prefix of slot ids generated on demand rather than read from storage.
pub const SYNTHESIZED_SLOT_PREFIX: &str = "default-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: String,
    pub doctor_id: String,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
    /// Concrete calendar day for one-off and synthesized slots; `None` for weekly slots.
    #[serde(default)]
    pub specific_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Entity for AvailabilitySlot {
    const TABLE: &'static str = tables::AVAILABILITY;

    fn id(&self) -> &str {
        &self.id
    }
}

impl AvailabilitySlot {
    pub fn is_synthesized(&self) -> bool {
        is_synthesized_slot_id(&self.id)
    }
}

pub fn is_synthesized_slot_id(slot_id: &str) -> bool {
    slot_id.starts_with(SYNTHESIZED_SLOT_PREFIX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub specific_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorAvailabilityResponse {
    pub doctor_id: String,
    pub slots: Vec<AvailabilitySlot>,
    /// True when no open slot was stored and the default schedule was generated.
    pub synthesized: bool,
    pub source: Option<StoreSource>,
}

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Availability slot not found")]
    NotFound,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
