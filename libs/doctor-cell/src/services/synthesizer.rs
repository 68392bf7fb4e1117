// libs/doctor-cell/src/services/synthesizer.rs
use std::ops::Range;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use tracing::debug;

use crate::models::{AvailabilitySlot, SYNTHESIZED_SLOT_PREFIX};

/// Default weekly schedule offered for doctors with no open stored slots.
///
/// Slots are hourly, regenerated on every call and never persisted.
#[derive(Debug, Clone)]
pub struct AvailabilitySynthesizer {
    pub days_ahead: u32,
    pub weekday_hours: Range<u32>,
    pub weekend_hours: Range<u32>,
}

impl Default for AvailabilitySynthesizer {
    fn default() -> Self {
        Self {
            days_ahead: 7,
            weekday_hours: 16..20, // 4 slots
            weekend_hours: 10..19, // 9 slots
        }
    }
}

impl AvailabilitySynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots for day offsets `0..days_ahead` starting at `today`.
    pub fn synthesize(&self, doctor_id: &str, today: NaiveDate) -> Vec<AvailabilitySlot> {
        let generated_at = today.and_time(NaiveTime::MIN).and_utc();

        let slots: Vec<AvailabilitySlot> = (0..self.days_ahead)
            .flat_map(|offset| {
                let date = today + Duration::days(offset as i64);
                let day_of_week = date.weekday().num_days_from_sunday() as i32;

                self.hours_for(date.weekday()).map(move |hour| {
                    let start_time = NaiveTime::MIN + Duration::hours(hour as i64);
                    AvailabilitySlot {
                        id: synthesized_slot_id(day_of_week, hour, offset),
                        doctor_id: doctor_id.to_string(),
                        day_of_week,
                        start_time,
                        end_time: start_time + Duration::hours(1),
                        is_booked: false,
                        specific_date: Some(date),
                        created_at: generated_at,
                    }
                })
            })
            .collect();

        debug!("Synthesized {} default slots for doctor {}", slots.len(), doctor_id);
        slots
    }

    fn hours_for(&self, weekday: Weekday) -> Range<u32> {
        match weekday {
            Weekday::Sat | Weekday::Sun => self.weekend_hours.clone(),
            _ => self.weekday_hours.clone(),
        }
    }
}

pub fn synthesized_slot_id(day_of_week: i32, hour: u32, day_offset: u32) -> String {
    format!("{}{}-{}-{}", SYNTHESIZED_SLOT_PREFIX, day_of_week, hour, day_offset)
}
