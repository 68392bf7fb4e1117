// libs/doctor-cell/src/services/availability.rs
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{AppState, DualPathStore, Filter, StoreSource};

use crate::models::{
    is_synthesized_slot_id, AvailabilityError, AvailabilitySlot, CreateAvailabilityRequest,
    DoctorAvailabilityResponse,
};
use crate::services::synthesizer::AvailabilitySynthesizer;

pub struct AvailabilityService {
    store: DualPathStore<AvailabilitySlot>,
    synthesizer: AvailabilitySynthesizer,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self::with_store(state.store::<AvailabilitySlot>())
    }

    pub fn with_store(store: DualPathStore<AvailabilitySlot>) -> Self {
        Self {
            store,
            synthesizer: AvailabilitySynthesizer::default(),
        }
    }

    /// Open slots for a doctor, or the default schedule when neither store has any.
    pub async fn get_availability(
        &self,
        doctor_id: &str,
        today: NaiveDate,
    ) -> Result<DoctorAvailabilityResponse, AvailabilityError> {
        debug!("Fetching availability for doctor: {}", doctor_id);

        let filter = Filter::new()
            .eq("doctor_id", doctor_id)
            .eq("is_booked", false);

        let stored = self.store.list(&filter).await?;

        if stored.is_empty() {
            info!("No open slots stored for doctor {}, synthesizing default schedule", doctor_id);
            return Ok(DoctorAvailabilityResponse {
                doctor_id: doctor_id.to_string(),
                slots: self.synthesizer.synthesize(doctor_id, today),
                synthesized: true,
                source: None,
            });
        }

        // Any primary row means the primary answered; fallback rows only appear when it did not.
        let source = if stored.iter().any(|s| s.source == StoreSource::Primary) {
            StoreSource::Primary
        } else {
            StoreSource::Fallback
        };

        let mut slots: Vec<AvailabilitySlot> = stored.into_iter().map(|s| s.into_inner()).collect();
        slots.sort_by(|a, b| {
            (a.specific_date, a.day_of_week, a.start_time).cmp(&(b.specific_date, b.day_of_week, b.start_time))
        });

        Ok(DoctorAvailabilityResponse {
            doctor_id: doctor_id.to_string(),
            slots,
            synthesized: false,
            source: Some(source),
        })
    }

    pub async fn create_availability(
        &self,
        doctor_id: &str,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilitySlot, AvailabilityError> {
        debug!("Creating availability for doctor: {}", doctor_id);

        if request.start_time >= request.end_time {
            return Err(AvailabilityError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        if !(0..=6).contains(&request.day_of_week) {
            return Err(AvailabilityError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        let slot = AvailabilitySlot {
            id: Uuid::new_v4().to_string(),
            doctor_id: doctor_id.to_string(),
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            is_booked: false,
            specific_date: request.specific_date,
            created_at: Utc::now(),
        };

        let stored = self.store.put(slot).await?;
        info!("Availability slot {} created for doctor {} ({:?})", stored.value.id, doctor_id, stored.source);

        Ok(stored.into_inner())
    }

    /// Flag a stored slot as taken. Synthesized slots have nothing to update.
    pub async fn mark_booked(&self, slot_id: &str) -> Result<Option<AvailabilitySlot>, AvailabilityError> {
        if is_synthesized_slot_id(slot_id) {
            debug!("Slot {} is synthesized, nothing to mark", slot_id);
            return Ok(None);
        }

        let located = self.store.get(slot_id).await?.ok_or(AvailabilityError::NotFound)?;
        if located.value.is_booked {
            warn!("Slot {} was already booked", slot_id);
            return Ok(Some(located.into_inner()));
        }

        let mut slot = located.value;
        slot.is_booked = true;

        let updated = self.store.update_in(located.source, &slot).await?;
        Ok(Some(updated.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use shared_utils::test_utils::TestConfig;

    fn service() -> AvailabilityService {
        let state = TestConfig::primary_down().to_state();
        AvailabilityService::new(&state)
    }

    fn request(start_hour: u32, end_hour: u32) -> CreateAvailabilityRequest {
        CreateAvailabilityRequest {
            day_of_week: 2,
            start_time: NaiveTime::from_hms_opt(start_hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end_hour, 0, 0).unwrap(),
            specific_date: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn test_empty_stores_synthesize_default_week() {
        let response = service().get_availability("doc-1", today()).await.unwrap();

        assert!(response.synthesized);
        assert_eq!(response.slots.len(), 38);
        assert!(response.source.is_none());
    }

    #[tokio::test]
    async fn test_stored_slot_suppresses_synthesis() {
        let service = service();
        service.create_availability("doc-1", request(9, 10)).await.unwrap();

        let response = service.get_availability("doc-1", today()).await.unwrap();
        assert!(!response.synthesized);
        assert_eq!(response.slots.len(), 1);
        assert_eq!(response.source, Some(StoreSource::Fallback));

        // Other doctors are unaffected.
        let other = service.get_availability("doc-2", today()).await.unwrap();
        assert!(other.synthesized);
    }

    #[tokio::test]
    async fn test_rejects_inverted_range() {
        let result = service().create_availability("doc-1", request(10, 9)).await;
        assert!(matches!(result, Err(AvailabilityError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_mark_booked_hides_slot() {
        let service = service();
        let slot = service.create_availability("doc-1", request(9, 10)).await.unwrap();

        let booked = service.mark_booked(&slot.id).await.unwrap().unwrap();
        assert!(booked.is_booked);

        let response = service.get_availability("doc-1", today()).await.unwrap();
        assert!(response.synthesized);
    }

    #[tokio::test]
    async fn test_mark_booked_ignores_synthesized_and_reports_missing() {
        let service = service();
        assert!(service.mark_booked("default-1-16-0").await.unwrap().is_none());

        let result = service.mark_booked("missing").await;
        assert!(matches!(result, Err(AvailabilityError::NotFound)));
    }
}
