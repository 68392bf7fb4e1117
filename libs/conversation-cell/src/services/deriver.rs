// libs/conversation-cell/src/services/deriver.rs
use chrono::Utc;
use tracing::{debug, info, instrument};

use shared_database::{AppState, DualPathStore, Sourced};

use crate::models::{
    AppointmentParties, Conversation, ConversationError, Participant, ParticipantRole,
    PLACEHOLDER_AVATAR_URL, PLACEHOLDER_DOCTOR_NAME, PLACEHOLDER_PATIENT_NAME,
};

/// Conversation id for an appointment. The only way conversation ids are minted.
pub fn conversation_id_for(appointment_id: &str) -> String {
    format!("conv-{}", appointment_id)
}

/// Creates the conversation belonging to an approved appointment, at most once.
pub struct ConversationDeriver {
    store: DualPathStore<Conversation>,
}

impl ConversationDeriver {
    pub fn new(state: &AppState) -> Self {
        Self::with_store(state.store::<Conversation>())
    }

    pub fn with_store(store: DualPathStore<Conversation>) -> Self {
        Self { store }
    }

    /// Returns the conversation for `parties.appointment_id` and whether this call created it.
    ///
    /// An existing conversation in either store is returned unchanged.
    #[instrument(skip_all, fields(appointment_id = %parties.appointment_id))]
    pub async fn create(
        &self,
        parties: &AppointmentParties,
    ) -> Result<(Sourced<Conversation>, bool), ConversationError> {
        if parties.appointment_id.is_empty() {
            return Err(ConversationError::ValidationError(
                "Appointment id is required to derive a conversation".to_string(),
            ));
        }

        let candidate = derive_conversation(parties);
        let (conversation, created) = self.store.insert_if_absent_mirrored(candidate).await?;

        if created {
            info!("Conversation {} created for appointment {}", conversation.value.id, parties.appointment_id);
        } else {
            debug!("Conversation {} already exists", conversation.value.id);
        }

        Ok((conversation, created))
    }
}

fn derive_conversation(parties: &AppointmentParties) -> Conversation {
    let now = Utc::now();

    let participants = vec![
        participant(
            &parties.patient_id,
            parties.patient_name.as_deref(),
            parties.patient_avatar.as_deref(),
            PLACEHOLDER_PATIENT_NAME,
            ParticipantRole::Patient,
        ),
        participant(
            &parties.doctor_id,
            parties.doctor_name.as_deref(),
            parties.doctor_avatar.as_deref(),
            PLACEHOLDER_DOCTOR_NAME,
            ParticipantRole::VerifiedDoctor,
        ),
    ];

    Conversation {
        id: conversation_id_for(&parties.appointment_id),
        appointment_id: parties.appointment_id.clone(),
        patient_id: parties.patient_id.clone(),
        doctor_id: parties.doctor_id.clone(),
        participants,
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn participant(
    user_id: &str,
    name: Option<&str>,
    avatar: Option<&str>,
    placeholder_name: &str,
    role: ParticipantRole,
) -> Participant {
    Participant {
        user_id: user_id.to_string(),
        username: name.filter(|n| !n.trim().is_empty()).unwrap_or(placeholder_name).to_string(),
        avatar_url: avatar.filter(|a| !a.is_empty()).unwrap_or(PLACEHOLDER_AVATAR_URL).to_string(),
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_database::FallbackStore;
    use shared_utils::test_utils::TestConfig;
    use std::sync::Arc;

    fn parties(appointment_id: &str) -> AppointmentParties {
        AppointmentParties {
            appointment_id: appointment_id.to_string(),
            patient_id: "p1".to_string(),
            doctor_id: "d1".to_string(),
            patient_name: Some("alice".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_conversation_id_is_deterministic() {
        assert_eq!(conversation_id_for("a1"), "conv-a1");
        assert_eq!(conversation_id_for("a1"), conversation_id_for("a1"));
    }

    #[test]
    fn test_participants_use_placeholders_when_missing() {
        let conversation = derive_conversation(&parties("a1"));

        assert_eq!(conversation.participants.len(), 2);
        let patient = &conversation.participants[0];
        assert_eq!(patient.username, "alice");
        assert_eq!(patient.role, ParticipantRole::Patient);
        assert_eq!(patient.avatar_url, PLACEHOLDER_AVATAR_URL);

        let doctor = &conversation.participants[1];
        assert_eq!(doctor.user_id, "d1");
        assert_eq!(doctor.username, PLACEHOLDER_DOCTOR_NAME);
        assert_eq!(doctor.role, ParticipantRole::VerifiedDoctor);
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let fallback = Arc::new(FallbackStore::in_memory());
        let state = TestConfig::primary_down().to_state_with(fallback.clone());
        let deriver = ConversationDeriver::new(&state);

        let (first, created) = deriver.create(&parties("a1")).await.unwrap();
        assert!(created);
        assert_eq!(first.value.id, "conv-a1");
        assert!(first.value.messages.is_empty());

        for _ in 0..3 {
            let (again, created) = deriver.create(&parties("a1")).await.unwrap();
            assert!(!created);
            assert_eq!(again.value.created_at, first.value.created_at);
        }

        assert_eq!(fallback.count::<Conversation>().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_conversation() {
        let fallback = Arc::new(FallbackStore::in_memory());
        let state = TestConfig::primary_down().to_state_with(fallback.clone());
        let deriver = Arc::new(ConversationDeriver::new(&state));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let deriver = Arc::clone(&deriver);
                tokio::spawn(async move { deriver.create(&parties("a1")).await.unwrap().1 })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(fallback.count::<Conversation>().await, 1);
    }
}
