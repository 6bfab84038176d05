use contracts::LobbyEventType;
use serde_json::{json, Value};
use vocab_core::{ParticipantEvent, PunishmentEvent};

/// Lobby event type and details for something a participant reported.
pub(crate) fn describe(event: &ParticipantEvent) -> (LobbyEventType, Value) {
    match event {
        ParticipantEvent::RoundStarted {
            round_id,
            shared,
            private,
        } => (
            LobbyEventType::RoundStarted,
            json!({ "round_id": round_id, "shared": shared, "private": private }),
        ),
        ParticipantEvent::RoundEnded { round_id } => {
            (LobbyEventType::RoundEnded, json!({ "round_id": round_id }))
        }
        ParticipantEvent::SyncMismatch { round_id, category } => (
            LobbyEventType::SyncMismatch,
            json!({ "round_id": round_id, "category": category }),
        ),
        ParticipantEvent::HintDisplayed { title, body } => {
            (LobbyEventType::HintDisplayed, json!({ "title": title, "body": body }))
        }
        ParticipantEvent::Violation { source, word } => (
            LobbyEventType::ViolationDetected,
            json!({ "source": source, "word": word }),
        ),
        ParticipantEvent::Punishment(punishment) => describe_punishment(punishment),
    }
}

fn describe_punishment(event: &PunishmentEvent) -> (LobbyEventType, Value) {
    match event {
        PunishmentEvent::Started { kind, .. } => (LobbyEventType::PunishmentStarted, json!({ "kind": kind })),
        PunishmentEvent::Escalated { from, reason, .. } => (
            LobbyEventType::PunishmentEscalated,
            json!({ "from": from, "reason": reason }),
        ),
        PunishmentEvent::Completed { kind, .. } => {
            (LobbyEventType::PunishmentCompleted, json!({ "kind": kind }))
        }
        PunishmentEvent::ApologyAccepted { .. } => (LobbyEventType::ApologyAccepted, Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{InputSource, PunishmentKind};

    #[test]
    fn violation_details_name_source_and_word() {
        let (event_type, details) = describe(&ParticipantEvent::Violation {
            source: InputSource::Terminal,
            word: "jester".to_string(),
        });
        assert_eq!(event_type, LobbyEventType::ViolationDetected);
        assert_eq!(details, json!({ "source": "terminal", "word": "jester" }));
    }

    #[test]
    fn escalation_keeps_the_reason() {
        let (event_type, details) = describe(&ParticipantEvent::Punishment(PunishmentEvent::Escalated {
            player_id: 4,
            from: PunishmentKind::Suffocate,
            reason: "player is outside".to_string(),
        }));
        assert_eq!(event_type, LobbyEventType::PunishmentEscalated);
        assert_eq!(details["from"], "suffocate");
        assert_eq!(details["reason"], "player is outside");
    }
}
