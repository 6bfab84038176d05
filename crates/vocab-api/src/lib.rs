//! In-process lobby facade: one authority, one seat per player, and the
//! message bus between them.

mod events;
mod server;

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    CatalogueEntry, LobbyEvent, LobbyEventType, LobbyStatus, ModConfig, PlayerId,
    SessionSettings, SettingsUpdate, SCHEMA_VERSION_V1,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use vocab_core::{
    Authority, Collaborators, GameWorld, Participant, Recipient, RecordingHud, RecordingRecognizer,
    RoundError, SessionContext, SettingsError, SimWorld,
};

pub use server::{serve, ServerError};

/// Player id of the lobby host. The host seat is created with the lobby.
pub const HOST_PLAYER_ID: PlayerId = 1;
pub const DEFAULT_SEED: u64 = 0x5eed_1ab5;

/// Upper bound on authority/participant exchanges per delivery. A healthy
/// exchange settles in three passes (catalogue, settings, assignment).
const MAX_DELIVERY_PASSES: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LobbyError {
    #[error("player {player_id} is not in the lobby")]
    PlayerNotFound { player_id: PlayerId },
    #[error("player {player_id} already joined the lobby")]
    PlayerAlreadyJoined { player_id: PlayerId },
    #[error("the host cannot leave the lobby")]
    HostCannotLeave,
    #[error("unknown location \"{location_id}\"")]
    UnknownLocation { location_id: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("round {round_id} is already in progress")]
    RoundInProgress { round_id: u64 },
    #[error("unsupported schema version {found}")]
    UnsupportedSchema { found: String },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("round selection failed: {0}")]
    Selection(String),
}

impl From<RoundError> for LobbyError {
    fn from(value: RoundError) -> Self {
        match value {
            RoundError::AlreadyInProgress { round_id } => Self::RoundInProgress { round_id },
            RoundError::Selection(err) => Self::Selection(err.to_string()),
        }
    }
}

/// One connected player: the participant and its local surfaces.
#[derive(Debug)]
pub struct Seat {
    participant: Participant,
    hud: RecordingHud,
    recognizer: RecordingRecognizer,
}

impl Seat {
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn hud(&self) -> &RecordingHud {
        &self.hud
    }

    pub fn recognizer(&self) -> &RecordingRecognizer {
        &self.recognizer
    }
}

#[derive(Debug)]
pub struct LobbyApi {
    authority: Authority,
    seats: BTreeMap<PlayerId, Seat>,
    world: SimWorld,
    seed: u64,
    clock_ms: u64,
    events: Vec<LobbyEvent>,
}

impl LobbyApi {
    pub fn new(config: &ModConfig) -> Result<Self, LobbyError> {
        Self::with_world(config, SimWorld::with_default_levels())
    }

    /// Builds the lobby around `world` and seats the host.
    pub fn with_world(config: &ModConfig, world: SimWorld) -> Result<Self, LobbyError> {
        if config.schema_version != SCHEMA_VERSION_V1 {
            return Err(LobbyError::UnsupportedSchema {
                found: config.schema_version.clone(),
            });
        }

        let seed = config.seed.unwrap_or(DEFAULT_SEED);
        let authority = Authority::new(HOST_PLAYER_ID, config, seed)?;
        let mut lobby = Self {
            authority,
            seats: BTreeMap::new(),
            world,
            seed,
            clock_ms: 0,
            events: Vec::new(),
        };
        let categories = lobby.authority.catalogue().len();
        let forced = lobby.authority.forced_categories();
        lobby.record(
            LobbyEventType::CatalogueLoaded,
            None,
            Some(json!({ "categories": categories, "forced": forced })),
        );
        lobby.join(HOST_PLAYER_ID)?;
        info!(seed, categories, "lobby opened");
        Ok(lobby)
    }

    pub fn host_id(&self) -> PlayerId {
        self.authority.host_id()
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn seat(&self, player_id: PlayerId) -> Option<&Seat> {
        self.seats.get(&player_id)
    }

    pub fn players(&self) -> Vec<PlayerId> {
        self.seats.keys().copied().collect()
    }

    pub fn events(&self) -> &[LobbyEvent] {
        &self.events
    }

    /// Events with a sequence number strictly greater than `sequence`.
    pub fn events_since(&self, sequence: u64) -> &[LobbyEvent] {
        let start = self.events.partition_point(|event| event.sequence <= sequence);
        &self.events[start..]
    }

    pub fn status(&self) -> LobbyStatus {
        LobbyStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            location_id: self.authority.location_id().map(str::to_string),
            round_in_progress: self.authority.round_in_progress(),
            round_id: self.authority.round_id(),
            clock_ms: self.clock_ms,
            players: self.players(),
            shared_categories: self.authority.shared_categories().iter().cloned().collect(),
        }
    }

    pub fn catalogue(&self) -> Vec<CatalogueEntry> {
        self.authority.catalogue_entries()
    }

    pub fn settings(&self) -> &SessionSettings {
        self.authority.settings()
    }

    pub fn join(&mut self, player_id: PlayerId) -> Result<(), LobbyError> {
        if self.seats.contains_key(&player_id) {
            return Err(LobbyError::PlayerAlreadyJoined { player_id });
        }

        let is_host = player_id == self.authority.host_id();
        self.world.add_player(player_id);
        self.seats.insert(
            player_id,
            Seat {
                participant: Participant::new(player_id, is_host, self.seed ^ player_id),
                hud: RecordingHud::default(),
                recognizer: RecordingRecognizer::default(),
            },
        );
        self.authority.register(player_id);
        let mid_round = self.authority.round_in_progress();
        self.record(
            LobbyEventType::PlayerJoined,
            Some(player_id),
            Some(json!({ "host": is_host, "mid_round": mid_round })),
        );
        self.deliver();
        Ok(())
    }

    pub fn leave(&mut self, player_id: PlayerId) -> Result<(), LobbyError> {
        if player_id == self.authority.host_id() {
            return Err(LobbyError::HostCannotLeave);
        }
        let Some(mut seat) = self.seats.remove(&player_id) else {
            return Err(LobbyError::PlayerNotFound { player_id });
        };

        let mut collab = Collaborators::new(&mut self.world, &mut seat.hud, &mut seat.recognizer);
        seat.participant.disconnect(&mut collab);
        self.absorb_events(player_id, &mut seat.participant);
        self.authority.unregister(player_id);
        self.world.remove_player(player_id);
        self.record(LobbyEventType::PlayerLeft, Some(player_id), None);
        Ok(())
    }

    /// Starts a round on `location_id`. Living players are restored first so
    /// a previous round's deaths do not carry over.
    pub fn start_round(&mut self, location_id: &str) -> Result<u64, LobbyError> {
        let location_id = location_id.trim();
        if location_id.is_empty() {
            return Err(LobbyError::InvalidInput("location_id must not be empty".to_string()));
        }
        if !self.world.has_level(location_id) {
            return Err(LobbyError::UnknownLocation {
                location_id: location_id.to_string(),
            });
        }
        if self.authority.round_in_progress() {
            let round_id = self.authority.round_id();
            self.record(
                LobbyEventType::RoundSkipped,
                None,
                Some(json!({ "round_id": round_id, "location_id": location_id })),
            );
            return Err(LobbyError::RoundInProgress { round_id });
        }

        self.world.reset_players();
        let context = SessionContext::new(location_id, self.world.spawnable_entities(location_id));
        let round_id = self.authority.start_round(&context)?;
        let shared: Vec<String> = self.authority.shared_categories().iter().cloned().collect();
        self.record(
            LobbyEventType::RoundStarted,
            None,
            Some(json!({
                "round_id": round_id,
                "location_id": location_id,
                "reserved": context.is_reserved(),
                "shared": shared,
            })),
        );
        self.deliver();
        Ok(round_id)
    }

    /// Ends the current round. Idle lobbies return `None` and record nothing.
    pub fn end_round(&mut self) -> Option<u64> {
        let round_id = self.authority.end_round()?;
        self.record(LobbyEventType::RoundEnded, None, Some(json!({ "round_id": round_id })));
        self.deliver();
        Some(round_id)
    }

    /// Chat text from `player_id`. Returns what reaches the game chat; an
    /// empty string means the message was swallowed.
    pub fn chat(&mut self, player_id: PlayerId, text: &str) -> Result<String, LobbyError> {
        let passthrough = self.with_seat(player_id, |participant, collab| participant.on_chat_submit(text, collab))?;
        self.deliver();
        Ok(passthrough)
    }

    pub fn terminal(&mut self, player_id: PlayerId, text: &str) -> Result<String, LobbyError> {
        let passthrough =
            self.with_seat(player_id, |participant, collab| participant.on_terminal_command(text, collab))?;
        self.deliver();
        Ok(passthrough)
    }

    /// Feeds a recognizer result through the participant's speech
    /// subscription, then pumps that participant at the current clock.
    pub fn speech(&mut self, player_id: PlayerId, text: &str, confidence: f64) -> Result<(), LobbyError> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(LobbyError::InvalidInput(format!(
                "confidence must be within 0..=1, got {confidence}"
            )));
        }
        let now_ms = self.clock_ms;
        self.with_seat(player_id, |participant, collab| {
            participant.speech_subscription().on_recognized(text, confidence);
            participant.pump(now_ms, collab);
        })?;
        self.deliver();
        Ok(())
    }

    /// Moves the lobby clock forward and runs every participant's due tasks.
    pub fn advance_clock(&mut self, delta_ms: u64) -> u64 {
        self.clock_ms = self.clock_ms.saturating_add(delta_ms);
        let now_ms = self.clock_ms;
        for seat in self.seats.values_mut() {
            let mut collab = Collaborators::new(&mut self.world, &mut seat.hud, &mut seat.recognizer);
            seat.participant.pump(now_ms, &mut collab);
        }
        self.deliver();
        self.clock_ms
    }

    /// Settings write from `requester`. Only the host may change settings.
    pub fn update_settings(
        &mut self,
        requester: PlayerId,
        update: &SettingsUpdate,
    ) -> Result<SessionSettings, LobbyError> {
        if !self.seats.contains_key(&requester) {
            return Err(LobbyError::PlayerNotFound { player_id: requester });
        }
        if update.is_empty() {
            return Err(LobbyError::InvalidInput("settings update has no fields".to_string()));
        }
        let before = self.authority.settings().clone();
        let after = self.authority.apply_update(requester, update)?.clone();
        self.record_settings_change(&before, &after);
        self.deliver();
        Ok(after)
    }

    /// Replaces the forced categories (profanity aside). A running round
    /// keeps its words; the new set applies from the next round.
    pub fn set_forced_categories<I, S>(&mut self, requester: PlayerId, names: I) -> Result<Vec<String>, LobbyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if !self.seats.contains_key(&requester) {
            return Err(LobbyError::PlayerNotFound { player_id: requester });
        }
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if self.authority.set_forced_categories(requester, &names)? {
            let forced: Vec<String> = self.authority.configured_forced().iter().cloned().collect();
            self.record(
                LobbyEventType::SettingsChanged,
                Some(requester),
                Some(json!({ "forced_categories": forced })),
            );
            self.deliver();
        }
        Ok(self.authority.configured_forced().iter().cloned().collect())
    }

    fn with_seat<T>(
        &mut self,
        player_id: PlayerId,
        f: impl FnOnce(&mut Participant, &mut Collaborators<'_>) -> T,
    ) -> Result<T, LobbyError> {
        let seat = self
            .seats
            .get_mut(&player_id)
            .ok_or(LobbyError::PlayerNotFound { player_id })?;
        let mut collab = Collaborators::new(&mut self.world, &mut seat.hud, &mut seat.recognizer);
        Ok(f(&mut seat.participant, &mut collab))
    }

    /// Runs the authority/participant exchange until both sides are quiet.
    /// Receivers are idempotent, so a message seen twice changes nothing.
    fn deliver(&mut self) {
        for _ in 0..MAX_DELIVERY_PASSES {
            let outbound = self.authority.drain_outbox();
            for out in &outbound {
                let targets: Vec<PlayerId> = match out.to {
                    Recipient::All => self.seats.keys().copied().collect(),
                    Recipient::Player(player_id) => vec![player_id],
                };
                for player_id in targets {
                    let Some(seat) = self.seats.get_mut(&player_id) else {
                        debug!(player_id, message = out.message.label(), "dropping message for departed player");
                        continue;
                    };
                    let mut collab = Collaborators::new(&mut self.world, &mut seat.hud, &mut seat.recognizer);
                    if let Err(err) = seat.participant.apply(&out.message, &mut collab) {
                        warn!(player_id, error = %err, "participant rejected sync message");
                    }
                }
            }

            let mut requests = Vec::new();
            for seat in self.seats.values_mut() {
                requests.extend(seat.participant.drain_requests());
            }
            for request in &requests {
                if let Err(err) = self.authority.handle_request(request) {
                    warn!(player_id = request.player_id(), error = %err, "authority refused request");
                }
            }

            self.collect_events();
            if outbound.is_empty() && requests.is_empty() {
                return;
            }
        }
        warn!(passes = MAX_DELIVERY_PASSES, "message exchange did not settle");
    }

    fn collect_events(&mut self) {
        let player_ids: Vec<PlayerId> = self.seats.keys().copied().collect();
        for player_id in player_ids {
            let drained = match self.seats.get_mut(&player_id) {
                Some(seat) => seat.participant.drain_events(),
                None => continue,
            };
            for event in drained {
                let (event_type, details) = events::describe(&event);
                self.record(event_type, Some(player_id), Some(details));
            }
        }
    }

    fn absorb_events(&mut self, player_id: PlayerId, participant: &mut Participant) {
        for event in participant.drain_events() {
            let (event_type, details) = events::describe(&event);
            self.record(event_type, Some(player_id), Some(details));
        }
    }

    fn record_settings_change(&mut self, before: &SessionSettings, after: &SessionSettings) {
        if before == after {
            return;
        }
        self.record(LobbyEventType::SettingsChanged, None, Some(json!(after)));
    }

    fn record(&mut self, event_type: LobbyEventType, player_id: Option<PlayerId>, details: Option<serde_json::Value>) {
        let sequence = self.events.len() as u64 + 1;
        debug!(sequence, event_type = ?event_type, player_id = ?player_id, "lobby event");
        self.events
            .push(LobbyEvent::new(sequence, self.clock_ms, event_type, player_id, details));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::PunishmentKind;

    fn flash_config() -> ModConfig {
        ModConfig {
            seed: Some(11),
            settings: SessionSettings {
                punishment: PunishmentKind::Flash,
                ..SessionSettings::default()
            },
            ..ModConfig::default()
        }
    }

    fn bracken_lobby() -> LobbyApi {
        let mut world = SimWorld::with_default_levels();
        world.set_level("Bracken Hollow", ["Flowerman"]);
        LobbyApi::with_world(&flash_config(), world).expect("lobby")
    }

    fn count(lobby: &LobbyApi, event_type: LobbyEventType) -> usize {
        lobby
            .events()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }

    #[test]
    fn host_is_seated_and_synced_on_open() {
        let lobby = bracken_lobby();
        assert_eq!(lobby.players(), vec![HOST_PLAYER_ID]);
        let seat = lobby.seat(HOST_PLAYER_ID).expect("host seat");
        assert!(seat.participant().is_synced());
        assert_eq!(seat.participant().settings().punishment, PunishmentKind::Flash);
        assert_eq!(lobby.events()[0].event_type, LobbyEventType::CatalogueLoaded);
    }

    #[test]
    fn rejects_unsupported_schema() {
        let config = ModConfig {
            schema_version: "2.0".to_string(),
            ..ModConfig::default()
        };
        let err = LobbyApi::new(&config).unwrap_err();
        assert_eq!(err, LobbyError::UnsupportedSchema { found: "2.0".to_string() });
    }

    #[test]
    fn joining_twice_is_a_conflict() {
        let mut lobby = bracken_lobby();
        lobby.join(2).expect("join");
        assert_eq!(lobby.join(2), Err(LobbyError::PlayerAlreadyJoined { player_id: 2 }));
    }

    #[test]
    fn host_cannot_leave_and_unknown_players_are_reported() {
        let mut lobby = bracken_lobby();
        assert_eq!(lobby.leave(HOST_PLAYER_ID), Err(LobbyError::HostCannotLeave));
        assert_eq!(lobby.leave(9), Err(LobbyError::PlayerNotFound { player_id: 9 }));
        assert_eq!(
            lobby.chat(9, "hello").unwrap_err(),
            LobbyError::PlayerNotFound { player_id: 9 }
        );
    }

    #[test]
    fn second_start_is_skipped_with_conflict() {
        let mut lobby = bracken_lobby();
        let round_id = lobby.start_round("Bracken Hollow").expect("start");
        let err = lobby.start_round("Bracken Hollow").unwrap_err();
        assert_eq!(err, LobbyError::RoundInProgress { round_id });
        assert_eq!(count(&lobby, LobbyEventType::RoundSkipped), 1);
        assert_eq!(lobby.status().round_id, round_id);
    }

    #[test]
    fn unknown_or_blank_location_is_invalid() {
        let mut lobby = bracken_lobby();
        assert!(matches!(
            lobby.start_round("Atlantis"),
            Err(LobbyError::UnknownLocation { .. })
        ));
        assert!(matches!(lobby.start_round("   "), Err(LobbyError::InvalidInput(_))));
        assert!(!lobby.status().round_in_progress);
    }

    #[test]
    fn end_round_is_idempotent() {
        let mut lobby = bracken_lobby();
        assert_eq!(lobby.end_round(), None);
        let round_id = lobby.start_round("Bracken Hollow").expect("start");
        assert_eq!(lobby.end_round(), Some(round_id));
        assert_eq!(lobby.end_round(), None);
        assert_eq!(count(&lobby, LobbyEventType::RoundEnded), 2);
    }

    #[test]
    fn violation_in_chat_is_swallowed_and_recorded() {
        let mut lobby = bracken_lobby();
        lobby.start_round("Bracken Hollow").expect("start");
        let passthrough = lobby.chat(HOST_PLAYER_ID, "the flowerman is behind you").expect("chat");
        assert_eq!(passthrough, "");
        assert_eq!(count(&lobby, LobbyEventType::ViolationDetected), 1);
        assert_eq!(count(&lobby, LobbyEventType::PunishmentStarted), 1);
        assert_eq!(
            lobby.world().player(HOST_PLAYER_ID).map(|player| player.health),
            Some(80)
        );
    }

    #[test]
    fn low_confidence_speech_is_ignored() {
        let mut lobby = bracken_lobby();
        lobby.start_round("Bracken Hollow").expect("start");
        lobby.speech(HOST_PLAYER_ID, "bracken", 0.2).expect("speech");
        assert_eq!(count(&lobby, LobbyEventType::ViolationDetected), 0);
        lobby.speech(HOST_PLAYER_ID, "bracken", 0.95).expect("speech");
        assert_eq!(count(&lobby, LobbyEventType::ViolationDetected), 1);
    }

    #[test]
    fn out_of_range_speech_confidence_is_rejected() {
        let mut lobby = bracken_lobby();
        assert!(matches!(
            lobby.speech(HOST_PLAYER_ID, "hi", 1.5),
            Err(LobbyError::InvalidInput(_))
        ));
    }

    #[test]
    fn settings_update_reaches_every_seat() {
        let mut lobby = bracken_lobby();
        lobby.join(2).expect("join");
        let update = SettingsUpdate {
            confidence_threshold: Some(0.5),
            punishment: Some(PunishmentKind::Teleport),
            ..SettingsUpdate::default()
        };
        let settings = lobby.update_settings(HOST_PLAYER_ID, &update).expect("update");
        assert_eq!(settings.punishment, PunishmentKind::Teleport);
        for player_id in [HOST_PLAYER_ID, 2] {
            let seat = lobby.seat(player_id).expect("seat");
            assert_eq!(seat.participant().settings(), &settings);
        }
        assert_eq!(count(&lobby, LobbyEventType::SettingsChanged), 1);
    }

    #[test]
    fn invalid_settings_change_nothing() {
        let mut lobby = bracken_lobby();
        let before = lobby.settings().clone();
        let update = SettingsUpdate {
            shared_categories_per_round: Some(21),
            ..SettingsUpdate::default()
        };
        assert!(matches!(
            lobby.update_settings(HOST_PLAYER_ID, &update),
            Err(LobbyError::Settings(SettingsError::OutOfRange { .. }))
        ));
        assert_eq!(lobby.settings(), &before);
        assert!(matches!(
            lobby.update_settings(HOST_PLAYER_ID, &SettingsUpdate::default()),
            Err(LobbyError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_host_settings_write_is_refused() {
        let mut lobby = bracken_lobby();
        lobby.join(2).expect("join");
        let before = lobby.settings().clone();
        let update = SettingsUpdate {
            punishment: Some(PunishmentKind::Explode),
            ..SettingsUpdate::default()
        };
        assert_eq!(
            lobby.update_settings(2, &update),
            Err(LobbyError::Settings(SettingsError::NotAuthority { player_id: 2 }))
        );
        assert_eq!(
            lobby.update_settings(9, &update),
            Err(LobbyError::PlayerNotFound { player_id: 9 })
        );
        assert_eq!(lobby.settings(), &before);
        assert_eq!(count(&lobby, LobbyEventType::SettingsChanged), 0);
    }

    #[test]
    fn forced_categories_apply_from_the_next_round() {
        let mut lobby = bracken_lobby();
        lobby.start_round("Bracken Hollow").expect("start");
        assert_eq!(
            lobby.set_forced_categories(HOST_PLAYER_ID, ["Thumper"]),
            Ok(vec!["Thumper".to_string()])
        );
        assert_eq!(count(&lobby, LobbyEventType::SettingsChanged), 1);
        assert_eq!(lobby.chat(HOST_PLAYER_ID, "a thumper!"), Ok("a thumper!".to_string()));

        lobby.end_round();
        lobby.start_round("Bracken Hollow").expect("restart");
        assert_eq!(lobby.chat(HOST_PLAYER_ID, "a thumper!"), Ok(String::new()));
        assert!(matches!(
            lobby.set_forced_categories(HOST_PLAYER_ID, ["Leviathan"]),
            Err(LobbyError::Settings(SettingsError::UnknownCategory { .. }))
        ));
    }

    #[test]
    fn events_since_returns_the_tail() {
        let mut lobby = bracken_lobby();
        let last = lobby.events().last().map(|event| event.sequence).unwrap_or(0);
        lobby.join(2).expect("join");
        let tail = lobby.events_since(last);
        assert!(!tail.is_empty());
        assert!(tail.iter().all(|event| event.sequence > last));
        assert_eq!(tail[0].event_type, LobbyEventType::PlayerJoined);
    }

    #[test]
    fn leaving_stops_the_recognizer_and_frees_the_seat() {
        let mut lobby = bracken_lobby();
        lobby.join(2).expect("join");
        lobby.start_round("Bracken Hollow").expect("start");
        assert!(lobby.seat(2).expect("seat").recognizer().running);
        lobby.leave(2).expect("leave");
        assert!(lobby.seat(2).is_none());
        assert!(lobby.world().player(2).is_none());
        assert!(!lobby.authority().players().contains(&2));
        assert_eq!(count(&lobby, LobbyEventType::PlayerLeft), 1);
    }
}
