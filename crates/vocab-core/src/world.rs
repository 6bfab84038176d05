//! Collaborator seams: the game world, the HUD and the speech recognizer.
//!
//! The engine never reaches for globals. Each participant is handed these
//! collaborators per call, so several sessions can run side by side in one
//! process. `SimWorld`, `RecordingHud` and `RecordingRecognizer` are in-memory
//! implementations used by the lobby facade and by tests.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{EffectRequest, PlayerId, Position};
use thiserror::Error;
use tracing::info;

pub const MAX_PLAYER_HEALTH: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HudError {
    #[error("no active HUD surface")]
    NoActiveSurface,
}

/// Read and act on the game world for punishment and eligibility.
pub trait GameWorld {
    fn spawnable_entities(&self, location_id: &str) -> BTreeSet<String>;
    fn player_health(&self, player_id: PlayerId) -> Option<i32>;
    fn is_player_alive(&self, player_id: PlayerId) -> bool;
    fn is_player_inside(&self, player_id: PlayerId) -> bool;
    fn player_position(&self, player_id: PlayerId) -> Option<Position>;
    /// Navigation points inside the facility, used as teleport targets.
    fn inside_nav_nodes(&self) -> Vec<Position>;
    fn teleport_player(&mut self, player_id: PlayerId, to: Position);
    fn damage_player(&mut self, player_id: PlayerId, amount: i32);
    fn kill_player(&mut self, player_id: PlayerId);
    fn spawn_effect(&mut self, request: EffectRequest);
}

/// Best-effort notification surface.
pub trait HudSurface {
    fn display_hint(&mut self, title: &str, body: &str) -> Result<(), HudError>;
}

/// Shows a hint, logging instead of failing when no HUD is up.
pub fn show_hint(hud: &mut dyn HudSurface, title: &str, body: &str) {
    if let Err(err) = hud.display_hint(title, body) {
        info!(title, error = %err, "no active HUD, hint dropped");
    }
}

/// Control half of a speech recognizer. Results come back through a
/// `SpeechSubscription`.
pub trait RecognizerControl {
    fn load_grammar(&mut self, words: &[String]);
    fn start(&mut self);
    fn stop(&mut self);
    fn unload_grammar(&mut self);
}

/// The collaborators a participant needs for one call.
pub struct Collaborators<'a> {
    pub world: &'a mut dyn GameWorld,
    pub hud: &'a mut dyn HudSurface,
    pub recognizer: &'a mut dyn RecognizerControl,
}

impl<'a> Collaborators<'a> {
    pub fn new(
        world: &'a mut dyn GameWorld,
        hud: &'a mut dyn HudSurface,
        recognizer: &'a mut dyn RecognizerControl,
    ) -> Self {
        Self {
            world,
            hud,
            recognizer,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimPlayer {
    pub health: i32,
    pub alive: bool,
    pub inside: bool,
    pub position: Position,
}

impl Default for SimPlayer {
    fn default() -> Self {
        Self {
            health: MAX_PLAYER_HEALTH,
            alive: true,
            inside: false,
            position: Position::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldAction {
    Teleported { player_id: PlayerId, to: Position },
    Damaged { player_id: PlayerId, amount: i32 },
    Killed { player_id: PlayerId },
    Effect(EffectRequest),
}

/// In-memory world. Every mutation is appended to `actions`.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    levels: BTreeMap<String, BTreeSet<String>>,
    players: BTreeMap<PlayerId, SimPlayer>,
    nav_nodes: Vec<Position>,
    actions: Vec<WorldAction>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// A world with the vanilla moons and a handful of facility nav nodes.
    pub fn with_default_levels() -> Self {
        let mut world = Self::new();
        world.set_level("41 Experimentation", ["Flowerman", "Crawler", "Centipede", "Blob", "Hoarding bug", "Puffer", "MouthDog", "Manticoil"]);
        world.set_level("220 Assurance", ["Flowerman", "Crawler", "Centipede", "Spring", "Baboon hawk", "ForestGiant", "Earth Leviathan"]);
        world.set_level("56 Vow", ["Flowerman", "Crawler", "Bunker Spider", "Girl", "ForestGiant", "Nutcracker", "Red Locust Bees"]);
        world.set_level("21 Offense", ["Jester", "Spring", "Nutcracker", "Crawler", "Baboon hawk", "RadMech"]);
        world.set_level("61 March", ["Flowerman", "Bunker Spider", "Blob", "Spring", "Earth Leviathan", "MouthDog"]);
        world.set_level("85 Rend", ["Jester", "Nutcracker", "Spring", "Girl", "Masked", "MouthDog", "ForestGiant"]);
        world.set_level("7 Dine", ["Jester", "Butler", "Masked", "Hoarding bug", "Blob", "MouthDog"]);
        world.set_level("8 Titan", ["Jester", "Nutcracker", "Spring", "Flowerman", "Bunker Spider", "Blob", "ForestGiant"]);
        world.set_level(crate::eligibility::RESERVED_LOCATION, Vec::<String>::new());
        world.set_nav_nodes(vec![
            Position::new(10.0, -200.0, 4.0),
            Position::new(-32.5, -210.0, 18.0),
            Position::new(64.0, -195.5, -12.0),
            Position::new(3.0, -220.0, 40.0),
        ]);
        world
    }

    pub fn set_level<I, S>(&mut self, location_id: impl Into<String>, entities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.levels
            .insert(location_id.into(), entities.into_iter().map(Into::into).collect());
    }

    pub fn has_level(&self, location_id: &str) -> bool {
        self.levels.contains_key(location_id)
    }

    pub fn set_nav_nodes(&mut self, nodes: Vec<Position>) {
        self.nav_nodes = nodes;
    }

    pub fn add_player(&mut self, player_id: PlayerId) {
        self.players.entry(player_id).or_default();
    }

    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.players.remove(&player_id);
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&SimPlayer> {
        self.players.get(&player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut SimPlayer> {
        self.players.get_mut(&player_id)
    }

    /// Revive everyone at full health outside the facility.
    pub fn reset_players(&mut self) {
        for player in self.players.values_mut() {
            *player = SimPlayer::default();
        }
    }

    pub fn actions(&self) -> &[WorldAction] {
        &self.actions
    }
}

impl GameWorld for SimWorld {
    fn spawnable_entities(&self, location_id: &str) -> BTreeSet<String> {
        self.levels.get(location_id).cloned().unwrap_or_default()
    }

    fn player_health(&self, player_id: PlayerId) -> Option<i32> {
        self.players.get(&player_id).map(|p| p.health)
    }

    fn is_player_alive(&self, player_id: PlayerId) -> bool {
        self.players.get(&player_id).is_some_and(|p| p.alive)
    }

    fn is_player_inside(&self, player_id: PlayerId) -> bool {
        self.players.get(&player_id).is_some_and(|p| p.inside)
    }

    fn player_position(&self, player_id: PlayerId) -> Option<Position> {
        self.players.get(&player_id).map(|p| p.position)
    }

    fn inside_nav_nodes(&self) -> Vec<Position> {
        self.nav_nodes.clone()
    }

    fn teleport_player(&mut self, player_id: PlayerId, to: Position) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.position = to;
            player.inside = true;
        }
        self.actions.push(WorldAction::Teleported { player_id, to });
    }

    fn damage_player(&mut self, player_id: PlayerId, amount: i32) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.health = (player.health - amount).max(0);
            if player.health == 0 {
                player.alive = false;
            }
        }
        self.actions.push(WorldAction::Damaged { player_id, amount });
    }

    fn kill_player(&mut self, player_id: PlayerId) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.health = 0;
            player.alive = false;
        }
        self.actions.push(WorldAction::Killed { player_id });
    }

    fn spawn_effect(&mut self, request: EffectRequest) {
        self.actions.push(WorldAction::Effect(request));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub title: String,
    pub body: String,
}

/// HUD that keeps every hint it was asked to show. An inactive HUD
/// refuses hints, like a player still on the main menu.
#[derive(Debug, Clone)]
pub struct RecordingHud {
    active: bool,
    hints: Vec<Hint>,
}

impl Default for RecordingHud {
    fn default() -> Self {
        Self {
            active: true,
            hints: Vec::new(),
        }
    }
}

impl RecordingHud {
    pub fn inactive() -> Self {
        Self {
            active: false,
            hints: Vec::new(),
        }
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    pub fn last(&self) -> Option<&Hint> {
        self.hints.last()
    }

    pub fn drain(&mut self) -> Vec<Hint> {
        std::mem::take(&mut self.hints)
    }
}

impl HudSurface for RecordingHud {
    fn display_hint(&mut self, title: &str, body: &str) -> Result<(), HudError> {
        if !self.active {
            return Err(HudError::NoActiveSurface);
        }
        self.hints.push(Hint {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingRecognizer {
    pub grammar: Option<Vec<String>>,
    pub running: bool,
    pub starts: u32,
    pub stops: u32,
}

impl RecognizerControl for RecordingRecognizer {
    fn load_grammar(&mut self, words: &[String]) {
        self.grammar = Some(words.to_vec());
    }

    fn start(&mut self) {
        self.running = true;
        self.starts += 1;
    }

    fn stop(&mut self) {
        if self.running {
            self.stops += 1;
        }
        self.running = false;
    }

    fn unload_grammar(&mut self) {
        self.grammar = None;
    }
}
