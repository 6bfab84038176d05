//! Punishment dispatcher.
//!
//! Per player: `Idle -> Executing(kind) -> Idle`, and for `Apologize`
//! `Idle -> AwaitingResponse -> Idle`. Delayed steps (teleport settle,
//! detonation, apology countdown, suffocator release) are tasks on the
//! dispatcher's own scheduler and fire from `advance`.
//!
//! A kind that cannot run escalates to another concrete kind drawn at
//! random. The draw excludes `Apologize` and every kind that already failed
//! for this dispatch, and `Explode`/`Flash` have no preconditions, so the
//! chain always ends in an executed punishment.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{EffectKind, EffectRequest, PlayerId, Position, PunishmentKind};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::matcher::normalize;
use crate::scheduler::{TaskId, TaskScheduler};
use crate::world::{show_hint, GameWorld, HudSurface};

pub const TELEPORT_SETTLE_MS: u64 = 3_000;
pub const TELEPORT_DAMAGE: i32 = 34;
/// Teleport damage turns lethal when health would end up this close to zero.
pub const TELEPORT_LETHAL_MARGIN: i32 = 5;
pub const EXPLODE_WARNING_MS: u64 = 3_000;
pub const FLASH_DAMAGE: i32 = 20;
pub const APOLOGY_WINDOW_SECS: u32 = 10;
pub const SUFFOCATE_CLING_MS: u64 = 15_000;

const SECOND_MS: u64 = 1_000;

pub const APOLOGY_PHRASES: [&str; 6] = [
    "i am sorry",
    "please forgive me",
    "my deepest apologies",
    "it will not happen again",
    "i take it back",
    "that was uncalled for",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PunishmentError {
    #[error("{kind} cannot run for player {player_id}: {reason}")]
    PreconditionNotMet {
        kind: PunishmentKind,
        player_id: PlayerId,
        reason: &'static str,
    },
    #[error("player {player_id} already owes an apology")]
    StaleContext { player_id: PlayerId },
    #[error("player {player_id} is dead or not in the session")]
    TargetUnavailable { player_id: PlayerId },
    #[error("no punishment left to escalate to for player {player_id}")]
    NoFallback { player_id: PlayerId },
}

impl PunishmentError {
    fn escalates(&self) -> bool {
        matches!(
            self,
            PunishmentError::PreconditionNotMet { .. } | PunishmentError::StaleContext { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunishmentState {
    Idle,
    Executing(PunishmentKind),
    AwaitingResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PunishmentTask {
    TeleportSettle { player_id: PlayerId, destination: Position },
    Detonate { player_id: PlayerId, position: Position },
    ApologyTick { player_id: PlayerId, remaining_secs: u32 },
    ApologyDeadline { player_id: PlayerId },
    ReleaseSuffocator { player_id: PlayerId },
}

impl PunishmentTask {
    fn player_id(&self) -> PlayerId {
        match self {
            PunishmentTask::TeleportSettle { player_id, .. }
            | PunishmentTask::Detonate { player_id, .. }
            | PunishmentTask::ApologyTick { player_id, .. }
            | PunishmentTask::ApologyDeadline { player_id }
            | PunishmentTask::ReleaseSuffocator { player_id } => *player_id,
        }
    }
}

/// What the dispatcher did, in order. Drained by the owner for reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum PunishmentEvent {
    Started {
        player_id: PlayerId,
        kind: PunishmentKind,
    },
    Escalated {
        player_id: PlayerId,
        from: PunishmentKind,
        reason: String,
    },
    Completed {
        player_id: PlayerId,
        kind: PunishmentKind,
    },
    ApologyAccepted {
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub player_id: PlayerId,
    pub requested: PunishmentKind,
    pub executed: PunishmentKind,
    pub escalations: Vec<PunishmentKind>,
}

#[derive(Debug, Clone)]
struct ApologyContext {
    phrase: String,
    tick_task: Option<TaskId>,
    deadline_task: TaskId,
}

#[derive(Debug, Clone, Default)]
struct PlayerPunishment {
    in_flight: BTreeMap<TaskId, PunishmentKind>,
    apology: Option<ApologyContext>,
}

impl PlayerPunishment {
    fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.apology.is_none()
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    configured: PunishmentKind,
    rng: StdRng,
    scheduler: TaskScheduler<PunishmentTask>,
    players: BTreeMap<PlayerId, PlayerPunishment>,
    events: Vec<PunishmentEvent>,
}

impl Dispatcher {
    pub fn new(configured: PunishmentKind, seed: u64) -> Self {
        Self {
            configured,
            rng: StdRng::seed_from_u64(seed),
            scheduler: TaskScheduler::new(),
            players: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn set_kind(&mut self, kind: PunishmentKind) {
        self.configured = kind;
    }

    pub fn state(&self, player_id: PlayerId) -> PunishmentState {
        let Some(slot) = self.players.get(&player_id) else {
            return PunishmentState::Idle;
        };
        if slot.apology.is_some() {
            return PunishmentState::AwaitingResponse;
        }
        slot.in_flight
            .values()
            .next_back()
            .map_or(PunishmentState::Idle, |kind| PunishmentState::Executing(*kind))
    }

    /// Phrase the player must type to cancel a pending apology.
    pub fn pending_apology(&self, player_id: PlayerId) -> Option<&str> {
        self.players
            .get(&player_id)
            .and_then(|slot| slot.apology.as_ref())
            .map(|ctx| ctx.phrase.as_str())
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.scheduler.has_pending()
    }

    pub fn drain_events(&mut self) -> Vec<PunishmentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Punish `player_id`. With `force_random`, or when the configured kind
    /// is `Random`, the kind is drawn from the concrete kinds.
    pub fn dispatch(
        &mut self,
        player_id: PlayerId,
        force_random: bool,
        world: &mut dyn GameWorld,
        hud: &mut dyn HudSurface,
    ) -> Result<DispatchOutcome, PunishmentError> {
        if !world.is_player_alive(player_id) {
            warn!(player_id, "punishment target is dead or missing, skipping");
            return Err(PunishmentError::TargetUnavailable { player_id });
        }

        let mut excluded = BTreeSet::new();
        let requested = if force_random || self.configured == PunishmentKind::Random {
            self.draw(player_id, force_random, &excluded)?
        } else {
            self.configured
        };

        let mut kind = requested;
        let mut escalations = Vec::new();
        loop {
            debug!(player_id, kind = %kind, "punishment resolved");
            match self.execute(kind, player_id, world, hud) {
                Ok(()) => {
                    info!(player_id, kind = %kind, escalations = escalations.len(), "punishment started");
                    self.events.push(PunishmentEvent::Started { player_id, kind });
                    return Ok(DispatchOutcome {
                        player_id,
                        requested,
                        executed: kind,
                        escalations,
                    });
                }
                Err(err) if err.escalates() => {
                    warn!(player_id, from = %kind, reason = %err, "escalating punishment");
                    self.events.push(PunishmentEvent::Escalated {
                        player_id,
                        from: kind,
                        reason: err.to_string(),
                    });
                    excluded.insert(kind);
                    escalations.push(kind);
                    kind = self.draw(player_id, true, &excluded)?;
                }
                Err(err) => {
                    warn!(player_id, kind = %kind, error = %err, "punishment aborted");
                    return Err(err);
                }
            }
        }
    }

    /// Checks `text` against the player's pending apology. An exact match
    /// (after trimming and case folding) cancels the countdown.
    pub fn try_apologize(&mut self, player_id: PlayerId, text: &str, hud: &mut dyn HudSurface) -> bool {
        let Some(slot) = self.players.get_mut(&player_id) else {
            return false;
        };
        let accepted = slot
            .apology
            .as_ref()
            .is_some_and(|ctx| normalize(text) == ctx.phrase);
        if !accepted {
            return false;
        }

        if let Some(ctx) = slot.apology.take() {
            if let Some(tick) = ctx.tick_task {
                self.scheduler.cancel(tick);
            }
            self.scheduler.cancel(ctx.deadline_task);
        }
        self.forget_if_idle(player_id);
        info!(player_id, "apology accepted");
        show_hint(hud, "Thank you!", "Apology accepted. Mind your words.");
        self.events.push(PunishmentEvent::ApologyAccepted { player_id });
        self.events.push(PunishmentEvent::Completed {
            player_id,
            kind: PunishmentKind::Apologize,
        });
        true
    }

    /// Moves the clock to `now_ms` and runs every task that came due.
    pub fn advance(&mut self, now_ms: u64, world: &mut dyn GameWorld, hud: &mut dyn HudSurface) {
        self.scheduler.advance_clock(now_ms);
        while let Some(task) = self.scheduler.pop_due() {
            let player_id = task.payload.player_id();
            let finished = self
                .players
                .get_mut(&player_id)
                .and_then(|slot| slot.in_flight.remove(&task.task_id));
            self.fire(task.payload, task.due_ms, finished, world, hud);
            self.forget_if_idle(player_id);
        }
    }

    /// Drops every pending task for one player. Nothing already scheduled
    /// for them will fire.
    pub fn cancel_player(&mut self, player_id: PlayerId) {
        if let Some(slot) = self.players.remove(&player_id) {
            for task_id in slot.in_flight.keys() {
                self.scheduler.cancel(*task_id);
            }
            if let Some(ctx) = slot.apology {
                if let Some(tick) = ctx.tick_task {
                    self.scheduler.cancel(tick);
                }
                self.scheduler.cancel(ctx.deadline_task);
            }
            debug!(player_id, "pending punishments cancelled");
        }
    }

    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.players.clear();
    }

    fn draw(
        &mut self,
        player_id: PlayerId,
        forced: bool,
        excluded: &BTreeSet<PunishmentKind>,
    ) -> Result<PunishmentKind, PunishmentError> {
        let pool: Vec<PunishmentKind> = PunishmentKind::CONCRETE
            .iter()
            .copied()
            .filter(|kind| !(forced && *kind == PunishmentKind::Apologize))
            .filter(|kind| !excluded.contains(kind))
            .collect();
        pool.choose(&mut self.rng)
            .copied()
            .ok_or(PunishmentError::NoFallback { player_id })
    }

    fn execute(
        &mut self,
        kind: PunishmentKind,
        player_id: PlayerId,
        world: &mut dyn GameWorld,
        hud: &mut dyn HudSurface,
    ) -> Result<(), PunishmentError> {
        match kind {
            PunishmentKind::Teleport => self.teleport(player_id, world),
            PunishmentKind::Explode => self.explode(player_id, world, hud),
            PunishmentKind::Flash => self.flash(player_id, world),
            PunishmentKind::Apologize => self.apologize(player_id, hud),
            PunishmentKind::Suffocate => self.suffocate(player_id, world),
            PunishmentKind::Random => Err(PunishmentError::PreconditionNotMet {
                kind,
                player_id,
                reason: "random is not a concrete punishment",
            }),
        }
    }

    fn teleport(&mut self, player_id: PlayerId, world: &mut dyn GameWorld) -> Result<(), PunishmentError> {
        let nodes = world.inside_nav_nodes();
        let Some(destination) = nodes.choose(&mut self.rng).copied() else {
            return Err(PunishmentError::PreconditionNotMet {
                kind: PunishmentKind::Teleport,
                player_id,
                reason: "no navigation points inside the facility",
            });
        };

        world.spawn_effect(EffectRequest {
            kind: EffectKind::TeleportBuildup,
            player_id,
            position: world.player_position(player_id),
        });
        self.schedule(
            player_id,
            PunishmentKind::Teleport,
            TELEPORT_SETTLE_MS,
            PunishmentTask::TeleportSettle { player_id, destination },
        );
        Ok(())
    }

    fn explode(
        &mut self,
        player_id: PlayerId,
        world: &mut dyn GameWorld,
        hud: &mut dyn HudSurface,
    ) -> Result<(), PunishmentError> {
        let position = world
            .player_position(player_id)
            .ok_or(PunishmentError::TargetUnavailable { player_id })?;
        world.spawn_effect(EffectRequest {
            kind: EffectKind::ExplosionWarning,
            player_id,
            position: Some(position),
        });
        show_hint(hud, "Watch your tongue!", "Something beneath you is ticking...");
        self.schedule(
            player_id,
            PunishmentKind::Explode,
            EXPLODE_WARNING_MS,
            PunishmentTask::Detonate { player_id, position },
        );
        Ok(())
    }

    fn flash(&mut self, player_id: PlayerId, world: &mut dyn GameWorld) -> Result<(), PunishmentError> {
        world.spawn_effect(EffectRequest {
            kind: EffectKind::Flash,
            player_id,
            position: world.player_position(player_id),
        });
        world.damage_player(player_id, FLASH_DAMAGE);
        self.events.push(PunishmentEvent::Completed {
            player_id,
            kind: PunishmentKind::Flash,
        });
        Ok(())
    }

    fn apologize(&mut self, player_id: PlayerId, hud: &mut dyn HudSurface) -> Result<(), PunishmentError> {
        if self
            .players
            .get(&player_id)
            .is_some_and(|slot| slot.apology.is_some())
        {
            return Err(PunishmentError::StaleContext { player_id });
        }

        let phrase = APOLOGY_PHRASES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(APOLOGY_PHRASES[0])
            .to_string();
        show_hint(hud, "Apologize!", &apology_prompt(&phrase, APOLOGY_WINDOW_SECS));

        let tick_task = self.scheduler.schedule(
            SECOND_MS,
            PunishmentTask::ApologyTick {
                player_id,
                remaining_secs: APOLOGY_WINDOW_SECS - 1,
            },
        );
        let deadline_task = self.scheduler.schedule(
            u64::from(APOLOGY_WINDOW_SECS) * SECOND_MS,
            PunishmentTask::ApologyDeadline { player_id },
        );
        self.players.entry(player_id).or_default().apology = Some(ApologyContext {
            phrase,
            tick_task: Some(tick_task),
            deadline_task,
        });
        Ok(())
    }

    fn suffocate(&mut self, player_id: PlayerId, world: &mut dyn GameWorld) -> Result<(), PunishmentError> {
        if !world.is_player_inside(player_id) {
            return Err(PunishmentError::PreconditionNotMet {
                kind: PunishmentKind::Suffocate,
                player_id,
                reason: "target is not inside the facility",
            });
        }
        world.spawn_effect(EffectRequest {
            kind: EffectKind::SuffocatorSpawned,
            player_id,
            position: world.player_position(player_id),
        });
        self.schedule(
            player_id,
            PunishmentKind::Suffocate,
            SUFFOCATE_CLING_MS,
            PunishmentTask::ReleaseSuffocator { player_id },
        );
        Ok(())
    }

    fn schedule(&mut self, player_id: PlayerId, kind: PunishmentKind, delay_ms: u64, task: PunishmentTask) {
        let task_id = self.scheduler.schedule(delay_ms, task);
        self.players
            .entry(player_id)
            .or_default()
            .in_flight
            .insert(task_id, kind);
    }

    fn fire(
        &mut self,
        task: PunishmentTask,
        due_ms: u64,
        finished: Option<PunishmentKind>,
        world: &mut dyn GameWorld,
        hud: &mut dyn HudSurface,
    ) {
        match task {
            PunishmentTask::TeleportSettle { player_id, destination } => {
                // The buildup ends in the beam: relocation and damage land together.
                if world.is_player_alive(player_id) {
                    world.teleport_player(player_id, destination);
                    world.spawn_effect(EffectRequest {
                        kind: EffectKind::TeleportBeam,
                        player_id,
                        position: Some(destination),
                    });
                    let health = world.player_health(player_id).unwrap_or(0);
                    if health <= TELEPORT_DAMAGE + TELEPORT_LETHAL_MARGIN {
                        world.kill_player(player_id);
                    } else {
                        world.damage_player(player_id, TELEPORT_DAMAGE);
                    }
                }
                self.complete(player_id, finished);
            }
            PunishmentTask::Detonate { player_id, position } => {
                world.spawn_effect(EffectRequest {
                    kind: EffectKind::Explosion,
                    player_id,
                    position: Some(position),
                });
                // Lethal to the target only; bystanders take nothing.
                if world.is_player_alive(player_id) {
                    world.kill_player(player_id);
                }
                self.complete(player_id, finished);
            }
            PunishmentTask::ReleaseSuffocator { player_id } => {
                world.spawn_effect(EffectRequest {
                    kind: EffectKind::SuffocatorRemoved,
                    player_id,
                    position: world.player_position(player_id),
                });
                self.complete(player_id, finished);
            }
            PunishmentTask::ApologyTick {
                player_id,
                remaining_secs,
            } => self.apology_tick(player_id, remaining_secs, due_ms, hud),
            PunishmentTask::ApologyDeadline { player_id } => self.apology_expired(player_id, world, hud),
        }
    }

    fn apology_tick(&mut self, player_id: PlayerId, remaining_secs: u32, due_ms: u64, hud: &mut dyn HudSurface) {
        let Some(ctx) = self
            .players
            .get_mut(&player_id)
            .and_then(|slot| slot.apology.as_mut())
        else {
            return;
        };
        show_hint(hud, "Apologize!", &apology_prompt(&ctx.phrase, remaining_secs));
        ctx.tick_task = (remaining_secs > 1).then(|| {
            self.scheduler.schedule_at(
                due_ms + SECOND_MS,
                PunishmentTask::ApologyTick {
                    player_id,
                    remaining_secs: remaining_secs - 1,
                },
            )
        });
    }

    fn apology_expired(&mut self, player_id: PlayerId, world: &mut dyn GameWorld, hud: &mut dyn HudSurface) {
        let Some(ctx) = self
            .players
            .get_mut(&player_id)
            .and_then(|slot| slot.apology.take())
        else {
            return;
        };
        if let Some(tick) = ctx.tick_task {
            self.scheduler.cancel(tick);
        }
        warn!(player_id, "apology window elapsed, escalating to explode");
        self.events.push(PunishmentEvent::Escalated {
            player_id,
            from: PunishmentKind::Apologize,
            reason: "apology window elapsed".to_string(),
        });
        if !world.is_player_alive(player_id) {
            return;
        }
        match self.explode(player_id, world, hud) {
            Ok(()) => self.events.push(PunishmentEvent::Started {
                player_id,
                kind: PunishmentKind::Explode,
            }),
            Err(err) => warn!(player_id, error = %err, "apology escalation failed"),
        }
    }

    fn complete(&mut self, player_id: PlayerId, finished: Option<PunishmentKind>) {
        if let Some(kind) = finished {
            info!(player_id, kind = %kind, "punishment completed");
            self.events.push(PunishmentEvent::Completed { player_id, kind });
        }
    }

    fn forget_if_idle(&mut self, player_id: PlayerId) {
        if self.players.get(&player_id).is_some_and(PlayerPunishment::is_idle) {
            self.players.remove(&player_id);
        }
    }
}

fn apology_prompt(phrase: &str, remaining_secs: u32) -> String {
    format!("Type \"{phrase}\" in chat ({remaining_secs}s)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{RecordingHud, SimWorld, WorldAction};

    const PLAYER: PlayerId = 7;

    fn world() -> SimWorld {
        let mut world = SimWorld::with_default_levels();
        world.add_player(PLAYER);
        world.add_player(8);
        world
    }

    fn kills(world: &SimWorld) -> usize {
        world
            .actions()
            .iter()
            .filter(|a| matches!(a, WorldAction::Killed { player_id } if *player_id == PLAYER))
            .count()
    }

    #[test]
    fn teleport_damages_after_settle() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Teleport, 1);

        let outcome = dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        assert_eq!(outcome.executed, PunishmentKind::Teleport);
        assert!(!world.is_player_inside(PLAYER));
        assert!(world.actions().iter().any(
            |a| matches!(a, WorldAction::Effect(req) if req.kind == EffectKind::TeleportBuildup)
        ));
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Executing(PunishmentKind::Teleport));

        dispatcher.advance(TELEPORT_SETTLE_MS - 1, &mut world, &mut hud);
        assert_eq!(world.player_health(PLAYER), Some(100));
        assert!(!world.actions().iter().any(|a| matches!(a, WorldAction::Teleported { .. })));

        dispatcher.advance(TELEPORT_SETTLE_MS, &mut world, &mut hud);
        assert!(world.is_player_inside(PLAYER));
        assert_eq!(world.player_health(PLAYER), Some(100 - TELEPORT_DAMAGE));
        assert!(world.actions().iter().any(
            |a| matches!(a, WorldAction::Effect(req) if req.kind == EffectKind::TeleportBeam)
        ));
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Idle);
    }

    #[test]
    fn teleport_is_lethal_near_threshold() {
        let mut world = world();
        world.player_mut(PLAYER).expect("player").health = TELEPORT_DAMAGE + TELEPORT_LETHAL_MARGIN;
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Teleport, 1);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        dispatcher.advance(TELEPORT_SETTLE_MS, &mut world, &mut hud);
        assert!(!world.is_player_alive(PLAYER));
        assert_eq!(kills(&world), 1);
    }

    #[test]
    fn explode_detonates_where_the_warning_was() {
        let mut world = world();
        let warned_at = Position::new(1.0, 0.0, 1.0);
        world.player_mut(PLAYER).expect("player").position = warned_at;
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Explode, 1);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");

        world.player_mut(PLAYER).expect("player").position = Position::new(50.0, 0.0, 50.0);
        dispatcher.advance(EXPLODE_WARNING_MS, &mut world, &mut hud);

        let explosion = world.actions().iter().find_map(|a| match a {
            WorldAction::Effect(req) if req.kind == EffectKind::Explosion => req.position,
            _ => None,
        });
        assert_eq!(explosion, Some(warned_at));
        assert!(!world.is_player_alive(PLAYER));
        assert!(world.is_player_alive(8));
    }

    #[test]
    fn flash_is_immediate_and_local() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Flash, 1);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        assert_eq!(world.player_health(PLAYER), Some(100 - FLASH_DAMAGE));
        assert_eq!(world.player_health(8), Some(100));
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Idle);
        assert!(!dispatcher.has_pending_tasks());
    }

    #[test]
    fn correct_apology_cancels_the_countdown() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Apologize, 3);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::AwaitingResponse);

        dispatcher.advance(4_000, &mut world, &mut hud);
        let phrase = dispatcher.pending_apology(PLAYER).expect("phrase").to_string();
        assert!(!dispatcher.try_apologize(PLAYER, "sorry i guess", &mut hud));
        assert!(dispatcher.try_apologize(PLAYER, &phrase.to_uppercase(), &mut hud));

        dispatcher.advance(60_000, &mut world, &mut hud);
        assert!(world.is_player_alive(PLAYER));
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Idle);
        assert_eq!(hud.last().map(|h| h.title.as_str()), Some("Thank you!"));
    }

    #[test]
    fn countdown_ticks_every_second() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Apologize, 3);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        for second in 1..=u64::from(APOLOGY_WINDOW_SECS) - 1 {
            dispatcher.advance(second * 1_000, &mut world, &mut hud);
        }
        let countdown = hud.hints().iter().filter(|h| h.title == "Apologize!").count();
        assert_eq!(countdown, APOLOGY_WINDOW_SECS as usize);
        assert!(hud.last().is_some_and(|h| h.body.ends_with("(1s)")));
    }

    #[test]
    fn missed_apology_explodes() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Apologize, 3);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        dispatcher.advance(u64::from(APOLOGY_WINDOW_SECS) * 1_000, &mut world, &mut hud);
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Executing(PunishmentKind::Explode));
        dispatcher.advance(u64::from(APOLOGY_WINDOW_SECS) * 1_000 + EXPLODE_WARNING_MS, &mut world, &mut hud);
        assert!(!world.is_player_alive(PLAYER));
    }

    #[test]
    fn second_apology_escalates_to_one_other_kind() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Apologize, 11);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("first");
        dispatcher.drain_events();

        let outcome = dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("second");
        assert_ne!(outcome.executed, PunishmentKind::Apologize);
        assert!(outcome.executed.is_concrete());
        assert_eq!(outcome.escalations.first(), Some(&PunishmentKind::Apologize));
        let started = dispatcher
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, PunishmentEvent::Started { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[test]
    fn suffocate_outside_escalates() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Suffocate, 5);
        let outcome = dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        assert_ne!(outcome.executed, PunishmentKind::Suffocate);
        assert_ne!(outcome.executed, PunishmentKind::Apologize);
        assert_eq!(outcome.escalations, vec![PunishmentKind::Suffocate]);
    }

    #[test]
    fn suffocate_inside_clings_then_releases() {
        let mut world = world();
        world.player_mut(PLAYER).expect("player").inside = true;
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Suffocate, 5);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        dispatcher.advance(SUFFOCATE_CLING_MS, &mut world, &mut hud);
        let released = world
            .actions()
            .iter()
            .any(|a| matches!(a, WorldAction::Effect(req) if req.kind == EffectKind::SuffocatorRemoved));
        assert!(released);
        assert_eq!(dispatcher.state(PLAYER), PunishmentState::Idle);
    }

    #[test]
    fn dead_target_is_skipped() {
        let mut world = world();
        world.kill_player(PLAYER);
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Flash, 1);
        let err = dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).unwrap_err();
        assert_eq!(err, PunishmentError::TargetUnavailable { player_id: PLAYER });
    }

    #[test]
    fn cancelled_player_tasks_never_fire() {
        let mut world = world();
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Explode, 1);
        dispatcher.dispatch(PLAYER, false, &mut world, &mut hud).expect("dispatch");
        dispatcher.cancel_player(PLAYER);
        dispatcher.advance(60_000, &mut world, &mut hud);
        assert!(world.is_player_alive(PLAYER));
    }

    #[test]
    fn forced_random_never_draws_apologize() {
        let mut world = world();
        world.player_mut(PLAYER).expect("player").inside = true;
        let mut hud = RecordingHud::default();
        let mut dispatcher = Dispatcher::new(PunishmentKind::Teleport, 21);
        for _ in 0..50 {
            world.reset_players();
            let outcome = dispatcher.dispatch(PLAYER, true, &mut world, &mut hud).expect("dispatch");
            assert_ne!(outcome.executed, PunishmentKind::Apologize);
            dispatcher.cancel_player(PLAYER);
        }
    }
}
