//! World state and the per-tick simulation step

use std::sync::Arc;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, trace, warn};
use uuid::Uuid;

use crate::config::{GameConfig, MAX_CLIENTS};
use crate::game::character::{Character, DamageResult};
use crate::game::collision::Collision;
use crate::game::controller::{BlockController, GameController};
use crate::game::entities::{Laser, Projectile};
use crate::game::events::{ClientMask, Sound, WorldEvent, CMASK_ALL};
use crate::game::input::{PlayerInput, PLAYERFLAG_CHATTING};
use crate::game::physics::{closest_point_on_line, PHYS_SIZE};
use crate::game::player::{Player, Team};
use crate::game::snapshot::SnapItem;
use crate::game::spatial::{EntityKey, EntityKind, SpatialIndex};
use crate::game::state_machine::BlockEvent;
use crate::game::weapon::{KillWeapon, WeaponSlot};
use crate::game::world_core::WorldCore;
use crate::game::ClientId;
use crate::net::protocol::{Outgoing, Recipient, ServerMsg};
use crate::util::time::GameTime;

/// Seconds a dead player waits before respawning without pressing fire
const AUTO_RESPAWN_SECONDS: i64 = 3;

const EXPLOSION_RADIUS: f32 = 135.0;
const EXPLOSION_INNER_RADIUS: f32 = 48.0;
const EXPLOSION_DAMAGE: f32 = 6.0;

/// Observers don't see anything further away than this
const CLIP_X: f32 = 1000.0;
const CLIP_Y: f32 = 800.0;
const CLIP_DISTANCE: f32 = 1100.0;

pub struct GameWorld {
    pub id: Uuid,
    pub time: GameTime,
    /// Paused worlds keep ticking players but send live cores in snapshots
    pub paused: bool,
    pub config: Arc<GameConfig>,
    pub collision: Arc<Collision>,
    /// Physics actor table
    pub core: WorldCore,
    pub index: SpatialIndex,
    /// Character arena indexed by client id. A slot is empty while its character
    /// is being ticked, and dead characters stay until the end of the tick.
    pub characters: Vec<Option<Character>>,
    pub players: Vec<Option<Player>>,
    pub projectiles: Vec<Projectile>,
    pub lasers: Vec<Laser>,
    pub controller: Box<dyn GameController>,
    events: Vec<WorldEvent>,
    outbox: Vec<Outgoing>,
    /// Killers whose character was out of the arena when the kill landed
    pending_taunts: Vec<ClientId>,
    spawn_points: Vec<Vec2>,
    rng: ChaCha8Rng,
}

impl GameWorld {
    pub fn new(
        config: Arc<GameConfig>,
        collision: Arc<Collision>,
        tick_speed: i64,
        seed: u64,
        max_clients: usize,
    ) -> Self {
        let max_clients = max_clients.clamp(1, MAX_CLIENTS);
        let spawn_points = collision.spawn_points();
        if spawn_points.is_empty() {
            warn!("map has no spawn points, spawning at the map centre");
        }

        Self {
            id: Uuid::new_v4(),
            time: GameTime::new(tick_speed),
            paused: false,
            config,
            collision,
            core: WorldCore::default(),
            index: SpatialIndex::default(),
            characters: vec![None; max_clients],
            players: vec![None; max_clients],
            projectiles: Vec::new(),
            lasers: Vec::new(),
            controller: Box::new(BlockController::default()),
            events: Vec::new(),
            outbox: Vec::new(),
            pending_taunts: Vec::new(),
            spawn_points,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_controller(mut self, controller: Box<dyn GameController>) -> Self {
        self.controller = controller;
        self
    }

    pub fn max_clients(&self) -> usize {
        self.players.len()
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            info!(paused, tick = self.time.tick, "world pause changed");
        }
    }

    // ---- players ----

    pub fn player(&self, id: ClientId) -> Option<&Player> {
        self.players.get(id).and_then(Option::as_ref)
    }

    pub fn player_mut(&mut self, id: ClientId) -> Option<&mut Player> {
        self.players.get_mut(id).and_then(Option::as_mut)
    }

    pub fn player_count(&self) -> usize {
        self.players.iter().flatten().count()
    }

    /// Name for log lines
    pub fn client_name(&self, id: Option<ClientId>) -> &str {
        id.and_then(|id| self.player(id))
            .map_or("(invalid)", |player| player.name.as_str())
    }

    pub fn add_player(&mut self, id: ClientId, name: &str, custom_client: bool) -> bool {
        match self.players.get_mut(id) {
            Some(slot @ None) => {
                *slot = Some(Player::new(id, name, custom_client, self.time.tick));
                info!(client_id = id, name, custom_client, "player joined");
                true
            }
            _ => false,
        }
    }

    pub fn remove_player(&mut self, id: ClientId) -> bool {
        if self.player(id).is_none() {
            return false;
        }

        self.kill_character(id, KillWeapon::Game);
        self.characters[id] = None;
        self.players[id] = None;
        info!(client_id = id, "player left");
        true
    }

    pub fn set_team(&mut self, id: ClientId, team: Team) {
        let Some(player) = self.player_mut(id) else {
            return;
        };
        if player.team == team {
            return;
        }
        player.team = team;
        player.spectator_id = None;
        player.spawn_requested = true;

        self.kill_character(id, KillWeapon::Game);
        info!(client_id = id, team = team.net_id(), "team changed");
    }

    /// Follow another player while spectating, `None` for free view
    pub fn set_spectator_target(&mut self, id: ClientId, target: Option<ClientId>) {
        let target = target.filter(|&t| self.player(t).is_some_and(|p| !p.is_spectator()));
        if let Some(player) = self.player_mut(id).filter(|p| p.is_spectator()) {
            player.spectator_id = target;
        }
    }

    /// Feed one client input into the character
    pub fn apply_input(&mut self, id: ClientId, input: &PlayerInput) {
        let tick = self.time.tick;
        let changed = self
            .character(id)
            .map_or(true, |chr| chr.input() != input);

        let Some(player) = self.player_mut(id) else {
            return;
        };

        // chatting freezes the input where it was
        if input.is_chatting() {
            let was_chatting = player.player_flags & PLAYERFLAG_CHATTING != 0;
            player.player_flags = input.player_flags;
            if !was_chatting {
                if let Some(chr) = self.character_mut(id) {
                    chr.reset_input();
                }
            }
            return;
        }

        player.player_flags = input.player_flags;
        if changed {
            player.last_action_tick = tick;
        }

        let handled = self
            .with_character(id, |chr, world| {
                chr.on_predicted_input(input, tick);
                chr.on_direct_input(world, input);
            })
            .is_some();

        if !handled && input.fire_held() {
            if let Some(player) = self.player_mut(id) {
                player.spawn_requested = true;
            }
        }
    }

    // ---- characters ----

    pub fn character(&self, id: ClientId) -> Option<&Character> {
        self.characters.get(id).and_then(Option::as_ref)
    }

    pub fn character_mut(&mut self, id: ClientId) -> Option<&mut Character> {
        self.characters.get_mut(id).and_then(Option::as_mut)
    }

    pub fn alive_characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.iter().flatten().filter(|chr| chr.is_alive())
    }

    pub fn spawn_character(&mut self, id: ClientId) -> bool {
        let can_spawn = self.player(id).is_some_and(|p| !p.is_spectator())
            && self.character(id).map_or(true, |chr| !chr.is_alive());
        if !can_spawn {
            return false;
        }

        let pos = self.pick_spawn_point();
        let chr = Character::spawn(self, id, pos);
        self.characters[id] = Some(chr);
        if let Some(player) = self.player_mut(id) {
            player.spawn_requested = false;
        }
        true
    }

    /// Spawn at a specific position, bypassing spawn point selection
    pub fn spawn_character_at(&mut self, id: ClientId, pos: Vec2) -> bool {
        if self.player(id).is_none() || self.character(id).is_some_and(Character::is_alive) {
            return false;
        }
        let chr = Character::spawn(self, id, pos);
        self.characters[id] = Some(chr);
        true
    }

    /// Take the character out of the arena, run `f` with the rest of the world and
    /// put it back. `None` if the slot is empty (absent or currently taken).
    pub fn with_character<R>(
        &mut self,
        id: ClientId,
        f: impl FnOnce(&mut Character, &mut GameWorld) -> R,
    ) -> Option<R> {
        let mut chr = self.characters.get_mut(id)?.take()?;
        let result = f(&mut chr, self);

        if let Some(pos) = self.pending_taunts.iter().position(|&t| t == id) {
            self.pending_taunts.swap_remove(pos);
            chr.taunt(&self.time);
        }
        self.characters[id] = Some(chr);
        Some(result)
    }

    /// Apply damage to a character and taunt the killer on death.
    /// `None` if the target has no character in the arena.
    pub fn damage_character(
        &mut self,
        target: ClientId,
        force: Vec2,
        damage: i32,
        from: Option<ClientId>,
        weapon: KillWeapon,
    ) -> Option<DamageResult> {
        let result = self.with_character(target, |chr, world| {
            chr.take_damage(world, force, damage, from, weapon)
        })?;

        if result == DamageResult::Death {
            if let Some(killer) = from.filter(|&k| k != target) {
                self.taunt(killer);
            }
        }
        Some(result)
    }

    fn taunt(&mut self, id: ClientId) {
        let time = self.time;
        match self.characters.get_mut(id) {
            Some(Some(chr)) => chr.taunt(&time),
            Some(None) if self.index.contains(EntityKey::character(id)) => {
                self.pending_taunts.push(id);
            }
            _ => {}
        }
    }

    fn kill_character(&mut self, id: ClientId, weapon: KillWeapon) {
        let killed = self.with_character(id, |chr, world| {
            if chr.is_alive() {
                chr.die(world, Some(chr.client_id()), weapon);
            }
        });
        if killed.is_some() {
            self.characters[id] = None;
        }
    }

    /// Credit the block that `victim` just entered
    pub fn credit_block(&mut self, victim: ClientId, pos: Vec2, event: BlockEvent) {
        match event.by {
            Some(blocker) => {
                let Some(player) = self.player_mut(blocker) else {
                    return;
                };
                player.block_kill(event.chat);
                if event.chat {
                    self.events.push(WorldEvent::FloatingText {
                        pos,
                        text: "chat block".to_string(),
                    });
                }
                info!(blocker, victim, chat = event.chat, "block credited");
            }
            None => {
                if let Some(player) = self.player_mut(victim) {
                    player.self_block();
                }
                info!(victim, "self block");
            }
        }
    }

    /// First character touched by the segment, with the closest point on it
    pub fn intersect_character(
        &self,
        from: Vec2,
        to: Vec2,
        radius: f32,
        exclude: Option<ClientId>,
    ) -> Option<(ClientId, Vec2)> {
        let center = from + (to - from) * 0.5;
        let reach = from.distance(to) * 0.5 + PHYS_SIZE + radius;

        self.index
            .find_near(center, reach, EntityKind::Character, MAX_CLIENTS)
            .into_iter()
            .filter(|&id| Some(id) != exclude)
            .filter_map(|id| {
                let pos = self.index.position(EntityKey::character(id))?;
                let closest = closest_point_on_line(from, to, pos);
                (pos.distance(closest) < PHYS_SIZE + radius).then_some((id, closest))
            })
            .min_by(|a, b| from.distance(a.1).total_cmp(&from.distance(b.1)))
    }

    /// True if `pos` is outside what `observer` can see
    pub fn network_clipped(&self, observer: ClientId, pos: Vec2) -> bool {
        let Some(player) = self.player(observer) else {
            return false;
        };
        let d = pos - player.view_pos;
        d.x.abs() > CLIP_X || d.y.abs() > CLIP_Y || d.length() > CLIP_DISTANCE
    }

    /// Snapshot items of every live character for one observer
    pub fn snap_for(&self, observer: Option<ClientId>) -> Vec<SnapItem> {
        self.alive_characters()
            .filter_map(|chr| chr.snap(self, observer))
            .collect()
    }

    fn pick_spawn_point(&mut self) -> Vec2 {
        if self.spawn_points.is_empty() {
            return Collision::tile_center(self.collision.width() / 2, self.collision.height() / 2);
        }

        let free: Vec<Vec2> = self
            .spawn_points
            .iter()
            .copied()
            .filter(|&p| {
                self.index
                    .find_near(p, PHYS_SIZE, EntityKind::Character, 1)
                    .is_empty()
            })
            .collect();
        let pool = if free.is_empty() { &self.spawn_points } else { &free };
        pool[self.rng.gen_range(0..pool.len())]
    }

    // ---- events ----

    pub fn create_sound(&mut self, pos: Vec2, sound: Sound, mask: ClientMask) {
        self.events.push(WorldEvent::Sound { pos, sound, mask });
    }

    pub fn create_sound_global(&mut self, pos: Vec2, sound: Sound) {
        self.create_sound(pos, sound, CMASK_ALL);
    }

    pub fn create_damage_indicator(&mut self, pos: Vec2, angle: f32, amount: i32) {
        self.events
            .push(WorldEvent::DamageIndicator { pos, angle, amount });
    }

    pub fn create_hammer_hit(&mut self, pos: Vec2) {
        self.events.push(WorldEvent::HammerHit { pos });
    }

    pub fn create_death(&mut self, pos: Vec2, client_id: ClientId) {
        self.events.push(WorldEvent::Death { pos, client_id });
    }

    /// Explosion effect plus falloff damage around `pos`
    pub fn create_explosion(&mut self, pos: Vec2, owner: ClientId, weapon: WeaponSlot, no_damage: bool) {
        self.events.push(WorldEvent::Explosion { pos, owner });
        if no_damage {
            return;
        }

        let targets = self
            .index
            .find_near(pos, EXPLOSION_RADIUS, EntityKind::Character, MAX_CLIENTS);
        for id in targets {
            let Some(target_pos) = self.index.position(EntityKey::character(id)) else {
                continue;
            };
            let diff = target_pos - pos;
            let dir = diff.try_normalize().unwrap_or(Vec2::new(0.0, 1.0));
            let falloff = 1.0
                - ((diff.length() - EXPLOSION_INNER_RADIUS)
                    / (EXPLOSION_RADIUS - EXPLOSION_INNER_RADIUS))
                    .clamp(0.0, 1.0);
            let damage = EXPLOSION_DAMAGE * falloff;
            if damage as i32 != 0 {
                self.damage_character(id, dir * damage * 2.0, damage as i32, Some(owner), weapon.into());
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- messages ----

    pub fn send_to(&mut self, id: ClientId, msg: ServerMsg) {
        self.outbox.push(Outgoing {
            recipient: Recipient::One(id),
            msg,
        });
    }

    pub fn send_to_all(&mut self, msg: ServerMsg, except: Option<ClientId>) {
        self.outbox.push(Outgoing {
            recipient: Recipient::All { except },
            msg,
        });
    }

    /// Centre-screen text for one client, or everyone when `to` is `None`
    pub fn send_broadcast(&mut self, text: &str, to: Option<ClientId>) {
        let msg = ServerMsg::Broadcast {
            text: text.to_string(),
        };
        match to {
            Some(id) => self.send_to(id, msg),
            None => self.send_to_all(msg, None),
        }
    }

    pub fn send_chat(&mut self, from: i32, team: i32, text: &str) {
        self.send_to_all(
            ServerMsg::Chat {
                team,
                client_id: from,
                text: text.to_string(),
            },
            None,
        );
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    // ---- entities ----

    pub fn spawn_projectile(&mut self, projectile: Projectile) {
        self.projectiles.push(projectile);
    }

    pub fn fire_laser(&mut self, from: Vec2, dir: Vec2, reach: f32, owner: ClientId) {
        let laser = Laser::fire(self, from, dir, reach, owner);
        self.lasers.push(laser);
    }

    // ---- tick ----

    /// Advance the world by one tick
    pub fn tick(&mut self) {
        self.time.advance();

        self.tick_respawns();

        for id in 0..self.characters.len() {
            if self.character(id).is_some_and(Character::is_alive) {
                self.with_character(id, |chr, world| chr.tick(world));
            }
        }

        self.tick_entities();

        for id in 0..self.characters.len() {
            if self.character(id).is_some_and(Character::is_alive) {
                self.with_character(id, |chr, world| chr.tick_deferred(world));
            }
        }

        self.update_views();

        for slot in &mut self.characters {
            if slot.as_ref().is_some_and(|chr| !chr.is_alive()) {
                *slot = None;
            }
        }
        self.pending_taunts.clear();
    }

    fn tick_respawns(&mut self) {
        let tick = self.time.tick;
        let auto_delay = self.time.tick_speed * AUTO_RESPAWN_SECONDS;

        let ready: Vec<ClientId> = self
            .players
            .iter()
            .flatten()
            .filter(|p| !p.is_spectator() && self.character(p.client_id).is_none())
            .filter(|p| {
                tick >= p.respawn_tick && (p.spawn_requested || tick > p.die_tick + auto_delay)
            })
            .map(|p| p.client_id)
            .collect();

        for id in ready {
            self.spawn_character(id);
        }
    }

    fn tick_entities(&mut self) {
        let mut projectiles = std::mem::take(&mut self.projectiles);
        projectiles.retain_mut(|p| p.tick(self));
        // keep anything launched while the old ones were flying
        projectiles.append(&mut self.projectiles);
        self.projectiles = projectiles;

        let tick = self.time.tick;
        self.lasers.retain(|laser| !laser.is_expired(tick));
        if !self.projectiles.is_empty() {
            trace!(count = self.projectiles.len(), "projectiles in flight");
        }
    }

    /// Move every player's view to what it watches and rebuild the legacy id maps
    fn update_views(&mut self) {
        let positions: Vec<(ClientId, Vec2)> = self
            .alive_characters()
            .map(|chr| (chr.client_id(), chr.pos()))
            .collect();
        let position_of = |id: ClientId| positions.iter().find(|(c, _)| *c == id).map(|(_, p)| *p);

        let mut views = Vec::new();
        for player in self.players.iter().flatten() {
            let watched = if player.is_spectator() {
                player.spectator_id.and_then(position_of)
            } else {
                position_of(player.client_id)
            };
            views.push((player.client_id, watched));
        }

        for (id, watched) in views {
            if let Some(player) = self.player_mut(id) {
                if let Some(pos) = watched {
                    player.view_pos = pos;
                }
                let view_pos = player.view_pos;
                player.id_map.rebuild(view_pos, positions.iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collision::DEFAULT_ARENA;

    fn world() -> GameWorld {
        let collision = Collision::from_ascii(DEFAULT_ARENA).unwrap();
        GameWorld::new(
            Arc::new(GameConfig::default()),
            Arc::new(collision),
            50,
            7,
            MAX_CLIENTS,
        )
    }

    #[test]
    fn join_spawns_on_next_tick() {
        let mut world = world();
        assert!(world.add_player(0, "alice", true));
        assert!(!world.add_player(0, "again", true));
        assert!(world.character(0).is_none());

        world.tick();
        let chr = world.character(0).unwrap();
        assert!(chr.is_alive());
        assert_eq!(chr.health(), 10);
        assert!(world.index.contains(EntityKey::character(0)));
        assert!(world.core.contains(0));
    }

    #[test]
    fn spectators_do_not_spawn() {
        let mut world = world();
        world.add_player(1, "spec", false);
        world.set_team(1, Team::Spectators);
        world.tick();
        assert!(world.character(1).is_none());
    }

    #[test]
    fn leaving_removes_everything() {
        let mut world = world();
        world.add_player(0, "alice", true);
        world.tick();
        assert!(world.remove_player(0));
        assert!(world.character(0).is_none());
        assert!(!world.index.contains(EntityKey::character(0)));
        assert!(!world.core.contains(0));
        assert!(world.player(0).is_none());

        let kills: Vec<_> = world
            .drain_outbox()
            .into_iter()
            .filter(|out| matches!(out.msg, ServerMsg::KillMsg { .. }))
            .collect();
        assert_eq!(kills.len(), 1);
    }

    #[test]
    fn reset_deregisters_without_kill_message() {
        let mut world = world();
        world.add_player(0, "alice", true);
        world.tick();
        world.drain_outbox();

        world.with_character(0, |chr, world| chr.reset(world));
        assert!(!world.character(0).unwrap().is_alive());
        assert!(!world.index.contains(EntityKey::character(0)));
        assert!(!world.core.contains(0));
        assert!(world.drain_outbox().is_empty());
    }

    #[test]
    fn chatting_releases_held_fire() {
        let mut world = world();
        world.add_player(0, "alice", true);
        world.tick();

        let held = PlayerInput {
            fire: 1,
            direction: 1,
            ..PlayerInput::default()
        };
        world.apply_input(0, &held);
        let chatting = PlayerInput {
            player_flags: PLAYERFLAG_CHATTING,
            ..held
        };
        world.apply_input(0, &chatting);

        let input = world.character(0).unwrap().input();
        assert_eq!(input.fire, 2);
        assert_eq!(input.direction, 0);
        assert_eq!(world.player(0).unwrap().player_flags, PLAYERFLAG_CHATTING);
    }

    #[test]
    fn team_mode_blocks_friendly_damage() {
        let mut world = world().with_controller(Box::new(BlockController { teams: true }));
        for id in 0..3 {
            world.add_player(id, "p", true);
        }
        world.set_team(2, Team::Blue);
        world.tick();
        world.tick();

        let hit = world.damage_character(1, Vec2::ZERO, 3, Some(0), KillWeapon::Weapon(WeaponSlot::Gun));
        assert_eq!(hit, Some(DamageResult::None));
        assert_eq!(world.character(1).unwrap().health(), 10);

        let hit = world.damage_character(2, Vec2::ZERO, 3, Some(0), KillWeapon::Weapon(WeaponSlot::Gun));
        assert_eq!(hit, Some(DamageResult::Damage));
        assert_eq!(world.character(2).unwrap().health(), 7);
    }

    #[test]
    fn explicit_spawn_refuses_living_characters() {
        let mut world = world();
        assert!(!world.spawn_character_at(0, Vec2::new(100.0, 100.0)));
        world.add_player(0, "alice", true);
        assert!(world.spawn_character_at(0, Vec2::new(100.0, 100.0)));
        assert_eq!(world.character(0).unwrap().pos(), Vec2::new(100.0, 100.0));
        assert!(!world.spawn_character_at(0, Vec2::new(200.0, 100.0)));
    }

    #[test]
    fn weapon_index_outside_range_selects_nothing() {
        let mut world = world();
        world.add_player(0, "alice", true);
        world.tick();

        world.with_character(0, |chr, world| chr.select_weapon_index(world, WeaponSlot::Hammer.index() as i32));
        assert_eq!(world.character(0).unwrap().active_weapon(), Some(WeaponSlot::Hammer));

        world.with_character(0, |chr, world| chr.select_weapon_index(world, 99));
        assert_eq!(world.character(0).unwrap().active_weapon(), None);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut world = world();
        assert!(!world.add_player(MAX_CLIENTS, "nope", false));
        assert!(world.character(MAX_CLIENTS).is_none());
        assert!(world.with_character(MAX_CLIENTS, |_, _| ()).is_none());
    }

    #[test]
    fn network_clipping() {
        let mut world = world();
        world.add_player(0, "alice", true);
        world.player_mut(0).unwrap().view_pos = Vec2::ZERO;
        assert!(!world.network_clipped(0, Vec2::new(500.0, 500.0)));
        assert!(world.network_clipped(0, Vec2::new(1001.0, 0.0)));
        assert!(world.network_clipped(0, Vec2::new(0.0, 801.0)));
        assert!(world.network_clipped(0, Vec2::new(790.0, 790.0)));
    }
}
