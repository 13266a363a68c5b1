//! The simulated character: input, weapons, damage, block state and snapshots

use std::sync::Arc;

use glam::Vec2;
use tracing::{debug, info};

use crate::config::{GameConfig, MAX_CLIENTS};
use crate::game::collision::Tile;
use crate::game::entities::{Projectile, ProjectileSpawn};
use crate::game::events::{cmask_all_except_one, cmask_one, Sound, CMASK_ALL};
use crate::game::input::{count_input, PlayerInput, INPUT_STATE_MASK, PLAYERFLAG_CHATTING};
use crate::game::physics::{
    closest_point_on_line, CharacterCore, CoreContext, COREEVENT_GROUND_JUMP, COREEVENT_HOOK_ATTACH_GROUND,
    COREEVENT_HOOK_ATTACH_PLAYER, COREEVENT_HOOK_HIT_NOHOOK, PHYS_SIZE,
};
use crate::game::snapshot::{CharacterSnap, Emote, Layout, SnapItem};
use crate::game::spatial::{EntityKey, EntityKind};
use crate::game::state_machine::{BlockState, BlockTracker, ResolveInput};
use crate::game::weapon::{
    HitSet, KillWeapon, NinjaState, WeaponBank, WeaponKind, WeaponSlot, WeaponState,
    AMMO_REGEN_CAP, NUM_WEAPONS,
};
use crate::game::world::GameWorld;
use crate::game::world_core::WorldCore;
use crate::game::ClientId;
use crate::net::protocol::{ProjectileRecord, ServerMsg, CHAT_ALL};
use crate::util::time::{GameTime, Tick};

pub const MAX_HEALTH: i32 = 10;
pub const MAX_ARMOR: i32 = 10;

/// Shortest reload after clicking an empty weapon, in milliseconds
const EMPTY_CLICK_RELOAD_MS: i64 = 125;

/// Damage indicators within this many ticks fan out instead of stacking
const DAMAGE_INDICATOR_BURST_TICKS: Tick = 25;

const PAIN_EMOTE_MS: i64 = 500;

/// Shotgun fan angles, centre pellet at index 2
const SHOTGUN_SPREAD: [f32; 5] = [-0.185, -0.070, 0.0, 0.070, 0.185];

/// Blink period and length, in ticks
const BLINK_PERIOD: Tick = 250;
const BLINK_TICKS: Tick = 5;

/// Outcome of applying damage to a character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageResult {
    /// Knockback only: damage disabled, friendly fire or already dead
    None,
    Damage,
    Death,
}

#[derive(Debug, Clone)]
pub struct Character {
    client_id: ClientId,
    config: Arc<GameConfig>,
    alive: bool,

    health: i32,
    armor: i32,

    weapons: WeaponBank,
    active_weapon: Option<WeaponSlot>,
    last_weapon: Option<WeaponSlot>,
    queued_weapon: Option<WeaponSlot>,
    ninja: NinjaState,
    /// Targets hit by the current hammer swing or ninja dash
    hits: HitSet,

    reload_timer: i64,
    attack_tick: Tick,
    damage_taken: i32,
    damage_taken_tick: Tick,
    /// Last tick the input changed
    last_action: Option<Tick>,

    emote: Emote,
    emote_stop: Option<Tick>,
    default_emote: Emote,
    default_emote_reset: Option<Tick>,

    pos: Vec2,
    core: CharacterCore,
    reckoning_core: CharacterCore,
    send_core: CharacterCore,
    reckoning_tick: Tick,

    block: BlockTracker,
    race_start: Option<Tick>,

    input: PlayerInput,
    prev_input: PlayerInput,
    latest_input: PlayerInput,
    latest_prev_input: PlayerInput,
    num_inputs: i32,
}

impl Character {
    pub fn new(client_id: ClientId, pos: Vec2, config: Arc<GameConfig>, tick: Tick) -> Self {
        Self {
            client_id,
            config,
            alive: false,
            health: 0,
            armor: 0,
            weapons: WeaponBank::default(),
            active_weapon: Some(WeaponSlot::Gun),
            last_weapon: Some(WeaponSlot::Hammer),
            queued_weapon: None,
            ninja: NinjaState::default(),
            hits: HitSet::default(),
            reload_timer: 0,
            attack_tick: 0,
            damage_taken: 0,
            damage_taken_tick: 0,
            last_action: None,
            emote: Emote::Normal,
            emote_stop: None,
            default_emote: Emote::Normal,
            default_emote_reset: None,
            pos,
            core: CharacterCore::default(),
            reckoning_core: CharacterCore::default(),
            send_core: CharacterCore::default(),
            reckoning_tick: 0,
            block: BlockTracker::new(tick),
            race_start: None,
            input: PlayerInput::default(),
            prev_input: PlayerInput::default(),
            latest_input: PlayerInput::default(),
            latest_prev_input: PlayerInput::default(),
            num_inputs: 0,
        }
    }

    /// Put a fresh character into the world at `pos`
    pub fn spawn(world: &mut GameWorld, client_id: ClientId, pos: Vec2) -> Self {
        let tick = world.time.tick;
        let mut chr = Self::new(client_id, pos, world.config.clone(), tick);

        if let Some(player) = world.player_mut(client_id) {
            player.override_colors(-1);
        }

        chr.core.reset();
        chr.core.pos = pos;
        world.core.insert(client_id, pos, Vec2::ZERO);
        world
            .index
            .insert(EntityKey::character(client_id), pos, PHYS_SIZE);
        chr.alive = true;

        world.controller.on_character_spawn(&mut chr);

        info!(client_id, x = pos.x, y = pos.y, "character spawned");
        chr
    }

    /// Remove from the actor table and the index without a kill message
    pub fn reset(&mut self, world: &mut GameWorld) {
        world.core.remove(self.client_id);
        world.index.remove(EntityKey::character(self.client_id));
        self.alive = false;
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn armor(&self) -> i32 {
        self.armor
    }

    pub fn pos(&self) -> Vec2 {
        self.pos
    }

    pub fn core(&self) -> &CharacterCore {
        &self.core
    }

    pub fn active_weapon(&self) -> Option<WeaponSlot> {
        self.active_weapon
    }

    pub fn last_weapon(&self) -> Option<WeaponSlot> {
        self.last_weapon
    }

    pub fn queued_weapon(&self) -> Option<WeaponSlot> {
        self.queued_weapon
    }

    pub fn weapon(&self, slot: WeaponSlot) -> &WeaponState {
        self.weapons.get(slot)
    }

    pub fn reload_timer(&self) -> i64 {
        self.reload_timer
    }

    pub fn attack_tick(&self) -> Tick {
        self.attack_tick
    }

    pub fn ninja(&self) -> &NinjaState {
        &self.ninja
    }

    pub fn block_state(&self) -> BlockState {
        self.block.state
    }

    pub fn block(&self) -> &BlockTracker {
        &self.block
    }

    pub fn reckoning_tick(&self) -> Tick {
        self.reckoning_tick
    }

    pub fn input(&self) -> &PlayerInput {
        &self.input
    }

    // ---- weapons ----

    pub fn set_weapon(&mut self, world: &mut GameWorld, slot: Option<WeaponSlot>) {
        if slot == self.active_weapon {
            return;
        }

        self.last_weapon = self.active_weapon;
        self.queued_weapon = None;
        self.active_weapon = slot;
        world.create_sound_global(self.pos, Sound::WeaponSwitch);
    }

    /// Select by raw index; anything outside the slot range selects no weapon
    pub fn select_weapon_index(&mut self, world: &mut GameWorld, index: i32) {
        self.set_weapon(world, WeaponSlot::from_index(index));
    }

    /// Grant a weapon. Ammo is capped at the slot maximum; -1 means infinite.
    pub fn give_weapon(&mut self, slot: WeaponSlot, ammo: i32) -> bool {
        let max_ammo = self.config.weapon(slot).max_ammo;
        let state = self.weapons.get_mut(slot);
        if state.ammo < max_ammo || !state.got {
            state.got = true;
            state.ammo = max_ammo.min(ammo);
            return true;
        }
        false
    }

    pub fn take_weapon(&mut self, world: &mut GameWorld, slot: WeaponSlot) {
        self.weapons.get_mut(slot).got = false;
        if self.active_weapon != Some(slot) {
            return;
        }

        let next = match self.last_weapon {
            Some(last) if last != slot && self.weapons.owns(last) => Some(last),
            _ => self.weapons.first_owned(),
        };
        self.set_weapon(world, next);
    }

    pub fn give_ninja(&mut self, world: &mut GameWorld, silent: bool) {
        self.ninja.activation_tick = world.time.tick;
        let ninja = self.weapons.get_mut(WeaponSlot::Ninja);
        ninja.got = true;
        ninja.ammo = -1;
        if self.active_weapon != Some(WeaponSlot::Ninja) {
            self.last_weapon = self.active_weapon;
        }
        self.active_weapon = Some(WeaponSlot::Ninja);

        if !silent {
            world.create_sound_global(self.pos, Sound::PickupNinja);
        }
    }

    pub fn take_ninja(&mut self) {
        if self.active_weapon != Some(WeaponSlot::Ninja) {
            return;
        }

        self.weapons.get_mut(WeaponSlot::Ninja).got = false;
        self.active_weapon = match self.last_weapon {
            Some(WeaponSlot::Ninja) => Some(WeaponSlot::Hammer),
            last => last,
        };
    }

    fn handle_ninja(&mut self, world: &mut GameWorld) {
        if self.active_weapon != Some(WeaponSlot::Ninja) {
            return;
        }

        let spec = self.config.ninja_spec;
        if world.time.tick - self.ninja.activation_tick > world.time.ticks(spec.duration) {
            self.take_ninja();
            return;
        }

        self.set_weapon(world, Some(WeaponSlot::Ninja));

        self.ninja.current_move_time -= 1;

        if self.ninja.current_move_time == 0 {
            self.core.vel = self.ninja.activation_dir * self.ninja.old_velocity_amount;
        }

        if self.ninja.current_move_time > 0 {
            self.core.vel = self.ninja.activation_dir * spec.velocity;
            let old_pos = self.core.pos;
            let mut pos = self.core.pos;
            let mut vel = self.core.vel;
            world
                .collision
                .move_box(&mut pos, &mut vel, Vec2::splat(PHYS_SIZE), 0.0);
            self.core.pos = pos;

            // zero it so remote prediction doesn't extrapolate the dash
            self.core.vel = Vec2::ZERO;

            self.ninja_sweep(world, old_pos, pos);
        }
    }

    /// Damage everyone along the dash capsule once per dash
    fn ninja_sweep(&mut self, world: &mut GameWorld, from: Vec2, to: Vec2) {
        let radius = PHYS_SIZE * 2.0;
        let center = from + (to - from) * 0.5;
        let near = world
            .index
            .find_near(center, radius, EntityKind::Character, MAX_CLIENTS);
        let damage = self.config.weapon(WeaponSlot::Ninja).damage;

        for id in near {
            if id == self.client_id || self.hits.contains(id) {
                continue;
            }
            let Some(target_pos) = world.index.position(EntityKey::character(id)) else {
                continue;
            };
            let closest = closest_point_on_line(from, to, target_pos);
            if target_pos.distance(closest) > radius {
                continue;
            }

            world.create_sound_global(target_pos, Sound::NinjaHit);
            self.hits.insert(id);
            world.damage_character(
                id,
                Vec2::new(0.0, 10.0),
                damage,
                Some(self.client_id),
                KillWeapon::Weapon(WeaponSlot::Ninja),
            );
        }
    }

    pub fn do_weapon_switch(&mut self, world: &mut GameWorld) {
        if self.reload_timer != 0 || self.weapons.owns(WeaponSlot::Ninja) {
            return;
        }
        let Some(queued) = self.queued_weapon else {
            return;
        };
        self.set_weapon(world, Some(queued));
    }

    pub fn handle_weapon_switch(&mut self, world: &mut GameWorld) {
        if self.weapons.first_owned().is_none() {
            return;
        }

        let mut wanted = self
            .queued_weapon
            .or(self.active_weapon)
            .map_or(-1, |slot| slot.index() as i32);

        let next = count_input(
            self.latest_prev_input.next_weapon,
            self.latest_input.next_weapon,
        )
        .presses;
        let prev = count_input(
            self.latest_prev_input.prev_weapon,
            self.latest_input.prev_weapon,
        )
        .presses;

        if next < 128 {
            wanted = self.weapons.cycle(wanted, next);
        }
        if prev < 128 {
            wanted = self.weapons.cycle(wanted, -prev);
        }

        if self.latest_input.wanted_weapon != 0 {
            wanted = self.input.wanted_weapon - 1;
        }

        if let Some(slot) = WeaponSlot::from_index(wanted) {
            if Some(slot) != self.active_weapon && self.weapons.owns(slot) {
                self.queued_weapon = Some(slot);
            }
        }

        self.do_weapon_switch(world);
    }

    pub fn fire_weapon(&mut self, world: &mut GameWorld) {
        if self.reload_timer != 0 || self.active_weapon.is_none() {
            return;
        }

        self.do_weapon_switch(world);
        let Some(weapon) = self.active_weapon else {
            return;
        };

        let direction = self.latest_input.aim_direction();
        let ammo = self.weapons.get(weapon).ammo;

        let mut will_fire =
            count_input(self.latest_prev_input.fire, self.latest_input.fire).presses > 0;
        if weapon.kind().is_full_auto() && self.latest_input.fire_held() && ammo != 0 {
            will_fire = true;
        }
        if !self.config.ninja && weapon == WeaponSlot::Ninja {
            will_fire = false;
        }
        if !will_fire {
            return;
        }

        if ammo == 0 {
            self.reload_timer = world.time.ticks(EMPTY_CLICK_RELOAD_MS);
            world.create_sound_global(self.pos, Sound::WeaponNoAmmo);
            return;
        }

        let start = self.pos + direction * PHYS_SIZE * 0.75;

        match weapon.kind() {
            WeaponKind::Melee => self.fire_hammer(world, start),
            WeaponKind::Projectile => {
                let tuning = self.config.projectiles;
                let record = self.launch(
                    world,
                    WeaponSlot::Gun,
                    start,
                    direction,
                    tuning.gun_lifetime,
                );
                world.send_to(
                    self.client_id,
                    ServerMsg::ExtraProjectile {
                        projectiles: vec![record],
                    },
                );
                world.create_sound_global(self.pos, Sound::GunFire);
            }
            WeaponKind::Spread => {
                let tuning = self.config.projectiles;
                let base = direction.y.atan2(direction.x);
                let mut records = Vec::with_capacity(SHOTGUN_SPREAD.len());

                for (i, spread) in SHOTGUN_SPREAD.iter().enumerate() {
                    let offset = i as i32 - 2;
                    let a = base + spread;
                    let v = 1.0 - offset.abs() as f32 / 2.0;
                    let speed = tuning.shotgun_speeddiff + (1.0 - tuning.shotgun_speeddiff) * v;
                    let dir = Vec2::new(a.cos(), a.sin()) * speed;
                    records.push(self.launch(
                        world,
                        WeaponSlot::Shotgun,
                        start,
                        dir,
                        tuning.shotgun_lifetime,
                    ));
                }

                world.send_to(
                    self.client_id,
                    ServerMsg::ExtraProjectile {
                        projectiles: records,
                    },
                );
                world.create_sound_global(self.pos, Sound::ShotgunFire);
            }
            WeaponKind::ExplosiveArc => {
                let tuning = self.config.projectiles;
                let record = self.launch(
                    world,
                    WeaponSlot::Grenade,
                    start,
                    direction,
                    tuning.grenade_lifetime,
                );
                world.send_to(
                    self.client_id,
                    ServerMsg::ExtraProjectile {
                        projectiles: vec![record],
                    },
                );
                world.create_sound_global(self.pos, Sound::GrenadeFire);
            }
            WeaponKind::Beam => {
                let reach = self.config.projectiles.laser_reach;
                world.fire_laser(self.pos, direction, reach, self.client_id);
                world.create_sound_global(self.pos, Sound::RifleFire);
            }
            WeaponKind::MeleeSpecial => {
                self.hits.clear();
                self.ninja.activation_dir = direction;
                self.ninja.current_move_time = world.time.ticks(self.config.ninja_spec.movetime);
                self.ninja.old_velocity_amount = self.core.vel.length();
                world.create_sound_global(self.pos, Sound::NinjaFire);
            }
        }

        self.attack_tick = world.time.tick;

        let state = self.weapons.get_mut(weapon);
        if !self.config.unlimited_ammo && state.ammo > 0 {
            state.ammo -= 1;
        }

        if self.reload_timer == 0 {
            self.reload_timer = world.time.ticks(self.config.weapon(weapon).fire_delay);
        }
    }

    fn fire_hammer(&mut self, world: &mut GameWorld, start: Vec2) {
        self.hits.clear();
        world.create_sound_global(self.pos, Sound::HammerFire);

        let damage = self.config.weapon(WeaponSlot::Hammer).damage;
        let window = self.config.block.dmg_int_mask;
        let near = world
            .index
            .find_near(start, PHYS_SIZE * 0.5, EntityKind::Character, MAX_CLIENTS);
        let mut hit_count = 0;

        for id in near {
            if id == self.client_id {
                continue;
            }
            let Some(target_pos) = world.index.position(EntityKey::character(id)) else {
                continue;
            };

            let effect_pos = match (target_pos - start).try_normalize() {
                Some(dir) => target_pos - dir * PHYS_SIZE * 0.5,
                None => start,
            };
            world.create_hammer_hit(effect_pos);

            let dir = (target_pos - self.pos)
                .try_normalize()
                .unwrap_or(Vec2::new(0.0, -1.0));
            let force = Vec2::new(0.0, -1.0) + (dir + Vec2::new(0.0, -1.1)).normalize() * 10.0;

            world.damage_character(
                id,
                force,
                damage,
                Some(self.client_id),
                KillWeapon::Weapon(WeaponSlot::Hammer),
            );

            let on_freeze = world.collision.tile_at(target_pos).is_freeze();
            let attacker = self.client_id;
            world.with_character(id, |target, world| {
                if !on_freeze {
                    target.core.frozen = 0;
                }
                target.interaction(attacker, window, &world.time);
            });
            hit_count += 1;
        }

        if hit_count > 0 {
            self.reload_timer = world.time.tick_speed / 3;
        }
    }

    /// Spawn one projectile and return its prediction record
    fn launch(
        &self,
        world: &mut GameWorld,
        weapon: WeaponSlot,
        pos: Vec2,
        dir: Vec2,
        lifetime: f32,
    ) -> ProjectileRecord {
        let explosive = weapon == WeaponSlot::Grenade;
        let projectile = Projectile::new(
            ProjectileSpawn {
                weapon,
                owner: self.client_id,
                pos,
                dir,
                lifespan: world.time.ticks_f32(lifetime),
                damage: self.config.weapon(weapon).damage,
                explosive,
                force: 0.0,
                impact_sound: explosive.then_some(Sound::GrenadeExplode),
            },
            world.time.tick,
        );
        let record = projectile.fill_info();
        world.spawn_projectile(projectile);
        record
    }

    pub fn handle_weapons(&mut self, world: &mut GameWorld) {
        if self.active_weapon.is_none() {
            return;
        }

        self.handle_ninja(world);

        if self.reload_timer > 0 {
            self.reload_timer -= 1;
            return;
        }

        self.fire_weapon(world);

        let Some(slot) = self.active_weapon else {
            return;
        };
        let spec = *self.config.weapon(slot);
        if spec.ammo_regen_time <= 0 {
            return;
        }

        let tick = world.time.tick;
        let regen_ticks = world.time.ticks(spec.ammo_regen_time);
        let cap = AMMO_REGEN_CAP.min(spec.max_ammo);
        let state = self.weapons.get_mut(slot);

        if self.reload_timer <= 0 {
            let start = *state.ammo_regen_start.get_or_insert(tick);
            if tick - start >= regen_ticks {
                if state.ammo >= 0 {
                    state.ammo = (state.ammo + 1).min(cap);
                }
                state.ammo_regen_start = None;
            }
        } else {
            state.ammo_regen_start = None;
        }
    }

    // ---- input ----

    pub fn on_predicted_input(&mut self, input: &PlayerInput, tick: Tick) {
        if *input != self.input {
            self.last_action = Some(tick);
        }

        self.input = *input;
        self.num_inputs += 1;

        // aiming at the exact centre has no direction
        if self.input.target_x == 0 && self.input.target_y == 0 {
            self.input.target_y = -1;
        }
    }

    pub fn on_direct_input(&mut self, world: &mut GameWorld, input: &PlayerInput) {
        self.latest_prev_input = self.latest_input;
        self.latest_input = *input;

        let spectating = world
            .player(self.client_id)
            .map_or(true, |player| player.is_spectator());
        if self.num_inputs > 2 && !spectating {
            self.handle_weapon_switch(world);
            self.fire_weapon(world);
        }

        self.latest_prev_input = self.latest_input;
    }

    pub fn reset_input(&mut self) {
        self.input.direction = 0;
        self.input.hook = 0;
        // simulate releasing the fire button
        if self.input.fire & 1 != 0 {
            self.input.fire += 1;
        }
        self.input.fire &= INPUT_STATE_MASK;
        self.input.jump = 0;
        self.latest_input = self.input;
        self.latest_prev_input = self.input;
    }

    // ---- ticking ----

    pub fn tick(&mut self, world: &mut GameWorld) {
        let id = self.client_id;
        let tick = world.time.tick;
        let tick_speed = world.time.tick_speed;

        let balanced_team = world
            .player_mut(id)
            .filter(|player| player.force_balanced)
            .map(|player| {
                player.force_balanced = false;
                player.team
            });
        if let Some(team) = balanced_team {
            let text = format!(
                "You were moved to {} due to team balancing",
                world.controller.team_name(team)
            );
            world.send_broadcast(&text, Some(id));
        }

        self.core.input = self.input;
        {
            let mut ctx = CoreContext {
                world: &mut world.core,
                collision: &world.collision,
                tuning: &self.config.physics,
                tick_speed,
                self_id: Some(id),
            };
            self.core.tick(true, &mut ctx);
        }

        if self.core.frozen > 0 {
            if self.active_weapon != Some(WeaponSlot::Ninja) {
                self.give_ninja(world, true);
            } else if self.ninja.activation_tick + 5 * tick_speed < tick {
                self.ninja.activation_tick = tick;
            }

            let remaining = i64::from(self.core.frozen) + 1;
            if remaining % tick_speed == 0 {
                world.create_damage_indicator(self.pos, 0.0, (remaining / tick_speed) as i32);
            }
            self.block.frozen(tick);
        } else {
            if self.active_weapon == Some(WeaponSlot::Ninja) {
                self.take_ninja();
            }
            self.block.unfrozen();
        }

        if let Some(hooked) = self.core.hooked_player {
            world.with_character(hooked, |other, world| {
                other.interaction(id, 0, &world.time);
            });
            self.interaction(hooked, self.config.block.hook_int_mask, &world.time);
        }

        let (chatting, last_action_tick) = world
            .player(id)
            .map_or((false, tick), |player| {
                let chatting = player.player_flags & PLAYERFLAG_CHATTING != 0;
                (chatting, player.last_action_tick)
            });
        let resolve = ResolveInput {
            core_frozen: self.core.frozen,
            chatting,
            last_action_tick,
        };
        if let Some(event) = self.block.resolve(&resolve, &self.config.block, &world.time) {
            world.credit_block(id, self.pos, event);
        }

        self.armor = self.core.heat;

        let tile = world.collision.tile_at(self.pos);
        if tile == Tile::Death || world.collision.game_layer_clipped(self.pos) {
            self.die(world, Some(id), KillWeapon::World);
            return;
        }
        match tile {
            Tile::ColorFreeze(index) => {
                let color = self.config.freeze_colors[usize::from(index)];
                if let Some(player) = world.player_mut(id) {
                    player.override_colors(color);
                }
            }
            Tile::RaceBegin => self.race_start = Some(tick),
            Tile::RaceEnd => {
                if let Some(start) = self.race_start.take() {
                    self.finish_race(world, start);
                }
            }
            _ => {}
        }

        self.handle_weapons(world);

        if let Some(reset) = self.default_emote_reset {
            if reset <= tick {
                self.default_emote_reset = None;
                self.default_emote = Emote::Normal;
                self.emote = Emote::Normal;
                self.emote_stop = None;
            }
        }

        self.prev_input = self.input;
    }

    fn finish_race(&mut self, world: &mut GameWorld, start: Tick) {
        let seconds = world.time.seconds_since(start);
        let reward = self.config.race_finish_reward;
        let Some(player) = world.player_mut(self.client_id) else {
            return;
        };

        let text = if reward > 0 && player.logged_in {
            format!(
                "{} finished in {:.2} seconds and gained {:.2} score",
                player.name,
                seconds,
                f64::from(reward)
            )
        } else {
            format!("{} finished in {:.2} seconds", player.name, seconds)
        };
        if player.logged_in {
            player.score.score += reward;
        }

        info!(client_id = self.client_id, seconds, "race finished");
        world.send_chat(-1, CHAT_ALL, &text);
    }

    /// Movement pass after every character ticked
    pub fn tick_deferred(&mut self, world: &mut GameWorld) {
        let id = self.client_id;
        let tick = world.time.tick;
        let tick_speed = world.time.tick_speed;

        {
            let mut empty = WorldCore::default();
            let mut ctx = CoreContext {
                world: &mut empty,
                collision: &world.collision,
                tuning: &self.config.physics,
                tick_speed,
                self_id: None,
            };
            self.reckoning_core.tick(false, &mut ctx);
            self.reckoning_core.move_step(&world.collision);
            self.reckoning_core.quantize();
        }

        let start_pos = self.core.pos;
        let start_vel = self.core.vel;
        let size = Vec2::splat(PHYS_SIZE);
        let stuck_before = world.collision.test_box(self.core.pos, size);

        self.core.vel += world.core.take_impulse(id);
        self.core.move_step(&world.collision);
        let stuck_after_move = world.collision.test_box(self.core.pos, size);
        self.core.quantize();
        let stuck_after_quant = world.collision.test_box(self.core.pos, size);
        self.pos = self.core.pos;

        if !stuck_before && (stuck_after_move || stuck_after_quant) {
            debug!(
                client_id = id,
                stuck_after_move,
                stuck_after_quant,
                start_x = start_pos.x,
                start_y = start_pos.y,
                vel_x = start_vel.x,
                vel_y = start_vel.y,
                bits = %format!(
                    "{:x} {:x} {:x} {:x}",
                    start_pos.x.to_bits(),
                    start_pos.y.to_bits(),
                    start_vel.x.to_bits(),
                    start_vel.y.to_bits()
                ),
                "character stuck after move"
            );
        }

        world.core.update(id, self.core.pos, self.core.vel);
        world.index.update(EntityKey::character(id), self.pos);

        let events = self.core.triggered_events;
        let mask = cmask_all_except_one(id);
        if events & COREEVENT_GROUND_JUMP != 0 {
            world.create_sound(self.pos, Sound::PlayerJump, mask);
        }
        if events & COREEVENT_HOOK_ATTACH_PLAYER != 0 {
            world.create_sound(self.pos, Sound::HookAttachPlayer, CMASK_ALL);
        }
        if events & COREEVENT_HOOK_ATTACH_GROUND != 0 {
            world.create_sound(self.pos, Sound::HookAttachGround, mask);
        }
        if events & COREEVENT_HOOK_HIT_NOHOOK != 0 {
            world.create_sound(self.pos, Sound::HookNoAttach, mask);
        }

        let (spectating, legacy) = world
            .player(id)
            .map_or((false, false), |p| (p.is_spectator(), !p.custom_client));
        if spectating {
            self.pos = self.input.target();
        }

        let predicted = self.reckoning_core.write(false);
        let current = self.core.write(false);
        if self.reckoning_tick + tick_speed * 3 < tick
            || predicted != current
            || (legacy && self.core.frozen > 0)
        {
            self.reckoning_tick = tick;
            self.send_core = self.core.clone();
            self.reckoning_core = self.core.clone();
        }
    }

    // ---- vitals ----

    pub fn increase_health(&mut self, amount: i32) -> bool {
        if self.health >= MAX_HEALTH {
            return false;
        }
        self.health = (self.health + amount).clamp(0, MAX_HEALTH);
        true
    }

    pub fn increase_armor(&mut self, amount: i32) -> bool {
        if self.armor >= MAX_ARMOR {
            return false;
        }
        self.armor = (self.armor + amount).clamp(0, MAX_ARMOR);
        self.core.heat = self.armor;
        true
    }

    /// Apply knockback and damage. Knockback always lands, even when nothing else does.
    pub fn take_damage(
        &mut self,
        world: &mut GameWorld,
        force: Vec2,
        damage: i32,
        from: Option<ClientId>,
        weapon: KillWeapon,
    ) -> DamageResult {
        if !self.alive {
            return DamageResult::None;
        }

        self.core.vel += force;

        let id = self.client_id;
        let friendly = from
            .is_some_and(|from| world.controller.is_friendly_fire(&world.players, id, from));
        if !self.config.damage || (friendly && !self.config.team_damage) {
            return DamageResult::None;
        }

        let mut damage = damage;
        if from == Some(id) {
            damage = (damage / 2).max(1);
        }

        let tick = world.time.tick;
        self.damage_taken += 1;
        if tick < self.damage_taken_tick + DAMAGE_INDICATOR_BURST_TICKS {
            world.create_damage_indicator(self.pos, self.damage_taken as f32 * 0.25, damage);
        } else {
            self.damage_taken = 0;
            world.create_damage_indicator(self.pos, 0.0, damage);
        }

        if damage != 0 {
            self.health -= damage;
        }
        self.damage_taken_tick = tick;

        if let Some(attacker) = from.filter(|&from| from != id) {
            if let Some(view_pos) = world.player(attacker).map(|p| p.view_pos) {
                let mut mask = cmask_one(attacker);
                for player in world.players.iter().flatten() {
                    if player.is_spectator() && player.spectator_id == Some(attacker) {
                        mask |= cmask_one(player.client_id);
                    }
                }
                world.create_sound(view_pos, Sound::Hit, mask);
            }
        }

        if self.health <= 0 {
            self.die(world, from, weapon);
            return DamageResult::Death;
        }

        let pain = if damage > 2 {
            Sound::PlayerPainLong
        } else {
            Sound::PlayerPainShort
        };
        world.create_sound_global(self.pos, pain);

        self.set_emote(Emote::Pain, tick + world.time.ticks(PAIN_EMOTE_MS));
        DamageResult::Damage
    }

    pub fn die(&mut self, world: &mut GameWorld, killer: Option<ClientId>, weapon: KillWeapon) {
        let id = self.client_id;
        let tick = world.time.tick;
        let half_second = world.time.tick_speed / 2;

        if let Some(player) = world.player_mut(id) {
            player.respawn_tick = tick + half_second;
        }

        let killer_player = match killer {
            Some(k) => world.players.get_mut(k).and_then(Option::as_mut),
            None => None,
        };
        let special = world
            .controller
            .on_character_death(self, killer_player, weapon);

        let killer_id = killer.map_or(-1, |k| k as i32);
        debug!(
            killer = killer_id,
            killer_name = %world.client_name(killer),
            victim = id,
            victim_name = %world.client_name(Some(id)),
            weapon = weapon.net_id(),
            special,
            "kill"
        );

        world.send_to_all(
            ServerMsg::KillMsg {
                killer: killer_id,
                victim: id as i32,
                weapon: weapon.net_id(),
                mode_special: special,
            },
            None,
        );

        world.create_sound_global(self.pos, Sound::PlayerDie);

        if let Some(player) = world.player_mut(id) {
            player.die_tick = tick;
        }

        self.alive = false;
        world.index.remove(EntityKey::character(id));
        world.core.remove(id);
        world.create_death(self.pos, id);
    }

    // ---- block attribution ----

    pub fn interaction(&mut self, with: ClientId, window_ms: i64, time: &GameTime) {
        self.block.interaction(with, window_ms, time);
    }

    /// Freeze the physics core for `ticks`
    pub fn freeze(&mut self, ticks: i32) {
        self.core.frozen = ticks;
    }

    // ---- emotes ----

    pub fn set_emote(&mut self, emote: Emote, stop_tick: Tick) {
        self.emote = emote;
        self.emote_stop = Some(stop_tick);
    }

    pub fn set_default_emote(&mut self, emote: Emote, reset_tick: Option<Tick>) {
        self.default_emote = emote;
        self.default_emote_reset = reset_tick;
    }

    /// Taunt after a kill
    pub fn taunt(&mut self, time: &GameTime) {
        self.set_emote(Emote::Happy, time.tick + time.tick_speed);
    }

    /// Emote shown at `tick`, the default once a temporary one expired
    pub fn visible_emote(&self, tick: Tick) -> Emote {
        match self.emote_stop {
            Some(stop) if stop >= tick => self.emote,
            _ => self.default_emote,
        }
    }

    // ---- snapshots ----

    /// Project this character for one observer. `None` observer means an
    /// unrestricted view (demo recorder, tests).
    pub fn snap(&self, world: &GameWorld, observer: Option<ClientId>) -> Option<SnapItem> {
        let observer_player = observer.and_then(|o| world.player(o));
        let id = match observer_player {
            Some(player) => player.id_map.translate(self.client_id)?,
            None => i32::try_from(self.client_id).ok()?,
        };

        if let Some(o) = observer {
            if world.network_clipped(o, self.pos) {
                return None;
            }
        }

        let layout =
            observer_player.map_or(Layout::Extended, |p| Layout::for_client(p.custom_client));
        let legacy = layout == Layout::Legacy;
        let tick = world.time.tick;

        let (snap_tick, mut core) = if self.reckoning_tick == 0 || world.paused {
            (0, self.core.write(legacy))
        } else {
            (self.reckoning_tick, self.send_core.write(legacy))
        };

        if core.hooked_player != -1 {
            if let Some(player) = observer_player {
                core.hooked_player = usize::try_from(core.hooked_player)
                    .ok()
                    .and_then(|hooked| player.id_map.translate(hooked))
                    .unwrap_or(-1);
            }
        }
        core.direction = self.input.direction;

        let mut emote = self.visible_emote(tick);
        let since_action = tick - self.last_action.unwrap_or(-1);
        if emote == Emote::Normal
            && BLINK_PERIOD - since_action.rem_euclid(BLINK_PERIOD) < BLINK_TICKS
        {
            emote = Emote::Blink;
        }

        let weapon = match self.active_weapon {
            Some(slot) => slot.index() as i32,
            None if self.config.nowep_knife => NUM_WEAPONS as i32,
            None => WeaponSlot::Gun.index() as i32,
        };

        let sees_vitals = match observer_player {
            None => true,
            Some(player) => {
                player.client_id == self.client_id
                    || (!self.config.strict_spectate && player.spectator_id == Some(self.client_id))
            }
        };

        let (health, armor, ammo_count) = if sees_vitals {
            let ammo = self
                .active_weapon
                .map_or(0, |slot| self.weapons.get(slot).ammo.max(0));
            (self.health, self.armor, ammo)
        } else {
            (0, 0, 0)
        };

        let player_flags = world.player(self.client_id).map_or(0, |p| p.player_flags);

        Some(SnapItem {
            id,
            layout,
            snap: CharacterSnap {
                tick: snap_tick as i32,
                core,
                player_flags,
                health,
                armor,
                ammo_count,
                weapon,
                emote: emote.net_id(),
                attack_tick: self.attack_tick as i32,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collision::{Collision, DEFAULT_ARENA};

    fn character() -> Character {
        Character::new(0, Vec2::ZERO, Arc::new(GameConfig::default()), 0)
    }

    fn world() -> GameWorld {
        let collision = Collision::from_ascii(DEFAULT_ARENA).unwrap();
        GameWorld::new(
            Arc::new(GameConfig::default()),
            Arc::new(collision),
            50,
            3,
            MAX_CLIENTS,
        )
    }

    fn emote_seen(world: &GameWorld) -> i32 {
        world.character(0).unwrap().snap(world, None).unwrap().snap.emote
    }

    #[test]
    fn vitals_clamp_and_refuse_at_max() {
        let mut chr = character();
        assert!(chr.increase_health(25));
        assert_eq!(chr.health(), MAX_HEALTH);
        assert!(!chr.increase_health(1));
        assert_eq!(chr.health(), MAX_HEALTH);

        assert!(chr.increase_armor(4));
        assert_eq!(chr.armor(), 4);
        assert_eq!(chr.core().heat, 4);
        assert!(chr.increase_armor(40));
        assert_eq!(chr.armor(), MAX_ARMOR);
        assert!(!chr.increase_armor(1));
    }

    #[test]
    fn give_weapon_caps_ammo() {
        let mut chr = character();
        assert!(chr.give_weapon(WeaponSlot::Shotgun, 99));
        assert_eq!(chr.weapon(WeaponSlot::Shotgun).ammo, 10);
        assert!(!chr.give_weapon(WeaponSlot::Shotgun, 5));
        assert_eq!(chr.weapon(WeaponSlot::Shotgun).ammo, 10);

        assert!(chr.give_weapon(WeaponSlot::Hammer, -1));
        assert_eq!(chr.weapon(WeaponSlot::Hammer).ammo, -1);
    }

    #[test]
    fn take_ninja_never_reselects_ninja() {
        let mut chr = character();
        chr.active_weapon = Some(WeaponSlot::Ninja);
        chr.last_weapon = Some(WeaponSlot::Ninja);
        chr.weapons.get_mut(WeaponSlot::Ninja).got = true;

        chr.take_ninja();
        assert_eq!(chr.active_weapon(), Some(WeaponSlot::Hammer));
        assert!(!chr.weapon(WeaponSlot::Ninja).got);

        // no-op when ninja isn't active
        chr.take_ninja();
        assert_eq!(chr.active_weapon(), Some(WeaponSlot::Hammer));
    }

    #[test]
    fn emote_falls_back_to_default() {
        let mut chr = character();
        chr.set_default_emote(Emote::Angry, None);
        chr.set_emote(Emote::Pain, 10);
        assert_eq!(chr.visible_emote(10), Emote::Pain);
        assert_eq!(chr.visible_emote(11), Emote::Angry);
    }

    #[test]
    fn centre_aim_points_up() {
        let mut chr = character();
        chr.on_predicted_input(&PlayerInput::default(), 5);
        assert_eq!(chr.input().target_y, -1);
        assert_eq!(chr.last_action, None);

        let moved = PlayerInput {
            direction: 1,
            ..PlayerInput::default()
        };
        chr.on_predicted_input(&moved, 6);
        assert_eq!(chr.last_action, Some(6));
    }

    #[test]
    fn reset_input_releases_fire() {
        let mut chr = character();
        chr.input.fire = 63;
        chr.input.direction = -1;
        chr.input.jump = 1;
        chr.reset_input();
        assert_eq!(chr.input().fire, 0);
        assert_eq!(chr.input().direction, 0);
        assert_eq!(chr.input().jump, 0);
    }

    #[test]
    fn snapshot_sends_live_core_until_reckoned_and_while_paused() {
        let mut world = world();
        world.add_player(0, "alice", true);
        assert!(world.spawn_character_at(0, Collision::tile_center(5, 2)));

        let chr = world.character(0).unwrap();
        let item = chr.snap(&world, None).unwrap();
        assert_eq!(item.snap.tick, 0);
        assert_eq!(item.snap.core.x, chr.core().write(false).x);
        assert_eq!(item.snap.core.y, chr.core().write(false).y);

        world.tick();
        let chr = world.character(0).unwrap();
        assert!(chr.reckoning_tick() > 0);
        let item = chr.snap(&world, None).unwrap();
        assert_eq!(i64::from(item.snap.tick), chr.reckoning_tick());

        world.set_paused(true);
        let chr = world.character(0).unwrap();
        let item = chr.snap(&world, None).unwrap();
        assert_eq!(item.snap.tick, 0);
        assert_eq!(item.snap.core.y, chr.core().write(false).y);
    }

    #[test]
    fn hooked_player_is_translated_per_observer() {
        let mut world = world();
        world.add_player(0, "subject", true);
        world.add_player(1, "legacy", false);
        world.add_player(2, "extended", true);
        assert!(world.spawn_character_at(0, Collision::tile_center(5, 2)));
        let pos = world.character(0).unwrap().pos();
        world
            .player_mut(1)
            .unwrap()
            .id_map
            .rebuild(Vec2::ZERO, [(0, pos), (1, Vec2::ZERO)]);

        let hooked_as_seen_by = |world: &GameWorld, observer: Option<ClientId>| {
            let item = world.character(0).unwrap().snap(world, observer).unwrap();
            (item.id, item.snap.core.hooked_player)
        };

        // hooking someone the legacy observer has no slot for
        world.with_character(0, |chr, _| chr.core.hooked_player = Some(40));
        assert_eq!(hooked_as_seen_by(&world, Some(1)), (1, -1));
        assert_eq!(hooked_as_seen_by(&world, Some(2)), (0, 40));
        assert_eq!(hooked_as_seen_by(&world, None), (0, 40));

        // hooking the legacy observer itself lands in its own slot
        world.with_character(0, |chr, _| chr.core.hooked_player = Some(1));
        assert_eq!(hooked_as_seen_by(&world, Some(1)), (1, 0));

        world.with_character(0, |chr, _| chr.core.hooked_player = None);
        assert_eq!(hooked_as_seen_by(&world, Some(1)), (1, -1));
    }

    #[test]
    fn blink_overlays_only_the_normal_emote() {
        let mut world = world();
        world.add_player(0, "alice", true);
        assert!(world.spawn_character_at(0, Collision::tile_center(5, 2)));
        world.time.tick = 1000;

        world.with_character(0, |chr, _| chr.last_action = Some(1000 - 247));
        assert_eq!(emote_seen(&world), Emote::Blink.net_id());

        world.with_character(0, |chr, _| chr.last_action = Some(1000 - 100));
        assert_eq!(emote_seen(&world), Emote::Normal.net_id());

        world.with_character(0, |chr, _| {
            chr.last_action = Some(1000 - 247);
            chr.set_emote(Emote::Pain, 1010);
        });
        assert_eq!(emote_seen(&world), Emote::Pain.net_id());
    }
}
