//! Character physics core: movement, jumping, hook and freeze countdown

use glam::Vec2;

use crate::config::PhysicsTuning;
use crate::game::collision::{Collision, Tile};
use crate::game::input::PlayerInput;
use crate::game::world_core::WorldCore;
use crate::game::ClientId;

/// Character hitbox edge length
pub const PHYS_SIZE: f32 = 28.0;

/// Freeze applied by freeze tiles, in seconds
pub const FREEZE_SECONDS: i64 = 3;

pub const COREEVENT_GROUND_JUMP: u32 = 0x01;
pub const COREEVENT_AIR_JUMP: u32 = 0x02;
pub const COREEVENT_HOOK_LAUNCH: u32 = 0x04;
pub const COREEVENT_HOOK_ATTACH_PLAYER: u32 = 0x08;
pub const COREEVENT_HOOK_ATTACH_GROUND: u32 = 0x10;
pub const COREEVENT_HOOK_HIT_NOHOOK: u32 = 0x20;
pub const COREEVENT_HOOK_RETRACT: u32 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookState {
    Retracted,
    #[default]
    Idle,
    /// Three-tick retract animation, 1 to 3
    Retracting(u8),
    Flying,
    Grabbed,
}

impl HookState {
    pub fn net_id(self) -> i32 {
        match self {
            HookState::Retracted => -1,
            HookState::Idle => 0,
            HookState::Retracting(step) => i32::from(step.clamp(1, 3)),
            HookState::Flying => 4,
            HookState::Grabbed => 5,
        }
    }

    pub fn from_net(id: i32) -> Self {
        match id {
            -1 => HookState::Retracted,
            1..=3 => HookState::Retracting(id as u8),
            4 => HookState::Flying,
            5 => HookState::Grabbed,
            _ => HookState::Idle,
        }
    }
}

/// Quantized core state as it goes over the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreNet {
    pub x: i32,
    pub y: i32,
    /// Velocities are fixed point, 1/256 units
    pub vel_x: i32,
    pub vel_y: i32,
    pub angle: i32,
    pub direction: i32,
    pub jumped: i32,
    /// -1 when not hooking a player
    pub hooked_player: i32,
    pub hook_state: i32,
    pub hook_tick: i32,
    pub hook_x: i32,
    pub hook_y: i32,
    pub hook_dx: i32,
    pub hook_dy: i32,
    /// Remaining freeze ticks, only carried by the extended layout
    pub frozen: i32,
}

/// Everything a core tick reads besides its own state
pub struct CoreContext<'a> {
    pub world: &'a mut WorldCore,
    pub collision: &'a Collision,
    pub tuning: &'a PhysicsTuning,
    pub tick_speed: i64,
    /// Own actor id, `None` for detached cores that see no other actors
    pub self_id: Option<ClientId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterCore {
    pub pos: Vec2,
    pub vel: Vec2,
    pub hook_pos: Vec2,
    pub hook_dir: Vec2,
    pub hook_tick: i32,
    pub hook_state: HookState,
    pub hooked_player: Option<ClientId>,
    pub jumped: i32,
    pub direction: i32,
    pub angle: i32,
    /// Remaining freeze ticks
    pub frozen: i32,
    /// Mirrors the character's armor
    pub heat: i32,
    pub triggered_events: u32,
    pub input: PlayerInput,
}

impl CharacterCore {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_grounded(&self, collision: &Collision) -> bool {
        let half = PHYS_SIZE / 2.0;
        collision.check_point(self.pos + Vec2::new(half, half + 5.0))
            || collision.check_point(self.pos + Vec2::new(-half, half + 5.0))
    }

    pub fn tick(&mut self, use_input: bool, ctx: &mut CoreContext<'_>) {
        let tuning = ctx.tuning;
        self.triggered_events = 0;

        let mut use_input = use_input;
        if self.frozen > 0 {
            self.frozen -= 1;
            use_input = false;
        }
        match ctx.collision.tile_at(self.pos) {
            tile if tile.is_freeze() => {
                self.frozen = self.frozen.max((ctx.tick_speed * FREEZE_SECONDS) as i32);
                use_input = false;
            }
            Tile::Unfreeze => self.frozen = 0,
            _ => {}
        }

        let grounded = self.is_grounded(ctx.collision);
        let target_dir = self.input.aim_direction();

        self.vel.y += tuning.gravity;

        let (max_speed, accel, friction) = if grounded {
            (
                tuning.ground_control_speed,
                tuning.ground_control_accel,
                tuning.ground_friction,
            )
        } else {
            (
                tuning.air_control_speed,
                tuning.air_control_accel,
                tuning.air_friction,
            )
        };

        if use_input {
            self.direction = self.input.direction.signum();
            let target = self.input.target();
            self.angle = (target.y.atan2(target.x) * 256.0) as i32;

            if self.input.jump != 0 {
                if self.jumped & 1 == 0 {
                    if grounded {
                        self.triggered_events |= COREEVENT_GROUND_JUMP;
                        self.vel.y = -tuning.ground_jump_impulse;
                        self.jumped |= 1;
                    } else if self.jumped & 2 == 0 {
                        self.triggered_events |= COREEVENT_AIR_JUMP;
                        self.vel.y = -tuning.air_jump_impulse;
                        self.jumped |= 3;
                    }
                }
            } else {
                self.jumped &= !1;
            }

            if self.input.hook != 0 {
                if self.hook_state == HookState::Idle {
                    self.hook_state = HookState::Flying;
                    self.hook_pos = self.pos + target_dir * PHYS_SIZE * 1.5;
                    self.hook_dir = target_dir;
                    self.hooked_player = None;
                    self.hook_tick = 0;
                    self.triggered_events |= COREEVENT_HOOK_LAUNCH;
                }
            } else {
                self.hooked_player = None;
                self.hook_state = HookState::Idle;
                self.hook_pos = self.pos;
            }
        } else if self.frozen > 0 {
            self.direction = 0;
        }

        if grounded {
            self.jumped &= !2;
        }

        if self.direction < 0 {
            self.vel.x = saturated_add(-max_speed, max_speed, self.vel.x, -accel);
        } else if self.direction > 0 {
            self.vel.x = saturated_add(-max_speed, max_speed, self.vel.x, accel);
        } else {
            self.vel.x *= friction;
        }

        self.tick_hook(ctx);
        self.tick_actor_contacts(ctx);

        if self.vel.length() > 6000.0 {
            self.vel = self.vel.normalize() * 6000.0;
        }
    }

    fn tick_hook(&mut self, ctx: &mut CoreContext<'_>) {
        let tuning = ctx.tuning;

        match self.hook_state {
            HookState::Idle => {
                self.hooked_player = None;
                self.hook_pos = self.pos;
            }
            HookState::Retracting(step) if step < 3 => {
                self.hook_state = HookState::Retracting(step + 1);
            }
            HookState::Retracting(_) => {
                self.triggered_events |= COREEVENT_HOOK_RETRACT;
                self.hook_state = HookState::Retracted;
            }
            HookState::Retracted => {}
            HookState::Flying => {
                let mut new_pos = self.hook_pos + self.hook_dir * tuning.hook_fire_speed;
                if self.pos.distance(new_pos) > tuning.hook_length {
                    self.hook_state = HookState::Retracting(1);
                    new_pos = self.pos + (new_pos - self.pos).normalize_or_zero() * tuning.hook_length;
                }

                let mut hit_ground = false;
                let mut hit_nohook = false;
                if let Some(hit) = ctx.collision.intersect_line(self.hook_pos, new_pos) {
                    if hit.tile == Tile::NoHook {
                        hit_nohook = true;
                    } else {
                        hit_ground = true;
                    }
                    new_pos = hit.pos;
                }

                if tuning.player_hooking {
                    if let Some(self_id) = ctx.self_id {
                        let mut best: Option<(ClientId, f32)> = None;
                        for (id, actor) in ctx.world.iter() {
                            if id == self_id {
                                continue;
                            }
                            let closest = closest_point_on_line(self.hook_pos, new_pos, actor.pos);
                            let dist = actor.pos.distance(closest);
                            if dist < PHYS_SIZE + 2.0 && best.map_or(true, |(_, d)| dist < d) {
                                best = Some((id, dist));
                            }
                        }
                        if let Some((id, _)) = best {
                            self.triggered_events |= COREEVENT_HOOK_ATTACH_PLAYER;
                            self.hook_state = HookState::Grabbed;
                            self.hooked_player = Some(id);
                        }
                    }
                }

                if self.hook_state == HookState::Flying {
                    if hit_ground {
                        self.triggered_events |= COREEVENT_HOOK_ATTACH_GROUND;
                        self.hook_state = HookState::Grabbed;
                    } else if hit_nohook {
                        self.triggered_events |= COREEVENT_HOOK_HIT_NOHOOK;
                        self.hook_state = HookState::Retracting(1);
                    }
                    self.hook_pos = new_pos;
                }
            }
            HookState::Grabbed => {
                if let Some(id) = self.hooked_player {
                    match ctx.world.actor(id) {
                        Some(actor) => self.hook_pos = actor.pos,
                        None => self.release_hook(),
                    }
                }

                if self.hook_state == HookState::Grabbed
                    && self.hooked_player.is_none()
                    && self.hook_pos.distance(self.pos) > 46.0
                {
                    let mut hook_vel =
                        (self.hook_pos - self.pos).normalize_or_zero() * tuning.hook_drag_accel;
                    if hook_vel.y > 0.0 {
                        hook_vel.y *= 0.3;
                    }
                    if (hook_vel.x < 0.0 && self.direction < 0) || (hook_vel.x > 0.0 && self.direction > 0) {
                        hook_vel.x *= 0.95;
                    } else {
                        hook_vel.x *= 0.75;
                    }

                    let new_vel = self.vel + hook_vel;
                    if new_vel.length() < tuning.hook_drag_speed || new_vel.length() < self.vel.length() {
                        self.vel = new_vel;
                    }
                }

                if self.hook_state == HookState::Grabbed {
                    self.hook_tick += 1;
                    let limit = (ctx.tick_speed as f32 * tuning.hook_duration) as i32;
                    if self.hooked_player.is_some() && self.hook_tick > limit {
                        self.release_hook();
                    }
                }
            }
        }
    }

    fn release_hook(&mut self) {
        self.hooked_player = None;
        self.hook_state = HookState::Retracted;
        self.hook_pos = self.pos;
    }

    fn tick_actor_contacts(&mut self, ctx: &mut CoreContext<'_>) {
        let Some(self_id) = ctx.self_id else {
            return;
        };
        let tuning = ctx.tuning;

        let others: Vec<(ClientId, Vec2, Vec2)> = ctx
            .world
            .iter()
            .filter(|(id, _)| *id != self_id)
            .map(|(id, actor)| (id, actor.pos, actor.vel))
            .collect();

        for (id, pos, other_vel) in others {
            let distance = self.pos.distance(pos);
            let dir = (self.pos - pos).normalize_or_zero();

            if tuning.player_collision && distance < PHYS_SIZE * 1.25 && distance > 0.0 {
                let a = PHYS_SIZE * 1.45 - distance;
                let mut velocity = 0.5;
                if self.vel.length() > 0.0001 {
                    velocity = 1.0 - (self.vel.normalize().dot(dir) + 1.0) / 2.0;
                }
                self.vel += dir * a * (velocity * 0.75);
                self.vel *= 0.85;
            }

            if self.hooked_player == Some(id) && distance > PHYS_SIZE * 1.5 {
                let accel = tuning.hook_drag_accel * (distance / tuning.hook_length);
                let speed = tuning.hook_drag_speed;

                // the hooked actor is dragged towards us
                let pulled = Vec2::new(
                    saturated_add(-speed, speed, other_vel.x, accel * dir.x * 1.5),
                    saturated_add(-speed, speed, other_vel.y, accel * dir.y * 1.5),
                );
                ctx.world.push_impulse(id, pulled - other_vel);

                self.vel.x = saturated_add(-speed, speed, self.vel.x, -accel * dir.x * 0.25);
                self.vel.y = saturated_add(-speed, speed, self.vel.y, -accel * dir.y * 0.25);
            }
        }
    }

    /// Integrate velocity against the map
    pub fn move_step(&mut self, collision: &Collision) {
        let mut pos = self.pos;
        let mut vel = self.vel;
        collision.move_box(&mut pos, &mut vel, Vec2::splat(PHYS_SIZE), 0.0);
        self.pos = pos;
        self.vel = vel;
    }

    /// Round-trip through the wire representation so server and client agree
    pub fn quantize(&mut self) {
        let net = self.write(false);
        self.read(&net);
    }

    pub fn write(&self, legacy: bool) -> CoreNet {
        CoreNet {
            x: self.pos.x.round() as i32,
            y: self.pos.y.round() as i32,
            vel_x: (self.vel.x * 256.0).round() as i32,
            vel_y: (self.vel.y * 256.0).round() as i32,
            angle: self.angle,
            direction: self.direction,
            jumped: self.jumped,
            hooked_player: self.hooked_player.map_or(-1, |id| id as i32),
            hook_state: self.hook_state.net_id(),
            hook_tick: self.hook_tick,
            hook_x: self.hook_pos.x.round() as i32,
            hook_y: self.hook_pos.y.round() as i32,
            hook_dx: (self.hook_dir.x * 256.0).round() as i32,
            hook_dy: (self.hook_dir.y * 256.0).round() as i32,
            frozen: if legacy { 0 } else { self.frozen },
        }
    }

    pub fn read(&mut self, net: &CoreNet) {
        self.pos = Vec2::new(net.x as f32, net.y as f32);
        self.vel = Vec2::new(net.vel_x as f32 / 256.0, net.vel_y as f32 / 256.0);
        self.angle = net.angle;
        self.direction = net.direction;
        self.jumped = net.jumped;
        self.hooked_player = usize::try_from(net.hooked_player).ok();
        self.hook_state = HookState::from_net(net.hook_state);
        self.hook_tick = net.hook_tick;
        self.hook_pos = Vec2::new(net.hook_x as f32, net.hook_y as f32);
        self.hook_dir = Vec2::new(net.hook_dx as f32 / 256.0, net.hook_dy as f32 / 256.0);
        self.frozen = net.frozen;
    }
}

fn saturated_add(min: f32, max: f32, current: f32, modifier: f32) -> f32 {
    if modifier < 0.0 {
        if current < min {
            return current;
        }
        (current + modifier).max(min)
    } else {
        if current > max {
            return current;
        }
        (current + modifier).min(max)
    }
}

/// Closest point to `p` on the segment `a`..`b`
pub fn closest_point_on_line(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_map() -> Collision {
        Collision::from_ascii(
            "##########\n\
             #........#\n\
             #........#\n\
             #........#\n\
             ##########",
        )
        .unwrap()
    }

    fn tick_core(core: &mut CharacterCore, world: &mut WorldCore, map: &Collision, id: ClientId) {
        let tuning = PhysicsTuning::default();
        let mut ctx = CoreContext {
            world,
            collision: map,
            tuning: &tuning,
            tick_speed: 50,
            self_id: Some(id),
        };
        core.tick(true, &mut ctx);
        core.move_step(map);
        core.quantize();
        ctx.world.update(id, core.pos, core.vel);
    }

    #[test]
    fn falls_and_lands() {
        let map = floor_map();
        let mut world = WorldCore::default();
        let mut core = CharacterCore {
            pos: Vec2::new(80.0, 48.0),
            ..Default::default()
        };
        world.insert(0, core.pos, core.vel);

        for _ in 0..100 {
            tick_core(&mut core, &mut world, &map, 0);
        }
        assert!(core.is_grounded(&map));
        assert_eq!(core.vel.y, 0.0);
    }

    #[test]
    fn ground_jump_sets_event() {
        let map = floor_map();
        let mut world = WorldCore::default();
        let mut core = CharacterCore {
            pos: Vec2::new(80.0, 48.0),
            ..Default::default()
        };
        world.insert(0, core.pos, core.vel);
        for _ in 0..100 {
            tick_core(&mut core, &mut world, &map, 0);
        }

        core.input.jump = 1;
        tick_core(&mut core, &mut world, &map, 0);
        assert_ne!(core.triggered_events & COREEVENT_GROUND_JUMP, 0);
        assert!(core.vel.y < 0.0);
    }

    #[test]
    fn freeze_counts_down_and_blocks_input() {
        let map = floor_map();
        let mut world = WorldCore::default();
        let mut core = CharacterCore {
            pos: Vec2::new(80.0, 112.0),
            frozen: 2,
            ..Default::default()
        };
        core.input.direction = 1;
        world.insert(0, core.pos, core.vel);

        tick_core(&mut core, &mut world, &map, 0);
        assert_eq!(core.frozen, 1);
        assert_eq!(core.direction, 0);
        tick_core(&mut core, &mut world, &map, 0);
        tick_core(&mut core, &mut world, &map, 0);
        assert_eq!(core.frozen, 0);
        assert_eq!(core.direction, 1);
    }

    #[test]
    fn hook_grabs_nearby_actor() {
        let map = floor_map();
        let mut world = WorldCore::default();
        let mut core = CharacterCore {
            pos: Vec2::new(80.0, 112.0),
            ..Default::default()
        };
        world.insert(0, core.pos, core.vel);
        world.insert(1, Vec2::new(200.0, 112.0), Vec2::ZERO);

        core.input.hook = 1;
        core.input.target_x = 100;
        for _ in 0..3 {
            tick_core(&mut core, &mut world, &map, 0);
        }
        assert_eq!(core.hook_state, HookState::Grabbed);
        assert_eq!(core.hooked_player, Some(1));

        tick_core(&mut core, &mut world, &map, 0);
        let pulled = world.take_impulse(1);
        assert!(pulled.x < 0.0);
    }

    #[test]
    fn quantize_is_stable() {
        let mut core = CharacterCore {
            pos: Vec2::new(10.4, 20.6),
            vel: Vec2::new(1.0 / 3.0, -2.5),
            hooked_player: Some(3),
            hook_state: HookState::Retracting(2),
            frozen: 7,
            ..Default::default()
        };
        core.quantize();
        let once = core.clone();
        core.quantize();
        assert_eq!(core, once);
        assert_eq!(core.write(true).frozen, 0);
        assert_eq!(core.write(false).frozen, 7);
        assert_eq!(core.write(false).hooked_player, 3);
    }

    #[test]
    fn saturated_add_respects_bounds() {
        assert_eq!(saturated_add(-10.0, 10.0, 9.0, 2.0), 10.0);
        assert_eq!(saturated_add(-10.0, 10.0, 12.0, 2.0), 12.0);
        assert_eq!(saturated_add(-10.0, 10.0, -9.5, -2.0), -10.0);
    }
}
