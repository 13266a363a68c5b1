//! Projectiles and lasers spawned by weapons

use glam::Vec2;

use crate::config::ProjectileTuning;
use crate::game::events::Sound;
use crate::game::weapon::{KillWeapon, WeaponSlot};
use crate::game::world::GameWorld;
use crate::game::ClientId;
use crate::net::protocol::ProjectileRecord;
use crate::util::time::Tick;

/// Extra hit radius of a projectile on top of the character body
const PROJECTILE_RADIUS: f32 = 6.0;

/// Everything needed to launch a projectile
#[derive(Debug, Clone, Copy)]
pub struct ProjectileSpawn {
    pub weapon: WeaponSlot,
    pub owner: ClientId,
    pub pos: Vec2,
    pub dir: Vec2,
    pub lifespan: i32,
    pub damage: i32,
    pub explosive: bool,
    pub force: f32,
    pub impact_sound: Option<Sound>,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub weapon: WeaponSlot,
    pub owner: ClientId,
    pub pos: Vec2,
    pub dir: Vec2,
    /// Remaining ticks, the projectile dies once it goes negative
    pub lifespan: i32,
    pub damage: i32,
    pub explosive: bool,
    pub force: f32,
    pub impact_sound: Option<Sound>,
    pub start_tick: Tick,
}

impl Projectile {
    pub fn new(spawn: ProjectileSpawn, start_tick: Tick) -> Self {
        Self {
            weapon: spawn.weapon,
            owner: spawn.owner,
            pos: spawn.pos,
            dir: spawn.dir,
            lifespan: spawn.lifespan,
            damage: spawn.damage,
            explosive: spawn.explosive,
            force: spawn.force,
            impact_sound: spawn.impact_sound,
            start_tick,
        }
    }

    fn curve(&self, tuning: &ProjectileTuning) -> (f32, f32) {
        match self.weapon {
            WeaponSlot::Shotgun => (tuning.shotgun_curvature, tuning.shotgun_speed),
            WeaponSlot::Grenade => (tuning.grenade_curvature, tuning.grenade_speed),
            _ => (tuning.gun_curvature, tuning.gun_speed),
        }
    }

    /// Position `time` seconds after launch
    pub fn position_at(&self, time: f32, tuning: &ProjectileTuning) -> Vec2 {
        let (curvature, speed) = self.curve(tuning);
        let t = time * speed;
        Vec2::new(
            self.pos.x + self.dir.x * t,
            self.pos.y + self.dir.y * t + curvature / 10000.0 * (t * t),
        )
    }

    pub fn fill_info(&self) -> ProjectileRecord {
        ProjectileRecord {
            x: self.pos.x as i32,
            y: self.pos.y as i32,
            vel_x: (self.dir.x * 100.0) as i32,
            vel_y: (self.dir.y * 100.0) as i32,
            kind: self.weapon.index() as i32,
            start_tick: self.start_tick as i32,
        }
    }

    /// Advance one tick, returns false once the projectile is gone
    pub fn tick(&mut self, world: &mut GameWorld) -> bool {
        let tuning = world.config.projectiles;
        let tick_speed = world.time.tick_speed as f32;
        let age = (world.time.tick - self.start_tick) as f32;
        let prev = self.position_at((age - 1.0) / tick_speed, &tuning);
        let mut cur = self.position_at(age / tick_speed, &tuning);

        let wall = world.collision.intersect_line(prev, cur);
        if let Some(hit) = wall {
            cur = hit.pos;
        }
        let target = world.intersect_character(prev, cur, PROJECTILE_RADIUS, Some(self.owner));

        self.lifespan -= 1;

        let expired = self.lifespan < 0 || world.collision.game_layer_clipped(cur);
        if target.is_none() && wall.is_none() && !expired {
            return true;
        }

        if self.lifespan >= 0 || self.weapon == WeaponSlot::Grenade {
            if let Some(sound) = self.impact_sound {
                world.create_sound_global(cur, sound);
            }
        }

        if self.explosive {
            world.create_explosion(cur, self.owner, self.weapon, false);
        } else if let Some((id, _)) = target {
            let force = self.dir * self.force.max(0.001);
            world.damage_character(id, force, self.damage, Some(self.owner), KillWeapon::Weapon(self.weapon));
        }

        false
    }
}

/// An instant-hit beam, kept around for one tick so it is visible to snapshots
#[derive(Debug, Clone)]
pub struct Laser {
    pub owner: ClientId,
    pub from: Vec2,
    pub to: Vec2,
    pub hit: Option<ClientId>,
    pub start_tick: Tick,
}

impl Laser {
    /// Trace the beam and damage the first character on it
    pub fn fire(world: &mut GameWorld, from: Vec2, dir: Vec2, reach: f32, owner: ClientId) -> Self {
        let mut to = from + dir * reach;
        if let Some(hit) = world.collision.intersect_line(from, to) {
            to = hit.before;
            world.create_sound_global(to, Sound::RifleBounce);
        }

        let hit = world
            .intersect_character(from, to, 0.0, Some(owner))
            .map(|(id, at)| {
                to = at;
                id
            });

        if let Some(id) = hit {
            let damage = world.config.weapon(WeaponSlot::Rifle).damage;
            world.damage_character(id, Vec2::ZERO, damage, Some(owner), KillWeapon::Weapon(WeaponSlot::Rifle));
        }

        Self {
            owner,
            from,
            to,
            hit,
            start_tick: world.time.tick,
        }
    }

    pub fn is_expired(&self, tick: Tick) -> bool {
        tick > self.start_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gun_shot() -> Projectile {
        Projectile::new(
            ProjectileSpawn {
                weapon: WeaponSlot::Gun,
                owner: 0,
                pos: Vec2::new(100.0, 100.0),
                dir: Vec2::new(1.0, 0.0),
                lifespan: 100,
                damage: 1,
                explosive: false,
                force: 0.0,
                impact_sound: None,
            },
            10,
        )
    }

    #[test]
    fn curve_drops_over_time() {
        let proj = gun_shot();
        let tuning = ProjectileTuning::default();
        assert_eq!(proj.position_at(0.0, &tuning), Vec2::new(100.0, 100.0));
        let later = proj.position_at(0.1, &tuning);
        assert!(later.x > 100.0);
        assert!(later.y > 100.0);
    }

    #[test]
    fn fill_info_scales_direction() {
        let info = gun_shot().fill_info();
        assert_eq!(
            info,
            ProjectileRecord {
                x: 100,
                y: 100,
                vel_x: 100,
                vel_y: 0,
                kind: 1,
                start_tick: 10,
            }
        );
    }
}
