//! Game tunables, injected into the simulation as an immutable snapshot

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::game::collision::NUM_COLOR_FREEZE;
use crate::game::weapon::{NinjaSpec, WeaponSlot, WeaponSpec, NUM_WEAPONS};

/// Server switches and per-slot tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Weapons deal damage at all
    pub damage: bool,
    pub team_damage: bool,
    pub unlimited_ammo: bool,
    /// Allow firing the ninja dash
    pub ninja: bool,
    /// Spectators following someone don't see their vitals
    pub strict_spectate: bool,
    /// Unarmed characters show the knife instead of the gun
    pub nowep_knife: bool,
    /// Score granted to logged-in players on race finish
    pub race_finish_reward: i32,
    /// Body colour per colour-freeze tile
    pub freeze_colors: [i32; NUM_COLOR_FREEZE as usize],
    pub block: BlockWindows,
    pub projectiles: ProjectileTuning,
    pub physics: PhysicsTuning,
    pub weapons: [WeaponSpec; NUM_WEAPONS],
    pub ninja_spec: NinjaSpec,
}

impl GameConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn weapon(&self, slot: WeaponSlot) -> &WeaponSpec {
        &self.weapons[slot.index()]
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            damage: true,
            team_damage: false,
            unlimited_ammo: false,
            ninja: true,
            strict_spectate: false,
            nowep_knife: false,
            race_finish_reward: 10,
            freeze_colors: [
                0x00ff00, 0x0000ff, 0xff0000, 0xffff00, 0xff00ff, 0x00ffff, 0xffffff, 0x808080,
                0x000000,
            ],
            block: BlockWindows::default(),
            projectiles: ProjectileTuning::default(),
            physics: PhysicsTuning::default(),
            weapons: WeaponSpec::default_table(),
            ninja_spec: NinjaSpec::default(),
        }
    }
}

/// Block state machine windows, all in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockWindows {
    /// SELFFREEZED to BLOCKED
    pub self_blocked: i64,
    /// INTERACTED to FREE
    pub int_free: i64,
    /// FROZEN to BLOCKED
    pub frozen_blocked: i64,
    /// FROZEN back to INTERACTED after the last freeze
    pub frozen_int: i64,
    /// BLOCKED to FREE after the last freeze
    pub blocked_free: i64,
    /// A freeze counts as chat block if the player chatted for this long
    pub chat_block_delay: i64,
    /// Interaction window for melee hits, -1 disables
    pub dmg_int_mask: i64,
    /// Interaction window for hooks, -1 disables
    pub hook_int_mask: i64,
    /// The blocked player must have acted this recently to leave BLOCKED
    pub active_window: i64,
}

impl Default for BlockWindows {
    fn default() -> Self {
        Self {
            self_blocked: 5000,
            int_free: 5000,
            frozen_blocked: 3000,
            frozen_int: 1000,
            blocked_free: 1000,
            chat_block_delay: 3000,
            dmg_int_mask: 500,
            hook_int_mask: 1000,
            active_window: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileTuning {
    /// Lifetimes are in seconds
    pub gun_lifetime: f32,
    pub gun_speed: f32,
    pub gun_curvature: f32,
    pub shotgun_lifetime: f32,
    pub shotgun_speed: f32,
    pub shotgun_curvature: f32,
    /// Slowest fan pellet speed as a fraction of full speed
    pub shotgun_speeddiff: f32,
    pub grenade_lifetime: f32,
    pub grenade_speed: f32,
    pub grenade_curvature: f32,
    pub laser_reach: f32,
}

impl Default for ProjectileTuning {
    fn default() -> Self {
        Self {
            gun_lifetime: 2.0,
            gun_speed: 2200.0,
            gun_curvature: 1.25,
            shotgun_lifetime: 0.20,
            shotgun_speed: 2750.0,
            shotgun_curvature: 1.25,
            shotgun_speeddiff: 0.8,
            grenade_lifetime: 2.0,
            grenade_speed: 1000.0,
            grenade_curvature: 7.0,
            laser_reach: 800.0,
        }
    }
}

/// Movement constants, velocities are in units per tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsTuning {
    pub ground_control_speed: f32,
    pub ground_control_accel: f32,
    pub ground_friction: f32,
    pub ground_jump_impulse: f32,
    pub air_jump_impulse: f32,
    pub air_control_speed: f32,
    pub air_control_accel: f32,
    pub air_friction: f32,
    pub hook_length: f32,
    pub hook_fire_speed: f32,
    pub hook_drag_accel: f32,
    pub hook_drag_speed: f32,
    pub gravity: f32,
    /// Hook hold limit in seconds before it lets go of a player
    pub hook_duration: f32,
    pub player_collision: bool,
    pub player_hooking: bool,
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        Self {
            ground_control_speed: 10.0,
            ground_control_accel: 100.0 / 50.0,
            ground_friction: 0.5,
            ground_jump_impulse: 13.2,
            air_jump_impulse: 12.0,
            air_control_speed: 250.0 / 50.0,
            air_control_accel: 1.5,
            air_friction: 0.95,
            hook_length: 380.0,
            hook_fire_speed: 80.0,
            hook_drag_accel: 3.0,
            hook_drag_speed: 15.0,
            gravity: 0.5,
            hook_duration: 1.25,
            player_collision: true,
            player_hooking: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = GameConfig::from_json(r#"{ "damage": false, "block": { "int_free": 2000 } }"#)
            .unwrap();
        assert!(!cfg.damage);
        assert_eq!(cfg.block.int_free, 2000);
        assert_eq!(cfg.block.frozen_blocked, 3000);
        assert_eq!(cfg.weapon(WeaponSlot::Gun).fire_delay, 125);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            GameConfig::from_json("{ damage: "),
            Err(ConfigError::Parse(_))
        ));
    }
}
