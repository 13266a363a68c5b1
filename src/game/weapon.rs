//! Weapon slots, per-slot stats and the character's weapon bank

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::game::ClientId;
use crate::util::time::Tick;

pub const NUM_WEAPONS: usize = 6;

/// Ammo regen never credits past this, whatever the slot maximum
pub const AMMO_REGEN_CAP: i32 = 10;

/// Maximum number of distinct targets one melee swing or ninja dash can hit
pub const MAX_HITS_PER_SWING: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponSlot {
    Hammer,
    Gun,
    Shotgun,
    Grenade,
    Rifle,
    Ninja,
}

impl WeaponSlot {
    pub const ALL: [WeaponSlot; NUM_WEAPONS] = [
        WeaponSlot::Hammer,
        WeaponSlot::Gun,
        WeaponSlot::Shotgun,
        WeaponSlot::Grenade,
        WeaponSlot::Rifle,
        WeaponSlot::Ninja,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Network/selection index to slot, `None` for anything out of range
    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn kind(self) -> WeaponKind {
        match self {
            WeaponSlot::Hammer => WeaponKind::Melee,
            WeaponSlot::Gun => WeaponKind::Projectile,
            WeaponSlot::Shotgun => WeaponKind::Spread,
            WeaponSlot::Grenade => WeaponKind::ExplosiveArc,
            WeaponSlot::Rifle => WeaponKind::Beam,
            WeaponSlot::Ninja => WeaponKind::MeleeSpecial,
        }
    }
}

/// How a weapon fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponKind {
    Melee,
    Projectile,
    Spread,
    ExplosiveArc,
    Beam,
    MeleeSpecial,
}

impl WeaponKind {
    /// Full-auto weapons keep firing while the button is held
    pub fn is_full_auto(self) -> bool {
        matches!(
            self,
            WeaponKind::Spread | WeaponKind::ExplosiveArc | WeaponKind::Beam
        )
    }
}

/// What killed a character, as reported in kill messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillWeapon {
    Weapon(WeaponSlot),
    /// Map hazard or leaving the game layer
    World,
    /// Team change, disconnect and other game-initiated deaths
    Game,
}

impl KillWeapon {
    pub fn net_id(self) -> i32 {
        match self {
            KillWeapon::Weapon(slot) => slot.index() as i32,
            KillWeapon::World => -1,
            KillWeapon::Game => -3,
        }
    }
}

impl From<WeaponSlot> for KillWeapon {
    fn from(slot: WeaponSlot) -> Self {
        KillWeapon::Weapon(slot)
    }
}

/// Static stats of one weapon slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponSpec {
    /// Delay between shots in milliseconds
    pub fire_delay: i64,
    pub max_ammo: i32,
    /// Milliseconds per regenerated ammo unit, 0 disables regen
    pub ammo_regen_time: i64,
    pub damage: i32,
}

impl WeaponSpec {
    pub fn for_slot(slot: WeaponSlot) -> Self {
        match slot {
            WeaponSlot::Hammer => Self {
                fire_delay: 125,
                max_ammo: 10,
                ammo_regen_time: 0,
                damage: 3,
            },
            WeaponSlot::Gun => Self {
                fire_delay: 125,
                max_ammo: 10,
                ammo_regen_time: 500,
                damage: 1,
            },
            WeaponSlot::Shotgun => Self {
                fire_delay: 500,
                max_ammo: 10,
                ammo_regen_time: 0,
                damage: 1,
            },
            WeaponSlot::Grenade => Self {
                fire_delay: 500,
                max_ammo: 10,
                ammo_regen_time: 0,
                damage: 6,
            },
            WeaponSlot::Rifle => Self {
                fire_delay: 800,
                max_ammo: 10,
                ammo_regen_time: 0,
                damage: 5,
            },
            WeaponSlot::Ninja => Self {
                fire_delay: 800,
                max_ammo: 10,
                ammo_regen_time: 0,
                damage: 9,
            },
        }
    }

    pub fn default_table() -> [WeaponSpec; NUM_WEAPONS] {
        WeaponSlot::ALL.map(Self::for_slot)
    }
}

impl Default for WeaponSpec {
    fn default() -> Self {
        Self::for_slot(WeaponSlot::Hammer)
    }
}

/// Ninja power-up tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NinjaSpec {
    /// How long the power-up lasts, in milliseconds
    pub duration: i64,
    /// Dash duration in milliseconds
    pub movetime: i64,
    /// Dash speed in units per tick
    pub velocity: f32,
}

impl Default for NinjaSpec {
    fn default() -> Self {
        Self {
            duration: 15000,
            movetime: 200,
            velocity: 50.0,
        }
    }
}

/// Ownership and ammo of one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaponState {
    pub got: bool,
    /// -1 means infinite
    pub ammo: i32,
    pub ammo_regen_start: Option<Tick>,
}

#[derive(Debug, Clone, Default)]
pub struct WeaponBank {
    slots: [WeaponState; NUM_WEAPONS],
}

impl WeaponBank {
    pub fn get(&self, slot: WeaponSlot) -> &WeaponState {
        &self.slots[slot.index()]
    }

    pub fn get_mut(&mut self, slot: WeaponSlot) -> &mut WeaponState {
        &mut self.slots[slot.index()]
    }

    pub fn owns(&self, slot: WeaponSlot) -> bool {
        self.get(slot).got
    }

    /// Lowest owned slot
    pub fn first_owned(&self) -> Option<WeaponSlot> {
        WeaponSlot::ALL.into_iter().find(|&slot| self.owns(slot))
    }

    /// Step `steps` owned slots forward (positive) or backward (negative) from `from`,
    /// wrapping around the slot count. `from` may be -1 for "no weapon".
    pub fn cycle(&self, from: i32, steps: i32) -> i32 {
        let n = NUM_WEAPONS as i32;
        let dir = steps.signum();
        let mut left = steps.abs();
        let mut wanted = if from < 0 && dir < 0 { n } else { from };

        if left == 0 || self.first_owned().is_none() {
            return from;
        }

        while left > 0 {
            wanted = (wanted + dir).rem_euclid(n);
            if self.slots[wanted as usize].got {
                left -= 1;
            }
        }

        wanted
    }
}

/// Targets already hit during the current swing or dash
#[derive(Debug, Clone, Default)]
pub struct HitSet {
    hits: Vec<ClientId>,
}

impl HitSet {
    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.hits.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.hits.len() >= MAX_HITS_PER_SWING
    }

    /// Record a hit, returns false if already hit or the set is full
    pub fn insert(&mut self, id: ClientId) -> bool {
        if self.is_full() || self.contains(id) {
            return false;
        }
        self.hits.push(id);
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct NinjaState {
    pub activation_tick: Tick,
    pub activation_dir: Vec2,
    /// Remaining dash ticks, counts below zero once the dash ended
    pub current_move_time: i64,
    pub old_velocity_amount: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_index_round_trip_and_bounds() {
        for slot in WeaponSlot::ALL {
            assert_eq!(WeaponSlot::from_index(slot.index() as i32), Some(slot));
        }
        assert_eq!(WeaponSlot::from_index(-1), None);
        assert_eq!(WeaponSlot::from_index(NUM_WEAPONS as i32), None);
    }

    #[test]
    fn full_auto_kinds() {
        assert!(!WeaponSlot::Hammer.kind().is_full_auto());
        assert!(!WeaponSlot::Gun.kind().is_full_auto());
        assert!(WeaponSlot::Shotgun.kind().is_full_auto());
        assert!(WeaponSlot::Grenade.kind().is_full_auto());
        assert!(WeaponSlot::Rifle.kind().is_full_auto());
        assert!(!WeaponSlot::Ninja.kind().is_full_auto());
    }

    #[test]
    fn cycle_skips_unowned_and_wraps() {
        let mut bank = WeaponBank::default();
        bank.get_mut(WeaponSlot::Hammer).got = true;
        bank.get_mut(WeaponSlot::Gun).got = true;
        bank.get_mut(WeaponSlot::Rifle).got = true;

        assert_eq!(bank.cycle(1, 1), WeaponSlot::Rifle.index() as i32);
        assert_eq!(bank.cycle(4, 1), WeaponSlot::Hammer.index() as i32);
        assert_eq!(bank.cycle(0, -1), WeaponSlot::Rifle.index() as i32);
        assert_eq!(bank.cycle(0, 3), 0);
        assert_eq!(bank.cycle(2, 0), 2);
        assert_eq!(bank.cycle(-1, 1), 0);
        assert_eq!(bank.cycle(-1, -1), WeaponSlot::Rifle.index() as i32);
    }

    #[test]
    fn hit_set_caps_and_dedups() {
        let mut hits = HitSet::default();
        assert!(hits.insert(3));
        assert!(!hits.insert(3));
        for id in 10..(10 + MAX_HITS_PER_SWING) {
            hits.insert(id);
        }
        assert!(hits.is_full());
        assert!(!hits.insert(99));
        assert!(!hits.contains(99));
        hits.clear();
        assert!(hits.insert(99));
    }

    #[test]
    fn kill_weapon_ids() {
        assert_eq!(KillWeapon::World.net_id(), -1);
        assert_eq!(KillWeapon::from(WeaponSlot::Rifle).net_id(), 4);
    }
}
