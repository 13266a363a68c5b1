//! One-shot world events (sounds, effects) emitted during a tick

use glam::Vec2;

use crate::game::ClientId;

/// Bit per client id that should receive an event
pub type ClientMask = u64;

pub const CMASK_ALL: ClientMask = u64::MAX;

pub fn cmask_one(id: ClientId) -> ClientMask {
    1u64.checked_shl(id as u32).unwrap_or(0)
}

pub fn cmask_all_except_one(id: ClientId) -> ClientMask {
    CMASK_ALL ^ cmask_one(id)
}

pub fn cmask_contains(mask: ClientMask, id: ClientId) -> bool {
    mask & cmask_one(id) != 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    WeaponSwitch,
    WeaponNoAmmo,
    HammerFire,
    GunFire,
    ShotgunFire,
    GrenadeFire,
    GrenadeExplode,
    RifleFire,
    RifleBounce,
    NinjaFire,
    NinjaHit,
    PickupNinja,
    PlayerPainShort,
    PlayerPainLong,
    PlayerDie,
    /// Hit confirmation, heard by the attacker
    Hit,
    PlayerJump,
    HookAttachPlayer,
    HookAttachGround,
    HookNoAttach,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    Sound {
        pos: Vec2,
        sound: Sound,
        mask: ClientMask,
    },
    DamageIndicator {
        pos: Vec2,
        angle: f32,
        amount: i32,
    },
    HammerHit {
        pos: Vec2,
    },
    Death {
        pos: Vec2,
        client_id: ClientId,
    },
    Explosion {
        pos: Vec2,
        owner: ClientId,
    },
    FloatingText {
        pos: Vec2,
        text: String,
    },
}

impl WorldEvent {
    /// Whether `client_id` receives this event
    pub fn visible_to(&self, client_id: ClientId) -> bool {
        match self {
            WorldEvent::Sound { mask, .. } => cmask_contains(*mask, client_id),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        assert_eq!(cmask_one(3), 0b1000);
        assert!(!cmask_contains(cmask_all_except_one(3), 3));
        assert!(cmask_contains(cmask_all_except_one(3), 4));
        assert_eq!(cmask_one(64), 0);
    }
}
