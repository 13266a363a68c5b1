//! Game mode rules consumed by the character simulation

use tracing::debug;

use crate::game::character::Character;
use crate::game::player::{Player, Team};
use crate::game::weapon::{KillWeapon, WeaponSlot};
use crate::game::ClientId;

/// Kill message tag for deaths in freeze (a block kill)
pub const SPECIAL_BLOCK_KILL: i32 = 1;

pub trait GameController: Send {
    /// Equip a freshly spawned character
    fn on_character_spawn(&mut self, chr: &mut Character);

    /// Resolve death semantics, returns the kill message tag
    fn on_character_death(
        &mut self,
        victim: &Character,
        killer: Option<&mut Player>,
        weapon: KillWeapon,
    ) -> i32;

    fn is_friendly_fire(&self, players: &[Option<Player>], a: ClientId, b: ClientId) -> bool;

    fn team_name(&self, team: Team) -> &'static str;
}

/// Block mode: free-for-all by default, scoring comes from block attribution
#[derive(Debug, Clone, Default)]
pub struct BlockController {
    pub teams: bool,
}

impl GameController for BlockController {
    fn on_character_spawn(&mut self, chr: &mut Character) {
        chr.increase_health(10);
        chr.give_weapon(WeaponSlot::Hammer, -1);
        chr.give_weapon(WeaponSlot::Gun, 10);
    }

    fn on_character_death(
        &mut self,
        victim: &Character,
        killer: Option<&mut Player>,
        weapon: KillWeapon,
    ) -> i32 {
        let frozen = victim.core().frozen > 0;
        if let Some(killer) = killer {
            if killer.client_id != victim.client_id() && weapon != KillWeapon::Game {
                killer.score.score += 1;
            }
        }
        debug!(
            victim = victim.client_id(),
            frozen,
            weapon = weapon.net_id(),
            "character death resolved"
        );
        if frozen {
            SPECIAL_BLOCK_KILL
        } else {
            0
        }
    }

    fn is_friendly_fire(&self, players: &[Option<Player>], a: ClientId, b: ClientId) -> bool {
        if a == b || !self.teams {
            return false;
        }
        let team = |id: ClientId| players.get(id).and_then(|p| p.as_ref()).map(|p| p.team);
        match (team(a), team(b)) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        }
    }

    fn team_name(&self, team: Team) -> &'static str {
        match (self.teams, team) {
            (_, Team::Spectators) => "spectators",
            (false, _) => "game",
            (true, Team::Red) => "red team",
            (true, Team::Blue) => "blue team",
        }
    }
}
