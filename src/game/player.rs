//! Connected player: team, spectating, timers and block score

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::game::idmap::IdMap;
use crate::game::ClientId;
use crate::util::time::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Spectators,
    Red,
    Blue,
}

impl Team {
    pub fn net_id(self) -> i32 {
        match self {
            Team::Spectators => -1,
            Team::Red => 0,
            Team::Blue => 1,
        }
    }
}

/// Block-mode scoreboard of one player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockScore {
    /// Blocks credited to this player
    pub blocks: u32,
    pub chat_blocks: u32,
    /// Times this player froze itself long enough to count as blocked
    pub self_blocks: u32,
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub client_id: ClientId,
    pub name: String,
    pub team: Team,
    /// Player followed while spectating, `None` for free view
    pub spectator_id: Option<ClientId>,
    pub player_flags: i32,
    /// Client understands the extended character layout
    pub custom_client: bool,
    pub logged_in: bool,
    /// Earliest tick the player may respawn
    pub respawn_tick: Tick,
    pub die_tick: Tick,
    /// Fire was pressed while dead; respawn as soon as the delay allows
    pub spawn_requested: bool,
    pub last_action_tick: Tick,
    /// Set when team balancing moved the player; a broadcast explains it once
    pub force_balanced: bool,
    pub color_override: Option<i32>,
    pub view_pos: Vec2,
    pub id_map: IdMap,
    pub score: BlockScore,
}

impl Player {
    pub fn new(client_id: ClientId, name: impl Into<String>, custom_client: bool, tick: Tick) -> Self {
        Self {
            client_id,
            name: name.into(),
            team: Team::Red,
            spectator_id: None,
            player_flags: 0,
            custom_client,
            logged_in: false,
            respawn_tick: tick,
            die_tick: tick,
            spawn_requested: true,
            last_action_tick: tick,
            force_balanced: false,
            color_override: None,
            view_pos: Vec2::ZERO,
            id_map: IdMap::new(client_id, custom_client),
            score: BlockScore::default(),
        }
    }

    pub fn is_spectator(&self) -> bool {
        self.team == Team::Spectators
    }

    /// Override body colour, `-1` restores the player's own colour
    pub fn override_colors(&mut self, color: i32) {
        self.color_override = (color != -1).then_some(color);
    }

    /// Credit a block against someone else
    pub fn block_kill(&mut self, chat: bool) {
        if chat {
            self.score.chat_blocks += 1;
        } else {
            self.score.blocks += 1;
            self.score.score += 1;
        }
    }

    pub fn self_block(&mut self) {
        self.score.self_blocks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_override_sentinel() {
        let mut player = Player::new(0, "a", false, 0);
        player.override_colors(0xff00ff);
        assert_eq!(player.color_override, Some(0xff00ff));
        player.override_colors(-1);
        assert_eq!(player.color_override, None);
    }

    #[test]
    fn chat_blocks_do_not_score() {
        let mut player = Player::new(0, "a", false, 0);
        player.block_kill(false);
        player.block_kill(true);
        assert_eq!(player.score.blocks, 1);
        assert_eq!(player.score.chat_blocks, 1);
        assert_eq!(player.score.score, 1);
    }
}
