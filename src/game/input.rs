//! Player input and edge counting for wrapped button counters

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Button counters wrap within this mask
pub const INPUT_STATE_MASK: i32 = 0x3f;

pub const PLAYERFLAG_CHATTING: i32 = 1 << 2;

/// One frame of client input.
///
/// `fire`, `next_weapon` and `prev_weapon` are wrapping counters: every press or
/// release bumps the value by one, so odd values mean "held".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInput {
    pub direction: i32,
    pub target_x: i32,
    pub target_y: i32,
    pub jump: i32,
    pub fire: i32,
    pub hook: i32,
    pub player_flags: i32,
    pub wanted_weapon: i32,
    pub next_weapon: i32,
    pub prev_weapon: i32,
}

impl PlayerInput {
    pub fn target(&self) -> Vec2 {
        Vec2::new(self.target_x as f32, self.target_y as f32)
    }

    /// Aim direction, straight up when the cursor sits on the character
    pub fn aim_direction(&self) -> Vec2 {
        self.target().try_normalize().unwrap_or(Vec2::new(0.0, -1.0))
    }

    pub fn fire_held(&self) -> bool {
        self.fire & 1 != 0
    }

    pub fn is_chatting(&self) -> bool {
        self.player_flags & PLAYERFLAG_CHATTING != 0
    }
}

/// Presses and releases between two counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputCount {
    pub presses: i32,
    pub releases: i32,
}

/// Walk the counter from `prev` to `cur` (mod the state mask) and classify each step.
/// Landing on an odd value is a press, an even value a release.
pub fn count_input(prev: i32, cur: i32) -> InputCount {
    let mut count = InputCount::default();
    let cur = cur & INPUT_STATE_MASK;
    let mut i = prev & INPUT_STATE_MASK;

    while i != cur {
        i = (i + 1) & INPUT_STATE_MASK;
        if i & 1 != 0 {
            count.presses += 1;
        } else {
            count.releases += 1;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_multiple_edges_in_one_update() {
        let c = count_input(0, 3);
        assert_eq!(c.presses, 2);
        assert_eq!(c.releases, 1);
    }

    #[test]
    fn same_value_means_no_edges() {
        assert_eq!(count_input(5, 5), InputCount::default());
    }

    #[test]
    fn wraps_around_mask() {
        // 62 -> 63 (press) -> 0 (release) -> 1 (press)
        let c = count_input(62, 1);
        assert_eq!(c.presses, 2);
        assert_eq!(c.releases, 1);
    }

    #[test]
    fn total_edges_match_steps() {
        for prev in 0..=INPUT_STATE_MASK {
            for cur in 0..=INPUT_STATE_MASK {
                let c = count_input(prev, cur);
                let steps = (cur - prev).rem_euclid(INPUT_STATE_MASK + 1);
                assert_eq!(c.presses + c.releases, steps);
            }
        }
    }

    #[test]
    fn centred_cursor_aims_up() {
        let input = PlayerInput::default();
        assert_eq!(input.aim_direction(), Vec2::new(0.0, -1.0));
    }
}
