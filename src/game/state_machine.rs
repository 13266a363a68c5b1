//! Block attribution state machine.
//!
//! Every tick the state is re-derived from the current flags and elapsed windows,
//! in a fixed order. Entering `Blocked` is reported to the caller exactly once per
//! incident so it can credit whoever caused it.

use crate::config::BlockWindows;
use crate::game::ClientId;
use crate::util::time::{GameTime, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    #[default]
    Free,
    Interacted,
    SelfFreezed,
    Frozen,
    Blocked,
}

/// Emitted when a character enters `Blocked`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    /// The player held responsible, `None` for a self block
    pub by: Option<ClientId>,
    /// The victim was chatting right before freezing
    pub chat: bool,
}

/// Per-tick flags the transition function reads
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput {
    /// Remaining freeze ticks of the physics core
    pub core_frozen: i32,
    pub chatting: bool,
    /// Last tick the character's own player changed input
    pub last_action_tick: Tick,
}

#[derive(Debug, Clone)]
pub struct BlockTracker {
    pub state: BlockState,
    pub last_state_change: Tick,
    pub last_interaction_player: Option<ClientId>,
    pub last_frozen: Tick,
    pub is_frozen: bool,
    pub last_not_chatting_tick: Tick,
    pub chat_frozen: bool,
}

impl BlockTracker {
    pub fn new(tick: Tick) -> Self {
        Self {
            state: BlockState::Free,
            last_state_change: tick,
            last_interaction_player: None,
            last_frozen: 0,
            is_frozen: false,
            last_not_chatting_tick: tick,
            chat_frozen: false,
        }
    }

    /// Record contact with another player. Only registers while FREE or INTERACTED and
    /// once `window_ms` has passed since the last state change; `-1` disables.
    pub fn interaction(&mut self, with: ClientId, window_ms: i64, time: &GameTime) {
        if window_ms == -1 {
            return;
        }
        if !matches!(self.state, BlockState::Free | BlockState::Interacted) {
            return;
        }
        if self.last_state_change > time.tick - time.ticks(window_ms) {
            return;
        }
        self.last_interaction_player = Some(with);
        self.last_state_change = time.tick;
    }

    pub fn frozen(&mut self, tick: Tick) {
        self.last_frozen = tick;
        self.is_frozen = true;
    }

    pub fn unfrozen(&mut self) {
        self.is_frozen = false;
    }

    /// Transition for this tick, `None` keeps the current state
    pub fn next_state(
        &self,
        input: &ResolveInput,
        windows: &BlockWindows,
        time: &GameTime,
    ) -> Option<BlockState> {
        match self.state {
            BlockState::Free => {
                if self.last_interaction_player.is_some() {
                    Some(BlockState::Interacted)
                } else if input.core_frozen > 0 {
                    Some(BlockState::SelfFreezed)
                } else {
                    None
                }
            }
            BlockState::SelfFreezed => {
                if time.ago(self.last_state_change, windows.self_blocked) {
                    Some(BlockState::Blocked)
                } else if input.core_frozen <= 0 {
                    Some(BlockState::Free)
                } else {
                    None
                }
            }
            BlockState::Interacted => {
                if self.is_frozen {
                    Some(BlockState::Frozen)
                } else if time.ago(self.last_state_change, windows.int_free) {
                    Some(BlockState::Free)
                } else {
                    None
                }
            }
            BlockState::Frozen => {
                if time.ago(self.last_state_change, windows.frozen_blocked) {
                    Some(BlockState::Blocked)
                } else if time.ago(self.last_frozen, windows.frozen_int) {
                    Some(BlockState::Interacted)
                } else {
                    None
                }
            }
            BlockState::Blocked => {
                let thawed = time.ago(self.last_frozen, windows.blocked_free);
                let active = !time.ago(input.last_action_tick, windows.active_window);
                (thawed && active).then_some(BlockState::Free)
            }
        }
    }

    /// Advance one tick. Returns the block event when `Blocked` was entered.
    pub fn resolve(
        &mut self,
        input: &ResolveInput,
        windows: &BlockWindows,
        time: &GameTime,
    ) -> Option<BlockEvent> {
        let event = self
            .next_state(input, windows, time)
            .and_then(|next| self.enter(next, windows, time));

        if matches!(self.state, BlockState::Interacted | BlockState::Free) && !input.chatting {
            self.last_not_chatting_tick = time.tick;
            self.chat_frozen = false;
        }

        event
    }

    fn enter(&mut self, next: BlockState, windows: &BlockWindows, time: &GameTime) -> Option<BlockEvent> {
        let mut event = None;
        match next {
            BlockState::Free => self.last_interaction_player = None,
            BlockState::Blocked => {
                event = Some(BlockEvent {
                    by: self.last_interaction_player,
                    chat: self.chat_frozen,
                });
            }
            BlockState::Frozen => {
                if self.last_not_chatting_tick < time.tick - time.ticks(windows.chat_block_delay) {
                    self.chat_frozen = true;
                }
            }
            BlockState::Interacted | BlockState::SelfFreezed => {}
        }

        self.state = next;
        self.last_state_change = time.tick;
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        time: GameTime,
        windows: BlockWindows,
        tracker: BlockTracker,
        input: ResolveInput,
    }

    impl Harness {
        fn new() -> Self {
            let mut time = GameTime::new(50);
            time.tick = 1000;
            Self {
                time,
                windows: BlockWindows::default(),
                tracker: BlockTracker::new(1000),
                input: ResolveInput {
                    core_frozen: 0,
                    chatting: false,
                    last_action_tick: 1000,
                },
            }
        }

        /// One character tick: freeze bookkeeping then resolve
        fn step(&mut self) -> Option<BlockEvent> {
            self.time.advance();
            if self.input.core_frozen > 0 {
                self.tracker.frozen(self.time.tick);
            } else {
                self.tracker.unfrozen();
            }
            self.tracker.resolve(&self.input, &self.windows, &self.time)
        }

        fn run(&mut self, ticks: usize) -> Vec<BlockEvent> {
            (0..ticks).filter_map(|_| self.step()).collect()
        }
    }

    #[test]
    fn idle_character_stays_free() {
        let mut h = Harness::new();
        assert!(h.run(5000).is_empty());
        assert_eq!(h.tracker.state, BlockState::Free);
    }

    #[test]
    fn interaction_then_nothing_returns_to_free() {
        let mut h = Harness::new();
        h.time.tick = 2000;
        h.tracker.interaction(7, 500, &h.time);
        h.step();
        assert_eq!(h.tracker.state, BlockState::Interacted);
        assert_eq!(h.tracker.last_interaction_player, Some(7));

        // int_free is 5000ms = 250 ticks
        h.run(250);
        assert_eq!(h.tracker.state, BlockState::Interacted);
        h.run(1);
        assert_eq!(h.tracker.state, BlockState::Free);
        assert_eq!(h.tracker.last_interaction_player, None);
    }

    #[test]
    fn frozen_past_threshold_blocks_once() {
        let mut h = Harness::new();
        h.time.tick = 2000;
        h.tracker.interaction(4, 500, &h.time);
        h.step();
        assert_eq!(h.tracker.state, BlockState::Interacted);

        h.input.core_frozen = 150;
        h.step();
        assert_eq!(h.tracker.state, BlockState::Frozen);

        let events = h.run(2000);
        assert_eq!(
            events,
            vec![BlockEvent {
                by: Some(4),
                chat: false
            }]
        );
        assert_eq!(h.tracker.state, BlockState::Blocked);
    }

    #[test]
    fn blocked_needs_thaw_and_own_activity() {
        let mut h = Harness::new();
        h.tracker.state = BlockState::Blocked;
        h.tracker.last_frozen = h.time.tick;
        h.input.last_action_tick = 0;
        h.run(200);
        assert_eq!(h.tracker.state, BlockState::Blocked);

        h.input.last_action_tick = h.time.tick;
        h.step();
        assert_eq!(h.tracker.state, BlockState::Free);
    }

    #[test]
    fn self_freeze_blocks_without_culprit() {
        let mut h = Harness::new();
        h.input.core_frozen = 10;
        h.step();
        assert_eq!(h.tracker.state, BlockState::SelfFreezed);

        // self_blocked is 5000ms = 250 ticks
        let events = h.run(251);
        assert_eq!(events, vec![BlockEvent { by: None, chat: false }]);
    }

    #[test]
    fn self_freeze_ends_when_thawed() {
        let mut h = Harness::new();
        h.input.core_frozen = 10;
        h.step();
        h.input.core_frozen = 0;
        h.step();
        assert_eq!(h.tracker.state, BlockState::Free);
    }

    #[test]
    fn interaction_ignored_once_escalated_or_disabled() {
        let mut h = Harness::new();
        h.time.tick = 5000;
        h.tracker.interaction(1, -1, &h.time);
        assert_eq!(h.tracker.last_interaction_player, None);

        h.tracker.state = BlockState::Frozen;
        h.tracker.interaction(1, 0, &h.time);
        assert_eq!(h.tracker.last_interaction_player, None);
    }

    #[test]
    fn interaction_window_must_elapse() {
        let mut h = Harness::new();
        h.time.tick = 1010;
        h.tracker.interaction(2, 1000, &h.time);
        assert_eq!(h.tracker.last_interaction_player, None);

        h.time.tick = 1050;
        h.tracker.interaction(2, 1000, &h.time);
        assert_eq!(h.tracker.last_interaction_player, Some(2));
    }

    #[test]
    fn chatting_freeze_is_flagged() {
        let mut h = Harness::new();
        h.time.tick = 2000;
        h.tracker.interaction(9, 500, &h.time);
        h.input.chatting = true;
        // chat_block_delay is 3000ms = 150 ticks
        h.run(200);
        assert_eq!(h.tracker.state, BlockState::Interacted);

        h.input.core_frozen = 150;
        h.step();
        assert_eq!(h.tracker.state, BlockState::Frozen);
        assert!(h.tracker.chat_frozen);

        let events = h.run(200);
        assert_eq!(events, vec![BlockEvent { by: Some(9), chat: true }]);
    }
}
