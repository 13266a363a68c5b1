//! Character snapshot records and their two wire layouts

use bytes::{BufMut, Bytes, BytesMut};

use crate::game::physics::CoreNet;
use crate::util::time::Tick;

/// Ints in the legacy character record
pub const LEGACY_FIELDS: usize = 22;
/// Leading ints only extended clients receive
pub const EXTENDED_PREFIX_FIELDS: usize = 1;
pub const EXTENDED_FIELDS: usize = LEGACY_FIELDS + EXTENDED_PREFIX_FIELDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emote {
    #[default]
    Normal,
    Pain,
    Happy,
    Surprise,
    Angry,
    Blink,
}

impl Emote {
    pub fn net_id(self) -> i32 {
        self as i32
    }
}

/// Which record layout an observer's client expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Legacy,
    Extended,
}

impl Layout {
    pub fn for_client(custom_client: bool) -> Self {
        if custom_client {
            Layout::Extended
        } else {
            Layout::Legacy
        }
    }

    pub fn size(self) -> usize {
        match self {
            Layout::Legacy => LEGACY_FIELDS * 4,
            Layout::Extended => EXTENDED_FIELDS * 4,
        }
    }
}

/// Everything a character record carries, before layout selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacterSnap {
    pub tick: i32,
    pub core: CoreNet,
    pub player_flags: i32,
    pub health: i32,
    pub armor: i32,
    pub ammo_count: i32,
    pub weapon: i32,
    pub emote: i32,
    pub attack_tick: i32,
}

/// Write the extended record: freeze prefix followed by the legacy fields
pub fn write_extended(snap: &CharacterSnap, out: &mut impl BufMut) {
    out.put_i32_le(snap.core.frozen);
    write_shared(snap, out);
}

/// Write the legacy record
pub fn write_legacy(snap: &CharacterSnap, out: &mut impl BufMut) {
    write_shared(snap, out);
}

fn write_shared(snap: &CharacterSnap, out: &mut impl BufMut) {
    let core = &snap.core;
    for value in [
        snap.tick,
        core.x,
        core.y,
        core.vel_x,
        core.vel_y,
        core.angle,
        core.direction,
        core.jumped,
        core.hooked_player,
        core.hook_state,
        core.hook_tick,
        core.hook_x,
        core.hook_y,
        core.hook_dx,
        core.hook_dy,
        snap.player_flags,
        snap.health,
        snap.armor,
        snap.ammo_count,
        snap.weapon,
        snap.emote,
        snap.attack_tick,
    ] {
        out.put_i32_le(value);
    }
}

/// One character as seen by one observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapItem {
    /// Id after translation for the observer
    pub id: i32,
    pub layout: Layout,
    pub snap: CharacterSnap,
}

impl SnapItem {
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.layout.size());
        match self.layout {
            Layout::Legacy => write_legacy(&self.snap, &mut out),
            Layout::Extended => write_extended(&self.snap, &mut out),
        }
        out.freeze()
    }
}

/// Decides on which ticks snapshots go out
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
    last_snapshot_tick: Option<Tick>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            last_snapshot_tick: None,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used after joins and deaths)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    pub fn mark_sent(&mut self, tick: Tick) {
        self.last_snapshot_tick = Some(tick);
    }

    pub fn last_snapshot_tick(&self) -> Option<Tick> {
        self.last_snapshot_tick
    }
}
