//! Per-observer client id translation.
//!
//! Extended clients see real ids. Legacy clients only know 16 slots: the observer
//! itself sits in slot 0 and the nearest other players fill the rest.

use glam::Vec2;

use crate::game::ClientId;

pub const LEGACY_SLOTS: usize = 16;

#[derive(Debug, Clone)]
pub struct IdMap {
    owner: ClientId,
    identity: bool,
    /// Real id per legacy slot
    slots: [Option<ClientId>; LEGACY_SLOTS],
}

impl IdMap {
    pub fn new(owner: ClientId, identity: bool) -> Self {
        let mut slots = [None; LEGACY_SLOTS];
        slots[0] = Some(owner);
        Self {
            owner,
            identity,
            slots,
        }
    }

    /// Rebuild the slot table from everyone's positions, nearest first (ties by id)
    pub fn rebuild(&mut self, view_pos: Vec2, others: impl IntoIterator<Item = (ClientId, Vec2)>) {
        if self.identity {
            return;
        }

        let mut candidates: Vec<(f32, ClientId)> = others
            .into_iter()
            .filter(|(id, _)| *id != self.owner)
            .map(|(id, pos)| (pos.distance_squared(view_pos), id))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        self.slots = [None; LEGACY_SLOTS];
        self.slots[0] = Some(self.owner);
        for (slot, (_, id)) in self.slots.iter_mut().skip(1).zip(candidates) {
            *slot = Some(id);
        }
    }

    /// Id as seen by this observer, `None` if the observer can't see it
    pub fn translate(&self, id: ClientId) -> Option<i32> {
        if self.identity {
            return i32::try_from(id).ok();
        }
        self.slots
            .iter()
            .position(|slot| *slot == Some(id))
            .map(|slot| slot as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_for_extended_clients() {
        let map = IdMap::new(3, true);
        assert_eq!(map.translate(3), Some(3));
        assert_eq!(map.translate(40), Some(40));
    }

    #[test]
    fn legacy_keeps_nearest_fifteen() {
        let mut map = IdMap::new(0, false);
        let others = (1..30).map(|id| (id, Vec2::new(id as f32 * 10.0, 0.0)));
        map.rebuild(Vec2::ZERO, others);

        assert_eq!(map.translate(0), Some(0));
        assert_eq!(map.translate(1), Some(1));
        assert_eq!(map.translate(15), Some(15));
        assert_eq!(map.translate(16), None);
    }

    #[test]
    fn legacy_ties_broken_by_id() {
        let mut map = IdMap::new(5, false);
        map.rebuild(Vec2::ZERO, [(9, Vec2::X), (2, Vec2::X), (5, Vec2::ZERO)]);
        assert_eq!(map.translate(2), Some(1));
        assert_eq!(map.translate(9), Some(2));
    }
}
