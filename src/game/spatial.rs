//! Entity registry with radius queries

use std::collections::BTreeMap;

use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Character,
    Projectile,
    Laser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: usize,
}

impl EntityKey {
    pub fn character(id: usize) -> Self {
        Self {
            kind: EntityKind::Character,
            id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    pos: Vec2,
    radius: f32,
}

/// Positions of every live entity.
///
/// Query results come back in ascending id order; callers that cap or stop at the
/// first match inherit that order.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    entries: BTreeMap<EntityKey, Entry>,
}

impl SpatialIndex {
    pub fn insert(&mut self, key: EntityKey, pos: Vec2, radius: f32) {
        self.entries.insert(key, Entry { pos, radius });
    }

    pub fn remove(&mut self, key: EntityKey) -> bool {
        self.entries.remove(&key).is_some()
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn update(&mut self, key: EntityKey, pos: Vec2) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.pos = pos;
        }
    }

    pub fn position(&self, key: EntityKey) -> Option<Vec2> {
        self.entries.get(&key).map(|entry| entry.pos)
    }

    /// Ids of `kind` entities whose body overlaps the circle, at most `max`
    pub fn find_near(&self, center: Vec2, radius: f32, kind: EntityKind, max: usize) -> Vec<usize> {
        self.entries
            .range(
                EntityKey { kind, id: 0 }..=EntityKey {
                    kind,
                    id: usize::MAX,
                },
            )
            .filter(|(_, entry)| entry.pos.distance(center) < radius + entry.radius)
            .map(|(key, _)| key.id)
            .take(max)
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries.keys().filter(|key| key.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_overlapping_in_id_order() {
        let mut index = SpatialIndex::default();
        index.insert(EntityKey::character(5), Vec2::new(10.0, 0.0), 14.0);
        index.insert(EntityKey::character(1), Vec2::new(-10.0, 0.0), 14.0);
        index.insert(EntityKey::character(3), Vec2::new(500.0, 0.0), 14.0);
        index.insert(
            EntityKey {
                kind: EntityKind::Projectile,
                id: 2,
            },
            Vec2::ZERO,
            1.0,
        );

        let near = index.find_near(Vec2::ZERO, 5.0, EntityKind::Character, 10);
        assert_eq!(near, vec![1, 5]);
        assert_eq!(index.find_near(Vec2::ZERO, 5.0, EntityKind::Character, 1), vec![1]);
    }

    #[test]
    fn removed_entities_are_not_found() {
        let mut index = SpatialIndex::default();
        let key = EntityKey::character(0);
        index.insert(key, Vec2::ZERO, 14.0);
        assert!(index.remove(key));
        assert!(index.find_near(Vec2::ZERO, 100.0, EntityKind::Character, 10).is_empty());
        assert!(!index.contains(key));
    }
}
