//! Physics actor table shared by all character cores

use std::collections::BTreeMap;

use glam::Vec2;

use crate::game::ClientId;

/// What other cores can see of an actor, plus impulses queued for it
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActorSlot {
    pub pos: Vec2,
    pub vel: Vec2,
    pending_impulse: Vec2,
}

/// Actor table indexed by client id.
///
/// A core only ever mutates its own state during a tick; effects on other actors
/// (hook drag) are queued as impulses and absorbed by their owner before moving.
#[derive(Debug, Clone, Default)]
pub struct WorldCore {
    actors: BTreeMap<ClientId, ActorSlot>,
}

impl WorldCore {
    pub fn insert(&mut self, id: ClientId, pos: Vec2, vel: Vec2) {
        self.actors.insert(
            id,
            ActorSlot {
                pos,
                vel,
                pending_impulse: Vec2::ZERO,
            },
        );
    }

    pub fn remove(&mut self, id: ClientId) -> bool {
        self.actors.remove(&id).is_some()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn actor(&self, id: ClientId) -> Option<&ActorSlot> {
        self.actors.get(&id)
    }

    /// Publish an actor's pose after its core moved
    pub fn update(&mut self, id: ClientId, pos: Vec2, vel: Vec2) {
        if let Some(slot) = self.actors.get_mut(&id) {
            slot.pos = pos;
            slot.vel = vel;
        }
    }

    pub fn push_impulse(&mut self, id: ClientId, impulse: Vec2) {
        if let Some(slot) = self.actors.get_mut(&id) {
            slot.pending_impulse += impulse;
        }
    }

    pub fn take_impulse(&mut self, id: ClientId) -> Vec2 {
        self.actors
            .get_mut(&id)
            .map(|slot| std::mem::take(&mut slot.pending_impulse))
            .unwrap_or(Vec2::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &ActorSlot)> {
        self.actors.iter().map(|(&id, slot)| (id, slot))
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
