//! ID-indexed storage for IR entities with stable IDs across removal.
//!
//! Rewrites create and erase operations constantly, so unlike an append-only
//! arena a slot can be vacated. Vacated slots are never reused: an ID always
//! names the same entity or nothing.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for opaque ID types used as arena keys.
pub trait ArenaId: Copy {
    /// Creates an ID from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// A dense, ID-indexed container whose entries can be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I: ArenaId, T> {
    slots: Vec<Option<T>>,
    live: usize,
    #[serde(skip)]
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Allocates a new item and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let id = I::from_raw(self.slots.len() as u32);
        self.slots.push(Some(item));
        self.live += 1;
        id
    }

    /// Returns the item with the given ID, or `None` if it was removed.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.slots.get(id.as_raw() as usize).and_then(Option::as_ref)
    }

    /// Mutable counterpart of [`try_get`](Self::try_get).
    pub fn try_get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots
            .get_mut(id.as_raw() as usize)
            .and_then(Option::as_mut)
    }

    /// Returns the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was never allocated or has been removed.
    pub fn get(&self, id: I) -> &T {
        match self.try_get(id) {
            Some(item) => item,
            None => panic!("arena id {} is not live", id.as_raw()),
        }
    }

    /// Returns a mutable reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID was never allocated or has been removed.
    pub fn get_mut(&mut self, id: I) -> &mut T {
        match self.try_get_mut(id) {
            Some(item) => item,
            None => panic!("arena id {} is not live", id.as_raw()),
        }
    }

    /// Returns `true` if the ID names a live item.
    pub fn contains(&self, id: I) -> bool {
        self.try_get(id).is_some()
    }

    /// Removes and returns the item, leaving the slot permanently vacant.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let taken = self.slots.get_mut(id.as_raw() as usize)?.take();
        if taken.is_some() {
            self.live -= 1;
        }
        taken
    }

    /// Returns the number of live items.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no items are live.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over live `(ID, &T)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (I::from_raw(i as u32), item)))
    }

    /// Iterates over live `(ID, &mut T)` pairs in allocation order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|item| (I::from_raw(i as u32), item)))
    }

    /// Snapshot of live IDs in allocation order.
    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Iterates over live items in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterates mutably over live items in allocation order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        self.get(id)
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        self.get_mut(id)
    }
}
