/*!
 * Object Table
 *
 * Keyed registry of live kernel objects (teams, threads) with O(1) lookup
 * and a stable iterator that tolerates concurrent insertion and removal.
 *
 * Entries live in an arena of slots threaded into one doubly linked list in
 * insertion order. Iterators are sentinel slots in that same list; see
 * [`TableIterator`].
 */

mod iterator;

pub use iterator::TableIterator;

use crate::core::errors::{KernelError, KernelResult};
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Object that can be registered in an [`ObjectTable`]
pub trait TableObject: Send + Sync {
    /// Key the object is registered under; must not change while registered
    fn object_id(&self) -> u32;

    /// Error reported when the table is at capacity
    fn table_full(limit: usize) -> KernelError
    where
        Self: Sized,
    {
        KernelError::busy(format!("object table full ({limit} entries)"))
    }
}

pub(crate) enum SlotKind<T> {
    Free,
    Object { object: Arc<T>, visible: bool },
    Sentinel,
}

pub(crate) struct Slot<T> {
    pub(crate) kind: SlotKind<T>,
    prev: Option<usize>,
    next: Option<usize>,
}

pub(crate) struct TableState<T> {
    index: HashMap<u32, usize, RandomState>,
    pub(crate) slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> TableState<T> {
    fn new() -> Self {
        Self {
            index: HashMap::with_hasher(RandomState::new()),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn alloc(&mut self, kind: SlotKind<T>) -> usize {
        let slot = Slot {
            kind,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    /// Unlinked slot back to the free list; returns its previous contents
    pub(crate) fn release(&mut self, idx: usize) -> SlotKind<T> {
        let kind = std::mem::replace(&mut self.slots[idx].kind, SlotKind::Free);
        self.free.push(idx);
        kind
    }

    /// Link `idx` right after `after`, or at the head when `after` is None
    pub(crate) fn link_after(&mut self, idx: usize, after: Option<usize>) {
        let next = match after {
            Some(prev) => self.slots[prev].next,
            None => self.head,
        };

        self.slots[idx].prev = after;
        self.slots[idx].next = next;

        match after {
            Some(prev) => self.slots[prev].next = Some(idx),
            None => self.head = Some(idx),
        }
        match next {
            Some(next) => self.slots[next].prev = Some(idx),
            None => self.tail = Some(idx),
        }
    }

    fn link_tail(&mut self, idx: usize) {
        let tail = self.tail;
        self.link_after(idx, tail);
    }

    pub(crate) fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    pub(crate) fn next_of(&self, idx: usize) -> Option<usize> {
        self.slots[idx].next
    }
}

/// Registry of kernel objects keyed by id
pub struct ObjectTable<T: TableObject> {
    name: &'static str,
    limit: usize,
    state: RwLock<TableState<T>>,
}

impl<T: TableObject> ObjectTable<T> {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            limit,
            state: RwLock::new(TableState::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Register `object` (visible) at the end of the iteration order
    ///
    /// Fails with `Busy` for a duplicate id and with the object's
    /// [`TableObject::table_full`] error at capacity.
    pub fn insert(&self, object: Arc<T>) -> KernelResult<()> {
        let id = object.object_id();
        let mut state = self.state.write();

        if state.index.contains_key(&id) {
            return Err(KernelError::busy(format!("{} {id} already registered", self.name)));
        }
        if state.index.len() >= self.limit {
            return Err(T::table_full(self.limit));
        }

        let idx = state.alloc(SlotKind::Object {
            object,
            visible: true,
        });
        state.link_tail(idx);
        state.index.insert(id, idx);
        Ok(())
    }

    /// Unregister `id`, visible or not
    pub fn remove(&self, id: u32) -> Option<Arc<T>> {
        let mut state = self.state.write();
        let idx = state.index.remove(&id)?;
        state.unlink(idx);
        match state.release(idx) {
            SlotKind::Object { object, .. } => Some(object),
            _ => None,
        }
    }

    /// Visible object registered under `id`
    pub fn lookup(&self, id: u32) -> Option<Arc<T>> {
        let state = self.state.read();
        let idx = *state.index.get(&id)?;
        match &state.slots[idx].kind {
            SlotKind::Object {
                object,
                visible: true,
            } => Some(Arc::clone(object)),
            _ => None,
        }
    }

    /// Object registered under `id`, including hidden ones
    pub fn lookup_any(&self, id: u32) -> Option<Arc<T>> {
        let state = self.state.read();
        let idx = *state.index.get(&id)?;
        match &state.slots[idx].kind {
            SlotKind::Object { object, .. } => Some(Arc::clone(object)),
            _ => None,
        }
    }

    /// Whether `id` is registered at all (visible or not)
    pub fn contains(&self, id: u32) -> bool {
        self.state.read().index.contains_key(&id)
    }

    /// Hide or reveal an entry; false if `id` is not registered
    pub fn set_visible(&self, id: u32, visible: bool) -> bool {
        let mut state = self.state.write();
        let Some(&idx) = state.index.get(&id) else {
            return false;
        };
        if let SlotKind::Object { visible: flag, .. } = &mut state.slots[idx].kind {
            *flag = visible;
        }
        true
    }

    /// Registered objects, visible or not
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable iterator over visible objects
    pub fn iter(&self) -> TableIterator<'_, T> {
        TableIterator::new(self)
    }

    pub(crate) fn state(&self) -> &RwLock<TableState<T>> {
        &self.state
    }
}
