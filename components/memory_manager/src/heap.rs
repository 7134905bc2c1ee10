//! Object registry with allocation accounting.
//!
//! Objects live in a vector of slots. A handle is the slot index plus the
//! slot's generation; sweeping a slot bumps its generation, so handles to
//! freed objects are reported as dangling instead of reaching whatever
//! object reuses the slot. Freed slots are recycled through a free list.
//!
//! Every allocation is charged to `total_allocated`. When an allocation
//! would push the total past `next_gc`, a full collection runs first.

use core_types::{GcError, ObjId, VmConfig};

use crate::gc::GcStats;
use crate::object::Obj;
use crate::roots::{PinToken, PinnedRoot, RootSet};

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) object: Option<Obj>,
    /// Bytes currently charged for the object
    pub(crate) bytes: usize,
    pub(crate) generation: u32,
}

/// Garbage-collected heap.
///
/// # Examples
///
/// ```
/// use core_types::VmConfig;
/// use memory_manager::{Heap, Obj};
///
/// let mut heap = Heap::new(&VmConfig::default());
/// let id = heap.allocate(Obj::Str("hello".to_string()), &()).unwrap();
/// assert_eq!(heap.get(id).unwrap().as_str(), Some("hello"));
///
/// // Nothing roots the string, so a collection frees it.
/// heap.collect(&());
/// assert!(heap.get(id).is_err());
/// assert_eq!(heap.total_allocated(), 0);
/// ```
#[derive(Debug)]
pub struct Heap {
    pub(crate) slots: Vec<Slot>,
    pub(crate) marks: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    /// Gray objects during marking; kept between cycles to avoid reallocating
    pub(crate) worklist: Vec<ObjId>,
    pub(crate) pins: Vec<ObjId>,
    pub(crate) total_allocated: usize,
    pub(crate) next_gc: usize,
    pub(crate) min_next_gc: usize,
    pub(crate) growth_percent: usize,
    pub(crate) max_bytes: Option<usize>,
    pub(crate) live_objects: usize,
    pub(crate) stats: GcStats,
}

impl Heap {
    /// Create an empty heap tuned by `config`
    pub fn new(config: &VmConfig) -> Self {
        Self {
            slots: Vec::new(),
            marks: Vec::new(),
            free_list: Vec::new(),
            worklist: Vec::new(),
            pins: Vec::new(),
            total_allocated: 0,
            next_gc: config.initial_next_gc,
            min_next_gc: config.min_next_gc,
            growth_percent: config.heap_growth_percent,
            max_bytes: config.max_heap_bytes,
            live_objects: 0,
            stats: GcStats::default(),
        }
    }

    /// Move `object` onto the heap and return its handle.
    ///
    /// May run a collection first, marking from the pin stack and `roots`.
    /// The new object itself is never freed by the collection its own
    /// allocation triggers, but anything else the caller holds only in Rust
    /// locals must be pinned or reachable from `roots`.
    pub fn allocate<R: RootSet + ?Sized>(
        &mut self,
        object: Obj,
        roots: &R,
    ) -> Result<ObjId, GcError> {
        let bytes = object.size_bytes();
        let mut collected = false;
        if self.total_allocated.saturating_add(bytes) > self.next_gc {
            self.collect(roots);
            collected = true;
        }

        if let Some(limit) = self.max_bytes {
            if self.total_allocated.saturating_add(bytes) > limit && !collected {
                self.collect(roots);
            }
            if self.total_allocated.saturating_add(bytes) > limit {
                return Err(GcError::OutOfMemory {
                    requested: bytes,
                    live: self.total_allocated,
                    limit,
                });
            }
        }

        let id = match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                slot.bytes = bytes;
                ObjId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    object: Some(object),
                    bytes,
                    generation: 0,
                });
                self.marks.push(false);
                ObjId::new(index, 0)
            }
        };

        self.total_allocated += bytes;
        self.live_objects += 1;
        self.stats.objects_allocated += 1;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.total_allocated);
        Ok(id)
    }

    fn slot(&self, id: ObjId) -> Option<&Slot> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation() && slot.object.is_some())
    }

    /// Whether `id` refers to a live object
    pub fn contains(&self, id: ObjId) -> bool {
        self.slot(id).is_some()
    }

    /// Borrow the object behind `id`
    pub fn get(&self, id: ObjId) -> Result<&Obj, GcError> {
        self.slot(id)
            .and_then(|slot| slot.object.as_ref())
            .ok_or(GcError::DanglingHandle(id))
    }

    /// Mutably borrow the object behind `id`.
    ///
    /// Call [`reaccount`](Self::reaccount) afterwards if the object grew.
    pub fn get_mut(&mut self, id: ObjId) -> Result<&mut Obj, GcError> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.object.as_mut())
            .ok_or(GcError::DanglingHandle(id))
    }

    /// Recompute the bytes charged for `id` after it was mutated.
    ///
    /// Growth counts toward the next collection threshold but never
    /// triggers a collection by itself.
    pub fn reaccount(&mut self, id: ObjId) -> Result<(), GcError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .ok_or(GcError::DanglingHandle(id))?;
        let object = slot.object.as_ref().ok_or(GcError::DanglingHandle(id))?;
        let bytes = object.size_bytes();
        self.total_allocated = self.total_allocated - slot.bytes + bytes;
        slot.bytes = bytes;
        self.stats.peak_bytes = self.stats.peak_bytes.max(self.total_allocated);
        Ok(())
    }

    /// Push `id` onto the pin stack
    pub fn pin(&mut self, id: ObjId) -> PinToken {
        self.pins.push(id);
        PinToken {
            depth: self.pins.len() - 1,
            id,
        }
    }

    /// Pop the most recent pin.
    ///
    /// Fails if nothing is pinned or if `token` is not the most recent pin;
    /// the pin stack is left unchanged in both cases.
    pub fn unpin(&mut self, token: PinToken) -> Result<(), GcError> {
        let depth = self.pins.len();
        if depth == 0 {
            return Err(GcError::PinStackEmpty);
        }
        if token.depth + 1 != depth || self.pins[token.depth] != token.id {
            return Err(GcError::PinOrder {
                token_depth: token.depth,
                depth,
            });
        }
        self.pins.pop();
        Ok(())
    }

    /// Pin `id` for the lifetime of the returned guard
    pub fn pinned(&mut self, id: ObjId) -> PinnedRoot<'_> {
        PinnedRoot::new(self, id)
    }

    /// Number of objects on the pin stack
    pub fn pinned_count(&self) -> usize {
        self.pins.len()
    }

    /// Whether `id` is currently pinned
    pub fn is_pinned(&self, id: ObjId) -> bool {
        self.pins.contains(&id)
    }

    /// Bytes charged to live objects
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    /// Threshold that triggers the next collection
    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    /// Number of live objects
    pub fn live_objects(&self) -> usize {
        self.live_objects
    }

    /// Collection statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Iterate live objects with their handles
    pub fn iter(&self) -> impl Iterator<Item = (ObjId, &Obj)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object
                .as_ref()
                .map(|object| (ObjId::new(index as u32, slot.generation), object))
        })
    }
}
