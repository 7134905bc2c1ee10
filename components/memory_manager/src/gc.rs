//! Mark-and-sweep collection.
//!
//! Marking starts from the heap's pin stack and a caller-supplied
//! [`RootSet`], then follows object edges with an explicit worklist so deep
//! object graphs cannot overflow the native stack. Sweeping walks the slot
//! registry and frees every slot that was not marked.

use core_types::{ObjId, Value};

use crate::heap::{Heap, Slot};
use crate::object::{Visitable, Visitor};
use crate::roots::RootSet;

/// Cumulative collector statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed collections
    pub collections: u64,
    /// Objects ever allocated
    pub objects_allocated: u64,
    /// Objects freed across all collections
    pub objects_freed: u64,
    /// Bytes freed across all collections
    pub bytes_freed: u64,
    /// Highest `total_allocated` observed
    pub peak_bytes: usize,
}

/// Outcome of one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionReport {
    /// `total_allocated` before sweeping
    pub bytes_before: usize,
    /// `total_allocated` after sweeping
    pub bytes_after: usize,
    /// Objects freed by this cycle
    pub objects_freed: usize,
    /// Threshold for the next cycle
    pub next_gc: usize,
}

/// Pushes every reachable handle onto the gray worklist
struct Tracer<'a> {
    worklist: &'a mut Vec<ObjId>,
}

impl Visitor for Tracer<'_> {
    fn visit(&mut self, value: Value) {
        if let Value::Obj(id) = value {
            self.worklist.push(id);
        }
    }

    fn visit_obj(&mut self, id: ObjId) {
        self.worklist.push(id);
    }
}

fn live_index(slots: &[Slot], id: ObjId) -> Option<usize> {
    let slot = slots.get(id.index())?;
    (slot.generation == id.generation() && slot.object.is_some()).then_some(id.index())
}

impl Heap {
    /// Run a full collection.
    ///
    /// Everything not reachable from the pin stack or `roots` is freed and
    /// its bytes are subtracted from `total_allocated`. Afterwards the next
    /// threshold is `total_allocated * heap_growth_percent / 100`, but never
    /// less than `min_next_gc`.
    pub fn collect<R: RootSet + ?Sized>(&mut self, roots: &R) -> CollectionReport {
        let bytes_before = self.total_allocated;

        // Mark.
        {
            let slots = &self.slots;
            let marks = &mut self.marks[..];
            self.worklist.clear();
            let mut tracer = Tracer {
                worklist: &mut self.worklist,
            };
            for pinned in &self.pins {
                tracer.visit_obj(*pinned);
            }
            roots.visit_roots(&mut tracer);

            while let Some(id) = tracer.worklist.pop() {
                let Some(index) = live_index(slots, id) else {
                    log::warn!("gc: root or edge refers to freed object {}", id);
                    continue;
                };
                if marks[index] {
                    continue;
                }
                marks[index] = true;
                if let Some(object) = &slots[index].object {
                    object.visit_edges(&mut tracer);
                }
            }
        }

        // Sweep.
        let mut objects_freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let marked = std::mem::replace(&mut self.marks[index], false);
            if marked || slot.object.is_none() {
                continue;
            }
            self.total_allocated -= slot.bytes;
            self.stats.bytes_freed += slot.bytes as u64;
            slot.object = None;
            slot.bytes = 0;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index as u32);
            objects_freed += 1;
        }

        self.live_objects -= objects_freed;
        self.stats.collections += 1;
        self.stats.objects_freed += objects_freed as u64;
        self.next_gc = (self.total_allocated.saturating_mul(self.growth_percent) / 100)
            .max(self.min_next_gc);

        log::debug!(
            "gc: {} -> {} bytes, freed {} objects, next at {}",
            bytes_before,
            self.total_allocated,
            objects_freed,
            self.next_gc
        );

        CollectionReport {
            bytes_before,
            bytes_after: self.total_allocated,
            objects_freed,
            next_gc: self.next_gc,
        }
    }
}
