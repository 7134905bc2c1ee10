//! Temporary roots and root sets.
//!
//! The collector marks from three places: the heap's own pin stack, the
//! root set the caller passes to `allocate`/`collect`, and nothing else.
//! Code that builds an object in several allocations pins the intermediate
//! objects so a collection triggered halfway through cannot free them.

use core_types::{GcError, ObjId, Value};

use crate::heap::Heap;
use crate::object::Visitor;

/// External roots the collector should mark from.
///
/// The VM implements this over its globals, core classes and fiber.
pub trait RootSet {
    /// Report every root value to `visitor`
    fn visit_roots(&self, visitor: &mut impl Visitor);
}

/// No external roots; only pinned objects survive a collection.
impl RootSet for () {
    fn visit_roots(&self, _visitor: &mut impl Visitor) {}
}

impl RootSet for [Value] {
    fn visit_roots(&self, visitor: &mut impl Visitor) {
        for value in self {
            visitor.visit(*value);
        }
    }
}

impl<A: RootSet + ?Sized, B: RootSet + ?Sized> RootSet for (&A, &B) {
    fn visit_roots(&self, visitor: &mut impl Visitor) {
        self.0.visit_roots(visitor);
        self.1.visit_roots(visitor);
    }
}

/// Proof of one entry on the pin stack.
///
/// Tokens cannot be copied, so each pin is released at most once. Passing a
/// token to [`Heap::unpin`] while a later pin is still held is reported as
/// [`GcError::PinOrder`].
#[must_use = "a pinned object stays rooted until its token is passed to Heap::unpin"]
#[derive(Debug, PartialEq, Eq)]
pub struct PinToken {
    pub(crate) depth: usize,
    pub(crate) id: ObjId,
}

impl PinToken {
    /// The pinned object
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// Position on the pin stack, 0 for the oldest pin
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Scoped pin that is released when the guard goes out of scope.
///
/// The guard holds the heap mutably, so further allocation goes through
/// [`PinnedRoot::heap_mut`]. Guards nest naturally: an inner guard always
/// drops before the outer one, which keeps the pin stack in LIFO order.
pub struct PinnedRoot<'a> {
    heap: &'a mut Heap,
    token: Option<PinToken>,
}

impl<'a> PinnedRoot<'a> {
    /// Pin `id` until the guard is dropped
    pub fn new(heap: &'a mut Heap, id: ObjId) -> Self {
        let token = heap.pin(id);
        Self {
            heap,
            token: Some(token),
        }
    }

    /// The pinned object
    pub fn id(&self) -> Option<ObjId> {
        self.token.as_ref().map(PinToken::id)
    }

    /// Borrows the underlying heap immutably
    pub fn heap(&self) -> &Heap {
        self.heap
    }

    /// Borrows the underlying heap mutably
    pub fn heap_mut(&mut self) -> &mut Heap {
        self.heap
    }

    /// Release the pin now and report misuse instead of ignoring it
    pub fn release(mut self) -> Result<(), GcError> {
        match self.token.take() {
            Some(token) => self.heap.unpin(token),
            None => Ok(()),
        }
    }
}

impl Drop for PinnedRoot<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.heap.unpin(token) {
                log::error!("pinned root released out of order: {}", e);
            }
        }
    }
}
