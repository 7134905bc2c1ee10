//! Memory Manager - object heap and garbage collector
//!
//! This component provides:
//! - The heap object model (classes, functions, lists, strings, instances)
//! - A slot registry with generation-checked handles
//! - Allocation accounting with threshold-triggered mark-and-sweep
//! - A LIFO pin stack for objects under construction
//!
//! The collector never runs on its own. It runs inside [`Heap::allocate`]
//! when the allocation threshold is crossed, or when [`Heap::collect`] is
//! called, and marks from the pin stack plus the [`RootSet`] the caller
//! passes in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gc;
pub mod heap;
pub mod object;
pub mod roots;

// Re-export main types
pub use gc::{CollectionReport, GcStats};
pub use heap::Heap;
pub use object::{Method, Obj, ObjClass, ObjFn, ObjInstance, Visitable, Visitor};
pub use roots::{PinToken, PinnedRoot, RootSet};
