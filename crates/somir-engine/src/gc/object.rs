//! Heap object representation.
//!
//! Every runtime value wider than a machine word lives in a [`GcBox`] on
//! the managed heap. The payload's variant tag doubles as the trace
//! dispatch: there is no vtable, `children` enumerates outgoing
//! references per kind.

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::ptr::NonNull;

use crate::value::Value;

/// A closure: a function prototype index plus its captured upvalues.
#[derive(Debug, Clone)]
pub struct Closure {
    /// Index of the function prototype inside its chunk.
    pub proto: u16,
    /// Captured values, one per upvalue slot.
    pub upvalues: Vec<Value>,
}

/// The payload of a heap allocation.
pub enum HeapObject {
    /// Immutable UTF-8 string.
    Str(String),
    /// Runtime list of values.
    List(Vec<Value>),
    /// A bare GC-traced vector of values (chunk constant tables).
    Values(Vec<Value>),
    /// A function closure.
    Closure(Closure),
}

impl HeapObject {
    /// Visit every heap reference held by this object.
    pub(crate) fn children(&self, visit: &mut dyn FnMut(GcRef)) {
        match self {
            HeapObject::Str(_) => {}
            HeapObject::List(items) | HeapObject::Values(items) => {
                for value in items {
                    if let Value::Ref(child) = value {
                        visit(*child);
                    }
                }
            }
            HeapObject::Closure(closure) => {
                for value in &closure.upvalues {
                    if let Value::Ref(child) = value {
                        visit(*child);
                    }
                }
            }
        }
    }
}

/// Allocation header plus payload. Created and destroyed only by the
/// heap, and only during collection.
pub(crate) struct GcBox {
    pub(crate) marked: Cell<bool>,
    pub(crate) object: UnsafeCell<HeapObject>,
}

/// An unrooted reference to a heap object.
///
/// Copyable and word-sized. A `GcRef` does not keep its referent alive:
/// holding one across a collection without a pin (see
/// [`Heap::pin`](super::Heap::pin) or [`Root`](super::Root)) is
/// undefined behavior, the same contract the VM's stack slots live
/// under.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(pub(crate) NonNull<GcBox>);

impl GcRef {
    /// Shared view of the payload.
    pub fn object(&self) -> &HeapObject {
        unsafe { &*(*self.0.as_ptr()).object.get() }
    }

    /// Exclusive view of the payload, with a caller-chosen lifetime.
    ///
    /// # Safety
    ///
    /// No other reference into this object may be live for `'a`. The
    /// compiler is single-threaded and only ever mutates the constants
    /// vector it owns, which satisfies this.
    pub(crate) unsafe fn object_mut<'a>(&self) -> &'a mut HeapObject {
        &mut *(*self.0.as_ptr()).object.get()
    }

    /// The string payload, if this is a string object.
    pub fn as_str(&self) -> Option<&str> {
        match self.object() {
            HeapObject::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The value-vector payload, if this is one.
    pub fn as_values(&self) -> Option<&[Value]> {
        match self.object() {
            HeapObject::Values(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    pub(crate) fn gc_box(&self) -> &GcBox {
        unsafe { self.0.as_ref() }
    }
}

impl fmt::Debug for GcRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({:p})", self.0.as_ptr())
    }
}
