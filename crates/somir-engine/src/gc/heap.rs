//! Heap registry, pinned roots, and the mark-and-sweep collector.
//!
//! Objects register themselves at allocation. `pin`/`unpin` maintain a
//! per-object root count; `collect` marks everything reachable from a
//! root and sweeps the rest; `step` is the safe-point hook that triggers
//! a collection once the live set reaches a threshold, then doubles it.
//!
//! Cycles are collected by construction: marking is a graph traversal,
//! not reference counting.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::ptr::NonNull;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::object::{GcBox, GcRef, HeapObject};

/// Collection threshold used until the first collection.
const INITIAL_COLLECT_THRESHOLD: usize = 16;

/// Snapshot of collector activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Total number of collections run.
    pub collections: usize,
    /// Total objects freed across all collections.
    pub objects_freed: usize,
    /// Objects freed by the last collection.
    pub last_freed: usize,
    /// Live objects after the last collection.
    pub live_objects: usize,
}

struct HeapState {
    objects: Vec<NonNull<GcBox>>,
    roots: FxHashMap<NonNull<GcBox>, usize>,
    next_collect: usize,
    stats: GcStats,
}

/// The managed heap.
///
/// Cheap to clone: clones share one underlying object set. The compiler,
/// the chunk it builds, and every [`Root`] hold clones of the same heap.
/// Single-threaded by design; collections run to completion at safe
/// points and never fail.
#[derive(Clone)]
pub struct Heap {
    state: Rc<RefCell<HeapState>>,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Heap {
        Heap {
            state: Rc::new(RefCell::new(HeapState {
                objects: Vec::new(),
                roots: FxHashMap::default(),
                next_collect: INITIAL_COLLECT_THRESHOLD,
                stats: GcStats::default(),
            })),
        }
    }

    /// Allocate `object`, registering it with the collector.
    ///
    /// The returned reference is unrooted: pin it, or store it inside a
    /// rooted object, before the next safe point.
    pub fn alloc(&self, object: HeapObject) -> GcRef {
        let boxed = Box::new(GcBox {
            marked: Cell::new(false),
            object: UnsafeCell::new(object),
        });
        let ptr = NonNull::from(Box::leak(boxed));
        self.state.borrow_mut().objects.push(ptr);
        GcRef(ptr)
    }

    /// Allocate a string object.
    pub fn alloc_str(&self, text: impl Into<String>) -> GcRef {
        self.alloc(HeapObject::Str(text.into()))
    }

    /// Increment `obj`'s root count.
    pub fn pin(&self, obj: GcRef) {
        *self.state.borrow_mut().roots.entry(obj.0).or_insert(0) += 1;
    }

    /// Decrement `obj`'s root count, removing it from the root set when
    /// the count reaches zero. Unbalanced unpins are ignored.
    pub fn unpin(&self, obj: GcRef) {
        let mut state = self.state.borrow_mut();
        if let Some(count) = state.roots.get_mut(&obj.0) {
            *count -= 1;
            if *count == 0 {
                state.roots.remove(&obj.0);
            }
        }
    }

    /// Pin `obj` for the lifetime of the returned guard. Roots may
    /// overlap and drop in any order.
    pub fn root(&self, obj: GcRef) -> Root {
        self.pin(obj);
        Root {
            heap: self.clone(),
            obj,
        }
    }

    /// Run one full mark-and-sweep cycle.
    pub fn collect(&self) {
        self.state.borrow_mut().collect();
    }

    /// Safe-point hook: collect once the live set reaches the current
    /// threshold, then double the threshold.
    pub fn step(&self) {
        let due = {
            let state = self.state.borrow();
            state.objects.len() >= state.next_collect
        };
        if due {
            let mut state = self.state.borrow_mut();
            state.collect();
            state.next_collect = (state.objects.len() * 2).max(INITIAL_COLLECT_THRESHOLD);
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.state.borrow().objects.len()
    }

    /// True when no objects are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collector statistics.
    pub fn stats(&self) -> GcStats {
        self.state.borrow().stats
    }
}

impl Default for Heap {
    fn default() -> Heap {
        Heap::new()
    }
}

impl HeapState {
    fn collect(&mut self) {
        // Mark: every pinned object is a root; trace transitively. A
        // marked object short-circuits, which also terminates cycles.
        let mut worklist: Vec<NonNull<GcBox>> = self.roots.keys().copied().collect();
        while let Some(ptr) = worklist.pop() {
            let gc_box = unsafe { ptr.as_ref() };
            if gc_box.marked.get() {
                continue;
            }
            gc_box.marked.set(true);
            let object = unsafe { &*gc_box.object.get() };
            object.children(&mut |child: GcRef| worklist.push(child.0));
        }

        // Sweep: destroy everything unmarked, clear the mark on survivors.
        let before = self.objects.len();
        self.objects.retain(|&ptr| {
            let gc_box = unsafe { ptr.as_ref() };
            if gc_box.marked.get() {
                gc_box.marked.set(false);
                true
            } else {
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
                false
            }
        });

        let freed = before - self.objects.len();
        self.stats.collections += 1;
        self.stats.objects_freed += freed;
        self.stats.last_freed = freed;
        self.stats.live_objects = self.objects.len();
    }
}

impl Drop for HeapState {
    fn drop(&mut self) {
        for &ptr in &self.objects {
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
        self.objects.clear();
    }
}

/// A scoped collection root.
///
/// Holding a `Root` guarantees the referenced object, and everything it
/// transitively traces, survives collection. Dropping the last
/// overlapping root for an object removes it from the root set.
pub struct Root {
    heap: Heap,
    obj: GcRef,
}

impl Root {
    /// The rooted reference.
    pub fn get(&self) -> GcRef {
        self.obj
    }
}

impl std::ops::Deref for Root {
    type Target = GcRef;

    fn deref(&self) -> &GcRef {
        &self.obj
    }
}

impl Clone for Root {
    fn clone(&self) -> Root {
        self.heap.pin(self.obj);
        Root {
            heap: self.heap.clone(),
            obj: self.obj,
        }
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.heap.unpin(self.obj);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_heap_creation() {
        let heap = Heap::new();
        assert!(heap.is_empty());
        assert_eq!(heap.stats().collections, 0);
    }

    #[test]
    fn test_alloc_registers_objects() {
        let heap = Heap::new();
        heap.alloc_str("a");
        heap.alloc(HeapObject::List(Vec::new()));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_collect_frees_unrooted() {
        let heap = Heap::new();
        heap.alloc_str("garbage");
        heap.alloc_str("more garbage");
        heap.collect();
        assert_eq!(heap.len(), 0);
        assert_eq!(heap.stats().objects_freed, 2);
    }

    #[test]
    fn test_pinned_object_survives() {
        let heap = Heap::new();
        let kept = heap.alloc_str("kept");
        heap.alloc_str("dropped");
        heap.pin(kept);
        heap.collect();
        assert_eq!(heap.len(), 1);
        assert_eq!(kept.as_str(), Some("kept"));
        heap.unpin(kept);
        heap.collect();
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_trace_keeps_children_alive() {
        let heap = Heap::new();
        let name = heap.alloc_str("inner");
        let list = heap.alloc(HeapObject::List(vec![Value::Ref(name), Value::Int(1)]));
        let _root = heap.root(list);
        heap.collect();
        assert_eq!(heap.len(), 2);
        assert_eq!(name.as_str(), Some("inner"));
    }

    #[test]
    fn test_overlapping_roots() {
        let heap = Heap::new();
        let obj = heap.alloc_str("x");
        let first = heap.root(obj);
        let second = first.clone();
        drop(first);
        heap.collect();
        assert_eq!(heap.len(), 1);
        drop(second);
        heap.collect();
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_cycle_is_collected() {
        let heap = Heap::new();
        let a = heap.alloc(HeapObject::List(Vec::new()));
        let b = heap.alloc(HeapObject::List(vec![Value::Ref(a)]));
        match unsafe { a.object_mut() } {
            HeapObject::List(items) => items.push(Value::Ref(b)),
            _ => unreachable!(),
        }
        heap.collect();
        assert_eq!(heap.len(), 0, "reference cycles must not leak");
    }

    #[test]
    fn test_cycle_survives_while_pinned() {
        let heap = Heap::new();
        let a = heap.alloc(HeapObject::List(Vec::new()));
        let b = heap.alloc(HeapObject::List(vec![Value::Ref(a)]));
        match unsafe { a.object_mut() } {
            HeapObject::List(items) => items.push(Value::Ref(b)),
            _ => unreachable!(),
        }
        let root = heap.root(a);
        heap.collect();
        assert_eq!(heap.len(), 2);
        drop(root);
        heap.collect();
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_step_collects_at_threshold() {
        let heap = Heap::new();
        for i in 0..INITIAL_COLLECT_THRESHOLD {
            heap.alloc_str(format!("tmp{i}"));
        }
        heap.step();
        assert_eq!(heap.stats().collections, 1);
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_step_below_threshold_is_noop() {
        let heap = Heap::new();
        heap.alloc_str("a");
        heap.step();
        assert_eq!(heap.stats().collections, 0);
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_closure_traces_upvalues() {
        use super::super::object::Closure;

        let heap = Heap::new();
        let captured = heap.alloc_str("captured");
        let closure = heap.alloc(HeapObject::Closure(Closure {
            proto: 1,
            upvalues: vec![Value::Ref(captured), Value::Nil],
        }));
        let _root = heap.root(closure);
        heap.collect();
        assert_eq!(heap.len(), 2);
    }
}
