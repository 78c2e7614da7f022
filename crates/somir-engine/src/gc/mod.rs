//! Mark-and-sweep heap shared by the compiler and the VM.
//!
//! The compiler allocates string constants here while a chunk is being
//! assembled; the chunk's constants vector is itself a heap object,
//! pinned for the chunk's lifetime so collections at safe points cannot
//! reclaim anything it reaches.

pub mod heap;
pub mod object;

pub use heap::{GcStats, Heap, Root};
pub use object::{Closure, GcRef, HeapObject};
