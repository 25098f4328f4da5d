//! Per-packet inspection context
//!
//! Detection components that need scratch state per in-flight packet
//! register once at startup for a stable slot id, then store and retrieve
//! their data through the context by that id. Registration finishes before
//! worker threads start, so the allocator is a plain monotonic counter.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Claim the next scratch-slot id. Call once per data type, at startup.
pub fn assign_context_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Number of slot ids handed out so far.
pub fn max_context_id() -> usize {
    NEXT_ID.load(Ordering::Relaxed)
}

/// Scratch environment for one in-flight packet.
///
/// Slots hold type-erased values keyed by registered id; accessors
/// downcast back to the registering type.
pub struct IpsContext {
    data: Vec<Option<Box<dyn Any + Send>>>,
    slot: usize,
}

impl IpsContext {
    /// `size` of 0 sizes the vector to the ids registered so far.
    pub fn new(size: usize) -> Self {
        let size = if size == 0 { max_context_id() } else { size };
        let mut data = Vec::with_capacity(size);
        data.resize_with(size, || None);
        Self { data, slot: 0 }
    }

    pub fn set_context_data<T: Any + Send>(&mut self, id: usize, value: T) {
        if id >= self.data.len() {
            self.data.resize_with(id + 1, || None);
        }
        self.data[id] = Some(Box::new(value));
    }

    pub fn get_context_data<T: Any + Send>(&self, id: usize) -> Option<&T> {
        self.data.get(id)?.as_ref()?.downcast_ref::<T>()
    }

    pub fn get_context_data_mut<T: Any + Send>(&mut self, id: usize) -> Option<&mut T> {
        self.data.get_mut(id)?.as_mut()?.downcast_mut::<T>()
    }

    /// Drop all slot contents before the context serves another packet.
    pub fn clear(&mut self) {
        for slot in &mut self.data {
            *slot = None;
        }
    }

    pub fn set_slot(&mut self, slot: usize) {
        self.slot = slot;
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}
