use crate::error::MemoryError;
use crate::linear::{LinearMemory, MemoryConfig};
use crate::region::{MemoryGrower, MemorySizeOracle};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct RegionInner {
    memory: LinearMemory,
    sbrk_ptr: AtomicUsize,
}

/// A linear memory shared by several execution contexts.
///
/// Cloning the handle attaches another context to the same memory. The
/// region also carries the shared program break word, which starts at zero
/// and is initialised lazily by the first context that uses it.
#[derive(Debug, Clone)]
pub struct SharedRegion {
    inner: Arc<RegionInner>,
}

impl SharedRegion {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        Ok(Self {
            inner: Arc::new(RegionInner {
                memory: LinearMemory::new(config)?,
                sbrk_ptr: AtomicUsize::new(0),
            }),
        })
    }

    pub fn memory(&self) -> &LinearMemory {
        &self.inner.memory
    }

    /// Word holding the break of every context attached to this region
    pub fn sbrk_slot(&self) -> &AtomicUsize {
        &self.inner.sbrk_ptr
    }

    /// Number of handles currently attached to this region
    pub fn attached(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn same_region(&self, other: &SharedRegion) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl MemorySizeOracle for SharedRegion {
    fn heap_size(&self) -> usize {
        self.inner.memory.heap_size()
    }
}

impl MemoryGrower for SharedRegion {
    fn resize_heap(&self, requested: usize) -> bool {
        self.inner.memory.resize_heap(requested)
    }
}

impl PartialEq for SharedRegion {
    fn eq(&self, other: &Self) -> bool {
        self.same_region(other)
    }
}

impl Eq for SharedRegion {}
