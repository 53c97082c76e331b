/// Reports how many bytes of the backing region are currently addressable.
pub trait MemorySizeOracle {
    /// Current size of the backing region in bytes
    fn heap_size(&self) -> usize;
}

/// Authority able to extend the backing region.
pub trait MemoryGrower {
    /// Grow the backing region so that it is at least `requested` bytes.
    ///
    /// Returns `false` when the region cannot be extended that far. A request
    /// that is already satisfied succeeds without growing.
    fn resize_heap(&self, requested: usize) -> bool;
}
