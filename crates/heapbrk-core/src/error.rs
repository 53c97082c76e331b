use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BrkError {
    #[error("address space overflow: break {current:#x} cannot move by {increment}")]
    AddressSpaceOverflow { current: usize, increment: isize },

    #[error("memory growth to {requested:#x} bytes denied (heap size {heap_size:#x})")]
    GrowthDenied { requested: usize, heap_size: usize },
}

impl BrkError {
    /// errno value reported through the C-style surface
    pub fn errno(&self) -> i32 {
        // Both kinds are an allocation failure to the caller.
        libc::ENOMEM
    }
}
