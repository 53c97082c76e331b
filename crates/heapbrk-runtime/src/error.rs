use heapbrk_memory::MemoryError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("memory configuration error: {0}")]
    Memory(#[from] MemoryError),

    #[error("heap base must not be zero")]
    ZeroHeapBase,

    #[error("heap base {base:#x} is not {alignment}-byte aligned")]
    MisalignedHeapBase { base: usize, alignment: usize },

    #[error("heap base {base:#x} is outside the initial memory of {size:#x} bytes")]
    HeapBaseOutsideMemory { base: usize, size: usize },

    #[error("heap is not shared, no other module can attach to it")]
    NotShared,
}
