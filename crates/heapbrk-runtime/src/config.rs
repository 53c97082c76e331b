use crate::error::RuntimeError;
use heapbrk_core::{is_aligned, SBRK_ALIGNMENT};
use heapbrk_memory::{MemoryConfig, WASM_PAGE_SIZE};

/// Static data and the stack occupy the first page.
pub const DEFAULT_HEAP_BASE: usize = WASM_PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Static heap boundary: the break starts here
    pub heap_base: usize,
    pub memory: MemoryConfig,
    /// Keep the break in a shared region so several contexts can grow it
    pub shared: bool,
    /// Record every break move in a memory profile
    pub profile: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            heap_base: DEFAULT_HEAP_BASE,
            memory: MemoryConfig::default(),
            shared: false,
            profile: false,
        }
    }
}

impl HeapConfig {
    pub fn with_heap_base(mut self, heap_base: usize) -> Self {
        self.heap_base = heap_base;
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn profiled(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        self.memory.validate()?;

        if self.heap_base == 0 {
            return Err(RuntimeError::ZeroHeapBase);
        }
        if !is_aligned(self.heap_base) {
            return Err(RuntimeError::MisalignedHeapBase {
                base: self.heap_base,
                alignment: SBRK_ALIGNMENT,
            });
        }

        // validate() above guarantees this cannot overflow.
        let size = self.memory.initial_pages * WASM_PAGE_SIZE;
        if self.heap_base > size {
            return Err(RuntimeError::HeapBaseOutsideMemory {
                base: self.heap_base,
                size,
            });
        }

        Ok(())
    }
}
