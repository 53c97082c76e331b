use crate::error::MemoryError;
use crate::region::{MemoryGrower, MemorySizeOracle};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{debug, warn};

/// WebAssembly page size; the linear memory always grows in whole pages.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// How far the memory grows past a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Grow to the smallest page count covering the request.
    Exact,
    /// Grow by at least `step_percent` of the current size, but never overgrow
    /// by more than `cap_bytes`. Keeps a run of small sbrk calls from growing
    /// the memory once per call.
    Geometric { step_percent: usize, cap_bytes: usize },
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy::Geometric {
            step_percent: 20,
            cap_bytes: 96 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub initial_pages: usize,
    pub maximum_pages: usize,
    pub growth: GrowthPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_pages: 256,   // 16 MiB
            maximum_pages: 32768, // 2 GiB
            growth: GrowthPolicy::default(),
        }
    }
}

impl MemoryConfig {
    pub fn with_initial_pages(mut self, pages: usize) -> Self {
        self.initial_pages = pages;
        self
    }

    pub fn with_maximum_pages(mut self, pages: usize) -> Self {
        self.maximum_pages = pages;
        self
    }

    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.maximum_pages < self.initial_pages {
            return Err(MemoryError::MaximumBelowInitial {
                initial: self.initial_pages,
                maximum: self.maximum_pages,
            });
        }
        if self.maximum_pages.checked_mul(WASM_PAGE_SIZE).is_none() {
            return Err(MemoryError::MaximumTooLarge(self.maximum_pages));
        }
        if let GrowthPolicy::Geometric { step_percent: 0, .. } = self.growth {
            return Err(MemoryError::InvalidGrowthStep(0));
        }
        Ok(())
    }
}

/// A growable, contiguous linear memory.
///
/// Only the size is modelled; the bytes themselves live wherever the host
/// maps them. The size is atomic so one memory can back several threads.
#[derive(Debug)]
pub struct LinearMemory {
    size: AtomicUsize,
    maximum: usize,
    growth: GrowthPolicy,
    grow_count: AtomicUsize,
    denied_count: AtomicUsize,
}

impl LinearMemory {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;

        debug!(
            "Linear memory: {} initial pages, {} maximum pages, {:?}",
            config.initial_pages, config.maximum_pages, config.growth
        );

        Ok(Self {
            size: AtomicUsize::new(config.initial_pages * WASM_PAGE_SIZE),
            maximum: config.maximum_pages * WASM_PAGE_SIZE,
            growth: config.growth,
            grow_count: AtomicUsize::new(0),
            denied_count: AtomicUsize::new(0),
        })
    }

    pub fn size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }

    pub fn pages(&self) -> usize {
        self.size() / WASM_PAGE_SIZE
    }

    pub fn maximum_size(&self) -> usize {
        self.maximum
    }

    /// Number of requests that actually grew the memory
    pub fn grow_count(&self) -> usize {
        self.grow_count.load(Ordering::Relaxed)
    }

    /// Number of requests refused because they exceed the maximum
    pub fn denied_count(&self) -> usize {
        self.denied_count.load(Ordering::Relaxed)
    }

    fn target_size(&self, current: usize, exact: usize) -> usize {
        match self.growth {
            GrowthPolicy::Exact => exact,
            GrowthPolicy::Geometric {
                step_percent,
                cap_bytes,
            } => {
                let overgrow = (current / 100).saturating_mul(step_percent).min(cap_bytes);
                let wanted = current
                    .saturating_add(overgrow)
                    .checked_next_multiple_of(WASM_PAGE_SIZE)
                    .unwrap_or(self.maximum);
                exact.max(wanted).min(self.maximum)
            }
        }
    }
}

impl MemorySizeOracle for LinearMemory {
    fn heap_size(&self) -> usize {
        self.size()
    }
}

impl MemoryGrower for LinearMemory {
    fn resize_heap(&self, requested: usize) -> bool {
        loop {
            let current = self.size.load(Ordering::SeqCst);
            if requested <= current {
                return true;
            }

            let exact = match requested.checked_next_multiple_of(WASM_PAGE_SIZE) {
                Some(exact) if exact <= self.maximum => exact,
                _ => {
                    self.denied_count.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Cannot grow linear memory to {:#x} bytes (maximum {:#x})",
                        requested, self.maximum
                    );
                    return false;
                }
            };

            let target = self.target_size(current, exact);

            // Another thread may grow concurrently; sizes only ever increase.
            if self
                .size
                .compare_exchange(current, target, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.grow_count.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Linear memory grown: {:#x} -> {:#x} (requested {:#x})",
                    current, target, requested
                );
                return true;
            }
        }
    }
}
