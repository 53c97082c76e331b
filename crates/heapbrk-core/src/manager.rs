use crate::align::align_increment;
use crate::errno::{set_errno, SBRK_FAILED};
use crate::error::BrkError;
use crate::locator::{BreakCell, BreakLocator, ExclusiveLocator};
use crate::trace::BreakObserver;
use heapbrk_memory::{MemoryGrower, MemorySizeOracle};
use log::{debug, trace, warn};
use std::sync::Arc;

/// Owns the program break of one heap.
///
/// `L` decides where the break is stored (and with it whether other contexts
/// may race on it), `M` is the backing linear memory.
pub struct BreakPointerManager<L, M> {
    locator: L,
    memory: M,
    observer: Option<Arc<dyn BreakObserver>>,
}

impl<L, M> BreakPointerManager<L, M>
where
    L: BreakLocator,
    M: MemorySizeOracle + MemoryGrower,
{
    pub fn new(locator: L, memory: M) -> Self {
        Self {
            locator,
            memory,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn BreakObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn current_break(&self) -> usize {
        self.locator.locate().read()
    }

    /// Move the break by `increment` bytes and return the previous break.
    ///
    /// The increment is first rounded up to [`crate::SBRK_ALIGNMENT`]. A zero
    /// increment queries the break. On error the break is left untouched.
    ///
    /// When the break is shared this is a lock-free compare-and-swap loop:
    /// a thread only retries because some other thread committed, so the heap
    /// as a whole always makes progress, though a single thread may retry
    /// indefinitely under continuous contention.
    pub fn grow(&self, increment: isize) -> Result<usize, BrkError> {
        let aligned = align_increment(increment);

        loop {
            let cell = self.locator.locate();
            let old_brk = cell.read();
            let new_brk = old_brk.wrapping_add(aligned);

            // Wrapping past either end of the address space.
            let wrapped = (increment > 0 && new_brk <= old_brk)
                || (increment < 0 && new_brk > old_brk);
            if wrapped {
                warn!(
                    "sbrk: {} bytes from {:#x} overflows the address space",
                    aligned as isize, old_brk
                );
                return Err(BrkError::AddressSpaceOverflow {
                    current: old_brk,
                    increment: aligned as isize,
                });
            }

            let heap_size = self.memory.heap_size();
            if new_brk > heap_size {
                debug!(
                    "sbrk: break {:#x} past heap size {:#x}, growing memory",
                    new_brk, heap_size
                );
                if !self.memory.resize_heap(new_brk) {
                    warn!("sbrk: memory growth to {:#x} denied", new_brk);
                    return Err(BrkError::GrowthDenied {
                        requested: new_brk,
                        heap_size,
                    });
                }
            }

            if !cell.commit(old_brk, new_brk) {
                debug!("sbrk: break moved from {:#x} concurrently, retrying", old_brk);
                core::hint::spin_loop();
                continue;
            }

            if new_brk != old_brk {
                trace!("sbrk: {:#x} -> {:#x}", old_brk, new_brk);
                if let Some(observer) = &self.observer {
                    observer.on_sbrk_grow(old_brk, new_brk);
                }
            }

            return Ok(old_brk);
        }
    }

    /// C-style `sbrk`: previous break, or [`SBRK_FAILED`] with errno set to
    /// `ENOMEM`.
    pub fn sbrk(&self, increment: isize) -> usize {
        match self.grow(increment) {
            Ok(old_brk) => old_brk,
            Err(e) => {
                set_errno(e.errno());
                SBRK_FAILED
            }
        }
    }
}

impl<L, M> BreakPointerManager<L, M>
where
    L: ExclusiveLocator,
    M: MemorySizeOracle + MemoryGrower,
{
    /// Move the break to `addr` (rounded up to the sbrk alignment relative to
    /// the current break).
    pub fn set_break(&self, addr: usize) -> Result<(), BrkError> {
        let last = self.grow(0)?;
        self.grow(addr.wrapping_sub(last) as isize).map(|_| ())
    }

    /// C-style `brk`: 0 on success, -1 with errno set to `ENOMEM`.
    pub fn brk(&self, addr: usize) -> i32 {
        match self.set_break(addr) {
            Ok(()) => 0,
            Err(e) => {
                set_errno(e.errno());
                -1
            }
        }
    }
}
