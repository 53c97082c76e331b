//! Where the program break lives.
//!
//! A module that owns its memory keeps the break in a plain local cell. When
//! several execution contexts share one linear memory the break is a word in
//! the shared region, initialised by whichever context touches it
//! first. The choice is made once, by picking the locator type.

use core::cell::Cell;
use core::sync::atomic::{AtomicUsize, Ordering};
use heapbrk_memory::SharedRegion;
use log::debug;

/// Storage holding the current break.
pub trait BreakCell {
    fn read(&self) -> usize;

    /// Publish `new` if the break still holds `current`.
    ///
    /// Returns `false` when another writer moved the break first; the caller
    /// must re-read and start over.
    fn commit(&self, current: usize, new: usize) -> bool;
}

impl BreakCell for Cell<usize> {
    fn read(&self) -> usize {
        self.get()
    }

    fn commit(&self, _current: usize, new: usize) -> bool {
        // Cell is !Sync, nobody else can have moved it.
        self.set(new);
        true
    }
}

impl BreakCell for AtomicUsize {
    fn read(&self) -> usize {
        AtomicUsize::load(self, Ordering::SeqCst)
    }

    fn commit(&self, current: usize, new: usize) -> bool {
        self.compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Resolves the authoritative break cell. Never fails.
pub trait BreakLocator {
    type Storage: BreakCell + ?Sized;

    /// Static heap boundary: where the heap starts
    fn heap_base(&self) -> usize;

    fn locate(&self) -> &Self::Storage;
}

/// Locators whose break no other context can move.
///
/// Only these support `brk`, which reads the break and then moves it in two
/// separate steps.
pub trait ExclusiveLocator: BreakLocator {}

/// Break owned by a single module.
#[derive(Debug)]
pub struct LocalBreak {
    heap_base: usize,
    value: Cell<usize>,
}

impl LocalBreak {
    pub fn new(heap_base: usize) -> Self {
        Self {
            heap_base,
            value: Cell::new(heap_base),
        }
    }

    /// A break whose cell has not been set up yet, as seen by code that runs
    /// during relocatable-module startup before the heap base is known to the
    /// module. The first `locate` repairs it.
    pub fn unset(heap_base: usize) -> Self {
        Self {
            heap_base,
            value: Cell::new(0),
        }
    }
}

impl BreakLocator for LocalBreak {
    type Storage = Cell<usize>;

    fn heap_base(&self) -> usize {
        self.heap_base
    }

    fn locate(&self) -> &Cell<usize> {
        // Sharp edge: this papers over a startup ordering problem outside our
        // control. It only helps if the heap base itself is already valid.
        if self.value.get() == 0 {
            debug!(
                "Local break unset, resetting to heap base {:#x}",
                self.heap_base
            );
            self.value.set(self.heap_base);
        }
        &self.value
    }
}

impl ExclusiveLocator for LocalBreak {}

/// Break stored in the [`SharedRegion::sbrk_slot`] word of a shared region.
#[derive(Debug, Clone)]
pub struct SharedBreak {
    heap_base: usize,
    region: SharedRegion,
}

impl SharedBreak {
    pub fn new(region: SharedRegion, heap_base: usize) -> Self {
        Self { heap_base, region }
    }
}

impl BreakLocator for SharedBreak {
    type Storage = AtomicUsize;

    fn heap_base(&self) -> usize {
        self.heap_base
    }

    fn locate(&self) -> &AtomicUsize {
        let slot = self.region.sbrk_slot();
        // First context to see zero installs the heap base; everyone else
        // finds it already set.
        if slot
            .compare_exchange(0, self.heap_base, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!("Shared break initialized to {:#x}", self.heap_base);
        }
        slot
    }
}
