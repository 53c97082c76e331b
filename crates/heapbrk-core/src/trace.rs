use core::sync::atomic::{AtomicUsize, Ordering};
use log::trace;

/// Receives every committed break move. Purely observational.
pub trait BreakObserver: Send + Sync {
    fn on_sbrk_grow(&self, old: usize, new: usize);
}

impl<F> BreakObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_sbrk_grow(&self, old: usize, new: usize) {
        self(old, new)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub moves: usize,
    pub peak_break: usize,
    pub bytes_grown: usize,
    pub bytes_shrunk: usize,
}

impl ProfileSnapshot {
    pub fn net_growth(&self) -> isize {
        self.bytes_grown.wrapping_sub(self.bytes_shrunk) as isize
    }
}

/// Memory profiler fed by the break manager.
#[derive(Debug, Default)]
pub struct MemProfile {
    moves: AtomicUsize,
    peak_break: AtomicUsize,
    bytes_grown: AtomicUsize,
    bytes_shrunk: AtomicUsize,
}

impl MemProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            moves: self.moves.load(Ordering::Relaxed),
            peak_break: self.peak_break.load(Ordering::Relaxed),
            bytes_grown: self.bytes_grown.load(Ordering::Relaxed),
            bytes_shrunk: self.bytes_shrunk.load(Ordering::Relaxed),
        }
    }
}

impl BreakObserver for MemProfile {
    fn on_sbrk_grow(&self, old: usize, new: usize) {
        trace!("memprof: sbrk {:#x} -> {:#x}", old, new);

        self.moves.fetch_add(1, Ordering::Relaxed);
        self.peak_break.fetch_max(new, Ordering::Relaxed);
        if new >= old {
            self.bytes_grown.fetch_add(new - old, Ordering::Relaxed);
        } else {
            self.bytes_shrunk.fetch_add(old - new, Ordering::Relaxed);
        }
    }
}
