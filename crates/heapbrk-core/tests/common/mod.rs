// ---------- Test helpers ----------
#![allow(dead_code)]

use heapbrk_memory::{MemoryGrower, MemorySizeOracle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Backing memory that records every growth request.
pub struct RecordingMemory {
    size: AtomicUsize,
    allow: AtomicBool,
    requests: Mutex<Vec<usize>>,
}

impl RecordingMemory {
    pub fn new(size: usize) -> Self {
        Self {
            size: AtomicUsize::new(size),
            allow: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Refuse every future growth request.
    pub fn deny(&self) {
        self.allow.store(false, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<usize> {
        self.requests.lock().unwrap().clone()
    }
}

impl MemorySizeOracle for RecordingMemory {
    fn heap_size(&self) -> usize {
        self.size.load(Ordering::SeqCst)
    }
}

impl MemoryGrower for RecordingMemory {
    fn resize_heap(&self, requested: usize) -> bool {
        self.requests.lock().unwrap().push(requested);
        if !self.allow.load(Ordering::SeqCst) {
            return false;
        }
        self.size.fetch_max(requested, Ordering::SeqCst);
        true
    }
}
