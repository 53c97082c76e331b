//! C-style error reporting for `sbrk`/`brk`.
//!
//! Failures are signalled with a sentinel return value plus a per-thread
//! error indicator, the way libc reports them.

use std::cell::Cell;

pub use libc::ENOMEM;

/// Returned by `sbrk` on failure: `(void*)-1`.
pub const SBRK_FAILED: usize = usize::MAX;

thread_local! {
    static ERRNO: Cell<i32> = const { Cell::new(0) };
}

/// Last error recorded on this thread, 0 if none
pub fn errno() -> i32 {
    ERRNO.with(Cell::get)
}

pub fn set_errno(code: i32) {
    ERRNO.with(|e| e.set(code));
}

pub fn clear_errno() {
    set_errno(0);
}
