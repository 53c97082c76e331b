/// Minimum alignment of every address handed out by sbrk: the alignment of
/// `max_align_t` on the targets we build for.
pub const SBRK_ALIGNMENT: usize = 16;

/// Round a signed sbrk increment up to the next multiple of [`SBRK_ALIGNMENT`].
///
/// The arithmetic is two's complement at register width, so negative
/// increments round towards zero: `-5` becomes `0`, `-16` stays `-16`.
///
/// # Examples
///
/// ```rust
/// use heapbrk_core::align_increment;
///
/// assert_eq!(align_increment(5), 16);
/// assert_eq!(align_increment(0), 0);
/// assert_eq!(align_increment(-16) as isize, -16);
/// ```
pub const fn align_increment(increment: isize) -> usize {
    (increment as usize).wrapping_add(SBRK_ALIGNMENT - 1) & !(SBRK_ALIGNMENT - 1)
}

pub const fn is_aligned(addr: usize) -> bool {
    addr & (SBRK_ALIGNMENT - 1) == 0
}
