//! Memory named by system call arguments.
//!
//! There is one address space, so a process pointer is used directly. The
//! handlers check for null and bound lengths; the callers' SAFETY notes
//! cover the rest.

/// Store an exit status through a process-supplied pointer.
///
/// # Safety
/// `addr` must be non-null and point at four writable bytes.
pub unsafe fn store_i32(addr: u64, value: i32) {
    (addr as *mut i32).write_unaligned(value);
}

/// Borrow `len` bytes starting at `addr`.
///
/// # Safety
/// `addr` must be non-null and the range readable for the returned
/// lifetime.
pub unsafe fn bytes<'a>(addr: u64, len: usize) -> &'a [u8] {
    core::slice::from_raw_parts(addr as *const u8, len)
}

/// Mutable version of [`bytes`].
///
/// # Safety
/// As for [`bytes`], and nothing else may reference the range.
pub unsafe fn bytes_mut<'a>(addr: u64, len: usize) -> &'a mut [u8] {
    core::slice::from_raw_parts_mut(addr as *mut u8, len)
}
