//! Linux futex syscalls
//!
//! Private futexes only: every word lives in this process.

use std::sync::atomic::AtomicU32;

/// FUTEX_WAIT: sleep if `*word == expected`
///
/// Returns on wake, on EAGAIN (value already changed) and on EINTR
/// (a notification signal arrived); callers re-check the word.
pub(super) fn futex_wait(word: &AtomicU32, expected: u32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// FUTEX_WAKE: wake up to `count` waiters
pub(super) fn futex_wake(word: &AtomicU32, count: i32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            count,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}
