//! Per-OS-thread state for virtual cores
//!
//! A user thread can migrate between cores between any two calls, so
//! the accessors here are never inlined: each call re-reads the thread
//! pointer instead of reusing an address computed before a switch.

use std::cell::Cell;
use vcthread_core::CoreId;

thread_local! {
    /// Core backed by this OS thread, NONE on non-core threads
    static CORE_ID: Cell<u32> = const { Cell::new(CoreId::NONE.as_u32()) };
}

/// Bind the calling OS thread to `core`; done once at core startup
pub(crate) fn set_core_id(core: CoreId) {
    CORE_ID.with(|c| c.set(core.as_u32()));
    vcthread_core::kprint::set_core_id(core.as_u32());
}

/// Core the caller is running on, NONE if not on a core
#[inline(never)]
pub fn current_core() -> CoreId {
    CoreId::new(CORE_ID.with(|c| c.get()))
}

/// Core the caller is running on, or None
#[inline(never)]
pub fn try_current_core() -> Option<CoreId> {
    current_core().to_option()
}

/// Whether the calling OS thread backs a virtual core
#[inline(never)]
pub fn on_core() -> bool {
    current_core().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_thread_is_not_a_core() {
        assert!(!on_core());
        assert_eq!(try_current_core(), None);
    }

    #[test]
    fn test_bind() {
        std::thread::spawn(|| {
            set_core_id(CoreId::new(3));
            assert_eq!(current_core(), CoreId::new(3));
            assert!(on_core());
        })
        .join()
        .unwrap();
        assert!(!on_core());
    }
}
