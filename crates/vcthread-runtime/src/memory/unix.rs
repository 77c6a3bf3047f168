//! Unix stack mappings using mmap

use super::{round_to_pages, Stack};
use vcthread_core::constants::GUARD_SIZE;
use vcthread_core::error::{MemoryError, VcoreResult};

impl Stack {
    /// Map a stack with at least `size` usable bytes plus a guard page
    pub fn new(size: usize) -> VcoreResult<Stack> {
        if size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let usable = round_to_pages(size).ok_or(MemoryError::InvalidSize)?;
        let mapped = usable
            .checked_add(GUARD_SIZE)
            .ok_or(MemoryError::InvalidSize)?;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed.into());
        }

        // Guard page at the low end; overflow faults here
        let ret = unsafe { libc::mprotect(base, GUARD_SIZE, libc::PROT_NONE) };
        if ret != 0 {
            unsafe { libc::munmap(base, mapped) };
            return Err(MemoryError::ProtectionFailed.into());
        }

        Ok(Stack {
            base: base as *mut u8,
            mapped,
        })
    }

    /// A stack of the configured default user thread size
    pub fn with_default_size() -> VcoreResult<Stack> {
        Stack::new(crate::vcore::config().uthread_stack_size)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.mapped);
        }
    }
}
