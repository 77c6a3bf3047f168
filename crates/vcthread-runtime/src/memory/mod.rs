//! Stack mappings
//!
//! Every stack the runtime runs on (transition stacks, signal stacks,
//! user thread stacks, the boot parking stack) is an anonymous mapping
//! with a PROT_NONE guard page below it, so an overflow faults instead
//! of corrupting a neighbour.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
    } else {
        compile_error!("Unsupported platform");
    }
}

use vcthread_core::constants::{GUARD_SIZE, PAGE_SIZE};

/// An owned, guarded stack mapping
///
/// Layout, low to high: `[guard][usable ...]`. Stacks grow down from
/// `top()`.
pub struct Stack {
    base: *mut u8,
    mapped: usize,
}

// Safety: the mapping is plain memory owned by this value
unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

impl Stack {
    /// Lowest usable address
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.add(GUARD_SIZE) }
    }

    /// One past the highest usable address
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.mapped) }
    }

    /// Usable bytes, excluding the guard page
    #[inline]
    pub fn size(&self) -> usize {
        self.mapped - GUARD_SIZE
    }

    /// Whether `addr` lies in the usable part of this stack
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom() as usize && addr < self.top() as usize
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("size", &self.size())
            .finish()
    }
}

#[inline]
fn round_to_pages(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1).map(|s| s & !(PAGE_SIZE - 1))
}

/// Stack for a user thread, handed to `init_uthread_context`
pub type UthreadStack = Stack;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_geometry() {
        let stack = Stack::new(10_000).unwrap();
        assert_eq!(stack.size(), 12 * 1024);
        assert_eq!(stack.top() as usize - stack.bottom() as usize, stack.size());
        assert_eq!(stack.top() as usize % PAGE_SIZE, 0);
        assert!(stack.contains(stack.bottom() as usize));
        assert!(!stack.contains(stack.top() as usize));
    }

    #[test]
    fn test_stack_writable() {
        let stack = Stack::new(16 * 1024).unwrap();
        unsafe {
            let p = stack.top().sub(8) as *mut u64;
            p.write(0xdead_beef);
            assert_eq!(p.read(), 0xdead_beef);
            stack.bottom().write(1);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(Stack::new(0).is_err());
        assert!(Stack::new(usize::MAX).is_err());
    }
}
