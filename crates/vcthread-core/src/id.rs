//! Virtual core identifier type

use core::fmt;

/// Index of a virtual core in the core arena
///
/// The maximum value (u32::MAX) is reserved as a sentinel for threads
/// that are not virtual cores (the original main thread before it
/// migrates, blocking-call backing threads, plain std threads).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoreId(u32);

impl CoreId {
    /// Sentinel value indicating "not on a virtual core"
    pub const NONE: CoreId = CoreId(u32::MAX);

    /// The core that adopts the original main thread
    pub const BOOT: CoreId = CoreId(0);

    #[inline]
    pub const fn new(id: u32) -> Self {
        CoreId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing the core arena
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    #[inline]
    pub const fn to_option(self) -> Option<CoreId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u32> for CoreId {
    #[inline]
    fn from(id: u32) -> Self {
        CoreId(id)
    }
}

impl From<usize> for CoreId {
    #[inline]
    fn from(id: usize) -> Self {
        debug_assert!(id < u32::MAX as usize);
        CoreId(id as u32)
    }
}

impl fmt::Debug for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "CoreId(NONE)")
        } else {
            write!(f, "CoreId({})", self.0)
        }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for CoreId {
    fn default() -> Self {
        CoreId::NONE
    }
}
