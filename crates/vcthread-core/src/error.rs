//! Error types for the vcthread runtime

use crate::id::CoreId;
use core::fmt;

/// Result type for runtime operations
pub type VcoreResult<T> = Result<T, VcoreError>;

/// Errors that can be reported to callers
///
/// Only recoverable conditions surface here. Resource exhaustion while
/// bringing up a core is fatal and aborts the process instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcoreError {
    /// More cores were requested than the pool can ever hold
    RequestImpossible { requested: usize, max: usize },

    /// Every core is already allocated
    NoCoresAvailable,

    /// Core id outside the arena
    InvalidCore(CoreId),

    /// Operation needs user-thread context
    NotInUthread,

    /// No collaborator installed for this operation
    Unsupported,

    /// A blocking call was abandoned by its alarm
    Timeout,

    /// Runtime not initialized
    NotInitialized,

    /// Runtime or registry already initialized
    AlreadyInitialized,

    /// Invalid configuration
    Config(&'static str),

    /// Memory mapping failed
    MemoryError(MemoryError),

    /// Backing thread setup failed
    CoreError(CoreError),

    /// Platform-specific error (errno)
    PlatformError(i32),
}

impl fmt::Display for VcoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcoreError::RequestImpossible { requested, max } => {
                write!(f, "requested {} vcores, only {} exist", requested, max)
            }
            VcoreError::NoCoresAvailable => write!(f, "no vcores available"),
            VcoreError::InvalidCore(id) => write!(f, "invalid vcore {}", id),
            VcoreError::NotInUthread => write!(f, "not running in a user thread"),
            VcoreError::Unsupported => write!(f, "operation not supported"),
            VcoreError::Timeout => write!(f, "operation timed out"),
            VcoreError::NotInitialized => write!(f, "runtime not initialized"),
            VcoreError::AlreadyInitialized => write!(f, "runtime already initialized"),
            VcoreError::Config(msg) => write!(f, "invalid config: {}", msg),
            VcoreError::MemoryError(e) => write!(f, "memory error: {}", e),
            VcoreError::CoreError(e) => write!(f, "vcore error: {}", e),
            VcoreError::PlatformError(code) => write!(f, "platform error: {}", code),
        }
    }
}

impl std::error::Error for VcoreError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// Requested size is zero or overflows
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::InvalidSize => write!(f, "invalid mapping size"),
        }
    }
}

impl From<MemoryError> for VcoreError {
    fn from(e: MemoryError) -> Self {
        VcoreError::MemoryError(e)
    }
}

/// Backing thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Failed to spawn the backing thread
    SpawnFailed,

    /// Failed to set thread affinity
    AffinityFailed,

    /// Signal handler or alternate stack setup failed
    SignalSetupFailed,

    /// TLS collaborator could not provide a region
    TlsAllocationFailed,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::SpawnFailed => write!(f, "failed to spawn vcore thread"),
            CoreError::AffinityFailed => write!(f, "failed to set thread affinity"),
            CoreError::SignalSetupFailed => write!(f, "signal setup failed"),
            CoreError::TlsAllocationFailed => write!(f, "TLS region allocation failed"),
        }
    }
}

impl From<CoreError> for VcoreError {
    fn from(e: CoreError) -> Self {
        VcoreError::CoreError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = VcoreError::RequestImpossible { requested: 9, max: 4 };
        assert_eq!(format!("{}", e), "requested 9 vcores, only 4 exist");

        let e = VcoreError::MemoryError(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: memory allocation failed");

        let e = VcoreError::InvalidCore(CoreId::new(7));
        assert_eq!(format!("{}", e), "invalid vcore 7");
    }

    #[test]
    fn test_error_conversion() {
        let err: VcoreError = CoreError::SpawnFailed.into();
        assert!(matches!(err, VcoreError::CoreError(CoreError::SpawnFailed)));

        let err: VcoreError = MemoryError::InvalidSize.into();
        assert!(matches!(err, VcoreError::MemoryError(MemoryError::InvalidSize)));
    }
}
