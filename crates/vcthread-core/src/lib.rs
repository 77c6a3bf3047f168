//! # vcthread-core
//!
//! Core types for the vcthread (virtual-core thread) runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Everything that touches the kernel (futexes, signals, stacks, context
//! switching) lives in `vcthread-runtime`.
//!
//! ## Modules
//!
//! - `id` - Virtual core identifier type
//! - `state` - Virtual core and user thread state enums
//! - `context` - Saved hardware context layout (repr(C), per architecture)
//! - `qlock` - MCS queue lock and the data-owning `QueueMutex`
//! - `mailbox` - Per-core event mailbox with enable/pending bits
//! - `error` - Error types
//! - `traits` - Architecture and collaborator traits
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod context;
pub mod qlock;
pub mod mailbox;
pub mod error;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::CoreId;
pub use state::{VcoreState, UthreadState};
pub use context::Context;
pub use qlock::{DisseminationBarrier, QueueLock, QueueLockNode, QueueMutex};
pub use mailbox::{EventEnvelope, EventPayload, EventType, Mailbox};
pub use error::{VcoreError, VcoreResult};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_size, env_is_set};

/// Constants for memory layout
pub mod constants {
    /// Hard upper bound on virtual cores, whatever the configuration says
    pub const MAX_VCORES: usize = 64;

    /// Guard page size (4 KB)
    pub const GUARD_SIZE: usize = 4096;

    /// Page size assumed for stack rounding
    pub const PAGE_SIZE: usize = 4096;

    /// Smallest stack the runtime will map for any context
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Cache line size for alignment
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Number of slots in the event handler table
    pub const MAX_NR_EVENT: usize = 4;
}
