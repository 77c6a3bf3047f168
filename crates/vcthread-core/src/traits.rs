//! Architecture and collaborator traits
//!
//! `ArchContext` is implemented once per target architecture in
//! `vcthread-runtime::arch`. The remaining traits describe subsystems the
//! runtime calls into but does not implement itself; applications install
//! implementations before the runtime starts.

use crate::context::Context;
use crate::error::VcoreResult;
use crate::id::CoreId;
use std::time::Instant;

/// Architecture-specific context operations
///
/// # Safety
///
/// Implementations must save and restore every callee-saved register of
/// the platform ABI, and `init_context` must produce a context that calls
/// `entry(arg)` with a correctly aligned stack.
pub unsafe trait ArchContext {
    /// Prepare `ctx` so that restoring it calls `entry(arg)` on the stack
    /// ending at `stack_top`.
    fn init_context(
        ctx: &mut Context,
        stack_top: *mut u8,
        entry: extern "C" fn(usize) -> !,
        arg: usize,
    );

    /// Save the caller into `old` and resume `new`
    ///
    /// Returns when something later restores `old`.
    ///
    /// # Safety
    ///
    /// Both pointers must be valid; `new` must hold a live context whose
    /// stack is not in use by anyone else.
    unsafe fn switch(old: *mut Context, new: *const Context);

    /// Resume `ctx`, abandoning the current stack
    ///
    /// # Safety
    ///
    /// Same as `switch` for `new`.
    unsafe fn restore(ctx: *const Context) -> !;
}

/// Opaque handle to a TLS region owned by the TLS collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlsRegion(usize);

impl TlsRegion {
    /// No region: the thread uses its core's thread-locals
    pub const NONE: TlsRegion = TlsRegion(0);

    #[inline]
    pub const fn new(raw: usize) -> Self {
        TlsRegion(raw)
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Thread-local storage region allocator
pub trait TlsAllocator: Send + Sync {
    /// Allocate a region for a vcore or a user thread
    fn allocate_region(&self) -> VcoreResult<TlsRegion>;

    fn free_region(&self, region: TlsRegion);

    /// Install `region` as the active TLS on `core`
    fn set_active(&self, region: TlsRegion, core: CoreId);

    /// Base address of the TLS active on the calling thread
    fn current_base(&self) -> usize;
}

/// Key into per-thread dynamic storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DtlsKey(pub u32);

/// Per-thread dynamic storage data, owned by the storage collaborator
/// and referenced from the user thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DtlsData(pub usize);

impl DtlsData {
    pub const EMPTY: DtlsData = DtlsData(0);

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Per-thread dynamic storage slots
pub trait DynamicStorage: Send + Sync {
    fn create_key(&self, destructor: Option<fn(usize)>) -> DtlsKey;

    fn delete_key(&self, key: DtlsKey);

    /// Store `value` under `key` in `data`, creating the data on first use
    fn set(&self, data: &mut DtlsData, key: DtlsKey, value: usize);

    fn get(&self, data: DtlsData, key: DtlsKey) -> Option<usize>;

    /// Run destructors and release everything held in `data`
    fn destroy_all(&self, data: DtlsData);
}

/// Runs calls that may block in the kernel off the virtual cores
pub trait BlockingForwarder: Send + Sync {
    /// Run `job` on a backing thread; `job` posts its own completion event
    fn forward(&self, job: Box<dyn FnOnce() + Send>);
}

/// Handle to an armed alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmId(pub u64);

/// Timer service used for blocking-call timeouts
pub trait AlarmService: Send + Sync {
    /// Call `callback` at or after `deadline`, from a helper thread
    fn arm(&self, deadline: Instant, callback: Box<dyn FnOnce() + Send>) -> AlarmId;

    /// Cancel an alarm; returns false if it already fired
    fn disarm(&self, id: AlarmId) -> bool;
}
