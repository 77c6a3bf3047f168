//! User threads
//!
//! A `UserThread` is caller-owned storage for one lightweight thread:
//! its saved registers, a single-use yield continuation, a notification
//! mask and its collaborator-owned storage. A two-level scheduler embeds
//! it at offset 0 of its own thread type and drives it through the
//! operations here plus a `SchedOps` table.
//!
//! ```text
//! NOT_RUNNING --run--> RUNNING --yield--> NOT_RUNNING
//! RUNNING --hijack--> HIJACKED
//! ```
//!
//! Every core has at most one current user thread. Yielding always goes
//! through vcore context: the thread's registers are saved, the core
//! moves to its transition stack and runs the continuation there, then
//! falls through to `uthread_vcore_entry`.

use crate::arch;
use crate::blocking::BlockingCall;
use crate::collab;
use crate::event;
use crate::memory::UthreadStack;
use crate::signal::SignalStack;
use crate::sync;
use crate::tls;
use crate::vcore::{self, VirtualCore};
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU8, Ordering};
use std::sync::OnceLock;
use vcthread_core::constants::MAX_VCORES;
use vcthread_core::error::{VcoreError, VcoreResult};
use vcthread_core::{fatal, kwarn};
use vcthread_core::traits::{DtlsData, DtlsKey, TlsRegion};
use vcthread_core::{Context, CoreId, UthreadState};

/// Flag: the thread must not be interrupted by a notification
pub const NO_INTERRUPT: u32 = 1 << 0;

/// What a yielding thread wants done once it is off its stack
///
/// Runs exactly once, in vcore context on the core's transition stack,
/// with the yielding thread as argument.
pub enum Continuation {
    Static(fn(UthreadPtr)),
    Boxed(Box<dyn FnOnce(UthreadPtr) + Send>),
}

impl Continuation {
    fn run(self, ut: UthreadPtr) {
        match self {
            Continuation::Static(f) => f(ut),
            Continuation::Boxed(f) => f(ut),
        }
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Static(_) => f.write_str("Continuation::Static"),
            Continuation::Boxed(_) => f.write_str("Continuation::Boxed"),
        }
    }
}

/// Storage for one user thread
#[repr(C)]
pub struct UserThread {
    ctx: UnsafeCell<Context>,
    continuation: Cell<Option<Continuation>>,
    disable_depth: AtomicU32,
    flags: AtomicU32,
    state: AtomicU8,
    tls: Cell<TlsRegion>,
    dtls: Cell<DtlsData>,
    /// In-flight blocking call, null when none
    pub(crate) sysc: AtomicPtr<BlockingCall>,
    sigstack: Cell<Option<SignalStack>>,
    entry: Cell<Option<fn()>>,
}

// Safety: a user thread is only touched by the core it is current on, or
// by whoever holds it while it is NOT_RUNNING
unsafe impl Send for UserThread {}
unsafe impl Sync for UserThread {}

impl UserThread {
    pub const fn new() -> Self {
        Self {
            ctx: UnsafeCell::new(Context::new()),
            continuation: Cell::new(None),
            disable_depth: AtomicU32::new(0),
            flags: AtomicU32::new(0),
            state: AtomicU8::new(UthreadState::NotRunning as u8),
            tls: Cell::new(TlsRegion::NONE),
            dtls: Cell::new(DtlsData::EMPTY),
            sysc: AtomicPtr::new(ptr::null_mut()),
            sigstack: Cell::new(None),
            entry: Cell::new(None),
        }
    }

    #[inline]
    pub fn state(&self) -> UthreadState {
        UthreadState::from(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    fn set_state(&self, next: UthreadState) {
        debug_assert!(
            self.state().can_transition_to(next),
            "illegal user thread transition {:?} -> {:?}",
            self.state(),
            next
        );
        self.state.store(next as u8, Ordering::SeqCst);
    }

    #[inline]
    pub fn disable_depth(&self) -> u32 {
        self.disable_depth.load(Ordering::SeqCst)
    }

    /// Whether notifications are masked for this thread
    #[inline]
    pub fn is_masked(&self) -> bool {
        self.disable_depth.load(Ordering::SeqCst) > 0
            || self.flags.load(Ordering::SeqCst) & NO_INTERRUPT != 0
    }

    #[inline]
    pub fn tls_region(&self) -> TlsRegion {
        self.tls.get()
    }

    /// Whether a blocking call issued by this thread is in flight
    #[inline]
    pub fn has_blocking_call(&self) -> bool {
        !self.sysc.load(Ordering::Acquire).is_null()
    }

    /// Saved stack pointer, for debugging
    pub fn saved_stack_pointer(&self) -> usize {
        unsafe { (*self.ctx.get()).stack_pointer() }
    }

    #[inline]
    pub fn as_ptr(&self) -> UthreadPtr {
        UthreadPtr::new(self)
    }

    fn install_tls(&self, core: CoreId) {
        if let Some(alloc) = collab::tls_allocator() {
            let region = self.tls.get();
            if !region.is_none() {
                alloc.set_active(region, core);
            }
        }
    }
}

impl Default for UserThread {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UserThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserThread")
            .field("state", &self.state())
            .field("disable_depth", &self.disable_depth())
            .field("tls", &self.tls.get())
            .finish()
    }
}

/// Pointer to a live `UserThread`
///
/// Copyable and sendable so schedulers can queue threads across cores.
/// Whoever creates one promises the thread outlives every use.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UthreadPtr(NonNull<UserThread>);

// Safety: see UserThread
unsafe impl Send for UthreadPtr {}
unsafe impl Sync for UthreadPtr {}

impl UthreadPtr {
    #[inline]
    pub fn new(ut: &UserThread) -> Self {
        UthreadPtr(NonNull::from(ut))
    }

    #[inline]
    pub fn from_raw(ptr: *mut UserThread) -> Option<Self> {
        NonNull::new(ptr).map(UthreadPtr)
    }

    #[inline]
    pub fn as_raw(self) -> *mut UserThread {
        self.0.as_ptr()
    }

    /// # Safety
    ///
    /// The thread must still be alive for `'a`.
    #[inline]
    pub unsafe fn as_ref<'a>(self) -> &'a UserThread {
        &*self.0.as_ptr()
    }

    #[inline]
    pub(crate) fn get(self) -> &'static UserThread {
        // Safety: runtime-internal uses only happen while the thread is live
        unsafe { &*self.0.as_ptr() }
    }
}

impl fmt::Debug for UthreadPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UthreadPtr({:p})", self.0)
    }
}

// ============================================================================
// Scheduler operations
// ============================================================================

/// Operations a two-level scheduler provides
pub trait SchedOps: Sync {
    /// Called on a core in vcore context once its mailbox is drained
    fn sched_entry(&self) -> !;

    /// `ut` may run again
    fn thread_runnable(&self, ut: UthreadPtr);

    /// `ut` yielded but wants to keep running
    fn thread_paused(&self, ut: UthreadPtr) {
        self.thread_runnable(ut);
    }

    /// `ut` is blocked on `call`; its completion makes it runnable
    fn thread_blockon(&self, _ut: UthreadPtr, _call: &BlockingCall) {}

    /// `ut` was blocked by code outside the scheduler
    fn thread_has_blocked(&self, _ut: UthreadPtr, _reason: u32) {}

    /// `ut` returned from its entry function
    fn thread_exited(&self, _ut: UthreadPtr) {}

    /// A preemption of the current core is imminent
    fn preempt_pending(&self) {}

    /// Create and start a thread running `entry(data)`
    fn spawn(&self, _entry: fn(usize), _data: usize) -> VcoreResult<UthreadPtr> {
        Err(VcoreError::Unsupported)
    }
}

/// Used until a scheduler registers: resume the current thread if any,
/// else give the core back
struct DefaultOps;

impl SchedOps for DefaultOps {
    fn sched_entry(&self) -> ! {
        if current_uthread().is_some_and(|ut| ut.get().state() == UthreadState::Running) {
            run_current_uthread();
        }
        vcore::vcore_yield()
    }

    fn thread_runnable(&self, ut: UthreadPtr) {
        fatal!("{:?} became runnable but no scheduler is registered", ut);
    }
}

static DEFAULT_OPS: DefaultOps = DefaultOps;
static SCHED_OPS: OnceLock<&'static dyn SchedOps> = OnceLock::new();

/// Register the two-level scheduler; only the first call wins
pub fn set_sched_ops(ops: &'static dyn SchedOps) -> VcoreResult<()> {
    SCHED_OPS
        .set(ops)
        .map_err(|_| VcoreError::AlreadyInitialized)
}

#[inline]
pub fn sched_ops() -> &'static dyn SchedOps {
    match SCHED_OPS.get() {
        Some(ops) => *ops,
        None => &DEFAULT_OPS,
    }
}

// ============================================================================
// Current thread
// ============================================================================

static CURRENT: [AtomicPtr<UserThread>; MAX_VCORES] =
    [const { AtomicPtr::new(ptr::null_mut()) }; MAX_VCORES];

/// The user thread current on the caller's core
#[inline(never)]
pub fn current_uthread() -> Option<UthreadPtr> {
    let core = tls::try_current_core()?;
    let slot = CURRENT.get(core.as_usize())?;
    UthreadPtr::from_raw(slot.load(Ordering::SeqCst))
}

pub(crate) fn set_current(core: CoreId, ut: Option<UthreadPtr>) {
    if let Some(slot) = CURRENT.get(core.as_usize()) {
        let raw = ut.map_or(ptr::null_mut(), UthreadPtr::as_raw);
        slot.store(raw, Ordering::SeqCst);
    }
}

fn current_or_die(what: &str) -> UthreadPtr {
    match current_uthread() {
        Some(ut) => ut,
        None => fatal!("{} called outside a user thread", what),
    }
}

fn core_or_die(what: &str) -> &'static VirtualCore {
    match vcore::current_vcore() {
        Some(core) => core,
        None => fatal!("{} called off a virtual core", what),
    }
}

/// Leave vcore context on whichever core the caller resumed on
#[inline(never)]
fn resumed() {
    if let Some(core) = vcore::current_vcore() {
        core.set_in_vcore_context(false);
    }
}

// ============================================================================
// Notification masking
// ============================================================================

#[inline]
fn disable_on(ut: &UserThread) {
    ut.disable_depth.fetch_add(1, Ordering::SeqCst);
    ut.flags.fetch_or(NO_INTERRUPT, Ordering::SeqCst);
}

/// Drop one level of masking; true when the mask is fully lifted
#[inline]
fn enable_raw(ut: &UserThread) -> bool {
    debug_assert!(ut.disable_depth() > 0, "unbalanced uth_enable_notifs");
    if ut.disable_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
        ut.flags.fetch_and(!NO_INTERRUPT, Ordering::SeqCst);
        return true;
    }
    false
}

/// Re-raise a notification that arrived while the thread was masked
fn maybe_resignal() {
    if let Some(core) = vcore::current_vcore() {
        resignal(core);
    }
}

/// Raise `core`'s deferred notification, if enabled; a failed raise
/// leaves it pending for the next drain or unmask
fn resignal(core: &VirtualCore) -> bool {
    if !core.mailbox.is_enabled() || !core.mailbox.take_pending() {
        return false;
    }
    if let Err(e) = core.raise() {
        kwarn!("vcore {}: deferred notification not raised: {}", core.id(), e);
        core.mailbox.set_pending();
        return false;
    }
    true
}

/// Mask notifications for the current user thread (nests)
pub fn uth_disable_notifs() {
    if let Some(ut) = current_uthread() {
        disable_on(ut.get());
    }
}

/// Undo one `uth_disable_notifs`
pub fn uth_enable_notifs() {
    if let Some(ut) = current_uthread() {
        if enable_raw(ut.get()) {
            maybe_resignal();
        }
    }
}

/// Mask iff running in user-thread context on a core
pub(crate) fn mask_if_in_uthread() -> bool {
    let Some(core) = vcore::current_vcore() else {
        return false;
    };
    if core.in_vcore_context() {
        return false;
    }
    match current_uthread() {
        Some(ut) => {
            disable_on(ut.get());
            true
        }
        None => false,
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Prepare `ut` for use, allocating (or keeping) its TLS region
///
/// The thread starts masked; its start routine unmasks.
pub fn uthread_init(ut: &UserThread) -> VcoreResult<()> {
    ut.state.store(UthreadState::NotRunning as u8, Ordering::SeqCst);
    ut.flags.store(NO_INTERRUPT, Ordering::SeqCst);
    ut.disable_depth.store(1, Ordering::SeqCst);
    ut.continuation.set(None);
    ut.sysc.store(ptr::null_mut(), Ordering::SeqCst);
    if let Some(alloc) = collab::tls_allocator() {
        if ut.tls.get().is_none() {
            ut.tls.set(alloc.allocate_region()?);
        }
    }
    Ok(())
}

/// Release what `ut` owns: TLS region, dynamic storage, spare signal stack
pub fn uthread_cleanup(ut: &UserThread) {
    debug_assert!(
        ut.state() != UthreadState::Running,
        "cleaning up a running user thread"
    );
    let region = ut.tls.replace(TlsRegion::NONE);
    if !region.is_none() {
        if let Some(alloc) = collab::tls_allocator() {
            alloc.free_region(region);
        }
    }
    let data = ut.dtls.replace(DtlsData::EMPTY);
    if !data.is_empty() {
        if let Some(storage) = collab::dynamic_storage() {
            storage.destroy_all(data);
        }
    }
    drop(ut.sigstack.take());
    ut.entry.set(None);
}

/// Make `ut` start at `entry` on `stack` when first run
///
/// Returning from `entry` exits the thread.
pub fn init_uthread_context(ut: &UserThread, entry: fn(), stack: &UthreadStack) {
    ut.entry.set(Some(entry));
    // Safety: the thread is not running, so nobody else reads its context
    unsafe {
        arch::init_context(&mut *ut.ctx.get(), stack.top(), uthread_start, 0);
    }
}

extern "C" fn uthread_start(_arg: usize) -> ! {
    resumed();
    uth_enable_notifs();
    let ut = current_or_die("uthread_start");
    if let Some(entry) = ut.get().entry.get() {
        entry();
    }
    uthread_exit()
}

fn exited(ut: UthreadPtr) {
    sched_ops().thread_exited(ut);
}

/// Finish the current thread; it stays NOT_RUNNING for good
pub fn uthread_exit() -> ! {
    uthread_yield(false, Continuation::Static(exited));
    fatal!("exited user thread was resumed")
}

/// Store a dynamic-storage value for the current thread
pub fn uthread_set_specific(key: DtlsKey, value: usize) -> VcoreResult<()> {
    let storage = collab::dynamic_storage().ok_or(VcoreError::Unsupported)?;
    let ut = current_uthread().ok_or(VcoreError::NotInUthread)?.get();
    let mut data = ut.dtls.get();
    // The first set allocates
    sync::notif_safe(|| storage.set(&mut data, key, value));
    ut.dtls.set(data);
    Ok(())
}

/// Look up a dynamic-storage value for the current thread
pub fn uthread_get_specific(key: DtlsKey) -> Option<usize> {
    let storage = collab::dynamic_storage()?;
    let ut = current_uthread()?.get();
    storage.get(ut.dtls.get(), key)
}

// ============================================================================
// Yield / run
// ============================================================================

/// Give up the core
///
/// With `save_state` the thread can later be resumed by `run_uthread`,
/// at which point this call returns. `cont` runs in vcore context once
/// the thread is off its stack; it decides what becomes of the thread.
pub fn uthread_yield(save_state: bool, cont: Continuation) {
    let ut = current_or_die("uthread_yield");
    disable_on(ut.get());
    yield_masked(ut, save_state, cont);
    uth_enable_notifs();
}

/// `uthread_yield` with a closure continuation
pub fn uthread_yield_with<F>(save_state: bool, f: F)
where
    F: FnOnce(UthreadPtr) + Send + 'static,
{
    let ut = current_or_die("uthread_yield_with");
    disable_on(ut.get());
    let cont = Continuation::Boxed(Box::new(f));
    yield_masked(ut, save_state, cont);
    uth_enable_notifs();
}

/// Yield and hand the thread back to the scheduler as paused
pub fn uthread_pause() {
    uthread_yield(true, Continuation::Static(uthread_paused));
}

/// Switch to vcore context; `ut` must already be masked
#[inline(never)]
fn yield_masked(ut: UthreadPtr, save_state: bool, cont: Continuation) {
    let t = ut.get();
    let core = core_or_die("uthread_yield");
    debug_assert!(!core.in_vcore_context(), "yield from vcore context");
    t.set_state(UthreadState::NotRunning);
    t.continuation.set(Some(cont));

    core.set_in_vcore_context(true);
    core.restore_tls();
    // Safety: the transition stack and entry context belong to this core,
    // which is not using them while a user thread runs
    unsafe {
        let tail = core.prepare_transition(yield_tail, 0);
        if save_state {
            arch::switch(t.ctx.get(), tail);
        } else {
            arch::restore(tail);
        }
    }
    resumed();
}

extern "C" fn yield_tail(_arg: usize) -> ! {
    let ut = current_or_die("yield_tail");
    match ut.get().continuation.take() {
        Some(cont) => cont.run(ut),
        None => debug_assert!(false, "user thread yielded without a continuation"),
    }
    set_current(vcore::vcore_id(), None);
    uthread_vcore_entry()
}

/// Generic vcore-context entry: drain the mailbox, then schedule
pub fn uthread_vcore_entry() -> ! {
    debug_assert!(vcore::in_vcore_context());
    event::handle_events();
    sched_ops().sched_entry()
}

/// Core entry point used once the user-thread layer is up
pub(crate) fn uthread_core_entry() -> ! {
    if let Some(saved) = vcore::take_saved_context() {
        match current_uthread() {
            Some(ut) => {
                // Safety: the thread is current here and not running
                unsafe { *ut.get().ctx.get() = saved };
                run_current_uthread();
            }
            // Safety: `saved` is a complete context captured by migrate_main
            None => unsafe { arch::restore(&saved) },
        }
    }
    uthread_vcore_entry()
}

/// Resume the core's current thread
///
/// Re-enters the core's entry point first if a notification is pending.
pub fn run_current_uthread() -> ! {
    let core = core_or_die("run_current_uthread");
    debug_assert!(core.in_vcore_context());
    let ut = current_or_die("run_current_uthread");
    let t = ut.get();
    debug_assert_eq!(t.state(), UthreadState::Running);

    if core.mailbox.is_enabled() && core.mailbox.is_pending() {
        vcore::vcore_reenter(vcore::current_entry());
    }

    t.install_tls(core.id());
    // Safety: the context was saved by a yield, a swap, or prepared by
    // init_uthread_context
    unsafe { arch::restore(t.ctx.get()) }
}

/// Make `ut` current and run it
pub fn run_uthread(ut: UthreadPtr) -> ! {
    let core = core_or_die("run_uthread");
    debug_assert!(core.in_vcore_context());
    debug_assert!(current_uthread() != Some(ut), "run_uthread on the current thread");
    ut.get().set_state(UthreadState::Running);
    set_current(core.id(), Some(ut));
    run_current_uthread()
}

/// From vcore context: take the current thread off the core
///
/// The thread was left current by a notification; it becomes
/// NOT_RUNNING so the scheduler may requeue it and later `run_uthread`
/// it anywhere.
pub fn take_current_uthread() -> Option<UthreadPtr> {
    let core = vcore::current_vcore()?;
    debug_assert!(core.in_vcore_context());
    let ut = current_uthread()?;
    ut.get().set_state(UthreadState::NotRunning);
    set_current(core.id(), None);
    Some(ut)
}

/// Save the caller into `old` and run `new` directly
///
/// `old` must be the current thread. It is NOT_RUNNING on return from
/// the switch, and must not be handed to anyone who might run it until
/// the switch has completed (e.g. by recording it from `new`).
pub fn swap_uthreads(old: UthreadPtr, new: UthreadPtr) {
    let core = core_or_die("swap_uthreads");
    debug_assert_eq!(current_uthread(), Some(old));
    let (o, n) = (old.get(), new.get());
    disable_on(o);

    // Defer notifications until `new` is really running
    core.set_in_vcore_context(true);
    o.set_state(UthreadState::NotRunning);
    n.set_state(UthreadState::Running);
    set_current(core.id(), Some(new));
    n.install_tls(core.id());
    switch_into(o, n);

    uth_enable_notifs();
}

#[inline(never)]
fn switch_into(old: &UserThread, new: &UserThread) {
    // Safety: `old` is the caller, `new` holds a saved context
    unsafe { arch::switch(old.ctx.get(), new.ctx.get()) };
    resumed();
}

/// Adopt the running flow as `ut`
///
/// The current thread becomes HIJACKED and is retired. `ut` inherits its
/// TLS region, dynamic storage, signal stack and mask depth; whatever
/// `ut` held before is released. The retired slot frees nothing.
pub fn hijack_current_uthread(ut: UthreadPtr) {
    let victim = current_or_die("hijack_current_uthread");
    debug_assert!(victim != ut, "hijacking the current thread with itself");
    sync::notif_safe(|| {
        let core = core_or_die("hijack_current_uthread");
        let (v, t) = (victim.get(), ut.get());

        let own_region = t.tls.replace(v.tls.replace(TlsRegion::NONE));
        if !own_region.is_none() {
            if let Some(alloc) = collab::tls_allocator() {
                alloc.free_region(own_region);
            }
        }
        let own_data = t.dtls.replace(v.dtls.replace(DtlsData::EMPTY));
        if !own_data.is_empty() {
            if let Some(storage) = collab::dynamic_storage() {
                storage.destroy_all(own_data);
            }
        }
        drop(t.sigstack.replace(v.sigstack.take()));

        t.disable_depth.store(v.disable_depth.swap(0, Ordering::SeqCst), Ordering::SeqCst);
        t.flags.store(v.flags.swap(0, Ordering::SeqCst), Ordering::SeqCst);

        v.set_state(UthreadState::Hijacked);
        t.state.store(UthreadState::Running as u8, Ordering::SeqCst);
        set_current(core.id(), Some(ut));
    });
}

// ============================================================================
// Scheduler glue
// ============================================================================

/// Hand `ut` to the scheduler as runnable
pub fn uthread_runnable(ut: UthreadPtr) {
    sched_ops().thread_runnable(ut);
}

/// Hand `ut` to the scheduler as paused; usable as a yield continuation
pub fn uthread_paused(ut: UthreadPtr) {
    sched_ops().thread_paused(ut);
}

/// Tell the scheduler `ut` was blocked by someone else
pub fn uthread_has_blocked(ut: UthreadPtr, reason: u32) {
    sched_ops().thread_has_blocked(ut, reason);
}

// ============================================================================
// Notification entry
// ============================================================================

/// Interrupt the running thread from inside the notification handler
///
/// Returns once the thread is resumed, possibly on another core.
pub(crate) fn preempt_from_handler(ut: UthreadPtr) {
    disable_on(ut.get());
    yield_masked(ut, true, Continuation::Static(notified_cont));
    enable_raw(ut.get());
}

/// The interrupted thread's handler frame lives on this core's alternate
/// stack: give the thread that stack, take its spare, and schedule. The
/// thread stays current and RUNNING so the scheduler may resume it.
fn notified_cont(ut: UthreadPtr) {
    let core = core_or_die("notification entry");
    let t = ut.get();
    // Safety: running on the transition stack, off both signal stacks
    let used = unsafe { core.swap_sigstack(t.sigstack.take()) };
    t.sigstack.set(used);
    t.state.store(UthreadState::Running as u8, Ordering::SeqCst);
    sched_ops().preempt_pending();
    uthread_vcore_entry()
}

/// Bring up the user-thread layer with the caller as `main_ut`
pub(crate) fn adopt_main(main_ut: &'static UserThread) {
    main_ut.state.store(UthreadState::Running as u8, Ordering::SeqCst);
    main_ut.flags.store(NO_INTERRUPT, Ordering::SeqCst);
    main_ut.disable_depth.store(1, Ordering::SeqCst);
    drop(main_ut.sigstack.take());
    if let Some(alloc) = collab::tls_allocator() {
        main_ut.tls.set(TlsRegion::new(alloc.current_base()));
    }
    set_current(CoreId::BOOT, Some(main_ut.as_ptr()));
}
