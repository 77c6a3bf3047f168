//! Virtual-core manager
//!
//! A fixed pool of backing pthreads, one per virtual core, created at
//! init and never destroyed. A core is in exactly one of three places:
//! parked on its futex word at the entry gate, running vcore-context
//! code on its transition stack, or running one user thread.
//!
//! ```text
//! CREATED -> PARKED <-> ALLOCATED -> (entry gate) -> PARKED
//! ```
//!
//! The core table and allocation counter only change under the manager
//! lock (or by CAS inside it), so `num_vcores()` always equals the
//! number of cores in the Allocated state once the lock is released.

use crate::arch;
use crate::collab;
use crate::config::{host_cpus, VcoreConfig};
use crate::event;
use crate::memory::Stack;
use crate::parking;
use crate::signal::{self, SignalStack};
use crate::sync;
use crate::tls;
use nix::sys::pthread::{pthread_self, Pthread};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{
    AtomicBool, AtomicPtr, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering,
};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::thread;
use vcthread_core::constants::MIN_STACK_SIZE;
use vcthread_core::error::{CoreError, VcoreError, VcoreResult};
use vcthread_core::traits::TlsRegion;
use vcthread_core::{fatal, kdebug, kinfo, kwarn};
use vcthread_core::{Context, CoreId, Mailbox, QueueLock, QueueLockNode, VcoreState};

/// Function a core runs on its transition stack each time it is
/// allocated or re-entered
pub type VcoreEntry = fn() -> !;

/// Snapshot of a core's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VcoreStats {
    /// Times the core left the gate
    pub wakeups: u64,
    /// Notification signals sent to the core
    pub signals_sent: u64,
    /// Notification signals the core received while allocated
    pub notifications: u64,
}

#[derive(Default)]
struct CoreCounters {
    wakeups: AtomicU64,
    signals_sent: AtomicU64,
    notifications: AtomicU64,
}

/// One slot of the core table
pub(crate) struct VirtualCore {
    id: CoreId,
    state: AtomicU8,
    /// Futex word: 0 parked, 1 allocated
    running: AtomicU32,
    pthread: AtomicUsize,
    tls: AtomicUsize,
    /// Context to resume on first entry; only set while main migrates
    saved_ctx: AtomicPtr<Context>,
    gate_ctx: UnsafeCell<Context>,
    entry_ctx: UnsafeCell<Context>,
    transition_top: AtomicPtr<u8>,
    transition: UnsafeCell<Option<Stack>>,
    sigstack: UnsafeCell<Option<SignalStack>>,
    in_vcore_context: AtomicBool,
    pub(crate) mailbox: Mailbox,
    counters: CoreCounters,
}

// Safety: the UnsafeCell fields are only touched by the core's own thread
unsafe impl Sync for VirtualCore {}

impl VirtualCore {
    pub(crate) fn new(id: CoreId) -> Self {
        Self {
            id,
            state: AtomicU8::new(VcoreState::Free as u8),
            running: AtomicU32::new(0),
            pthread: AtomicUsize::new(0),
            tls: AtomicUsize::new(TlsRegion::NONE.raw()),
            saved_ctx: AtomicPtr::new(ptr::null_mut()),
            gate_ctx: UnsafeCell::new(Context::new()),
            entry_ctx: UnsafeCell::new(Context::new()),
            transition_top: AtomicPtr::new(ptr::null_mut()),
            transition: UnsafeCell::new(None),
            sigstack: UnsafeCell::new(None),
            in_vcore_context: AtomicBool::new(true),
            mailbox: Mailbox::new(),
            counters: CoreCounters::default(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> CoreId {
        self.id
    }

    #[inline]
    pub(crate) fn state(&self) -> VcoreState {
        VcoreState::from(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn in_vcore_context(&self) -> bool {
        self.in_vcore_context.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_in_vcore_context(&self, value: bool) {
        self.in_vcore_context.store(value, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn tls_region(&self) -> TlsRegion {
        TlsRegion::new(self.tls.load(Ordering::Relaxed))
    }

    #[inline]
    fn pthread(&self) -> Pthread {
        self.pthread.load(Ordering::Acquire) as Pthread
    }

    #[inline]
    fn transition_top(&self) -> *mut u8 {
        self.transition_top.load(Ordering::Relaxed)
    }

    /// Reinstall the core's own TLS region
    pub(crate) fn restore_tls(&self) {
        if let Some(alloc) = collab::tls_allocator() {
            let region = self.tls_region();
            if !region.is_none() {
                alloc.set_active(region, self.id);
            }
        }
    }

    /// Send the notification signal unconditionally
    pub(crate) fn raise(&self) -> VcoreResult<()> {
        // No backing thread yet
        if self.pthread.load(Ordering::Acquire) == 0 {
            return Err(VcoreError::InvalidCore(self.id));
        }
        self.counters.signals_sent.fetch_add(1, Ordering::Relaxed);
        signal::send_signal(self.pthread())
    }

    #[inline]
    pub(crate) fn count_notification(&self) {
        self.counters.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Install `spare` (or a fresh stack) as this core's alternate signal
    /// stack and return the one it replaces
    ///
    /// # Safety
    ///
    /// Must run on this core's thread, off the stack being replaced.
    pub(crate) unsafe fn swap_sigstack(&self, spare: Option<SignalStack>) -> Option<SignalStack> {
        let fresh = match spare {
            Some(stack) => stack,
            None => SignalStack::new(config().signal_stack_size)
                .unwrap_or_else(|e| fatal!("vcore {}: cannot map signal stack: {}", self.id, e)),
        };
        if let Err(e) = fresh.install() {
            fatal!("vcore {}: cannot install signal stack: {}", self.id, e);
        }
        (*self.sigstack.get()).replace(fresh)
    }

    /// Make a live handler frame return onto this core's alternate stack
    ///
    /// # Safety
    ///
    /// See `SignalStack::patch_ucontext`.
    pub(crate) unsafe fn patch_ucontext(&self, uc: *mut libc::c_void) {
        if let Some(stack) = &*self.sigstack.get() {
            stack.patch_ucontext(uc);
        }
    }

    /// Prepare the entry context to call `entry` on the transition stack
    ///
    /// # Safety
    ///
    /// Must run on this core's thread.
    unsafe fn prepare_entry(&self, entry: VcoreEntry) -> *const Context {
        let ctx = self.entry_ctx.get();
        arch::init_context(&mut *ctx, self.transition_top(), entry_trampoline, entry as *const () as usize);
        ctx
    }

    /// Entry context, prepared to run `tail(arg)` on the transition stack
    ///
    /// # Safety
    ///
    /// Must run on this core's thread.
    pub(crate) unsafe fn prepare_transition(
        &self,
        tail: arch::ContextEntry,
        arg: usize,
    ) -> *const Context {
        let ctx = self.entry_ctx.get();
        arch::init_context(&mut *ctx, self.transition_top(), tail, arg);
        ctx
    }

    fn stats(&self) -> VcoreStats {
        VcoreStats {
            wakeups: self.counters.wakeups.load(Ordering::Relaxed),
            signals_sent: self.counters.signals_sent.load(Ordering::Relaxed),
            notifications: self.counters.notifications.load(Ordering::Relaxed),
        }
    }
}

struct VcoreManager {
    cores: Box<[VirtualCore]>,
    /// Cores in the Reserved or Allocated state
    num_vcores: AtomicUsize,
    lock: QueueLock,
    bootstrapped: AtomicBool,
    /// Cores that reached the gate after init
    booted: AtomicU32,
    main_ctx: UnsafeCell<Context>,
    abandon_ctx: UnsafeCell<Context>,
    abandon_stack: Stack,
}

// Safety: main_ctx and abandon_ctx are written once, by the thread doing
// the first request, under the manager lock
unsafe impl Sync for VcoreManager {}

static MANAGER: OnceLock<VcoreManager> = OnceLock::new();
static CONFIG: OnceLock<VcoreConfig> = OnceLock::new();

/// Use `config` instead of the environment; must precede `vcore_lib_init`
pub fn set_config(config: VcoreConfig) -> VcoreResult<()> {
    config.validate()?;
    CONFIG.set(config).map_err(|_| VcoreError::AlreadyInitialized)
}

/// Active configuration, read from the environment on first use
pub fn config() -> &'static VcoreConfig {
    CONFIG.get_or_init(VcoreConfig::from_env)
}

#[inline]
pub fn is_initialized() -> bool {
    MANAGER.get().is_some()
}

#[inline]
fn try_manager() -> Option<&'static VcoreManager> {
    MANAGER.get()
}

#[inline]
fn manager() -> &'static VcoreManager {
    match MANAGER.get() {
        Some(mgr) => mgr,
        None => fatal!("vcore subsystem used before vcore_lib_init"),
    }
}

#[inline]
pub(crate) fn vcore(core: CoreId) -> VcoreResult<&'static VirtualCore> {
    let mgr = try_manager().ok_or(VcoreError::NotInitialized)?;
    mgr.cores
        .get(core.as_usize())
        .ok_or(VcoreError::InvalidCore(core))
}

/// The core the caller runs on, if any
#[inline]
pub(crate) fn current_vcore() -> Option<&'static VirtualCore> {
    let id = tls::try_current_core()?;
    try_manager()?.cores.get(id.as_usize())
}

#[inline]
fn current_vcore_or_die(what: &str) -> &'static VirtualCore {
    match current_vcore() {
        Some(core) => core,
        None => fatal!("{} called off a virtual core", what),
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Bring up the core pool
///
/// Spawns one parked backing thread per core and returns once all of
/// them sit at the entry gate. Later calls return `Ok(())`.
pub fn vcore_lib_init() -> VcoreResult<()> {
    static INIT: Mutex<()> = Mutex::new(());
    let _guard = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if is_initialized() {
        return Ok(());
    }

    vcthread_core::kprint::init();
    let config = config();
    config.validate()?;
    if config.debug_logging {
        vcthread_core::kprint::set_log_level(vcthread_core::kprint::LogLevel::Debug);
    }

    let max = config.max_vcores;
    let cores: Box<[VirtualCore]> = (0..max).map(|i| VirtualCore::new(CoreId::from(i))).collect();
    let mgr = VcoreManager {
        cores,
        num_vcores: AtomicUsize::new(0),
        lock: QueueLock::new(),
        bootstrapped: AtomicBool::new(false),
        booted: AtomicU32::new(0),
        main_ctx: UnsafeCell::new(Context::new()),
        abandon_ctx: UnsafeCell::new(Context::new()),
        abandon_stack: Stack::new(MIN_STACK_SIZE)
            .unwrap_or_else(|e| fatal!("cannot map the boot parking stack: {}", e)),
    };
    if MANAGER.set(mgr).is_err() {
        return Err(VcoreError::AlreadyInitialized);
    }
    let mgr = manager();

    if let Err(e) = signal::install_handler(crate::notify::vcore_sigentry) {
        fatal!("cannot install the notification handler: {}", e);
    }

    for i in 0..max {
        let id = CoreId::from(i);
        let spawned = thread::Builder::new()
            .name(format!("vcore-{}", i))
            .stack_size(config.vcore_thread_stack_size)
            .spawn(move || {
                core_thread_main(id);
            });
        if let Err(e) = spawned {
            fatal!("{}: vcore {}: {}", CoreError::SpawnFailed, i, e);
        }
    }

    // Every core parks before anyone may request one
    loop {
        let booted = mgr.booted.load(Ordering::Acquire);
        if booted as usize == max {
            break;
        }
        parking::wait_while(&mgr.booted, booted);
    }

    kinfo!("vcore pool up: {} cores", max);
    Ok(())
}

fn core_thread_main(id: CoreId) -> ! {
    let mgr = manager();
    let core = &mgr.cores[id.as_usize()];
    let config = config();

    tls::set_core_id(id);
    core.pthread.store(pthread_self() as usize, Ordering::Release);

    if let Some(alloc) = collab::tls_allocator() {
        match alloc.allocate_region() {
            Ok(region) => {
                core.tls.store(region.raw(), Ordering::Relaxed);
                alloc.set_active(region, id);
            }
            Err(e) => fatal!("{}: vcore {}: {}", CoreError::TlsAllocationFailed, id, e),
        }
    }

    let sigstack = SignalStack::new(config.signal_stack_size)
        .unwrap_or_else(|e| fatal!("vcore {}: cannot map signal stack: {}", id, e));
    if let Err(e) = sigstack.install() {
        fatal!("vcore {}: cannot install signal stack: {}", id, e);
    }
    let transition = Stack::new(config.transition_stack_size)
        .unwrap_or_else(|e| fatal!("vcore {}: cannot map transition stack: {}", id, e));
    core.transition_top.store(transition.top(), Ordering::Relaxed);
    // Safety: nothing else touches these before the core first parks
    unsafe {
        *core.sigstack.get() = Some(sigstack);
        *core.transition.get() = Some(transition);
    }

    if let Err(e) = signal::unblock_vcore_signal() {
        kwarn!("cannot unblock the notification signal: {}", e);
    }
    if config.pin_cores {
        let cpu = id.as_usize() % host_cpus();
        if let Err(e) = pin_to_cpu(cpu) {
            kwarn!("could not pin to cpu {}: {}", cpu, e);
        }
    }

    kdebug!("parked at gate");
    mgr.booted.fetch_add(1, Ordering::AcqRel);
    parking::wake_all(&mgr.booted);

    gate_loop(mgr, core)
}

fn pin_to_cpu(cpu: usize) -> VcoreResult<()> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    set.set(cpu).map_err(|_| CoreError::AffinityFailed)?;
    sched_setaffinity(Pid::from_raw(0), &set).map_err(|_| CoreError::AffinityFailed)?;
    Ok(())
}

/// The entry gate
///
/// Runs on the backing pthread's own stack. Each pass parks until the
/// core is allocated, then jumps to the entry point on the transition
/// stack; `vcore_yield` comes back here.
fn gate_loop(mgr: &'static VcoreManager, core: &'static VirtualCore) -> ! {
    loop {
        parking::wait_while(&core.running, 0);
        core.counters.wakeups.fetch_add(1, Ordering::Relaxed);
        core.set_in_vcore_context(true);

        // Safety: the entry context belongs to this core
        unsafe {
            let entry = core.prepare_entry(current_entry());
            arch::switch(core.gate_ctx.get(), entry);
        }

        mgr.park_or_rerun(core);
    }
}

extern "C" fn entry_trampoline(entry: usize) -> ! {
    // Safety: produced from a `VcoreEntry` by prepare_entry / vcore_reenter
    let entry = unsafe { std::mem::transmute::<usize, VcoreEntry>(entry) };
    entry()
}

/// Entry used until something else is installed
///
/// Resumes a migrating main thread; otherwise drains the mailbox and
/// gives the core back.
fn default_vcore_entry() -> ! {
    resume_saved_context_or(drain_and_yield)
}

fn drain_and_yield() -> ! {
    event::handle_events();
    vcore_yield()
}

extern "C" fn abandon_boot_thread(_arg: usize) -> ! {
    // The caller's context is saved by now; core 0 may resume it
    if let Some(mgr) = try_manager() {
        let core0 = &mgr.cores[0];
        core0.running.store(1, Ordering::Release);
        parking::wake_one(&core0.running);
    }
    parking::park_forever()
}

impl VcoreManager {
    /// Gate side of `vcore_yield`: stay up if events arrived, else park
    fn park_or_rerun(&self, core: &VirtualCore) {
        let node = QueueLockNode::new();
        // Safety: vcore context, the node outlives the critical section
        unsafe { self.lock.acquire(&node) };
        if core.mailbox.has_events() {
            kdebug!("mailbox not empty, re-entering");
        } else {
            self.num_vcores.fetch_sub(1, Ordering::SeqCst);
            core.state.store(VcoreState::Free as u8, Ordering::SeqCst);
            core.running.store(0, Ordering::SeqCst);
        }
        unsafe { self.lock.release(&node) };
    }

    /// Move the calling thread's context onto core 0
    ///
    /// Returns on core 0's backing thread. The original thread parks
    /// forever on a private stack; its own stack lives on as the
    /// migrated caller's.
    fn migrate_main(&self) {
        let core0 = &self.cores[0];
        debug_assert_eq!(core0.state(), VcoreState::Free);
        core0.state.store(VcoreState::Allocated as u8, Ordering::SeqCst);
        self.num_vcores.fetch_add(1, Ordering::SeqCst);
        core0.saved_ctx.store(self.main_ctx.get(), Ordering::SeqCst);

        // Safety: main_ctx/abandon_ctx are only used here, once, under the lock
        unsafe {
            arch::init_context(
                &mut *self.abandon_ctx.get(),
                self.abandon_stack.top(),
                abandon_boot_thread,
                0,
            );
            arch::switch(self.main_ctx.get(), self.abandon_ctx.get());
        }

        // Now on core 0
        core0.saved_ctx.store(ptr::null_mut(), Ordering::SeqCst);
        if crate::uthread::current_uthread().is_some() {
            core0.set_in_vcore_context(false);
        }
        kdebug!("main thread migrated onto vcore 0");
    }

    /// Reserve up to `k` slots on the allocation counter
    fn reserve_slots(&self, k: usize) -> usize {
        let max = self.cores.len();
        let mut cur = self.num_vcores.load(Ordering::Acquire);
        loop {
            let want = k.min(max.saturating_sub(cur));
            if want == 0 {
                return 0;
            }
            match self.num_vcores.compare_exchange_weak(
                cur,
                cur + want,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return want,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Free -> Reserved -> Allocated, then wake the core
    fn claim(&self, core: &VirtualCore) -> bool {
        if core
            .state
            .compare_exchange(
                VcoreState::Free as u8,
                VcoreState::Reserved as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        core.state.store(VcoreState::Allocated as u8, Ordering::SeqCst);
        core.running.store(1, Ordering::Release);
        parking::wake_one(&core.running);
        true
    }

    /// Allocate up to `k` parked cores; caller holds the lock
    fn allocate(&self, k: usize) -> usize {
        let want = self.reserve_slots(k);
        let mut granted = 0;
        for core in self.cores.iter() {
            if granted == want {
                break;
            }
            if self.claim(core) {
                granted += 1;
            }
        }
        if granted < want {
            self.num_vcores.fetch_sub(want - granted, Ordering::SeqCst);
        }
        granted
    }

    /// Allocate exactly `core`; caller holds the lock
    fn allocate_specific(&self, core: &VirtualCore) -> bool {
        if self.reserve_slots(1) == 0 {
            return false;
        }
        if self.claim(core) {
            return true;
        }
        self.num_vcores.fetch_sub(1, Ordering::SeqCst);
        false
    }
}

// ============================================================================
// Allocation
// ============================================================================

/// Request `k` more cores
///
/// The first request ever made also moves the caller onto core 0 and
/// counts that core toward `k`. Returns the number granted, which may
/// be less than `k`.
pub fn vcore_request(k: usize) -> VcoreResult<usize> {
    if k == 0 {
        return Ok(0);
    }
    let mgr = try_manager().ok_or(VcoreError::NotInitialized)?;
    let max = mgr.cores.len();
    if k > max {
        return Err(VcoreError::RequestImpossible { requested: k, max });
    }

    let node = QueueLockNode::new();
    let guard = sync::lock_notifsafe(&mgr.lock, &node);

    let mut remaining = k;
    let mut granted = 0;
    if !mgr.bootstrapped.load(Ordering::SeqCst) {
        mgr.bootstrapped.store(true, Ordering::SeqCst);
        mgr.migrate_main();
        granted = 1;
        remaining -= 1;
    }
    granted += mgr.allocate(remaining);

    drop(guard);
    kdebug!("vcore_request({}) granted {}", k, granted);

    if granted == 0 {
        return Err(VcoreError::NoCoresAvailable);
    }
    Ok(granted)
}

/// Allocate `core` if it is parked
///
/// Returns `Ok(false)` if the core is already allocated, or if the pool
/// has not been bootstrapped by a first request yet.
pub fn vcore_request_specific(core: CoreId) -> VcoreResult<bool> {
    let target = vcore(core)?;
    let mgr = manager();
    if !mgr.bootstrapped.load(Ordering::SeqCst) {
        return Ok(false);
    }
    let node = QueueLockNode::new();
    let _guard = sync::lock_notifsafe(&mgr.lock, &node);
    Ok(mgr.allocate_specific(target))
}

/// Give the current core back
///
/// Vcore context only. Jumps to the entry gate, which parks the core
/// unless its mailbox has events.
pub fn vcore_yield() -> ! {
    let core = current_vcore_or_die("vcore_yield");
    debug_assert!(core.in_vcore_context(), "vcore_yield from user-thread context");
    core.saved_ctx.store(ptr::null_mut(), Ordering::SeqCst);
    core.restore_tls();
    // Safety: the gate context was saved by this core's gate_loop
    unsafe { arch::restore(core.gate_ctx.get()) }
}

/// Restart the current core at the top of its transition stack
pub fn vcore_reenter(entry: VcoreEntry) -> ! {
    let core = current_vcore_or_die("vcore_reenter");
    core.set_in_vcore_context(true);
    // Safety: the entry context belongs to this core; the current stack
    // is abandoned
    unsafe {
        let ctx = core.prepare_entry(entry);
        arch::restore(ctx)
    }
}

/// Notify `core`, unless it already has a notification pending
///
/// With notifications disabled on the target, only its pending flag is
/// set.
pub fn vcore_signal(core: CoreId) -> VcoreResult<()> {
    let target = vcore(core)?;
    if target.mailbox.notify() {
        target.raise()?;
    }
    Ok(())
}

static ENTRY: AtomicUsize = AtomicUsize::new(0);

/// Install the function cores run when allocated or re-entered
pub fn set_vcore_entry(entry: VcoreEntry) {
    ENTRY.store(entry as *const () as usize, Ordering::Release);
}

/// The entry point currently installed
pub fn current_entry() -> VcoreEntry {
    match ENTRY.load(Ordering::Acquire) {
        0 => default_vcore_entry,
        // Safety: only set_vcore_entry stores here
        raw => unsafe { std::mem::transmute::<usize, VcoreEntry>(raw) },
    }
}

/// Take the context left for this core by a migrating thread
pub fn take_saved_context() -> Option<Context> {
    let core = current_vcore()?;
    let saved = core.saved_ctx.swap(ptr::null_mut(), Ordering::SeqCst);
    if saved.is_null() {
        return None;
    }
    // Safety: the slot points at the manager's main_ctx, written before
    // core 0 was woken
    Some(unsafe { *saved })
}

/// Resume the context left for this core, or give the core back
pub fn resume_saved_context() -> ! {
    resume_saved_context_or(vcore_yield)
}

fn resume_saved_context_or(otherwise: VcoreEntry) -> ! {
    if let Some(core) = current_vcore() {
        let saved = core.saved_ctx.load(Ordering::SeqCst);
        if !saved.is_null() {
            // Safety: see take_saved_context; migrate_main clears the slot
            unsafe { arch::restore(saved) }
        }
    }
    otherwise()
}

/// From an idle loop in vcore context: re-enter the entry point if a
/// notification is waiting and notifications are enabled here
pub fn vcore_poll_notifications() {
    let Some(core) = current_vcore() else {
        return;
    };
    debug_assert!(core.in_vcore_context());
    let mailbox = &core.mailbox;
    if mailbox.is_enabled() && (mailbox.is_pending() || mailbox.has_events()) {
        vcore_reenter(current_entry());
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Id of the core the caller runs on, NONE off the pool
#[inline(never)]
pub fn vcore_id() -> CoreId {
    tls::current_core()
}

/// Cores currently allocated
pub fn num_vcores() -> usize {
    try_manager().map_or(0, |mgr| mgr.num_vcores.load(Ordering::SeqCst))
}

/// Size of the pool
pub fn max_vcores() -> usize {
    try_manager().map_or(config().max_vcores, |mgr| mgr.cores.len())
}

/// Whether the caller runs vcore-context code
#[inline(never)]
pub fn in_vcore_context() -> bool {
    current_vcore().is_some_and(|core| core.in_vcore_context())
}

pub fn vcore_stats(core: CoreId) -> Option<VcoreStats> {
    vcore(core).ok().map(|c| c.stats())
}

/// Whether `core` has a deferred notification
pub fn notification_pending(core: CoreId) -> bool {
    vcore(core).is_ok_and(|c| c.mailbox.is_pending())
}

/// Whether `core` is currently allocated
pub fn vcore_is_allocated(core: CoreId) -> bool {
    vcore(core).is_ok_and(|c| c.state().is_allocated())
}

/// Check, under the lock, that the counter matches the core table
pub fn check_allocation_invariant() -> bool {
    let Some(mgr) = try_manager() else {
        return true;
    };
    let node = QueueLockNode::new();
    let _guard = sync::lock_notifsafe(&mgr.lock, &node);
    let allocated = mgr
        .cores
        .iter()
        .filter(|c| c.state() == VcoreState::Allocated)
        .count();
    let num = mgr.num_vcores.load(Ordering::SeqCst);
    allocated == num && num <= mgr.cores.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_defaults() {
        let core = VirtualCore::new(CoreId::new(5));
        assert_eq!(core.id(), CoreId::new(5));
        assert_eq!(core.state(), VcoreState::Free);
        assert!(core.in_vcore_context());
        assert!(core.tls_region().is_none());
        assert_eq!(core.stats(), VcoreStats::default());
    }

    #[test]
    fn test_raise_without_backing_thread() {
        let core = VirtualCore::new(CoreId::new(1));
        assert!(matches!(core.raise(), Err(VcoreError::InvalidCore(_))));
        assert_eq!(core.stats().signals_sent, 0);
    }

    #[test]
    fn test_queries_off_pool() {
        // Unit tests never bring the pool up; see the integration tests
        assert!(vcore_id().is_none());
        assert!(!in_vcore_context());
        assert!(!notification_pending(CoreId::new(0)));
        assert!(vcore_stats(CoreId::new(0)).is_none());
        assert!(matches!(
            vcore_signal(CoreId::new(0)),
            Err(VcoreError::NotInitialized)
        ));
        assert_eq!(vcore_request(0).unwrap(), 0);
    }
}
