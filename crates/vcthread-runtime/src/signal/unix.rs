//! Unix signal handling for vcore notifications

use crate::memory::Stack;
use nix::sys::pthread::{pthread_kill, Pthread};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};
use vcthread_core::error::{CoreError, VcoreResult};

/// Signal used to notify a virtual core
pub const SIGVCORE: Signal = Signal::SIGURG;

/// Raw handler signature for `SA_SIGINFO` handlers
pub type RawHandler = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install `handler` for SIGVCORE
///
/// The handler runs on the alternate stack, may be re-entered while it
/// runs (the user thread it interrupted can be resumed from inside it),
/// and interrupted syscalls restart.
pub fn install_handler(handler: RawHandler) -> VcoreResult<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::SigAction(handler),
        SaFlags::SA_ONSTACK | SaFlags::SA_NODEFER | SaFlags::SA_RESTART | SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    // Safety: the handler only touches atomics and per-core state
    match unsafe { sigaction(SIGVCORE, &action) } {
        Ok(_) => Ok(()),
        Err(_) => {
            HANDLER_INSTALLED.store(false, Ordering::SeqCst);
            Err(CoreError::SignalSetupFailed.into())
        }
    }
}

/// Send SIGVCORE to the OS thread backing a core
pub fn send_signal(thread: Pthread) -> VcoreResult<()> {
    pthread_kill(thread, SIGVCORE).map_err(|_| CoreError::SignalSetupFailed.into())
}

/// Make sure SIGVCORE is deliverable on the calling thread
pub fn unblock_vcore_signal() -> VcoreResult<()> {
    let mut set = SigSet::empty();
    set.add(SIGVCORE);
    set.thread_unblock()
        .map_err(|_| CoreError::SignalSetupFailed.into())
}

/// An alternate signal stack
///
/// Ownership moves between a core and the user threads it interrupts:
/// a thread suspended from inside the handler keeps the stack its
/// handler frame lives on until it resumes.
#[derive(Debug)]
pub struct SignalStack {
    stack: Stack,
}

impl SignalStack {
    pub fn new(size: usize) -> VcoreResult<SignalStack> {
        let size = size.max(libc::MINSIGSTKSZ);
        Ok(SignalStack {
            stack: Stack::new(size)?,
        })
    }

    fn as_stack_t(&self) -> libc::stack_t {
        libc::stack_t {
            ss_sp: self.stack.bottom() as *mut libc::c_void,
            ss_flags: 0,
            ss_size: self.stack.size(),
        }
    }

    /// Install as the calling thread's alternate stack
    pub fn install(&self) -> VcoreResult<()> {
        let ss = self.as_stack_t();
        let ret = unsafe { libc::sigaltstack(&ss, std::ptr::null_mut()) };
        if ret != 0 {
            return Err(CoreError::SignalSetupFailed.into());
        }
        Ok(())
    }

    /// Point a saved `ucontext`'s stack record at this stack
    ///
    /// `sigreturn` reinstalls whatever the frame says, so a handler that
    /// resumes on a different core must rewrite it before returning.
    ///
    /// # Safety
    ///
    /// `uc` must be the live ucontext of the running handler.
    pub unsafe fn patch_ucontext(&self, uc: *mut libc::c_void) {
        let uc = uc as *mut libc::ucontext_t;
        if uc.is_null() {
            return;
        }
        (*uc).uc_stack = self.as_stack_t();
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.stack.contains(addr)
    }
}

/// Disable the alternate stack on the calling thread
pub fn uninstall_altstack() {
    let ss = libc::stack_t {
        ss_sp: std::ptr::null_mut(),
        ss_flags: libc::SS_DISABLE,
        ss_size: 0,
    };
    unsafe { libc::sigaltstack(&ss, std::ptr::null_mut()) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_stack_install() {
        let ss = SignalStack::new(64 * 1024).unwrap();
        ss.install().unwrap();

        let mut cur: libc::stack_t = unsafe { std::mem::zeroed() };
        unsafe { libc::sigaltstack(std::ptr::null(), &mut cur) };
        assert_eq!(cur.ss_sp as usize, ss.stack.bottom() as usize);
        assert!(ss.contains(cur.ss_sp as usize));

        uninstall_altstack();
    }

    #[test]
    fn test_tiny_stack_rounded_up() {
        let ss = SignalStack::new(1).unwrap();
        assert!(ss.stack.size() >= libc::MINSIGSTKSZ);
    }
}
