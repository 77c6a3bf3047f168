//! Notification signal handler
//!
//! Runs on the interrupted core's alternate signal stack. If the core
//! is executing an unmasked user thread, the thread is suspended right
//! here, inside the handler, and the core drops into vcore context. The
//! handler frame stays on the alternate stack, which now belongs to the
//! thread; when the thread is resumed (possibly on another core) the
//! frame returns normally and `sigreturn` restores the interrupted code.

use crate::uthread;
use crate::vcore;

/// Handler for the notification signal
pub(crate) extern "C" fn vcore_sigentry(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    uc: *mut libc::c_void,
) {
    // Safety: errno is thread-local; the interrupted code must see its own
    let errno = unsafe { *libc::__errno_location() };

    let Some(core) = vcore::current_vcore() else {
        return;
    };
    if !core.state().is_allocated() {
        return;
    }
    core.count_notification();

    loop {
        let core = match vcore::current_vcore() {
            Some(core) => core,
            None => break,
        };
        if core.in_vcore_context() {
            // The entry point checks the mailbox before running anything
            core.mailbox.set_pending();
            break;
        }
        let ut = match uthread::current_uthread() {
            Some(ut) if !ut.get().is_masked() => ut,
            _ => {
                core.mailbox.set_pending();
                break;
            }
        };

        uthread::preempt_from_handler(ut);

        // Resumed, perhaps elsewhere: sigreturn must reinstall that
        // core's alternate stack, not the one this frame started on
        let core = match vcore::current_vcore() {
            Some(core) => core,
            None => break,
        };
        // Safety: `uc` is this handler's live frame
        unsafe { core.patch_ucontext(uc) };
        if !(core.mailbox.is_enabled() && core.mailbox.take_pending()) {
            break;
        }
    }

    unsafe { *libc::__errno_location() = errno };
}
