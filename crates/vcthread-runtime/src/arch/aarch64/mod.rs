//! aarch64 context switching
//!
//! Offsets match `vcthread_core::Context`: sp 0, pc 8, lr 16,
//! x19-x28 24..104, fp 104, d8-d15 112..176, fpcr 176.

use std::arch::naked_asm;
use vcthread_core::traits::ArchContext;
use vcthread_core::Context;

pub struct Arch;

unsafe impl ArchContext for Arch {
    #[inline]
    fn init_context(
        ctx: &mut Context,
        stack_top: *mut u8,
        entry: extern "C" fn(usize) -> !,
        arg: usize,
    ) {
        let sp = (stack_top as usize) & !0xF;
        *ctx = Context::new();
        ctx.sp = sp as u64;
        ctx.pc = context_trampoline as *const () as usize as u64;
        ctx.x19_x28[0] = entry as *const () as usize as u64;
        ctx.x19_x28[1] = arg as u64;
    }

    #[inline]
    unsafe fn switch(old: *mut Context, new: *const Context) {
        context_switch(old, new)
    }

    #[inline]
    unsafe fn restore(ctx: *const Context) -> ! {
        context_restore(ctx)
    }
}

/// First instruction of every fresh context: `entry(arg)` from x19/x20
#[unsafe(naked)]
unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "mov x29, xzr",
        "mov x30, xzr",
        "mov x0, x20",
        "blr x19",
        "brk #1",
    );
}

/// Save callee-saved state into `old` (x0), resume `new` (x1)
///
/// The saved pc is our own return address, so restoring `old` returns
/// straight to whoever called `switch`.
#[unsafe(naked)]
unsafe extern "C" fn context_switch(_old: *mut Context, _new: *const Context) {
    naked_asm!(
        "mov x9, sp",
        "str x9, [x0, #0]",
        "str x30, [x0, #8]",
        "str x30, [x0, #16]",
        "stp x19, x20, [x0, #24]",
        "stp x21, x22, [x0, #40]",
        "stp x23, x24, [x0, #56]",
        "stp x25, x26, [x0, #72]",
        "stp x27, x28, [x0, #88]",
        "str x29, [x0, #104]",
        "stp d8, d9, [x0, #112]",
        "stp d10, d11, [x0, #128]",
        "stp d12, d13, [x0, #144]",
        "stp d14, d15, [x0, #160]",
        "mrs x9, fpcr",
        "str x9, [x0, #176]",
        "mov x0, x1",
        "b {restore}",
        restore = sym context_restore,
    );
}

/// Resume `ctx` (x0) without saving anything
#[unsafe(naked)]
unsafe extern "C" fn context_restore(_ctx: *const Context) -> ! {
    naked_asm!(
        "ldr x9, [x0, #0]",
        "mov sp, x9",
        "ldr x10, [x0, #8]",
        "ldr x30, [x0, #16]",
        "ldp x19, x20, [x0, #24]",
        "ldp x21, x22, [x0, #40]",
        "ldp x23, x24, [x0, #56]",
        "ldp x25, x26, [x0, #72]",
        "ldp x27, x28, [x0, #88]",
        "ldr x29, [x0, #104]",
        "ldp d8, d9, [x0, #112]",
        "ldp d10, d11, [x0, #128]",
        "ldp d12, d13, [x0, #144]",
        "ldp d14, d15, [x0, #160]",
        "ldr x9, [x0, #176]",
        "msr fpcr, x9",
        "br x10",
    );
}
