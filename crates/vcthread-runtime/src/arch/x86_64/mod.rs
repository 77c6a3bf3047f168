//! x86_64 context switching
//!
//! Naked functions (stable since Rust 1.88). The offsets used here match
//! `vcthread_core::Context`.

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
        // The trampoline is jumped to with a 16-byte aligned rsp, so its
        // `call` leaves the entry function with the ABI's rsp % 16 == 8.
        let sp = (stack_top as usize) & !0xF;
        *ctx = Context::new();
        ctx.rsp = sp as u64;
        ctx.rip = context_trampoline as *const () as usize as u64;
        ctx.r12 = entry as *const () as usize as u64;
        ctx.r13 = arg as u64;
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

/// First instruction of every fresh context: `entry(arg)` from r12/r13
#[unsafe(naked)]
unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "xor ebp, ebp",
        "mov rdi, r13",
        "call r12",
        "ud2",
    );
}

/// Save callee-saved state into `old` (RDI), resume `new` (RSI)
#[unsafe(naked)]
unsafe extern "C" fn context_switch(_old: *mut Context, _new: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "stmxcsr dword ptr [rdi + 0x40]",
        "fnstcw word ptr [rdi + 0x44]",
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "ldmxcsr dword ptr [rsi + 0x40]",
        "fldcw word ptr [rsi + 0x44]",
        "jmp rax",
        // Resumed here when `old` is restored
        "1:",
        "ret",
    );
}

/// Resume `ctx` (RDI) without saving anything
#[unsafe(naked)]
unsafe extern "C" fn context_restore(_ctx: *const Context) -> ! {
    naked_asm!(
        "mov rsp, [rdi + 0x00]",
        "mov rax, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov rbp, [rdi + 0x18]",
        "mov r12, [rdi + 0x20]",
        "mov r13, [rdi + 0x28]",
        "mov r14, [rdi + 0x30]",
        "mov r15, [rdi + 0x38]",
        "ldmxcsr dword ptr [rdi + 0x40]",
        "fldcw word ptr [rdi + 0x44]",
        "jmp rax",
    );
}
