//! Saved hardware context layout
//!
//! Only callee-saved state is kept: every switch happens at a call
//! boundary (voluntary yield, or a yield issued from inside the
//! notification signal handler, whose frame already holds the rest).
//! The layout is shared with the assembly in `vcthread-runtime::arch`,
//! so field order and offsets are fixed.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Callee-saved registers per System V AMD64 ABI, plus the SSE and
        /// x87 control words.
        #[repr(C, align(16))]
        #[derive(Clone, Copy)]
        pub struct Context {
            pub rsp: u64,   // 0x00
            pub rip: u64,   // 0x08
            pub rbx: u64,   // 0x10
            pub rbp: u64,   // 0x18
            pub r12: u64,   // 0x20
            pub r13: u64,   // 0x28
            pub r14: u64,   // 0x30
            pub r15: u64,   // 0x38
            pub mxcsr: u32, // 0x40
            pub fpucw: u16, // 0x44
            _pad: [u8; 10],
        }

        impl Context {
            /// MXCSR power-on value: all exceptions masked, round to nearest
            pub const DEFAULT_MXCSR: u32 = 0x1F80;
            /// x87 control word power-on value
            pub const DEFAULT_FPUCW: u16 = 0x037F;

            pub const fn new() -> Self {
                Self {
                    rsp: 0, rip: 0, rbx: 0, rbp: 0,
                    r12: 0, r13: 0, r14: 0, r15: 0,
                    mxcsr: Self::DEFAULT_MXCSR,
                    fpucw: Self::DEFAULT_FPUCW,
                    _pad: [0; 10],
                }
            }

            #[inline]
            pub fn stack_pointer(&self) -> usize {
                self.rsp as usize
            }

            #[inline]
            pub fn program_counter(&self) -> usize {
                self.rip as usize
            }
        }

        const _: () = {
            assert!(core::mem::offset_of!(Context, rip) == 0x08);
            assert!(core::mem::offset_of!(Context, r15) == 0x38);
            assert!(core::mem::offset_of!(Context, mxcsr) == 0x40);
            assert!(core::mem::offset_of!(Context, fpucw) == 0x44);
        };
    } else if #[cfg(target_arch = "aarch64")] {
        /// Callee-saved registers per AAPCS64: x19-x29, sp, the link
        /// register, the low halves of v8-v15 and FPCR.
        #[repr(C, align(16))]
        #[derive(Clone, Copy)]
        pub struct Context {
            pub sp: u64,        // 0
            pub pc: u64,        // 8
            pub lr: u64,        // 16
            pub x19_x28: [u64; 10], // 24
            pub fp: u64,        // 104
            pub d8_d15: [u64; 8],   // 112
            pub fpcr: u64,      // 176
            _pad: u64,
        }

        impl Context {
            pub const fn new() -> Self {
                Self {
                    sp: 0, pc: 0, lr: 0,
                    x19_x28: [0; 10],
                    fp: 0,
                    d8_d15: [0; 8],
                    fpcr: 0,
                    _pad: 0,
                }
            }

            #[inline]
            pub fn stack_pointer(&self) -> usize {
                self.sp as usize
            }

            #[inline]
            pub fn program_counter(&self) -> usize {
                self.pc as usize
            }
        }

        const _: () = {
            assert!(core::mem::offset_of!(Context, x19_x28) == 24);
            assert!(core::mem::offset_of!(Context, fp) == 104);
            assert!(core::mem::offset_of!(Context, d8_d15) == 112);
            assert!(core::mem::offset_of!(Context, fpcr) == 176);
        };
    } else {
        compile_error!("Unsupported architecture");
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Context {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("sp", &format_args!("{:#x}", self.stack_pointer()))
            .field("pc", &format_args!("{:#x}", self.program_counter()))
            .finish()
    }
}
