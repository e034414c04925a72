//! # Application Processor Entry Stub
//!
//! A processor woken by a start-up IPI begins in 16-bit real mode at
//! `TRAMPOLINE_PHYS`. The stub below is assembled into the kernel image,
//! copied there by [`kernel_smp::SmpBoot`], and walks the processor up to
//! long mode using only the parameter footer just below it:
//!
//! 1. Load a flat GDT, enter protected mode, switch to the temporary stack.
//! 2. Enable PAE, load the boot page-table root, set `EFER.LME`/`NXE`, enable
//!    paging, far-jump into 64-bit code.
//! 3. Load the kernel stack top and jump to the physical entry address.
//!
//! The stub is position dependent: every absolute address is computed
//! relative to `TRAMPOLINE_PHYS`. The boot page table must identity-map the
//! trampoline page and the entry address.
//!
//! The entry address is [`ap_long_mode_entry`], which only leaves the
//! identity mapping for the kernel's higher-half `ap_main`.

use kernel_info::smp::{TRAMPOLINE_PHYS, footer};

core::arch::global_asm!(
    ".section .rodata.ap_stub, \"a\"",
    ".global ap_stub_start",
    ".global ap_stub_end",
    ".code16",
    "ap_stub_start:",
    "    cli",
    "    cld",
    "    xorw %ax, %ax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    movw %ax, %ss",
    "    lgdtl (ap_stub_gdt_pointer - ap_stub_start + {base})",
    "    movl %cr0, %eax",
    "    orl $1, %eax",
    "    movl %eax, %cr0",
    "    ljmpl $0x08, $(ap_stub_32 - ap_stub_start + {base})",
    "",
    ".code32",
    "ap_stub_32:",
    "    movw $0x10, %ax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    movw %ax, %ss",
    "    movl ({base} - {reserve}), %esp",
    "    movl %cr4, %eax",
    "    orl $(1 << 5), %eax",
    "    movl %eax, %cr4",
    "    movl ({base} - {root}), %eax",
    "    movl %eax, %cr3",
    "    movl $0xC0000080, %ecx",
    "    rdmsr",
    "    orl $((1 << 8) | (1 << 11)), %eax",
    "    wrmsr",
    "    movl %cr0, %eax",
    "    orl $((1 << 31) | (1 << 16)), %eax",
    "    movl %eax, %cr0",
    "    ljmpl $0x18, $(ap_stub_64 - ap_stub_start + {base})",
    "",
    ".code64",
    "ap_stub_64:",
    "    xorl %eax, %eax",
    "    movw %ax, %ds",
    "    movw %ax, %es",
    "    movw %ax, %ss",
    "    movq ({base} - {stack}), %rsp",
    "    movl ({base} - {entry}), %eax",
    "    jmpq *%rax",
    "",
    ".balign 8",
    "ap_stub_gdt:",
    "    .quad 0",
    "    .quad 0x00cf9a000000ffff",
    "    .quad 0x00cf92000000ffff",
    "    .quad 0x00209a0000000000",
    "ap_stub_gdt_pointer:",
    "    .word ap_stub_gdt_pointer - ap_stub_gdt - 1",
    "    .long ap_stub_gdt - ap_stub_start + {base}",
    "ap_stub_end:",
    "",
    ".text",
    base = const TRAMPOLINE_PHYS,
    reserve = const footer::STACK_RESERVE,
    root = const footer::PAGE_TABLE_ROOT,
    stack = const footer::STACK_TOP,
    entry = const footer::ENTRY,
    options(att_syntax)
);

unsafe extern "C" {
    static ap_stub_start: u8;
    static ap_stub_end: u8;
}

/// The assembled stub, ready to be copied to the trampoline.
#[must_use]
pub fn stub() -> &'static [u8] {
    let start = &raw const ap_stub_start;
    let end = &raw const ap_stub_end;
    // SAFETY: both symbols delimit one read-only section of the kernel image.
    unsafe {
        let len = end.offset_from(start).unsigned_abs();
        core::slice::from_raw_parts(start, len)
    }
}

/// First 64-bit code an application processor runs, still on the identity
/// mapping and already on its kernel stack.
///
/// Lives in `.text.boot` so the linker keeps it in the identity-mapped
/// start of the image.
#[unsafe(naked)]
#[unsafe(link_section = ".text.boot")]
pub unsafe extern "C" fn ap_long_mode_entry() -> ! {
    core::arch::naked_asm!(
        "and rsp, -16",
        "push 0",
        "xor rbp, rbp",
        "movabs rax, offset {main}",
        "jmp rax",
        main = sym crate::platform::ap_main,
    );
}
