//! # Kernel Entry Point

#![no_std]
#![no_main]
#![allow(unsafe_code)]

use kernel::platform::{halt, kernel_main};
use kernel_info::boot::KernelBootInfo;
use kernel_qemu::qemu_trace;

/// Stack the bootstrap processor runs on until it joins the scheduler.
const BOOT_STACK_SIZE: usize = 64 * 1024;

#[repr(align(16))]
struct Aligned16<const N: usize>([u8; N]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned16<BOOT_STACK_SIZE> = Aligned16([0; BOOT_STACK_SIZE]);

const _: () = assert!(BOOT_STACK_SIZE.is_multiple_of(16));

/// The loader jumps here with `boot_info` in `RDI`, interrupts off.
///
/// Naked so that nothing touches the loader's stack before `RSP` points at
/// [`BOOT_STACK`].
#[unsafe(no_mangle)]
#[unsafe(naked)]
#[unsafe(link_section = ".text.boot")]
pub extern "C" fn _start_kernel(_boot_info: *const KernelBootInfo) {
    core::arch::naked_asm!(
        "cli",
        "mov r12, rdi",
        "lea rax, [rip + {stack}]",
        "add rax, {size}",
        "and rax, -16",
        "mov rsp, rax",
        // Fake return address so RSP % 16 == 8 on entry, as after a CALL.
        "push 0",
        "xor rbp, rbp",
        "mov rdi, r12",
        "jmp {entry}",
        stack = sym BOOT_STACK,
        size = const BOOT_STACK_SIZE,
        entry = sym kernel_entry_on_boot_stack,
    );
}

extern "C" fn kernel_entry_on_boot_stack(boot_info: *const KernelBootInfo) -> ! {
    qemu_trace!("kernel: entered on the boot stack\n");
    // SAFETY: the loader passes a valid, immutable boot info block.
    match unsafe { boot_info.as_ref() } {
        Some(bi) => kernel_main(bi),
        None => {
            qemu_trace!("kernel: no boot info\n");
            halt()
        }
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    qemu_trace!("kernel panic: {info}\n");
    halt()
}
