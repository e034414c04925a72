//! # Memory Layout

use kernel_memory_addresses::{DirectMap, VirtualAddress};

/// End of userspace VA range after which Kernel space begins.
pub const LAST_USERSPACE_ADDRESS: u64 = 0xffff_0000_0000_0000;

/// Higher Half Direct Map (HHDM) base.
/// Physical address `pa` is visible to the kernel at [`HHDM_BASE`] + `pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Amount of physical memory covered by the direct map.
pub const HHDM_LIMIT: u64 = 64 * 1024 * 1024 * 1024; // 64 GiB

/// Where the kernel executes (VMA), matches the linker script.
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the kernel image is placed in *physical* memory (LMA).
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// Low identity map kept alive so application processors can run their
/// trampoline and the early long-mode landing code before jumping high.
pub const IDENTITY_LOW_BYTES: u64 = 0x20_0000; // 2 MiB

/// Size of every per-core kernel stack.
pub const KERNEL_STACK_SIZE: usize = 32 * 1024;

/// Number of 4 KiB frames per kernel stack.
pub const KERNEL_STACK_PAGES: usize = KERNEL_STACK_SIZE / 4096;

/// The kernel's direct map of physical memory.
#[must_use]
pub const fn kernel_direct_map() -> DirectMap {
    DirectMap::new(VirtualAddress::new(HHDM_BASE), HHDM_LIMIT)
}

/// Physical address of a kernel image symbol, given its link-time address.
///
/// Returns `None` for addresses below [`KERNEL_BASE`].
#[must_use]
pub const fn kernel_image_phys(va: u64) -> Option<u64> {
    match va.checked_sub(KERNEL_BASE) {
        Some(off) => Some(PHYS_LOAD + off),
        None => None,
    }
}

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(HHDM_BASE >= LAST_USERSPACE_ADDRESS);
    assert!(KERNEL_BASE > HHDM_BASE + HHDM_LIMIT);
    assert!(KERNEL_BASE.is_multiple_of(2 * 1024 * 1024));
    assert!(PHYS_LOAD.is_multiple_of(4096));
};

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn direct_map_covers_low_memory() {
        let map = kernel_direct_map();
        let va = map.to_virtual(PhysicalAddress::new(0x7000)).unwrap();
        assert_eq!(va.as_u64(), HHDM_BASE + 0x7000);
    }

    #[test]
    fn image_addresses_translate() {
        assert_eq!(kernel_image_phys(KERNEL_BASE + 0x1234), Some(PHYS_LOAD + 0x1234));
        assert_eq!(kernel_image_phys(HHDM_BASE), None);
    }
}
