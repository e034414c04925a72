//! # Kernel Boot Information

/// Kernel entry point as called by the loader.
pub type KernelEntryFn = extern "C" fn(*const KernelBootInfo) -> !;

/// What the loader hands to the kernel.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct KernelBootInfo {
    /// RSDP (ACPI 2.0+) physical address, or 0 if not provided.
    pub rsdp_addr: u64,

    /// First byte of usable RAM above the kernel image.
    pub free_phys_start: u64,

    /// One past the last byte of usable RAM.
    pub free_phys_end: u64,

    /// Physical address of the kernel's top-level page table.
    pub kernel_page_table: u64,
}

impl KernelBootInfo {
    /// The RSDP address, if the loader found one.
    #[must_use]
    pub const fn rsdp(&self) -> Option<u64> {
        if self.rsdp_addr == 0 {
            None
        } else {
            Some(self.rsdp_addr)
        }
    }
}
