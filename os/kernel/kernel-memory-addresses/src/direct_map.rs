use crate::{AddressError, PhysicalAddress, VirtualAddress};

/// A linear window in which every physical byte below `phys_limit` is visible
/// at `virt_base + phys`.
///
/// This is the higher-half direct map (HHDM) on bare metal. Host tests use it
/// to describe their heap-backed fake RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMap {
    virt_base: VirtualAddress,
    phys_limit: u64,
}

impl DirectMap {
    /// Window of `phys_limit` bytes of physical memory starting at `virt_base`.
    #[must_use]
    pub const fn new(virt_base: VirtualAddress, phys_limit: u64) -> Self {
        Self {
            virt_base,
            phys_limit,
        }
    }

    #[must_use]
    pub const fn virt_base(&self) -> VirtualAddress {
        self.virt_base
    }

    #[must_use]
    pub const fn phys_limit(&self) -> u64 {
        self.phys_limit
    }

    /// Kernel-visible alias of `pa`.
    ///
    /// # Errors
    /// [`AddressError::PhysicalOutOfWindow`] if `pa` is beyond the mapped limit,
    /// [`AddressError::Overflow`] if the alias would wrap.
    pub const fn to_virtual(&self, pa: PhysicalAddress) -> Result<VirtualAddress, AddressError> {
        if pa.as_u64() >= self.phys_limit {
            return Err(AddressError::PhysicalOutOfWindow(pa));
        }
        self.virt_base.checked_add(pa.as_u64())
    }

    /// Physical address behind a direct-map alias.
    ///
    /// # Errors
    /// [`AddressError::VirtualOutOfWindow`] if `va` is not inside the window.
    pub const fn to_physical(&self, va: VirtualAddress) -> Result<PhysicalAddress, AddressError> {
        match va.as_u64().checked_sub(self.virt_base.as_u64()) {
            Some(off) if off < self.phys_limit => Ok(PhysicalAddress::new(off)),
            _ => Err(AddressError::VirtualOutOfWindow(va)),
        }
    }
}
