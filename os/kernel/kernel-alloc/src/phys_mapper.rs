//! # Direct-Map [`PhysMapper`]
//!
//! With a higher-half direct map every physical address `pa` below the
//! window limit is visible at `HHDM_BASE + pa`, so reaching a page table or a
//! freshly allocated frame is a single addition.

use kernel_info::memory::kernel_direct_map;
use kernel_memory_addresses::{DirectMap, PhysicalAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] over a [`DirectMap`].
#[derive(Debug, Clone, Copy)]
pub struct HhdmPhysMapper {
    map: DirectMap,
}

impl HhdmPhysMapper {
    #[must_use]
    pub const fn new(map: DirectMap) -> Self {
        Self { map }
    }

    /// The mapper for the kernel's own HHDM.
    #[must_use]
    pub const fn kernel() -> Self {
        Self::new(kernel_direct_map())
    }

    #[must_use]
    pub const fn direct_map(&self) -> DirectMap {
        self.map
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T {
        let va = match self.map.to_virtual(at) {
            Ok(va) => va,
            Err(e) => panic!("physical access outside the direct map: {e}"),
        };
        // SAFETY: the caller guarantees `at` holds a valid `T`; the HHDM makes it visible at `va`.
        unsafe { &mut *va.as_mut_ptr::<T>() }
    }
}
