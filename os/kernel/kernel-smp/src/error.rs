use crate::CoreId;
use kernel_memory_addresses::{AddressError, PhysicalAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SmpError {
    /// No physical memory for the kernel stack of a core. That core and every
    /// core after it in table order was not started.
    #[error("no kernel stack for {core} (APIC id {apic_id})")]
    StackAllocation { core: CoreId, apic_id: u32 },
    #[error("{count} cores exceed the table capacity of {max}")]
    TooManyCores { count: usize, max: usize },
    #[error("APIC id {0} is listed twice")]
    DuplicateApicId(u32),
    #[error("the core table is empty")]
    NoCores,
    #[error("APIC id {0} is not in the core table")]
    UnknownCore(u32),
    #[error("entry stub of {len} bytes exceeds the {max}-byte trampoline")]
    StubTooLarge { len: usize, max: usize },
    #[error("trampoline region of {0} bytes is too small")]
    RegionTooSmall(usize),
    /// The start-up IPI could not be delivered; the processor was not signalled.
    #[error("cannot start APIC id {apic_id} at {target}")]
    Startup { apic_id: u32, target: PhysicalAddress },
    #[error("{0} is not reachable before long mode")]
    Above4G(PhysicalAddress),
    #[error(transparent)]
    Address(#[from] AddressError),
}
