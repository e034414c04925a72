use crate::{PhysicalAddress, VirtualAddress};

/// Failed address conversion or arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("physical address {0} is outside the direct map")]
    PhysicalOutOfWindow(PhysicalAddress),
    #[error("virtual address {0} is outside the direct map")]
    VirtualOutOfWindow(VirtualAddress),
    #[error("address arithmetic overflowed")]
    Overflow,
    #[error("address {addr:#x} is not aligned to {align:#x}")]
    Misaligned { addr: u64, align: u64 },
}
