use kernel_memory_addresses::VirtualAddress;

/// Why a page-table operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No frame was available for an intermediate table.
    #[error("out of memory for page-table frames")]
    OutOfMemory,
    /// The leaf for this address is already present.
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
    /// The leaf for this address is not present.
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
    /// A 2 MiB or 1 GiB leaf covers this address.
    #[error("{0} is covered by a huge page")]
    HugePage(VirtualAddress),
    /// Address not 4 KiB aligned.
    #[error("{0} is not page aligned")]
    Misaligned(VirtualAddress),
}
