use crate::sdt::Signature;

/// Why firmware tables could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcpiError {
    #[error("no RSDP signature at {0:#x}")]
    RsdpSignature(u64),
    #[error("RSDP checksum mismatch")]
    RsdpChecksum,
    #[error("RSDP names neither an RSDT nor an XSDT")]
    NoRootTable,
    #[error("expected a {expected} table, found {found}")]
    UnexpectedSignature {
        expected: Signature,
        found: Signature,
    },
    #[error("{0} table checksum mismatch")]
    TableChecksum(Signature),
    #[error("{0} table is truncated")]
    Truncated(Signature),
    #[error("no {0} table present")]
    NotFound(Signature),
    #[error("{len} bytes at {paddr:#x} are outside mapped memory")]
    Unmapped { paddr: u64, len: usize },
    #[error("malformed MADT entry at offset {offset}")]
    MalformedEntry { offset: usize },
}
