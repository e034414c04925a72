//! Multiple APIC Description Table.
//!
//! After the common header the MADT carries the local APIC address and a
//! flags word, followed by variable-length interrupt controller structures,
//! each starting with a `(type, length)` byte pair.

use crate::sdt::{HEADER_LEN, Signature, validate};
use crate::{AcpiError, AcpiRoots, PhysMapRo, find_table, read_u32};
use kernel_info::smp::MAX_CPUS;
use log::{debug, warn};

const ENTRIES_START: usize = HEADER_LEN + 8;

/// Processor is usable (bit 0 of the Local APIC / x2APIC flags).
pub const PROCESSOR_ENABLED: u32 = 1 << 0;

/// One interrupt controller structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MadtEntry {
    /// Type 0.
    LocalApic {
        processor_uid: u8,
        apic_id: u8,
        flags: u32,
    },
    /// Type 1.
    IoApic {
        id: u8,
        address: u32,
        gsi_base: u32,
    },
    /// Type 9, used for APIC ids that do not fit in a byte.
    LocalX2Apic {
        x2apic_id: u32,
        flags: u32,
        processor_uid: u32,
    },
    /// Anything else, skipped.
    Other { kind: u8, length: u8 },
}

impl MadtEntry {
    /// The APIC id of an enabled processor entry.
    #[must_use]
    pub fn enabled_apic_id(&self) -> Option<u32> {
        match *self {
            Self::LocalApic { apic_id, flags, .. } if flags & PROCESSOR_ENABLED != 0 => {
                Some(u32::from(apic_id))
            }
            Self::LocalX2Apic {
                x2apic_id, flags, ..
            } if flags & PROCESSOR_ENABLED != 0 => Some(x2apic_id),
            _ => None,
        }
    }
}

/// A validated MADT.
#[derive(Debug, Clone, Copy)]
pub struct Madt<'a> {
    pub local_apic_addr: u32,
    pub flags: u32,
    table: &'a [u8],
}

impl<'a> Madt<'a> {
    /// Validate `table` as an MADT.
    ///
    /// # Errors
    /// Checksum or length problems, or a table that is not an MADT.
    pub fn parse(table: &'a [u8]) -> Result<Self, AcpiError> {
        let (header, table) = validate(table)?;
        if header.signature != Signature::MADT {
            return Err(AcpiError::UnexpectedSignature {
                expected: Signature::MADT,
                found: header.signature,
            });
        }
        let truncated = AcpiError::Truncated(Signature::MADT);
        Ok(Self {
            local_apic_addr: read_u32(table, HEADER_LEN).ok_or(truncated)?,
            flags: read_u32(table, HEADER_LEN + 4).ok_or(truncated)?,
            table,
        })
    }

    /// Interrupt controller structures in table order.
    ///
    /// A malformed entry is yielded as an error and ends the iteration.
    #[must_use]
    pub const fn entries(&self) -> Entries<'a> {
        Entries {
            table: self.table,
            offset: ENTRIES_START,
        }
    }
}

/// Iterator over [`MadtEntry`] values.
pub struct Entries<'a> {
    table: &'a [u8],
    offset: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<MadtEntry, AcpiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (table, at) = (self.table, self.offset);
        if at >= table.len() {
            return None;
        }
        let malformed = AcpiError::MalformedEntry { offset: at };
        let Some(entry) = table
            .get(at..at + 2)
            .and_then(|h| table.get(at..at + usize::from(h[1])))
            .filter(|e| e.len() >= 2)
        else {
            self.offset = table.len();
            return Some(Err(malformed));
        };
        self.offset += entry.len();

        let kind = entry[0];
        let parsed = match kind {
            0 if entry.len() >= 8 => Some(MadtEntry::LocalApic {
                processor_uid: entry[2],
                apic_id: entry[3],
                flags: read_u32(entry, 4).unwrap_or(0),
            }),
            1 if entry.len() >= 12 => Some(MadtEntry::IoApic {
                id: entry[2],
                address: read_u32(entry, 4).unwrap_or(0),
                gsi_base: read_u32(entry, 8).unwrap_or(0),
            }),
            9 if entry.len() >= 16 => Some(MadtEntry::LocalX2Apic {
                x2apic_id: read_u32(entry, 4).unwrap_or(0),
                flags: read_u32(entry, 8).unwrap_or(0),
                processor_uid: read_u32(entry, 12).unwrap_or(0),
            }),
            0 | 1 | 9 => None,
            _ => Some(MadtEntry::Other {
                kind,
                length: entry[1],
            }),
        };
        match parsed {
            Some(e) => Some(Ok(e)),
            None => {
                self.offset = table.len();
                Some(Err(malformed))
            }
        }
    }
}

/// APIC ids of the usable processors, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApicIds {
    ids: [u32; MAX_CPUS],
    len: usize,
}

impl ApicIds {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ids: [0; MAX_CPUS],
            len: 0,
        }
    }

    /// Append `id`. Returns `false` if the list is full.
    pub const fn push(&mut self, id: u32) -> bool {
        if self.len == MAX_CPUS {
            return false;
        }
        self.ids[self.len] = id;
        self.len += 1;
        true
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.ids[..self.len]
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ApicIds {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> FromIterator<&'a u32> for ApicIds {
    fn from_iter<T: IntoIterator<Item = &'a u32>>(iter: T) -> Self {
        let mut ids = Self::new();
        for &id in iter {
            if !ids.push(id) {
                break;
            }
        }
        ids
    }
}

/// Collect enabled processors from `madt`.
///
/// Processors beyond [`MAX_CPUS`] are ignored with a warning. An APIC id
/// listed twice (as both a type 0 and a type 9 entry) is counted once.
///
/// # Errors
/// The first malformed entry.
pub fn discover_cpus(madt: &Madt<'_>) -> Result<ApicIds, AcpiError> {
    let mut ids = ApicIds::new();
    for entry in madt.entries() {
        let Some(id) = entry?.enabled_apic_id() else {
            continue;
        };
        if ids.as_slice().contains(&id) {
            debug!("APIC id {id} listed twice");
            continue;
        }
        if !ids.push(id) {
            warn!("ignoring processor with APIC id {id}: more than {MAX_CPUS} cpus");
        }
    }
    Ok(ids)
}

/// Find the MADT through the firmware RSDP and collect its processors.
///
/// # Errors
/// Any [`AcpiError`] on the way from the RSDP to the MADT entries.
///
/// # Safety
/// Every slice `map` hands out must stay valid and unmodified while the
/// tables are read. Addresses `map` cannot reach come back as
/// [`AcpiError::Unmapped`].
pub unsafe fn cpus_from_rsdp<M: PhysMapRo>(map: &M, rsdp_addr: u64) -> Result<ApicIds, AcpiError> {
    let roots = unsafe { AcpiRoots::parse(map, rsdp_addr)? };
    let table = unsafe { find_table(map, &roots, Signature::MADT)? };
    discover_cpus(&Madt::parse(table)?)
}
