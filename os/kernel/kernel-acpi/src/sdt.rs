//! System Description Table headers and the root-table walk.

use crate::{AcpiError, AcpiRoots, PhysMapRo, map_checked, read_u32, read_u64, sum};
use core::fmt;
use log::debug;

/// Size of the common header in front of every SDT.
pub const HEADER_LEN: usize = 36;

/// A four-byte table signature such as `APIC` or `XSDT`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 4]);

impl Signature {
    pub const MADT: Self = Self(*b"APIC");
    pub const RSDT: Self = Self(*b"RSDT");
    pub const XSDT: Self = Self(*b"XSDT");
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

/// The fields of the common header this crate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdtHeader {
    pub signature: Signature,
    pub length: u32,
    pub revision: u8,
}

impl SdtHeader {
    /// Decode the header at the start of `bytes`.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let head = bytes.get(..HEADER_LEN)?;
        Some(Self {
            signature: Signature(head[..4].try_into().ok()?),
            length: read_u32(head, 4)?,
            revision: head[8],
        })
    }
}

/// Check a complete table: header present, claimed length fits, sums to zero.
///
/// Returns the table trimmed to its claimed length.
///
/// # Errors
/// [`AcpiError::Truncated`] or [`AcpiError::TableChecksum`].
pub fn validate(bytes: &[u8]) -> Result<(SdtHeader, &[u8]), AcpiError> {
    let header = SdtHeader::parse(bytes).ok_or(AcpiError::Truncated(Signature(*b"????")))?;
    let len = header.length as usize;
    if len < HEADER_LEN {
        return Err(AcpiError::Truncated(header.signature));
    }
    let table = bytes
        .get(..len)
        .ok_or(AcpiError::Truncated(header.signature))?;
    if sum(table) != 0 {
        return Err(AcpiError::TableChecksum(header.signature));
    }
    Ok((header, table))
}

/// Map and validate the table at `addr`.
///
/// # Safety
/// `addr` must be the physical address of an ACPI table mapped by `map`.
unsafe fn load<'a, M: PhysMapRo>(map: &M, addr: u64) -> Result<(SdtHeader, &'a [u8]), AcpiError> {
    let head = unsafe { map_checked(map, addr, HEADER_LEN)? };
    let header = SdtHeader::parse(head).ok_or(AcpiError::Truncated(Signature(*b"????")))?;
    let bytes = unsafe { map_checked(map, addr, header.length as usize)? };
    validate(bytes)
}

/// Physical addresses listed in a root table with `width`-byte entries.
///
/// # Errors
/// If the root table is not a valid RSDT/XSDT.
pub fn root_entries(
    root: &[u8],
    width: usize,
) -> Result<impl Iterator<Item = u64> + '_, AcpiError> {
    let (header, table) = validate(root)?;
    let expected = if width == 8 {
        Signature::XSDT
    } else {
        Signature::RSDT
    };
    if header.signature != expected {
        return Err(AcpiError::UnexpectedSignature {
            expected,
            found: header.signature,
        });
    }
    let body = &table[HEADER_LEN..];
    Ok(body.chunks_exact(width).filter_map(move |c| {
        if width == 8 {
            read_u64(c, 0)
        } else {
            read_u32(c, 0).map(u64::from)
        }
    }))
}

/// Locate and validate the first table with `signature`.
///
/// # Errors
/// [`AcpiError::NotFound`] if no listed table matches;
/// [`AcpiError::Unmapped`] if a listed table cannot be reached; validation
/// errors of the root table or of the matching table.
///
/// # Safety
/// `roots` must come from the firmware RSDP and every listed table must be
/// mapped by `map`.
pub unsafe fn find_table<'a, M: PhysMapRo>(
    map: &M,
    roots: &AcpiRoots,
    signature: Signature,
) -> Result<&'a [u8], AcpiError> {
    let (root_addr, width) = roots.root().ok_or(AcpiError::NoRootTable)?;
    let (_, root) = unsafe { load(map, root_addr)? };

    for addr in root_entries(root, width)? {
        let head = unsafe { map_checked(map, addr, HEADER_LEN)? };
        let Some(header) = SdtHeader::parse(head) else {
            continue;
        };
        debug!("ACPI table {} at {addr:#x}", header.signature);
        if header.signature == signature {
            return unsafe { load(map, addr) }.map(|(_, table)| table);
        }
    }
    Err(AcpiError::NotFound(signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seal_table;

    fn table(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut t = Vec::new();
        t.extend_from_slice(sig);
        t.extend_from_slice(&u32::try_from(HEADER_LEN + body.len()).unwrap().to_le_bytes());
        t.push(1);
        t.push(0);
        t.extend_from_slice(&[0; 26]);
        t.extend_from_slice(body);
        seal_table(&mut t);
        t
    }

    #[test]
    fn validates_length_and_checksum() {
        let t = table(b"FACP", &[1, 2, 3]);
        let (h, bytes) = validate(&t).unwrap();
        assert_eq!(h.signature, Signature(*b"FACP"));
        assert_eq!(bytes.len(), 39);

        let mut bad = t.clone();
        bad[37] ^= 0xFF;
        assert_eq!(
            validate(&bad),
            Err(AcpiError::TableChecksum(Signature(*b"FACP")))
        );
        assert_eq!(
            validate(&t[..38]),
            Err(AcpiError::Truncated(Signature(*b"FACP")))
        );
    }

    #[test]
    fn walks_rsdt_and_xsdt() {
        let rsdt = table(b"RSDT", &[0x00, 0x10, 0, 0, 0x00, 0x20, 0, 0]);
        let e: Vec<_> = root_entries(&rsdt, 4).unwrap().collect();
        assert_eq!(e, [0x1000, 0x2000]);

        let mut body = Vec::new();
        body.extend_from_slice(&0x1_0000_0000u64.to_le_bytes());
        let xsdt = table(b"XSDT", &body);
        let e: Vec<_> = root_entries(&xsdt, 8).unwrap().collect();
        assert_eq!(e, [0x1_0000_0000]);

        assert!(matches!(
            root_entries(&xsdt, 4),
            Err(AcpiError::UnexpectedSignature { .. })
        ));
    }

    #[test]
    fn signature_display_is_ascii() {
        assert_eq!(Signature::MADT.to_string(), "APIC");
        assert_eq!(Signature([b'A', 0, b'C', 0xFF]).to_string(), "A?C?");
    }
}
