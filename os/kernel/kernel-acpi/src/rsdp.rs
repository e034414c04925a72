//! Root System Description Pointer.
//!
//! ACPI 1.0 RSDPs are 20 bytes and name a 32-bit RSDT. Revision 2 and later
//! extend the structure to 36 bytes with a 64-bit XSDT address and a second
//! checksum over the full length.

use crate::{AcpiError, PhysMapRo, map_checked, read_u32, read_u64, sum};

pub const RSDP_SIGNATURE: [u8; 8] = *b"RSD PTR ";
const V1_LEN: usize = 20;
const V2_LEN: usize = 36;

/// Root table addresses extracted from a validated RSDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcpiRoots {
    pub revision: u8,
    pub rsdt_addr: Option<u64>,
    pub xsdt_addr: Option<u64>,
}

impl AcpiRoots {
    /// Validate and decode an RSDP.
    ///
    /// # Errors
    /// Signature or checksum mismatches, or an RSDP without any root table.
    pub fn from_bytes(bytes: &[u8], at: u64) -> Result<Self, AcpiError> {
        let head = bytes.get(..V1_LEN).ok_or(AcpiError::RsdpSignature(at))?;
        if head[..8] != RSDP_SIGNATURE {
            return Err(AcpiError::RsdpSignature(at));
        }
        if sum(head) != 0 {
            return Err(AcpiError::RsdpChecksum);
        }

        let revision = head[15];
        let rsdt = read_u32(head, 16).filter(|&a| a != 0).map(u64::from);

        let xsdt = if revision >= 2 {
            let len = read_u32(bytes, 20).map_or(V2_LEN, |l| l as usize);
            let full = bytes
                .get(..len.max(V2_LEN))
                .ok_or(AcpiError::RsdpChecksum)?;
            if sum(full) != 0 {
                return Err(AcpiError::RsdpChecksum);
            }
            read_u64(full, 24).filter(|&a| a != 0)
        } else {
            None
        };

        if rsdt.is_none() && xsdt.is_none() {
            return Err(AcpiError::NoRootTable);
        }
        Ok(Self {
            revision,
            rsdt_addr: rsdt,
            xsdt_addr: xsdt,
        })
    }

    /// Read and validate the RSDP at physical address `rsdp_addr`.
    ///
    /// # Errors
    /// [`AcpiError::Unmapped`] if `map` cannot reach the RSDP; otherwise see
    /// [`from_bytes`](Self::from_bytes).
    ///
    /// # Safety
    /// `rsdp_addr` must point at firmware memory mapped by `map`.
    pub unsafe fn parse<M: PhysMapRo>(map: &M, rsdp_addr: u64) -> Result<Self, AcpiError> {
        let head = unsafe { map_checked(map, rsdp_addr, V1_LEN)? };
        let len = if head.get(15).copied().unwrap_or(0) >= 2 {
            V2_LEN
        } else {
            V1_LEN
        };
        let bytes = unsafe { map_checked(map, rsdp_addr, len)? };
        Self::from_bytes(bytes, rsdp_addr)
    }

    /// The preferred root table: the XSDT if present, else the RSDT.
    #[must_use]
    pub const fn root(&self) -> Option<(u64, usize)> {
        match (self.xsdt_addr, self.rsdt_addr) {
            (Some(x), _) => Some((x, 8)),
            (None, Some(r)) => Some((r, 4)),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsdp(revision: u8, rsdt: u32, xsdt: u64) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&RSDP_SIGNATURE);
        b.push(0);
        b.extend_from_slice(b"OEMID ");
        b.push(revision);
        b.extend_from_slice(&rsdt.to_le_bytes());
        b[8] = 0u8.wrapping_sub(sum(&b));
        if revision >= 2 {
            b.extend_from_slice(&36u32.to_le_bytes());
            b.extend_from_slice(&xsdt.to_le_bytes());
            b.extend_from_slice(&[0; 4]);
            b[32] = 0u8.wrapping_sub(sum(&b));
        }
        b
    }

    #[test]
    fn acpi1_uses_rsdt() {
        let roots = AcpiRoots::from_bytes(&rsdp(0, 0xE_0000, 0), 0).unwrap();
        assert_eq!(roots.rsdt_addr, Some(0xE_0000));
        assert_eq!(roots.xsdt_addr, None);
        assert_eq!(roots.root(), Some((0xE_0000, 4)));
    }

    #[test]
    fn acpi2_prefers_xsdt() {
        let roots = AcpiRoots::from_bytes(&rsdp(2, 0xE_0000, 0x7FE_0000), 0).unwrap();
        assert_eq!(roots.root(), Some((0x7FE_0000, 8)));
    }

    #[test]
    fn rejects_bad_checksums() {
        let mut b = rsdp(2, 0xE_0000, 0x7FE_0000);
        b[30] ^= 1;
        assert_eq!(AcpiRoots::from_bytes(&b, 0), Err(AcpiError::RsdpChecksum));
        b[30] ^= 1;
        b[16] ^= 1;
        assert_eq!(AcpiRoots::from_bytes(&b, 0), Err(AcpiError::RsdpChecksum));
    }

    #[test]
    fn rejects_missing_signature() {
        assert_eq!(
            AcpiRoots::from_bytes(&[0; 36], 0x1000),
            Err(AcpiError::RsdpSignature(0x1000))
        );
        assert_eq!(
            AcpiRoots::from_bytes(b"RSD", 0x1000),
            Err(AcpiError::RsdpSignature(0x1000))
        );
    }
}
