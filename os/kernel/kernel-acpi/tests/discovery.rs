//! Firmware tables laid out in a fake physical memory and discovered through
//! the RSDP, the way the kernel does it at boot.

use kernel_acpi::rsdp::RSDP_SIGNATURE;
use kernel_acpi::{AcpiError, PhysMapRo, Signature, cpus_from_rsdp, seal_table};

struct FakeFirmware {
    mem: Vec<u8>,
}

impl PhysMapRo for FakeFirmware {
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> Option<&'a [u8]> {
        let start = usize::try_from(paddr).ok()?;
        let bytes = self.mem.get(start..start.checked_add(len)?)?;
        // SAFETY: the fake outlives every test that borrows from it.
        Some(unsafe { core::slice::from_raw_parts(bytes.as_ptr(), bytes.len()) })
    }
}

const RSDP: usize = 0x100;
const XSDT: usize = 0x200;
const FACP: usize = 0x300;
const MADT: usize = 0x400;

fn sdt(sig: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(sig);
    t.extend_from_slice(&u32::try_from(36 + body.len()).unwrap().to_le_bytes());
    t.extend_from_slice(&[1, 0]);
    t.extend_from_slice(&[0; 26]);
    t.extend_from_slice(body);
    seal_table(&mut t);
    t
}

fn firmware(madt_body: &[u8]) -> FakeFirmware {
    firmware_with_tables(&[FACP as u64, MADT as u64], madt_body)
}

fn firmware_with_tables(tables: &[u64], madt_body: &[u8]) -> FakeFirmware {
    let mut mem = vec![0u8; 0x1000];

    let mut rsdp = Vec::new();
    rsdp.extend_from_slice(&RSDP_SIGNATURE);
    rsdp.push(0);
    rsdp.extend_from_slice(b"OEMID ");
    rsdp.push(2);
    rsdp.extend_from_slice(&0u32.to_le_bytes());
    rsdp[8] = 0u8.wrapping_sub(rsdp.iter().fold(0u8, |a, &b| a.wrapping_add(b)));
    rsdp.extend_from_slice(&36u32.to_le_bytes());
    rsdp.extend_from_slice(&(XSDT as u64).to_le_bytes());
    rsdp.extend_from_slice(&[0; 4]);
    rsdp[32] = 0u8.wrapping_sub(rsdp.iter().fold(0u8, |a, &b| a.wrapping_add(b)));

    let entries: Vec<u8> = tables.iter().flat_map(|t| t.to_le_bytes()).collect();

    let mut madt = Vec::new();
    madt.extend_from_slice(&0xFEE0_0000u32.to_le_bytes());
    madt.extend_from_slice(&1u32.to_le_bytes());
    madt.extend_from_slice(madt_body);

    for (at, bytes) in [
        (RSDP, rsdp),
        (XSDT, sdt(b"XSDT", &entries)),
        (FACP, sdt(b"FACP", &[0; 16])),
        (MADT, sdt(b"APIC", &madt)),
    ] {
        mem[at..at + bytes.len()].copy_from_slice(&bytes);
    }
    FakeFirmware { mem }
}

#[test]
fn finds_processors_through_the_xsdt() {
    let fw = firmware(&[0, 8, 0, 0, 1, 0, 0, 0, 0, 8, 1, 1, 1, 0, 0, 0, 0, 8, 2, 7, 1, 0, 0, 0]);
    // SAFETY: all tables live in the fake.
    let ids = unsafe { cpus_from_rsdp(&fw, RSDP as u64) }.unwrap();
    assert_eq!(ids.as_slice(), [0, 1, 7]);
}

#[test]
fn corrupted_madt_is_reported() {
    let mut fw = firmware(&[0, 8, 0, 0, 1, 0, 0, 0]);
    fw.mem[MADT + 40] ^= 0x55;
    // SAFETY: all tables live in the fake.
    let err = unsafe { cpus_from_rsdp(&fw, RSDP as u64) }.unwrap_err();
    assert_eq!(err, AcpiError::TableChecksum(Signature::MADT));
}

#[test]
fn missing_madt_is_reported() {
    let mut fw = firmware(&[]);
    fw.mem[MADT..MADT + 4].copy_from_slice(b"SSDT");
    seal_table(&mut fw.mem[MADT..MADT + 44]);
    // SAFETY: all tables live in the fake.
    let err = unsafe { cpus_from_rsdp(&fw, RSDP as u64) }.unwrap_err();
    assert_eq!(err, AcpiError::NotFound(Signature::MADT));
}

#[test]
fn garbage_at_the_rsdp_address_is_rejected() {
    let fw = firmware(&[]);
    // SAFETY: in-bounds read of the fake.
    let err = unsafe { cpus_from_rsdp(&fw, 0x800) }.unwrap_err();
    assert_eq!(err, AcpiError::RsdpSignature(0x800));
}

#[test]
fn table_outside_mapped_memory_is_reported() {
    let far = 0x10_0000_0000;
    let fw = firmware_with_tables(&[far, MADT as u64], &[0, 8, 0, 0, 1, 0, 0, 0]);
    // SAFETY: the fake refuses addresses it does not hold.
    let err = unsafe { cpus_from_rsdp(&fw, RSDP as u64) }.unwrap_err();
    assert_eq!(err, AcpiError::Unmapped { paddr: far, len: 36 });
    assert_eq!(err.to_string(), "36 bytes at 0x1000000000 are outside mapped memory");
}

#[test]
fn rsdp_outside_mapped_memory_is_reported() {
    let fw = firmware(&[]);
    // SAFETY: the fake refuses addresses it does not hold.
    let err = unsafe { cpus_from_rsdp(&fw, 0x2000) }.unwrap_err();
    assert_eq!(err, AcpiError::Unmapped { paddr: 0x2000, len: 20 });
}
