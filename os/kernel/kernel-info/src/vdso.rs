//! # VDSO Page Contract
//!
//! Every process may have one read-only page at [`VDSO_ADDR`] carrying data the
//! kernel wants user space to read without a system call.
//!
//! ```text
//! offset 0  u32  VDSO_MAGIC ("vdso" read as a little-endian word)
//! offset 4  i32  process id
//! ```
//!
//! Readers must treat any other magic as "no VDSO" and fall back to the
//! system call.

use crate::process::Pid;

/// Fixed user virtual address of the VDSO page in every address space.
pub const VDSO_ADDR: u64 = 0x4000_0000;

/// Marker identifying a valid VDSO page.
pub const VDSO_MAGIC: u32 = 0x7664_736f;

/// Size of the VDSO page.
pub const VDSO_SIZE: usize = 4096;

pub const MAGIC_OFFSET: usize = 0;
pub const PID_OFFSET: usize = 4;

/// The data at the start of a VDSO page.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdsoData {
    pub magic: u32,
    pub pid: i32,
}

impl VdsoData {
    #[must_use]
    pub const fn new(pid: Pid) -> Self {
        Self {
            magic: VDSO_MAGIC,
            pid: pid.as_i32(),
        }
    }

    /// Decode the header of a page, or `None` if the magic is not ours.
    #[must_use]
    pub fn parse(page: &[u8]) -> Option<Self> {
        let magic = read_u32(page, MAGIC_OFFSET)?;
        if magic != VDSO_MAGIC {
            return None;
        }
        let pid = read_u32(page, PID_OFFSET)?;
        Some(Self {
            magic,
            pid: i32::from_le_bytes(pid.to_le_bytes()),
        })
    }

    /// Write magic and pid to the start of `page`.
    ///
    /// # Panics
    /// If `page` is shorter than the header.
    pub fn write_to(&self, page: &mut [u8]) {
        page[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&self.magic.to_le_bytes());
        write_pid(page, Pid::new(self.pid));
    }

    #[must_use]
    pub const fn pid(&self) -> Pid {
        Pid::new(self.pid)
    }
}

/// Overwrite only the pid field of a page.
///
/// # Panics
/// If `page` is shorter than the header.
pub fn write_pid(page: &mut [u8], pid: Pid) {
    page[PID_OFFSET..PID_OFFSET + 4].copy_from_slice(&pid.as_i32().to_le_bytes());
}

/// Whether `page` starts with [`VDSO_MAGIC`].
#[must_use]
pub fn has_magic(page: &[u8]) -> bool {
    read_u32(page, MAGIC_OFFSET) == Some(VDSO_MAGIC)
}

fn read_u32(page: &[u8], offset: usize) -> Option<u32> {
    let bytes = page.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

const _: () = {
    assert!(VDSO_ADDR.is_multiple_of(VDSO_SIZE as u64));
    assert!(size_of::<VdsoData>() == 8);
    assert!(core::mem::offset_of!(VdsoData, pid) == PID_OFFSET);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_vdso() {
        assert_eq!(&VDSO_MAGIC.to_be_bytes(), b"vdso");
    }

    #[test]
    fn parse_accepts_written_header() {
        let mut page = [0u8; VDSO_SIZE];
        VdsoData::new(Pid::new(42)).write_to(&mut page);
        assert_eq!(VdsoData::parse(&page).map(|d| d.pid()), Some(Pid::new(42)));
    }

    #[test]
    fn parse_rejects_foreign_or_short_pages() {
        let mut page = [0u8; VDSO_SIZE];
        assert_eq!(VdsoData::parse(&page), None);
        page[..4].copy_from_slice(&0xdead_beef_u32.to_le_bytes());
        assert_eq!(VdsoData::parse(&page), None);
        assert_eq!(VdsoData::parse(&[0x6f, 0x73]), None);
    }

    #[test]
    fn write_pid_leaves_everything_else() {
        let mut page = [0xAAu8; 64];
        write_pid(&mut page, Pid::new(-1));
        assert_eq!(&page[4..8], &[0xFF; 4]);
        assert!(page[..4].iter().chain(&page[8..]).all(|b| *b == 0xAA));
        assert!(!has_magic(&page));
    }
}
