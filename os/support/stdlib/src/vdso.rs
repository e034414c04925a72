//! Reading the VDSO page.

use kernel_info::vdso::{VDSO_ADDR, VDSO_SIZE, VdsoData};

const HEADER_LEN: usize = 8;

const _: () = assert!(VDSO_SIZE >= HEADER_LEN);

/// Decode a VDSO page image. `None` if the magic does not match.
#[must_use]
pub fn decode(page: &[u8]) -> Option<VdsoData> {
    VdsoData::parse(page)
}

/// Read the VDSO page of the running process.
///
/// # Safety
/// Something must be mapped readable at `VDSO_ADDR`. The kernel maps the
/// VDSO there; a process it could not give one to must not call this.
#[must_use]
pub unsafe fn read() -> Option<VdsoData> {
    let base = VDSO_ADDR as usize as *const u8;
    // The kernel rewrites the pid behind our back.
    let mut header = [0u8; HEADER_LEN];
    for (i, byte) in header.iter_mut().enumerate() {
        // SAFETY: the caller guarantees the page is mapped; `i` stays inside it.
        *byte = unsafe { base.add(i).read_volatile() };
    }
    decode(&header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::process::Pid;
    use kernel_info::vdso::VDSO_MAGIC;

    #[test]
    fn decodes_kernel_layout() {
        let mut page = [0u8; VDSO_SIZE];
        page[..4].copy_from_slice(&VDSO_MAGIC.to_le_bytes());
        page[4..8].copy_from_slice(&42i32.to_le_bytes());
        assert_eq!(decode(&page).map(|d| d.pid()), Some(Pid::new(42)));
    }

    #[test]
    fn unknown_magic_is_no_vdso() {
        let mut page = [0u8; VDSO_SIZE];
        page[..4].copy_from_slice(b"vdsp");
        assert_eq!(decode(&page), None);
        assert_eq!(decode(&[]), None);
    }
}
