use crate::VdsoError;
use kernel_alloc::OwnedFrame;
use kernel_info::process::Pid;
use kernel_info::vdso::{VDSO_ADDR, VdsoData, has_magic, write_pid};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, FrameAlloc, PageEntryBits, PhysMapper, RootPage};
use log::{debug, warn};

const VDSO_VA: VirtualAddress = VirtualAddress::new(VDSO_ADDR);

/// What the VDSO page needs to know about a process.
pub trait VdsoProcess {
    fn pid(&self) -> Pid;

    /// Root of the process's page tables.
    fn address_space(&self) -> RootPage;
}

/// Outcome of [`VdsoManager::copy_on_fork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkCopy {
    /// The child got its own copy, backed by this page.
    Copied(PhysicalPage<Size4K>),
    /// The parent has no VDSO page, so neither does the child.
    NoVdso,
}

/// Outcome of [`VdsoManager::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The pid in this page was rewritten.
    Updated(PhysicalPage<Size4K>),
    /// Nothing is mapped at the VDSO address.
    NotMapped,
    /// Something without the VDSO magic is mapped there; it was left alone.
    ForeignPage(PhysicalPage<Size4K>),
}

/// Attaches, duplicates and refreshes VDSO pages.
pub struct VdsoManager<'m, M: PhysMapper> {
    mapper: &'m M,
}

impl<'m, M: PhysMapper> VdsoManager<'m, M> {
    pub const fn new(mapper: &'m M) -> Self {
        Self { mapper }
    }

    /// Give `process` a fresh VDSO page in `address_space`.
    ///
    /// # Errors
    /// - [`VdsoError::OutOfMemory`] if no page is free; nothing is mapped.
    /// - [`VdsoError::Map`] if the page cannot be mapped; the page is freed.
    pub fn setup<A, P>(
        &self,
        alloc: &mut A,
        address_space: RootPage,
        process: &P,
    ) -> Result<PhysicalPage<Size4K>, VdsoError>
    where
        A: FrameAlloc,
        P: VdsoProcess + ?Sized,
    {
        let mut frame = OwnedFrame::zeroed(&mut *alloc, self.mapper).ok_or_else(|| {
            warn!("pid {}: no page for the VDSO", process.pid());
            VdsoError::OutOfMemory
        })?;

        let page = frame.page();
        AddressSpace::from_root(self.mapper, address_space)
            .map_one(frame.allocator(), VDSO_VA, page, PageEntryBits::user_read_only())
            .inspect_err(|e| warn!("pid {}: VDSO mapping failed: {e}", process.pid()))?;

        VdsoData::new(process.pid()).write_to(frame.bytes(self.mapper));
        debug!("pid {}: VDSO page {page}", process.pid());
        Ok(frame.into_mapped())
    }

    /// Give `child` a private copy of the VDSO page in `src`, mapped into `dst`.
    ///
    /// The copy keeps the protection of the source entry. The source page is
    /// only read.
    ///
    /// # Errors
    /// As [`setup`](Self::setup); the new page is freed on failure.
    pub fn copy_on_fork<A, P>(
        &self,
        alloc: &mut A,
        dst: RootPage,
        src: RootPage,
        child: &P,
    ) -> Result<ForkCopy, VdsoError>
    where
        A: FrameAlloc,
        P: VdsoProcess + ?Sized,
    {
        let Some(source) = self.present_entry(src) else {
            return Ok(ForkCopy::NoVdso);
        };

        let mut frame = OwnedFrame::allocate(&mut *alloc).ok_or_else(|| {
            warn!("pid {}: no page for the VDSO copy", child.pid());
            VdsoError::OutOfMemory
        })?;
        // SAFETY: the source page is mapped in `src` and is only read here.
        let parent_bytes: &[u8] = unsafe { self.mapper.frame_bytes(source.frame()) };
        frame.bytes(self.mapper).copy_from_slice(parent_bytes);

        let page = frame.page();
        AddressSpace::from_root(self.mapper, dst)
            .map_one(frame.allocator(), VDSO_VA, page, source)
            .inspect_err(|e| warn!("pid {}: VDSO mapping failed: {e}", child.pid()))?;

        write_pid(frame.bytes(self.mapper), child.pid());
        Ok(ForkCopy::Copied(frame.into_mapped()))
    }

    /// Rewrite the pid in `process`'s VDSO page.
    ///
    /// Does not allocate and cannot fail. A page at the VDSO address that
    /// lacks the magic is not written to.
    pub fn refresh<P: VdsoProcess + ?Sized>(&self, process: &P) -> Refresh {
        let Some(entry) = self.present_entry(process.address_space()) else {
            return Refresh::NotMapped;
        };
        let page = entry.frame();
        // SAFETY: the page is mapped at the VDSO address of this process.
        let bytes = unsafe { self.mapper.frame_bytes(page) };
        if !has_magic(bytes) {
            warn!("pid {}: page at the VDSO address has no VDSO magic", process.pid());
            return Refresh::ForeignPage(page);
        }
        write_pid(bytes, process.pid());
        Refresh::Updated(page)
    }

    /// Decode the VDSO page of `address_space`, if it has a valid one.
    #[must_use]
    pub fn read(&self, address_space: RootPage) -> Option<VdsoData> {
        let entry = self.present_entry(address_space)?;
        // SAFETY: mapped page, read only.
        let bytes: &[u8] = unsafe { self.mapper.frame_bytes(entry.frame()) };
        VdsoData::parse(bytes)
    }

    fn present_entry(&self, address_space: RootPage) -> Option<PageEntryBits> {
        AddressSpace::from_root(self.mapper, address_space)
            .lookup_entry(VDSO_VA)
            .filter(|e| e.present())
    }
}
