//! # Address Space (x86-64, PML4-rooted)
//!
//! A handle to one page-table tree. The handle borrows the [`PhysMapper`] and
//! never owns an allocator: every operation that needs frames takes one
//! explicitly, so the same allocator can be shared by the caller.
//!
//! Intermediate tables are created on demand with [`PageEntryBits::table_link`]
//! and, if a mapping attempt fails half-way, the tables that attempt created
//! are unlinked and returned to the allocator before the error is reported.
//!
//! ## Ownership
//!
//! The lower half (PML4 slots `0..256`) belongs to the address space: its
//! tables and leaf frames are freed by [`AddressSpace::teardown`]. The upper
//! half is shared with the kernel and is only ever linked, never freed.

use crate::page_table::{ENTRIES, TableIndices, USER_HALF_ENTRIES};
use crate::{FrameAlloc, MapError, PageEntryBits, PhysMapper};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use log::trace;

/// The PML4 frame identifying an address space.
pub type RootPage = PhysicalPage<Size4K>;

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: RootPage,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Create an empty address space with a fresh, zeroed PML4.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if no frame is available for the root.
    pub fn allocate<A: FrameAlloc>(mapper: &'m M, alloc: &mut A) -> Result<Self, MapError> {
        let root = alloc.alloc_4k().ok_or(MapError::OutOfMemory)?;
        let aspace = Self { root, mapper };
        aspace.zero_table(root);
        Ok(aspace)
    }

    /// View an existing tree.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: RootPage) -> Self {
        Self { root, mapper }
    }

    #[inline]
    pub const fn root_page(&self) -> RootPage {
        self.root
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[inline]
    fn read(&self, table: PhysicalPage<Size4K>, index: usize) -> PageEntryBits {
        // SAFETY: every frame reached from `root` is a page table of this tree.
        unsafe { self.mapper.table_mut(table) }.get(index)
    }

    #[inline]
    fn write(&self, table: PhysicalPage<Size4K>, index: usize, entry: PageEntryBits) {
        // SAFETY: as in `read`; the reference does not outlive this call.
        unsafe { self.mapper.table_mut(table) }.set(index, entry);
    }

    #[inline]
    fn zero_table(&self, table: PhysicalPage<Size4K>) {
        // SAFETY: called on frames just allocated for this tree.
        unsafe { self.mapper.table_mut(table) }.zero();
    }

    /// Walk down to the PT covering `va` without creating anything.
    fn walk(&self, va: VirtualAddress) -> Result<(PhysicalPage<Size4K>, usize), MapError> {
        let ix = TableIndices::of(va);
        let mut table = self.root;
        for (level, &index) in ix.path()[..3].iter().enumerate() {
            let entry = self.read(table, index);
            if !entry.present() {
                return Err(MapError::NotMapped(va));
            }
            if level > 0 && entry.large_page() {
                return Err(MapError::HugePage(va));
            }
            table = entry.frame();
        }
        Ok((table, ix.pt))
    }

    /// Install `va → frame` with `flags`.
    ///
    /// The present bit is always set; any address bits in `flags` are ignored,
    /// so a leaf read from another tree can be passed as-is to replicate its
    /// protection.
    ///
    /// # Errors
    /// - [`MapError::Misaligned`] if `va` is not page aligned.
    /// - [`MapError::OutOfMemory`] if an intermediate table could not be allocated.
    /// - [`MapError::AlreadyMapped`] if a present leaf already covers `va`.
    /// - [`MapError::HugePage`] if a huge leaf covers `va`.
    ///
    /// On error the tree is left as it was before the call.
    pub fn map_one<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        frame: PhysicalPage<Size4K>,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        if !va.is_aligned::<Size4K>() {
            return Err(MapError::Misaligned(va));
        }

        let ix = TableIndices::of(va);
        let link = PageEntryBits::table_link(flags.user_access());
        let mut created: [Option<(PhysicalPage<Size4K>, usize)>; 3] = [None; 3];

        let mut table = self.root;
        for (level, &index) in ix.path()[..3].iter().enumerate() {
            let entry = self.read(table, index);
            table = if entry.present() {
                if level > 0 && entry.large_page() {
                    self.unlink_created(alloc, &created);
                    return Err(MapError::HugePage(va));
                }
                entry.frame()
            } else {
                let Some(next) = alloc.alloc_4k() else {
                    self.unlink_created(alloc, &created);
                    return Err(MapError::OutOfMemory);
                };
                self.zero_table(next);
                self.write(table, index, link.with_frame(next));
                created[level] = Some((table, index));
                next
            };
        }

        if self.read(table, ix.pt).present() {
            self.unlink_created(alloc, &created);
            return Err(MapError::AlreadyMapped(va));
        }

        self.write(table, ix.pt, flags.flags().with_present(true).with_frame(frame));
        trace!("mapped {va} -> {frame}");
        Ok(())
    }

    fn unlink_created<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        created: &[Option<(PhysicalPage<Size4K>, usize)>; 3],
    ) {
        for &(parent, index) in created.iter().rev().flatten() {
            let frame = self.read(parent, index).frame();
            self.write(parent, index, PageEntryBits::new());
            alloc.free_4k(frame);
        }
    }

    /// The PT entry for `va`, present or not, or `None` if no PT covers it.
    #[must_use]
    pub fn lookup_entry(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        let (pt, index) = self.walk(va).ok()?;
        Some(self.read(pt, index))
    }

    /// The frame behind `va` if it is present and user-accessible.
    #[must_use]
    pub fn user_page(&self, va: VirtualAddress) -> Option<PhysicalPage<Size4K>> {
        self.lookup_entry(va)
            .filter(|e| e.present() && e.user_access())
            .map(|e| e.frame())
    }

    /// Translate `va` through a present 4 KiB leaf.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.lookup_entry(va)
            .filter(|e| e.present())
            .map(|e| e.frame().join(va.offset::<Size4K>()))
    }

    /// Link the kernel half of `kernel` into this tree.
    pub fn share_kernel_half(&self, kernel: RootPage) {
        for index in USER_HALF_ENTRIES..ENTRIES {
            let entry = self.read(kernel, index);
            self.write(self.root, index, entry);
        }
    }

    /// Free every lower-half leaf frame, every lower-half table and the root.
    ///
    /// Huge leaves in the lower half are unlinked but not freed, since they
    /// are never handed out by this module.
    pub fn teardown<A: FrameAlloc>(self, alloc: &mut A) {
        for index in 0..USER_HALF_ENTRIES {
            let entry = self.read(self.root, index);
            if entry.present() {
                self.free_subtree(alloc, entry.frame(), 3);
            }
        }
        alloc.free_4k(self.root);
    }

    /// Free the table `table` at `level` (3 = PDPT, 2 = PD, 1 = PT) and
    /// everything it owns.
    fn free_subtree<A: FrameAlloc>(&self, alloc: &mut A, table: PhysicalPage<Size4K>, level: u8) {
        for index in 0..ENTRIES {
            let entry = self.read(table, index);
            if !entry.present() {
                continue;
            }
            if level == 1 {
                alloc.free_4k(entry.frame());
            } else if !entry.large_page() {
                self.free_subtree(alloc, entry.frame(), level - 1);
            }
        }
        alloc.free_4k(table);
    }

    /// Load CR3 with this tree.
    ///
    /// # Safety
    /// The kernel half must be linked (see [`share_kernel_half`](Self::share_kernel_half))
    /// so the running code stays mapped.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[inline]
    pub unsafe fn activate(&self) {
        use kernel_registers::StoreRegisterUnsafe;
        use kernel_registers::cr3::Cr3;

        unsafe { Cr3::from_root(self.root).store_unsafe() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::UnsafeCell;
    use std::collections::BTreeSet;

    #[repr(align(4096))]
    struct Aligned4K([u8; 4096]);

    /// Heap-backed "physical RAM": physical address `n * 4096` is frame `n`.
    struct TestPhys {
        frames: Vec<UnsafeCell<Aligned4K>>,
    }

    impl TestPhys {
        fn with_frames(n: usize) -> Self {
            Self {
                frames: (0..n).map(|_| UnsafeCell::new(Aligned4K([0xCC; 4096]))).collect(),
            }
        }
    }

    impl PhysMapper for TestPhys {
        unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T {
            let idx = usize::try_from(at.as_u64() >> 12).unwrap();
            let off = usize::try_from(at.as_u64() & 0xFFF).unwrap();
            let base = self.frames[idx].get().cast::<u8>();
            unsafe { &mut *base.add(off).cast::<T>() }
        }
    }

    /// Frame allocator over `1..limit` that tracks what is outstanding.
    struct TrackingAlloc {
        free: Vec<u64>,
        live: BTreeSet<u64>,
    }

    impl TrackingAlloc {
        fn new(limit: u64) -> Self {
            Self {
                free: (1..limit).rev().collect(),
                live: BTreeSet::new(),
            }
        }

        fn with_budget(limit: u64, budget: usize) -> Self {
            let mut a = Self::new(limit);
            let keep = a.free.len() - budget;
            a.free.drain(..keep);
            a
        }
    }

    impl FrameAlloc for TrackingAlloc {
        fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
            let n = self.free.pop()?;
            assert!(self.live.insert(n));
            Some(PhysicalPage::containing(PhysicalAddress::new(n << 12)))
        }

        fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
            let n = frame.frame_number();
            assert!(self.live.remove(&n), "double free of frame {n}");
            self.free.push(n);
        }
    }

    const VA: VirtualAddress = VirtualAddress::new(0x4000_0000);

    fn frame(n: u64) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(n << 12))
    }

    #[test]
    fn map_then_lookup() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(32);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();

        aspace
            .map_one(&mut alloc, VA, frame(40), PageEntryBits::user_read_only())
            .unwrap();

        let e = aspace.lookup_entry(VA).unwrap();
        assert!(e.present() && e.user_access() && !e.writable());
        assert_eq!(e.frame(), frame(40));
        assert_eq!(aspace.user_page(VA), Some(frame(40)));
        assert_eq!(
            aspace.translate(VirtualAddress::new(0x4000_0010)),
            Some(PhysicalAddress::new((40 << 12) + 0x10))
        );
        // root + PDPT + PD + PT
        assert_eq!(alloc.live.len(), 4);
    }

    #[test]
    fn lookup_distinguishes_absent_tables_from_absent_leaf() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(32);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        assert_eq!(aspace.lookup_entry(VA), None);

        aspace
            .map_one(&mut alloc, VirtualAddress::new(0x4000_1000), frame(40), PageEntryBits::user_rw())
            .unwrap();
        let neighbour = aspace.lookup_entry(VA).expect("PT exists now");
        assert!(!neighbour.present());
        assert_eq!(aspace.user_page(VA), None);
    }

    #[test]
    fn kernel_only_pages_are_not_user_pages() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(32);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        aspace
            .map_one(&mut alloc, VA, frame(40), PageEntryBits::kernel_rw())
            .unwrap();
        assert!(aspace.lookup_entry(VA).unwrap().present());
        assert_eq!(aspace.user_page(VA), None);
    }

    #[test]
    fn double_map_is_rejected_without_side_effects() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(32);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        aspace
            .map_one(&mut alloc, VA, frame(40), PageEntryBits::user_read_only())
            .unwrap();
        let live = alloc.live.len();

        assert_eq!(
            aspace.map_one(&mut alloc, VA, frame(41), PageEntryBits::user_rw()),
            Err(MapError::AlreadyMapped(VA))
        );
        assert_eq!(alloc.live.len(), live);
        assert_eq!(aspace.lookup_entry(VA).unwrap().frame(), frame(40));
    }

    #[test]
    fn out_of_memory_mid_walk_releases_new_tables() {
        let phys = TestPhys::with_frames(64);
        // Root plus two tables; the PT allocation fails.
        let mut alloc = TrackingAlloc::with_budget(32, 3);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();

        assert_eq!(
            aspace.map_one(&mut alloc, VA, frame(40), PageEntryBits::user_read_only()),
            Err(MapError::OutOfMemory)
        );
        assert_eq!(alloc.live.len(), 1, "only the root survives");
        assert_eq!(aspace.lookup_entry(VA), None);
        assert!(!aspace.read(aspace.root_page(), 0).present());
    }

    #[test]
    fn misaligned_addresses_are_rejected() {
        let phys = TestPhys::with_frames(16);
        let mut alloc = TrackingAlloc::new(8);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        let va = VirtualAddress::new(0x4000_0008);
        assert_eq!(
            aspace.map_one(&mut alloc, va, frame(9), PageEntryBits::user_rw()),
            Err(MapError::Misaligned(va))
        );
    }

    #[test]
    fn flags_are_copied_without_the_source_address() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(32);
        let aspace = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        let src = PageEntryBits::user_read_only()
            .with_no_execute(true)
            .with_frame(frame(50));
        aspace.map_one(&mut alloc, VA, frame(40), src).unwrap();
        let e = aspace.lookup_entry(VA).unwrap();
        assert_eq!(e.frame(), frame(40));
        assert_eq!(e.flags(), src.flags());
    }

    #[test]
    fn teardown_frees_user_half_only() {
        let phys = TestPhys::with_frames(64);
        let mut alloc = TrackingAlloc::new(48);

        let kernel = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        let kva = VirtualAddress::new(0xFFFF_8880_0000_0000);
        let kframe = alloc.alloc_4k().unwrap();
        kernel
            .map_one(&mut alloc, kva, kframe, PageEntryBits::kernel_rw())
            .unwrap();
        let kernel_live = alloc.live.len();

        let user = AddressSpace::allocate(&phys, &mut alloc).unwrap();
        user.share_kernel_half(kernel.root_page());
        assert_eq!(user.lookup_entry(kva).map(|e| e.frame()), Some(kframe));

        let page = alloc.alloc_4k().unwrap();
        user.map_one(&mut alloc, VA, page, PageEntryBits::user_rw())
            .unwrap();
        user.teardown(&mut alloc);

        assert_eq!(alloc.live.len(), kernel_live);
        assert_eq!(kernel.lookup_entry(kva).map(|e| e.frame()), Some(kframe));
    }
}
