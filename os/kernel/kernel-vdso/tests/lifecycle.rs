//! VDSO pages across process creation, fork and identity changes, in fake
//! physical memory.

use kernel_alloc::BitmapFrameAlloc;
use kernel_alloc::testing::{CountingAlloc, FailAfter, TestMemory};
use kernel_info::process::Pid;
use kernel_info::vdso::{VDSO_ADDR, VDSO_MAGIC, VdsoData};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vdso::{ForkCopy, Refresh, VdsoError, VdsoManager, VdsoProcess};
use kernel_vmem::{AddressSpace, FrameAlloc, MapError, PageEntryBits, RootPage};

const VDSO: VirtualAddress = VirtualAddress::new(VDSO_ADDR);

struct Proc {
    pid: Pid,
    root: RootPage,
}

impl VdsoProcess for Proc {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn address_space(&self) -> RootPage {
        self.root
    }
}

fn process(mem: &TestMemory, alloc: &mut impl FrameAlloc, pid: i32) -> Proc {
    let aspace = AddressSpace::allocate(mem, alloc).unwrap();
    Proc {
        pid: Pid::new(pid),
        root: aspace.root_page(),
    }
}

/// The page a process would see at the VDSO address.
fn user_view(mem: &TestMemory, p: &Proc) -> Option<PhysicalPage<Size4K>> {
    AddressSpace::from_root(mem, p.root).user_page(VDSO)
}

fn counting(mem: &TestMemory) -> CountingAlloc<BitmapFrameAlloc> {
    CountingAlloc::new(mem.frame_alloc())
}

#[test]
fn setup_maps_magic_and_pid_read_only() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let p = process(&mem, &mut alloc, 7);

    let page = vdso.setup(&mut alloc, p.root, &p).unwrap();

    assert_eq!(user_view(&mem, &p), Some(page));
    let entry = AddressSpace::from_root(&mem, p.root).lookup_entry(VDSO).unwrap();
    assert!(entry.present() && entry.user_access() && !entry.writable());

    let bytes = mem.bytes(page);
    assert_eq!(bytes[..4], VDSO_MAGIC.to_le_bytes());
    assert_eq!(bytes[4..8], 7i32.to_le_bytes());
    assert!(bytes[8..].iter().all(|&b| b == 0), "page is zeroed");
    assert_eq!(
        vdso.read(p.root),
        Some(VdsoData {
            magic: VDSO_MAGIC,
            pid: 7
        })
    );
}

#[test]
fn setup_out_of_memory_leaks_nothing() {
    let mem = TestMemory::new(64);
    let mut base = mem.frame_alloc();
    let p = process(&mem, &mut base, 1);
    let vdso = VdsoManager::new(&mem);

    let mut alloc = CountingAlloc::new(FailAfter::new(&mut base, 0));
    assert_eq!(vdso.setup(&mut alloc, p.root, &p), Err(VdsoError::OutOfMemory));
    assert_eq!(alloc.allocated(), alloc.freed());
    assert_eq!(user_view(&mem, &p), None);
}

#[test]
fn setup_frees_the_page_when_tables_cannot_be_allocated() {
    let mem = TestMemory::new(64);
    let mut base = mem.frame_alloc();
    let p = process(&mem, &mut base, 1);
    let vdso = VdsoManager::new(&mem);

    // The data page succeeds, the first intermediate table does not.
    let mut alloc = CountingAlloc::new(FailAfter::new(&mut base, 1));
    assert_eq!(
        vdso.setup(&mut alloc, p.root, &p),
        Err(VdsoError::Map(MapError::OutOfMemory))
    );
    assert_eq!(alloc.allocated(), 1);
    assert_eq!(alloc.freed(), 1);
    assert_eq!(AddressSpace::from_root(&mem, p.root).lookup_entry(VDSO), None);
}

#[test]
fn setup_frees_the_page_when_the_address_is_taken() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let p = process(&mem, &mut alloc, 1);
    let other = alloc.alloc_4k().unwrap();
    AddressSpace::from_root(&mem, p.root)
        .map_one(&mut alloc, VDSO, other, PageEntryBits::user_rw())
        .unwrap();
    let vdso = VdsoManager::new(&mem);

    let before = alloc.outstanding();
    assert_eq!(
        vdso.setup(&mut alloc, p.root, &p),
        Err(VdsoError::Map(MapError::AlreadyMapped(VDSO)))
    );
    assert_eq!(alloc.outstanding(), before);
    assert_eq!(user_view(&mem, &p), Some(other));
}

#[test]
fn fork_gives_the_child_its_own_page() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let parent = process(&mem, &mut alloc, 10);
    let child = process(&mem, &mut alloc, 11);
    let parent_page = vdso.setup(&mut alloc, parent.root, &parent).unwrap();
    mem.bytes(parent_page)[100] = 0x5A;

    let ForkCopy::Copied(child_page) = vdso
        .copy_on_fork(&mut alloc, child.root, parent.root, &child)
        .unwrap()
    else {
        panic!("parent has a VDSO page");
    };

    assert_ne!(child_page, parent_page);
    assert_eq!(user_view(&mem, &child), Some(child_page));
    assert_eq!(vdso.read(child.root).map(|d| d.pid()), Some(Pid::new(11)));
    assert_eq!(vdso.read(parent.root).map(|d| d.pid()), Some(Pid::new(10)));
    assert_eq!(mem.bytes(child_page)[100], 0x5A, "contents are copied");

    // Later writes to the parent do not reach the child.
    mem.bytes(parent_page)[100] = 0;
    mem.bytes(parent_page)[4..8].copy_from_slice(&99i32.to_le_bytes());
    assert_eq!(mem.bytes(child_page)[100], 0x5A);
    assert_eq!(vdso.read(child.root).map(|d| d.pid()), Some(Pid::new(11)));
}

#[test]
fn fork_keeps_the_source_protection() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let parent = process(&mem, &mut alloc, 1);
    let child = process(&mem, &mut alloc, 2);

    // A parent page mapped with extra flags, as a future kernel might.
    let page = alloc.alloc_4k().unwrap();
    mem.bytes(page)[..8].copy_from_slice(&[0x6f, 0x73, 0x64, 0x76, 1, 0, 0, 0]);
    let flags = PageEntryBits::user_read_only().with_no_execute(true);
    AddressSpace::from_root(&mem, parent.root)
        .map_one(&mut alloc, VDSO, page, flags)
        .unwrap();

    vdso.copy_on_fork(&mut alloc, child.root, parent.root, &child)
        .unwrap();
    let copied = AddressSpace::from_root(&mem, child.root).lookup_entry(VDSO).unwrap();
    assert_eq!(copied.flags(), flags);
    assert_eq!(vdso.read(child.root).map(|d| d.pid()), Some(Pid::new(2)));
}

#[test]
fn fork_without_a_parent_page_is_a_no_op() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let parent = process(&mem, &mut alloc, 1);
    let child = process(&mem, &mut alloc, 2);
    let before = alloc.outstanding();

    assert_eq!(
        vdso.copy_on_fork(&mut alloc, child.root, parent.root, &child),
        Ok(ForkCopy::NoVdso)
    );
    assert_eq!(alloc.outstanding(), before);
    assert_eq!(user_view(&mem, &child), None);
}

#[test]
fn fork_treats_a_non_present_entry_as_absent() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let parent = process(&mem, &mut alloc, 1);
    let child = process(&mem, &mut alloc, 2);

    // Tables exist for the VDSO address but the leaf itself is not present.
    let neighbour = VirtualAddress::new(VDSO_ADDR + 0x1000);
    let page = alloc.alloc_4k().unwrap();
    AddressSpace::from_root(&mem, parent.root)
        .map_one(&mut alloc, neighbour, page, PageEntryBits::user_rw())
        .unwrap();
    assert!(AddressSpace::from_root(&mem, parent.root).lookup_entry(VDSO).is_some());

    assert_eq!(
        vdso.copy_on_fork(&mut alloc, child.root, parent.root, &child),
        Ok(ForkCopy::NoVdso)
    );
}

#[test]
fn fork_failures_leak_nothing_and_spare_the_parent() {
    let mem = TestMemory::new(64);
    let mut base = mem.frame_alloc();
    let vdso = VdsoManager::new(&mem);
    let parent = process(&mem, &mut base, 1);
    let child = process(&mem, &mut base, 2);
    let parent_page = vdso.setup(&mut base, parent.root, &parent).unwrap();

    for budget in [0, 1, 2, 3] {
        let mut alloc = CountingAlloc::new(FailAfter::new(&mut base, budget));
        let result = vdso.copy_on_fork(&mut alloc, child.root, parent.root, &child);
        assert!(result.is_err(), "budget {budget}");
        assert_eq!(alloc.allocated(), alloc.freed(), "budget {budget}");
    }

    assert!(base.is_allocated(parent_page));
    assert_eq!(vdso.read(parent.root).map(|d| d.pid()), Some(Pid::new(1)));
    assert_eq!(user_view(&mem, &child), None);
}

#[test]
fn refresh_rewrites_only_the_pid() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let mut p = process(&mem, &mut alloc, 3);
    let page = vdso.setup(&mut alloc, p.root, &p).unwrap();
    mem.bytes(page)[8..].fill(0x77);
    let before = *mem.bytes(page);
    let outstanding = alloc.outstanding();

    p.pid = Pid::new(30);
    assert_eq!(vdso.refresh(&p), Refresh::Updated(page));

    let after = mem.bytes(page);
    assert_eq!(after[4..8], 30i32.to_le_bytes());
    assert_eq!(after[..4], before[..4]);
    assert_eq!(after[8..], before[8..]);
    assert_eq!(alloc.outstanding(), outstanding);
}

#[test]
fn refresh_without_a_page_is_a_no_op() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let p = process(&mem, &mut alloc, 3);
    let outstanding = alloc.outstanding();

    assert_eq!(vdso.refresh(&p), Refresh::NotMapped);
    assert_eq!(alloc.outstanding(), outstanding);
    assert_eq!(user_view(&mem, &p), None);
}

#[test]
fn refresh_leaves_foreign_pages_alone() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let p = process(&mem, &mut alloc, 3);
    let page = alloc.alloc_4k().unwrap();
    mem.bytes(page).fill(0x11);
    AddressSpace::from_root(&mem, p.root)
        .map_one(&mut alloc, VDSO, page, PageEntryBits::user_rw())
        .unwrap();

    assert_eq!(vdso.refresh(&p), Refresh::ForeignPage(page));
    assert!(mem.bytes(page).iter().all(|&b| b == 0x11));
    assert_eq!(vdso.read(p.root), None);
}

#[test]
fn teardown_returns_the_vdso_page() {
    let mem = TestMemory::new(64);
    let mut alloc = counting(&mem);
    let vdso = VdsoManager::new(&mem);
    let p = process(&mem, &mut alloc, 3);
    let page = vdso.setup(&mut alloc, p.root, &p).unwrap();

    AddressSpace::from_root(&mem, p.root).teardown(&mut alloc);
    assert_eq!(alloc.outstanding(), 0);
    assert!(!alloc.inner().is_allocated(page));
}
