//! Host-side stand-ins for physical memory.
//!
//! [`TestMemory`] is heap-backed fake RAM where physical address
//! `n * 4096 + off` is byte `off` of frame `n`. The allocator wrappers count
//! or fail allocations so tests can assert that nothing leaks on error paths.

use crate::BitmapFrameAlloc;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FRAME_SIZE, FrameAlloc, PhysMapper};

#[repr(C, align(4096))]
struct Aligned4K([u8; FRAME_SIZE]);

/// Fake physical memory made of `frames` 4 KiB frames starting at address 0.
pub struct TestMemory {
    frames: Vec<UnsafeCell<Aligned4K>>,
}

impl TestMemory {
    /// Fresh memory filled with a junk pattern.
    #[must_use]
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames)
                .map(|_| UnsafeCell::new(Aligned4K([0xA5; FRAME_SIZE])))
                .collect(),
        }
    }

    /// A frame allocator over all frames but frame 0.
    #[must_use]
    pub fn frame_alloc(&self) -> BitmapFrameAlloc {
        BitmapFrameAlloc::new(page(1), self.frames.len().saturating_sub(1))
    }

    /// Direct view of one frame.
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub fn bytes(&self, frame: PhysicalPage<Size4K>) -> &mut [u8; FRAME_SIZE] {
        // SAFETY: test-only memory; tests do not hold overlapping views.
        unsafe { self.frame_bytes(frame) }
    }

    fn index(&self, at: PhysicalAddress) -> (usize, usize) {
        let frame = usize::try_from(at.as_u64() / FRAME_SIZE as u64).unwrap_or(usize::MAX);
        assert!(frame < self.frames.len(), "{at} is outside test memory");
        (frame, usize::try_from(at.as_u64() % FRAME_SIZE as u64).unwrap_or(0))
    }
}

impl PhysMapper for TestMemory {
    unsafe fn phys_to_mut<'a, T>(&self, at: PhysicalAddress) -> &'a mut T {
        let (frame, offset) = self.index(at);
        let base = self.frames[frame].get().cast::<u8>();
        // SAFETY: the caller guarantees `at` holds a valid `T` inside one frame.
        unsafe { &mut *base.add(offset).cast::<T>() }
    }
}

/// The 4 KiB frame with number `n`.
#[must_use]
pub const fn page(n: u64) -> PhysicalPage<Size4K> {
    PhysicalPage::containing(PhysicalAddress::new(n * FRAME_SIZE as u64))
}

/// Counts allocations and frees passing through to `A`.
pub struct CountingAlloc<A> {
    inner: A,
    allocated: usize,
    freed: usize,
}

impl<A: FrameAlloc> CountingAlloc<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            allocated: 0,
            freed: 0,
        }
    }

    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    #[must_use]
    pub const fn freed(&self) -> usize {
        self.freed
    }

    /// Frames handed out and not yet returned.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.allocated - self.freed
    }

    pub const fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: FrameAlloc> FrameAlloc for CountingAlloc<A> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let frame = self.inner.alloc_4k()?;
        self.allocated += 1;
        Some(frame)
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.freed += 1;
        self.inner.free_4k(frame);
    }

    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        let first = self.inner.alloc_contiguous_4k(count)?;
        self.allocated += count;
        Some(first)
    }

    fn free_contiguous_4k(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        self.freed += count;
        self.inner.free_contiguous_4k(first, count);
    }
}

/// Succeeds for the first `budget` allocation calls, then returns `None`.
///
/// A contiguous allocation counts as one call.
pub struct FailAfter<A> {
    inner: A,
    budget: usize,
}

impl<A: FrameAlloc> FailAfter<A> {
    pub const fn new(inner: A, budget: usize) -> Self {
        Self { inner, budget }
    }

    pub const fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: FrameAlloc> FrameAlloc for FailAfter<A> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        self.inner.alloc_4k()
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.inner.free_4k(frame);
    }

    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        self.inner.alloc_contiguous_4k(count)
    }

    fn free_contiguous_4k(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        self.inner.free_contiguous_4k(first, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_addresses_index_frames() {
        let mem = TestMemory::new(4);
        mem.bytes(page(2))[8] = 0x42;
        // SAFETY: inside frame 2.
        let v: &mut u8 = unsafe { mem.phys_to_mut(PhysicalAddress::new(0x2008)) };
        assert_eq!(*v, 0x42);
    }

    #[test]
    fn counting_and_failing() {
        let mem = TestMemory::new(8);
        let mut a = CountingAlloc::new(FailAfter::new(mem.frame_alloc(), 2));
        let f = a.alloc_4k().unwrap();
        assert!(a.alloc_4k().is_some());
        assert!(a.alloc_4k().is_none());
        a.free_4k(f);
        assert_eq!((a.allocated(), a.freed(), a.outstanding()), (2, 1, 1));
    }
}
