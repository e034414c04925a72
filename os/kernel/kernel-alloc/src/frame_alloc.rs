//! # Bitmap Frame Allocator
//!
//! Tracks a contiguous range of physical 4 KiB frames with one bit each
//! (`1` = in use). No heap is needed, so the allocator can live in a `static`
//! and be used before anything else is running.

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use kernel_vmem::FrameAlloc;
use log::{error, warn};

/// Largest number of frames one allocator can track (512 MiB of RAM).
pub const MAX_FRAMES: usize = 128 * 1024;

const WORDS: usize = MAX_FRAMES / 64;

/// Physical frame allocator over `[base, base + frames * 4 KiB)`.
pub struct BitmapFrameAlloc {
    base: PhysicalPage<Size4K>,
    frames: usize,
    used: [u64; WORDS],
    free: usize,
    /// Word index where the next search starts.
    hint: usize,
}

impl BitmapFrameAlloc {
    /// An allocator managing nothing; see [`add_range`](Self::add_range).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            base: PhysicalPage::containing(PhysicalAddress::new(0)),
            frames: 0,
            used: [u64::MAX; WORDS],
            free: 0,
            hint: 0,
        }
    }

    /// Allocator over `frames` frames starting at `base`, all free.
    ///
    /// Frames beyond [`MAX_FRAMES`] are ignored.
    #[must_use]
    pub fn new(base: PhysicalPage<Size4K>, frames: usize) -> Self {
        let mut alloc = Self::empty();
        alloc.base = base;
        alloc.frames = frames.min(MAX_FRAMES);
        if frames > MAX_FRAMES {
            warn!("frame allocator truncated to {MAX_FRAMES} of {frames} frames");
        }
        for n in 0..alloc.frames {
            alloc.clear(n);
        }
        alloc.free = alloc.frames;
        alloc
    }

    /// Allocator over the page-aligned part of `[start, end)`.
    #[must_use]
    pub fn from_range(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let first = start.as_u64().div_ceil(4096);
        let last = end.as_u64() / 4096;
        let frames = usize::try_from(last.saturating_sub(first)).unwrap_or(MAX_FRAMES);
        Self::new(
            PhysicalPage::containing(PhysicalAddress::new(first * 4096)),
            frames,
        )
    }

    /// Mark `[first, first + count)` as in use, e.g. for firmware or the
    /// kernel image. Frames outside the managed range are ignored.
    pub fn reserve(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        for i in 0..count as u64 {
            let Some(frame) = first.checked_step(i) else {
                break;
            };
            if let Some(n) = self.index_of(frame)
                && !self.is_set(n)
            {
                self.set(n);
                self.free -= 1;
            }
        }
    }

    /// Lowest managed frame.
    #[must_use]
    pub const fn first_frame(&self) -> PhysicalPage<Size4K> {
        self.base
    }

    /// Number of managed frames.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.frames
    }

    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.free
    }

    #[must_use]
    pub const fn allocated_frames(&self) -> usize {
        self.frames - self.free
    }

    /// Whether `frame` is managed here and currently handed out.
    #[must_use]
    pub fn is_allocated(&self, frame: PhysicalPage<Size4K>) -> bool {
        self.index_of(frame).is_some_and(|n| self.is_set(n))
    }

    fn index_of(&self, frame: PhysicalPage<Size4K>) -> Option<usize> {
        let n = frame.frame_number().checked_sub(self.base.frame_number())?;
        let n = usize::try_from(n).ok()?;
        (n < self.frames).then_some(n)
    }

    fn frame_at(&self, n: usize) -> Option<PhysicalPage<Size4K>> {
        self.base.checked_step(n as u64)
    }

    #[inline]
    const fn is_set(&self, n: usize) -> bool {
        self.used[n / 64] & (1 << (n % 64)) != 0
    }

    #[inline]
    const fn set(&mut self, n: usize) {
        self.used[n / 64] |= 1 << (n % 64);
    }

    #[inline]
    const fn clear(&mut self, n: usize) {
        self.used[n / 64] &= !(1 << (n % 64));
    }

    fn release(&mut self, n: usize) {
        if self.is_set(n) {
            self.clear(n);
            self.free += 1;
            self.hint = self.hint.min(n / 64);
        } else {
            error!("double free of frame #{n}");
        }
    }
}

impl Default for BitmapFrameAlloc {
    fn default() -> Self {
        Self::empty()
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.free == 0 {
            return None;
        }
        let words = self.frames.div_ceil(64);
        for w in (self.hint..words).chain(0..self.hint) {
            let word = self.used[w];
            if word == u64::MAX {
                continue;
            }
            let n = w * 64 + word.trailing_ones() as usize;
            if n >= self.frames {
                continue;
            }
            self.set(n);
            self.free -= 1;
            self.hint = w;
            return self.frame_at(n);
        }
        None
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        match self.index_of(frame) {
            Some(n) => self.release(n),
            None => error!("freeing unmanaged frame {frame}"),
        }
    }

    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        if count == 0 || count > self.free {
            return None;
        }
        let mut run = 0;
        for n in 0..self.frames {
            if self.is_set(n) {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                let first = n + 1 - count;
                for i in first..=n {
                    self.set(i);
                }
                self.free -= count;
                return self.frame_at(first);
            }
        }
        None
    }
}

/// A [`FrameAlloc`] view of an allocator shared behind a [`SpinLock`].
///
/// Each call takes the lock for the duration of that call only.
pub struct LockedFrameAlloc<'a, A>(&'a SpinLock<A>);

impl<'a, A: FrameAlloc> LockedFrameAlloc<'a, A> {
    #[must_use]
    pub const fn new(lock: &'a SpinLock<A>) -> Self {
        Self(lock)
    }
}

impl<A: FrameAlloc> FrameAlloc for LockedFrameAlloc<'_, A> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.0.with_lock(FrameAlloc::alloc_4k)
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.0.with_lock(|a| a.free_4k(frame));
    }

    fn alloc_contiguous_4k(&mut self, count: usize) -> Option<PhysicalPage<Size4K>> {
        self.0.with_lock(|a| a.alloc_contiguous_4k(count))
    }

    fn free_contiguous_4k(&mut self, first: PhysicalPage<Size4K>, count: usize) {
        self.0.with_lock(|a| a.free_contiguous_4k(first, count));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u64) -> PhysicalPage<Size4K> {
        PhysicalPage::containing(PhysicalAddress::new(n << 12))
    }

    #[test]
    fn hands_out_each_frame_once() {
        let mut a = BitmapFrameAlloc::new(page(0x100), 130);
        let mut seen = std::collections::BTreeSet::new();
        while let Some(f) = a.alloc_4k() {
            assert!(seen.insert(f.frame_number()));
        }
        assert_eq!(seen.len(), 130);
        assert_eq!(*seen.first().unwrap(), 0x100);
        assert_eq!(*seen.last().unwrap(), 0x100 + 129);
        assert_eq!(a.free_frames(), 0);
    }

    #[test]
    fn freed_frames_are_reused() {
        let mut a = BitmapFrameAlloc::new(page(0), 4);
        let f = a.alloc_4k().unwrap();
        let _g = a.alloc_4k().unwrap();
        a.free_4k(f);
        assert!(!a.is_allocated(f));
        assert_eq!(a.alloc_4k(), Some(f));
    }

    #[test]
    fn double_free_is_ignored() {
        let mut a = BitmapFrameAlloc::new(page(0), 4);
        let f = a.alloc_4k().unwrap();
        a.free_4k(f);
        a.free_4k(f);
        a.free_4k(page(99));
        assert_eq!(a.free_frames(), 4);
    }

    #[test]
    fn reserved_frames_are_skipped() {
        let mut a = BitmapFrameAlloc::new(page(0), 4);
        a.reserve(page(0), 2);
        assert_eq!(a.allocated_frames(), 2);
        assert_eq!(a.alloc_4k(), Some(page(2)));
    }

    #[test]
    fn from_range_rounds_inwards() {
        let a = BitmapFrameAlloc::from_range(
            PhysicalAddress::new(0x1001),
            PhysicalAddress::new(0x5fff),
        );
        assert_eq!(a.capacity(), 3);
    }

    #[test]
    fn contiguous_runs() {
        let mut a = BitmapFrameAlloc::new(page(0), 8);
        a.reserve(page(2), 1);
        assert_eq!(a.alloc_contiguous_4k(3), Some(page(3)));
        assert_eq!(a.alloc_contiguous_4k(2), Some(page(0)));
        assert_eq!(a.alloc_contiguous_4k(3), None);
        a.free_contiguous_4k(page(3), 3);
        assert_eq!(a.free_frames(), 5);
    }

    #[test]
    fn locked_view_shares_state() {
        let lock = SpinLock::new(BitmapFrameAlloc::new(page(0), 2));
        let mut a = LockedFrameAlloc::new(&lock);
        let mut b = LockedFrameAlloc::new(&lock);
        let f = a.alloc_4k().unwrap();
        assert!(b.alloc_4k().is_some());
        assert!(b.alloc_4k().is_none());
        a.free_4k(f);
        assert_eq!(b.alloc_4k(), Some(f));
    }
}
