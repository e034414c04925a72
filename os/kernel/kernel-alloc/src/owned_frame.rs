use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_vmem::{FRAME_SIZE, FrameAlloc, PhysMapper};

/// A physical frame that goes back to its allocator when dropped.
///
/// Hold one while a fresh frame is being prepared and installed somewhere;
/// any early return gives the frame back. Once the frame is owned by
/// something else (usually a page table) call [`into_mapped`](Self::into_mapped).
///
/// ```rust
/// # use kernel_alloc::{BitmapFrameAlloc, OwnedFrame};
/// # use kernel_memory_addresses::*;
/// let mut alloc = BitmapFrameAlloc::new(PhysicalPage::containing(PhysicalAddress::new(0)), 4);
/// {
///     let frame = OwnedFrame::allocate(&mut alloc).unwrap();
///     assert_eq!(frame.page().frame_number(), 0);
/// }
/// assert_eq!(alloc.free_frames(), 4);
/// ```
pub struct OwnedFrame<A: FrameAlloc> {
    frame: PhysicalPage<Size4K>,
    alloc: A,
    armed: bool,
}

impl<A: FrameAlloc> OwnedFrame<A> {
    /// Take one frame from `alloc`. Contents are unspecified.
    pub fn allocate(mut alloc: A) -> Option<Self> {
        let frame = alloc.alloc_4k()?;
        Some(Self {
            frame,
            alloc,
            armed: true,
        })
    }

    /// Take one frame from `alloc` and fill it with zeros.
    pub fn zeroed<M: PhysMapper>(alloc: A, mapper: &M) -> Option<Self> {
        let mut frame = Self::allocate(alloc)?;
        frame.bytes(mapper).fill(0);
        Some(frame)
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> PhysicalPage<Size4K> {
        self.frame
    }

    /// The allocator the frame came from, for allocations made while the
    /// frame is still held.
    #[inline]
    pub const fn allocator(&mut self) -> &mut A {
        &mut self.alloc
    }

    /// Contents of the frame.
    ///
    /// `mapper` must make the allocator's frames addressable.
    pub fn bytes<M: PhysMapper>(&mut self, mapper: &M) -> &mut [u8; FRAME_SIZE] {
        // SAFETY: the frame is exclusively ours until `into_mapped` or drop.
        unsafe { mapper.frame_bytes(self.frame) }
    }

    /// Give up ownership without freeing.
    #[must_use]
    pub fn into_mapped(mut self) -> PhysicalPage<Size4K> {
        self.armed = false;
        self.frame
    }
}

impl<A: FrameAlloc> Drop for OwnedFrame<A> {
    fn drop(&mut self) {
        if self.armed {
            self.alloc.free_4k(self.frame);
        }
    }
}
