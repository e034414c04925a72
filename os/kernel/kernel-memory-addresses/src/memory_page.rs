use crate::{MemoryAddress, MemoryAddressOffset, PageSize};
use core::fmt;
use core::marker::PhantomData;

/// A page base address (lower `S::SHIFT` bits are zero).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryPage<S: PageSize> {
    value: u64,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> MemoryPage<S> {
    /// Page that contains `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(addr: MemoryAddress) -> Self {
        Self {
            value: addr.as_u64() & !(S::SIZE - 1),
            _phantom: PhantomData,
        }
    }

    /// Page starting exactly at `addr`, or `None` if `addr` is not aligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: MemoryAddress) -> Option<Self> {
        if addr.is_aligned::<S>() {
            Some(Self::from_addr(addr))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> MemoryAddress {
        MemoryAddress::new(self.value)
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> MemoryAddress {
        // The offset is below S::SIZE and the base is S-aligned, so no carry.
        MemoryAddress::new(self.value | off.as_u64())
    }

    /// The page `count` pages above this one.
    #[inline]
    #[must_use]
    pub const fn checked_step(self, count: u64) -> Option<Self> {
        match count.checked_mul(S::SIZE) {
            Some(delta) => match self.value.checked_add(delta) {
                Some(value) => Some(Self {
                    value,
                    _phantom: PhantomData,
                }),
                None => None,
            },
            None => None,
        }
    }
}

impl<S: PageSize> fmt::Display for MemoryPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.value, S::LABEL)
    }
}

impl<S: PageSize> fmt::Debug for MemoryPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryPage<{}>(0x{:016X})", S::LABEL, self.value)
    }
}

impl<S: PageSize> From<MemoryPage<S>> for MemoryAddress {
    fn from(value: MemoryPage<S>) -> Self {
        value.base()
    }
}
