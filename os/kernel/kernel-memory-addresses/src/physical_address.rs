use crate::{AddressError, MemoryAddress, MemoryAddressOffset, MemoryPage, PageSize, Size4K};
use core::fmt;

/// Physical memory address (RAM or MMIO).
///
/// Carries intent only; there is no implicit conversion to
/// [`VirtualAddress`](crate::VirtualAddress). Use a [`DirectMap`](crate::DirectMap)
/// to obtain the kernel alias.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
/// let (pp, off) = pa.split::<Size4K>();
/// assert_eq!(pp.base().as_u64(), 0x0000_0010_2000_0000);
/// assert_eq!(pp.join(off), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// The address as a 32-bit value, if it lies below 4 GiB.
    ///
    /// Application processors leave reset in real mode and can only be handed
    /// addresses they can reach before long mode is enabled.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_u32(self) -> Option<u32> {
        let v = self.0.as_u64();
        if v >> 32 == 0 {
            Some(v as u32)
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage(self.0.page::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (PhysicalPage<S>, MemoryAddressOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0.is_aligned::<S>()
    }

    #[inline]
    pub const fn checked_add(self, rhs: u64) -> Result<Self, AddressError> {
        match self.0.checked_add(rhs) {
            Ok(a) => Ok(Self(a)),
            Err(e) => Err(e),
        }
    }

    #[inline]
    pub const fn checked_sub(self, rhs: u64) -> Result<Self, AddressError> {
        match self.0.checked_sub(rhs) {
            Ok(a) => Ok(Self(a)),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// Physical page base for size `S`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(MemoryPage<S>);

impl<S: PageSize> PhysicalPage<S> {
    /// Page that contains `addr`.
    #[inline]
    #[must_use]
    pub const fn containing(addr: PhysicalAddress) -> Self {
        Self(MemoryPage::from_addr(addr.0))
    }

    /// Page starting at `addr`.
    ///
    /// # Errors
    /// [`AddressError::Misaligned`] if `addr` is not a multiple of `S::SIZE`.
    #[inline]
    pub const fn from_aligned(addr: PhysicalAddress) -> Result<Self, AddressError> {
        match MemoryPage::from_aligned(addr.0) {
            Some(p) => Ok(Self(p)),
            None => Err(AddressError::Misaligned {
                addr: addr.as_u64(),
                align: S::SIZE,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0.base())
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> PhysicalAddress {
        PhysicalAddress(self.0.join(off))
    }

    /// The frame `count` pages above this one.
    #[inline]
    #[must_use]
    pub const fn checked_step(self, count: u64) -> Option<Self> {
        match self.0.checked_step(count) {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }
}

impl PhysicalPage<Size4K> {
    /// The 4 KiB frame number (`base >> 12`).
    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u64 {
        self.base().as_u64() >> Size4K::SHIFT
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::LABEL, self.base().as_u64())
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    fn from(value: PhysicalPage<S>) -> Self {
        value.base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Size2M;

    #[test]
    fn below_4g() {
        assert_eq!(PhysicalAddress::new(0x7000).as_u32(), Some(0x7000));
        assert_eq!(PhysicalAddress::new(0xFFFF_FFFF).as_u32(), Some(u32::MAX));
        assert_eq!(PhysicalAddress::new(0x1_0000_0000).as_u32(), None);
    }

    #[test]
    fn aligned_pages() {
        let pp = PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x7000)).unwrap();
        assert_eq!(pp.frame_number(), 7);
        assert_eq!(
            PhysicalPage::<Size2M>::from_aligned(PhysicalAddress::new(0x1000)),
            Err(AddressError::Misaligned {
                addr: 0x1000,
                align: Size2M::SIZE
            })
        );
    }
}
