use crate::{AddressError, MemoryAddressOffset, MemoryPage, PageSize};
use core::fmt;
use core::ptr::NonNull;

/// Principal raw memory address ([virtual](crate::VirtualAddress) or
/// [physical](crate::PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u64);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The page for size `S` that contains this address.
    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> MemoryPage<S> {
        MemoryPage::from_addr(self)
    }

    /// The offset within the page of size `S` that contains this address.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        MemoryAddressOffset::from_addr(self)
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (MemoryPage<S>, MemoryAddressOffset<S>) {
        (self.page::<S>(), self.offset::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !(S::SIZE - 1))
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.0 & (S::SIZE - 1) == 0
    }

    /// Add a byte offset, failing instead of wrapping around.
    #[inline]
    pub const fn checked_add(self, rhs: u64) -> Result<Self, AddressError> {
        match self.0.checked_add(rhs) {
            Some(v) => Ok(Self(v)),
            None => Err(AddressError::Overflow),
        }
    }

    /// Subtract a byte offset, failing instead of wrapping around.
    #[inline]
    pub const fn checked_sub(self, rhs: u64) -> Result<Self, AddressError> {
        match self.0.checked_sub(rhs) {
            Some(v) => Ok(Self(v)),
            None => Err(AddressError::Overflow),
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress(0x{:016X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for MemoryAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<MemoryAddress> for u64 {
    #[inline]
    fn from(a: MemoryAddress) -> Self {
        a.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Size1G, Size2M, Size4K};

    #[test]
    fn split_and_join() {
        let a = MemoryAddress::new(0x0000_0008_1234_5678);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u64(), 0x0000_0008_1234_5000);
        assert_eq!(o.as_u64(), 0x678);
        assert_eq!(p.join(o), a);

        let (p, o) = a.split::<Size2M>();
        assert_eq!(p.join(o), a);
        let (p, o) = a.split::<Size1G>();
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u64(), 0x12000);
        assert!(!a.is_aligned::<Size4K>());
        assert!(a.align_down::<Size4K>().is_aligned::<Size4K>());
    }

    #[test]
    fn checked_arithmetic_refuses_wraparound() {
        let top = MemoryAddress::new(u64::MAX - 1);
        assert_eq!(top.checked_add(1), Ok(MemoryAddress::new(u64::MAX)));
        assert_eq!(top.checked_add(2), Err(AddressError::Overflow));
        assert_eq!(
            MemoryAddress::new(0x10).checked_sub(0x20),
            Err(AddressError::Overflow)
        );
    }
}
