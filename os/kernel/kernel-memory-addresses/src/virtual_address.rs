use crate::{AddressError, MemoryAddress, MemoryAddressOffset, MemoryPage, PageSize};
use core::fmt;

/// Virtual memory address.
///
/// No canonicality check is performed; the type only records that the value
/// is meant to be translated by the paging hardware.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(MemoryAddress::from_ptr(ptr))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage(self.0.page::<S>())
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> MemoryAddressOffset<S> {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn split<S: PageSize>(self) -> (VirtualPage<S>, MemoryAddressOffset<S>) {
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

    /// Non-null pointer to `T` at this address.
    ///
    /// Creating the pointer is safe; dereferencing it is on the caller.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        core::ptr::with_exposed_provenance_mut(self.as_u64() as usize)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

/// Virtual page base for size `S`.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x4000_0004);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base(), VirtualAddress::new(0x4000_0000));
/// assert_eq!(vp.join(va.offset::<Size4K>()), va);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize>(MemoryPage<S>);

impl<S: PageSize> VirtualPage<S> {
    #[inline]
    #[must_use]
    pub const fn containing(addr: VirtualAddress) -> Self {
        Self(MemoryPage::from_addr(addr.0))
    }

    /// Page starting at `addr`.
    ///
    /// # Errors
    /// [`AddressError::Misaligned`] if `addr` is not a multiple of `S::SIZE`.
    #[inline]
    pub const fn from_aligned(addr: VirtualAddress) -> Result<Self, AddressError> {
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
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0.base())
    }

    #[inline]
    #[must_use]
    pub const fn join(self, off: MemoryAddressOffset<S>) -> VirtualAddress {
        VirtualAddress(self.0.join(off))
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{}>({:#018X})", S::LABEL, self.base().as_u64())
    }
}

impl<S: PageSize> From<VirtualPage<S>> for VirtualAddress {
    fn from(value: VirtualPage<S>) -> Self {
        value.base()
    }
}
