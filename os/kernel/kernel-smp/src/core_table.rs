use crate::SmpError;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use kernel_info::smp::MAX_CPUS;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::{Latch, SyncOnceCell};

/// Position of a core in the [`CoreTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(pub usize);

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Start-up progress of one core. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CoreState {
    Reset = 0,
    Trampoline = 1,
    LocalSetup = 2,
    Ready = 3,
    Scheduling = 4,
}

impl CoreState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Reset,
            1 => Self::Trampoline,
            2 => Self::LocalSetup,
            3 => Self::Ready,
            _ => Self::Scheduling,
        }
    }
}

/// A core's private kernel stack, handed over for good at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    /// Lowest frame of the physically contiguous run.
    pub base: PhysicalPage<Size4K>,
    /// Initial stack pointer (one past the highest byte).
    pub top: VirtualAddress,
}

/// Everything the bootstrap core and one application core share.
#[derive(Debug)]
pub struct CoreDescriptor {
    apic_id: u32,
    ready: Latch,
    state: AtomicU8,
    stack: SyncOnceCell<KernelStack>,
}

impl CoreDescriptor {
    const fn new(apic_id: u32) -> Self {
        Self {
            apic_id,
            ready: Latch::new(),
            state: AtomicU8::new(CoreState::Reset as u8),
            stack: SyncOnceCell::new(),
        }
    }

    #[must_use]
    pub const fn apic_id(&self) -> u32 {
        self.apic_id
    }

    /// The readiness flag, raised once from `join_scheduler`.
    #[must_use]
    pub const fn ready(&self) -> &Latch {
        &self.ready
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.is_set()
    }

    #[must_use]
    pub fn state(&self) -> CoreState {
        CoreState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `to` unless the core is already further along.
    /// Returns the state before the call.
    pub fn advance(&self, to: CoreState) -> CoreState {
        CoreState::from_u8(self.state.fetch_max(to as u8, Ordering::AcqRel))
    }

    /// Advance to [`CoreState::Ready`] and raise the readiness flag.
    ///
    /// Returns `false` if the flag had already been raised.
    pub fn mark_ready(&self) -> bool {
        self.advance(CoreState::Ready);
        !self.ready.set()
    }

    #[must_use]
    pub fn stack(&self) -> Option<KernelStack> {
        self.stack.get().copied()
    }

    pub(crate) fn assign_stack(&self, stack: KernelStack) -> Result<(), KernelStack> {
        self.stack.set(stack)
    }
}

/// Fixed-size table of every usable core, built once at boot.
///
/// The table is immutable after construction; cores coordinate only through
/// the per-descriptor atomics.
#[derive(Debug)]
pub struct CoreTable {
    cores: [CoreDescriptor; MAX_CPUS],
    len: usize,
}

impl CoreTable {
    /// Build the table from APIC ids in discovery order.
    ///
    /// # Errors
    /// [`SmpError::NoCores`], [`SmpError::TooManyCores`] or
    /// [`SmpError::DuplicateApicId`].
    pub fn from_apic_ids(ids: &[u32]) -> Result<Self, SmpError> {
        if ids.is_empty() {
            return Err(SmpError::NoCores);
        }
        if ids.len() > MAX_CPUS {
            return Err(SmpError::TooManyCores {
                count: ids.len(),
                max: MAX_CPUS,
            });
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(SmpError::DuplicateApicId(*id));
            }
        }
        Ok(Self {
            cores: core::array::from_fn(|i| CoreDescriptor::new(ids.get(i).copied().unwrap_or(0))),
            len: ids.len(),
        })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn get(&self, id: CoreId) -> Option<&CoreDescriptor> {
        self.cores[..self.len].get(id.0)
    }

    /// The core whose local APIC reports `apic_id`.
    #[must_use]
    pub fn current(&self, apic_id: u32) -> Option<CoreId> {
        self.iter()
            .find(|(_, c)| c.apic_id == apic_id)
            .map(|(id, _)| id)
    }

    /// Cores in table order.
    pub fn iter(&self) -> impl Iterator<Item = (CoreId, &CoreDescriptor)> {
        self.cores[..self.len]
            .iter()
            .enumerate()
            .map(|(i, c)| (CoreId(i), c))
    }

    /// Whether every core has raised its readiness flag.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        self.iter().all(|(_, c)| c.is_ready())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_and_lookup() {
        let t = CoreTable::from_apic_ids(&[0, 4, 2]).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.current(2), Some(CoreId(2)));
        assert_eq!(t.current(1), None);
        let ids: Vec<u32> = t.iter().map(|(_, c)| c.apic_id()).collect();
        assert_eq!(ids, [0, 4, 2]);
        assert!(t.get(CoreId(3)).is_none());
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(CoreTable::from_apic_ids(&[]).unwrap_err(), SmpError::NoCores);
        assert_eq!(
            CoreTable::from_apic_ids(&[1, 2, 1]).unwrap_err(),
            SmpError::DuplicateApicId(1)
        );
        let many: Vec<u32> = (0..=MAX_CPUS as u32).collect();
        assert_eq!(
            CoreTable::from_apic_ids(&many).unwrap_err(),
            SmpError::TooManyCores {
                count: MAX_CPUS + 1,
                max: MAX_CPUS
            }
        );
    }

    #[test]
    fn state_only_advances() {
        let t = CoreTable::from_apic_ids(&[0]).unwrap();
        let c = t.get(CoreId(0)).unwrap();
        assert_eq!(c.state(), CoreState::Reset);
        assert_eq!(c.advance(CoreState::LocalSetup), CoreState::Reset);
        assert_eq!(c.advance(CoreState::Trampoline), CoreState::LocalSetup);
        assert_eq!(c.state(), CoreState::LocalSetup);
    }

    #[test]
    fn ready_is_raised_once() {
        let t = CoreTable::from_apic_ids(&[0, 1]).unwrap();
        let c = t.get(CoreId(1)).unwrap();
        assert!(!t.all_ready());
        assert!(c.mark_ready());
        assert!(!c.mark_ready());
        assert_eq!(c.state(), CoreState::Ready);
        assert!(t.get(CoreId(0)).unwrap().mark_ready());
        assert!(t.all_ready());
    }
}
