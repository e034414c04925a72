use crate::{ApBootParameters, CoreId, CoreState, CoreTable, KernelStack, SmpError, Trampoline};
use kernel_info::memory::{KERNEL_STACK_PAGES, KERNEL_STACK_SIZE};
use kernel_info::smp::{AP_STACK_RESERVE, READY_SPIN_REPORT_INTERVAL};
use kernel_memory_addresses::{DirectMap, PhysicalAddress};
use kernel_vmem::FrameAlloc;
use log::{debug, info, warn};

/// Delivers the start-up interrupt sequence to one processor.
pub trait StartupIpi {
    /// Make the processor with `apic_id` begin executing at `target`.
    ///
    /// # Errors
    /// [`SmpError::Startup`] if nothing was sent. An implementation must not
    /// fail once the processor may have been signalled.
    fn send_startup(&mut self, apic_id: u32, target: PhysicalAddress) -> Result<(), SmpError>;
}

impl<I: StartupIpi + ?Sized> StartupIpi for &mut I {
    fn send_startup(&mut self, apic_id: u32, target: PhysicalAddress) -> Result<(), SmpError> {
        (**self).send_startup(apic_id, target)
    }
}

/// How the bootstrap core waits for a signalled core to become ready.
///
/// Neither policy gives up: a core that never reports ready stalls start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Spin silently.
    #[default]
    Forever,
    /// Spin, logging a warning every `interval` polls.
    Report { interval: u64 },
}

impl WaitPolicy {
    /// [`WaitPolicy::Report`] at the default interval.
    #[must_use]
    pub const fn reporting() -> Self {
        Self::Report {
            interval: READY_SPIN_REPORT_INTERVAL,
        }
    }
}

/// The application-processor entry path.
#[derive(Debug, Clone, Copy)]
pub struct ApEntry<'a> {
    /// Real-mode stub copied into the trampoline.
    pub stub: &'a [u8],
    /// Physical address of the long-mode landing code.
    pub entry: PhysicalAddress,
    /// Page-table root the stub enables paging with.
    pub page_table_root: PhysicalAddress,
}

/// The bootstrap core's side of multiprocessor start-up.
pub struct SmpBoot<'a, A, I> {
    cores: &'a CoreTable,
    trampoline: Trampoline<'a>,
    frames: A,
    ipi: I,
    direct_map: DirectMap,
    wait: WaitPolicy,
}

impl<'a, A: FrameAlloc, I: StartupIpi> SmpBoot<'a, A, I> {
    /// `direct_map` turns stack frames into the addresses the cores run on.
    pub const fn new(
        cores: &'a CoreTable,
        trampoline: Trampoline<'a>,
        frames: A,
        ipi: I,
        direct_map: DirectMap,
    ) -> Self {
        Self {
            cores,
            trampoline,
            frames,
            ipi,
            direct_map,
            wait: WaitPolicy::Forever,
        }
    }

    #[must_use]
    pub const fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Start every core but `me`, strictly one after the other.
    ///
    /// For each core in table order: allocate its kernel stack, write the
    /// trampoline footer, send the start-up IPI, and spin until the core has
    /// raised its readiness flag. Cores that are already ready are skipped.
    ///
    /// Returns the number of cores started.
    ///
    /// # Errors
    /// - [`SmpError::StubTooLarge`] before any core is touched.
    /// - [`SmpError::StackAllocation`] naming the first core without a stack;
    ///   it and all later cores stay in reset.
    /// - [`SmpError::Startup`] naming the first core that could not be
    ///   signalled; its stack is released and later cores stay in reset.
    /// - [`SmpError::Above4G`] or [`SmpError::Address`] if the entry path or
    ///   a stack cannot be expressed to the stub.
    pub fn start_all_others(&mut self, me: CoreId, entry: &ApEntry<'_>) -> Result<usize, SmpError> {
        self.trampoline.install(entry.stub)?;

        let mut started = 0;
        for (id, core) in self.cores.iter() {
            if id == me {
                continue;
            }
            if core.is_ready() {
                debug!("{id} is already running");
                continue;
            }

            let stack = self.allocate_stack(id, core.apic_id())?;
            let params = ApBootParameters {
                stack_top: stack.top,
                entry: entry.entry,
                stack_reserve: AP_STACK_RESERVE,
                page_table_root: entry.page_table_root,
            };
            let signalled = self
                .trampoline
                .write_parameters(&params)
                .and_then(|()| {
                    info!("{id}: sending start-up IPI to APIC id {}", core.apic_id());
                    self.ipi
                        .send_startup(core.apic_id(), Trampoline::entry_point())
                });
            if let Err(e) = signalled {
                self.frames
                    .free_contiguous_4k(stack.base, KERNEL_STACK_PAGES);
                return Err(e);
            }

            // Only cores that end up ready are given a stack, and those are skipped.
            let assigned = core.assign_stack(stack);
            debug_assert!(assigned.is_ok(), "{id} was given a second kernel stack");
            core.advance(CoreState::Trampoline);

            match self.wait {
                WaitPolicy::Forever => core.ready().spin_until_set(),
                WaitPolicy::Report { interval } => {
                    core.ready().spin_until_set_reporting(interval, |spins| {
                        warn!("{id}: still waiting for ready after {spins} polls");
                    });
                }
            }
            debug!("{id} is ready");
            started += 1;
        }
        Ok(started)
    }

    fn allocate_stack(&mut self, core: CoreId, apic_id: u32) -> Result<KernelStack, SmpError> {
        let base = self
            .frames
            .alloc_contiguous_4k(KERNEL_STACK_PAGES)
            .ok_or(SmpError::StackAllocation { core, apic_id })?;

        let top = self
            .direct_map
            .to_virtual(base.base())
            .and_then(|low| low.checked_add(KERNEL_STACK_SIZE as u64));
        match top {
            Ok(top) => Ok(KernelStack { base, top }),
            Err(e) => {
                self.frames.free_contiguous_4k(base, KERNEL_STACK_PAGES);
                Err(e.into())
            }
        }
    }
}
