use crate::{CoreDescriptor, CoreId, CoreState, CoreTable};
use log::{error, info};

/// Per-core hardware set-up and the hand-off to the scheduler.
///
/// Every method acts on the calling core only.
pub trait CoreServices {
    /// Load the kernel's own page table in place of the boot one.
    fn switch_to_kernel_page_table(&self);

    /// Load this core's GDT and segment registers.
    fn init_segments(&self);

    /// Enable and configure the local APIC.
    fn init_local_apic(&self);

    /// Load the shared interrupt descriptor table.
    fn install_idt(&self);

    /// Program the per-core system-call entry state.
    fn init_syscall(&self);

    /// APIC id of the calling core.
    fn current_apic_id(&self) -> u32;

    /// Run the scheduler loop.
    fn enter_scheduler(&self) -> !;
}

/// Landing point of every application processor after the trampoline.
pub fn core_entry<S: CoreServices + ?Sized>(cores: &CoreTable, services: &S) -> ! {
    services.switch_to_kernel_page_table();
    if let Some((_, descriptor)) = lookup(cores, services) {
        descriptor.advance(CoreState::LocalSetup);
    }
    services.init_segments();
    services.init_local_apic();
    join_scheduler(cores, services)
}

/// Common tail of every core, bootstrap included: install the IDT, set up
/// system calls, announce readiness, and enter the scheduler.
pub fn join_scheduler<S: CoreServices + ?Sized>(cores: &CoreTable, services: &S) -> ! {
    let core = lookup(cores, services);
    if let Some((id, _)) = core {
        info!("{id}: starting");
    }

    services.install_idt();
    services.init_syscall();

    if let Some((id, descriptor)) = core {
        if !descriptor.mark_ready() {
            error!("{id} reported ready twice");
        }
        descriptor.advance(CoreState::Scheduling);
    }
    services.enter_scheduler()
}

fn lookup<'t, S: CoreServices + ?Sized>(
    cores: &'t CoreTable,
    services: &S,
) -> Option<(CoreId, &'t CoreDescriptor)> {
    let apic_id = services.current_apic_id();
    let found = cores
        .current(apic_id)
        .and_then(|id| cores.get(id).map(|c| (id, c)));
    if found.is_none() {
        error!("APIC id {apic_id} is not in the core table");
    }
    found
}
