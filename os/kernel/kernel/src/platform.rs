//! # Bare-Metal Platform
//!
//! Binds the boot stages and the per-core hooks to the real machine. All
//! state shared between cores lives in the statics below; each is written
//! exactly once by the bootstrap processor before the other processors are
//! started, and only read afterwards.

use crate::apic::{InitSipiSipi, X2Apic};
use crate::boot::{BootPlatform, BootSequence, BootStage, StageError};
use crate::gdt::GDT;
use crate::idt::Idt;
use crate::process::{Process, Processes};
use crate::{ap_boot, syscall};
use kernel_acpi::PhysMapRo;
use kernel_alloc::{BitmapFrameAlloc, HhdmPhysMapper, LockedFrameAlloc};
use kernel_info::boot::KernelBootInfo;
use kernel_info::memory::kernel_image_phys;
use kernel_info::process::Pid;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_qemu::QemuLogger;
use kernel_smp::{ApEntry, CoreServices, CoreTable, SmpBoot, SmpError, Trampoline, WaitPolicy};
use kernel_sync::{SpinLock, SyncOnceCell};
use kernel_vmem::{AddressSpace, FrameAlloc, RootPage};
use log::{LevelFilter, debug, error, info, warn};

/// Physical memory handed to the allocator before the other processors run;
/// the rest of the free range is added by the late allocator stage.
const EARLY_ALLOCATOR_BYTES: u64 = 4 * 1024 * 1024;

static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
static MAPPER: HhdmPhysMapper = HhdmPhysMapper::kernel();
static FRAMES: SpinLock<BitmapFrameAlloc> = SpinLock::new(BitmapFrameAlloc::empty());
static CORES: SyncOnceCell<CoreTable> = SyncOnceCell::new();
static KERNEL_ROOT: SyncOnceCell<RootPage> = SyncOnceCell::new();
static IDT: SyncOnceCell<Idt> = SyncOnceCell::new();
static INIT_PROCESS: SpinLock<Option<Process>> = SpinLock::new(None);

/// Firmware tables read through the direct map.
struct FirmwareWindow;

impl PhysMapRo for FirmwareWindow {
    unsafe fn map_ro<'a>(&self, paddr: u64, len: usize) -> Option<&'a [u8]> {
        let map = MAPPER.direct_map();
        let last = paddr.checked_add(u64::try_from(len).ok()?.saturating_sub(1))?;
        let va = match map
            .to_virtual(PhysicalAddress::new(last))
            .and_then(|_| map.to_virtual(PhysicalAddress::new(paddr)))
        {
            Ok(va) => va,
            Err(e) => {
                warn!("firmware region {paddr:#x}+{len:#x}: {e}");
                return None;
            }
        };
        // SAFETY: the whole region lies inside the direct map, which is never unmapped.
        Some(unsafe { core::slice::from_raw_parts(va.as_mut_ptr::<u8>(), len) })
    }
}

/// The bootstrap processor's view of the machine during boot.
pub struct KernelPlatform {
    boot_info: KernelBootInfo,
    late_frames: Option<(PhysicalPage<Size4K>, usize)>,
}

impl KernelPlatform {
    #[must_use]
    pub const fn new(boot_info: KernelBootInfo) -> Self {
        Self {
            boot_info,
            late_frames: None,
        }
    }

    fn cores() -> Result<&'static CoreTable, StageError> {
        CORES
            .get()
            .ok_or(StageError::Unsupported("core table not built"))
    }

    fn kernel_root() -> Result<RootPage, StageError> {
        KERNEL_ROOT
            .get()
            .copied()
            .ok_or(StageError::Unsupported("kernel page table not set"))
    }

    fn init_allocator(&mut self) {
        let start = PhysicalAddress::new(self.boot_info.free_phys_start);
        let end = PhysicalAddress::new(self.boot_info.free_phys_end);
        let mut frames = BitmapFrameAlloc::from_range(start, end);

        let early = usize::try_from(EARLY_ALLOCATOR_BYTES / 4096).unwrap_or(usize::MAX);
        if let Some(late) = frames.capacity().checked_sub(early).filter(|&n| n > 0)
            && let Some(first) = frames.first_frame().checked_step(early as u64)
        {
            frames.reserve(first, late);
            self.late_frames = Some((first, late));
        }
        info!(
            "{} frames free, {} deferred",
            frames.free_frames(),
            self.late_frames.map_or(0, |(_, n)| n)
        );
        FRAMES.with_lock(|f| *f = frames);
    }

    fn detect_processors(&self) -> Result<(), StageError> {
        let rsdp = self
            .boot_info
            .rsdp()
            .ok_or(StageError::Unsupported("no ACPI RSDP from the loader"))?;
        // SAFETY: the loader passed the RSDP address; the HHDM maps all firmware tables.
        let ids = unsafe { kernel_acpi::cpus_from_rsdp(&FirmwareWindow, rsdp)? };
        let table = CoreTable::from_apic_ids(ids.as_slice())?;
        info!("{} processors", table.len());
        CORES
            .set(table)
            .map_err(|_| StageError::AlreadyInitialized)
    }

    fn start_others(&self) -> Result<(), StageError> {
        let cores = Self::cores()?;
        let apic_id = X2Apic::id();
        let me = cores
            .current(apic_id)
            .ok_or(SmpError::UnknownCore(apic_id))?;

        let landing = ap_boot::ap_long_mode_entry as usize as u64;
        let entry = kernel_image_phys(landing)
            .map(PhysicalAddress::new)
            .ok_or(StageError::Unsupported("AP entry is outside the kernel image"))?;
        let ap = ApEntry {
            stub: ap_boot::stub(),
            entry,
            page_table_root: PhysicalAddress::new(self.boot_info.kernel_page_table),
        };

        // SAFETY: the trampoline pages lie below the allocator's range and belong to start-up.
        let trampoline = unsafe { Trampoline::at_physical(&MAPPER) };
        let mut smp = SmpBoot::new(
            cores,
            trampoline,
            LockedFrameAlloc::new(&FRAMES),
            InitSipiSipi::new(X2Apic),
            MAPPER.direct_map(),
        )
        .with_wait_policy(WaitPolicy::reporting());

        let started = smp.start_all_others(me, &ap)?;
        info!("{started} other processors running");
        Ok(())
    }

    fn spawn_first_process() -> Result<(), StageError> {
        let processes = Processes::new(&MAPPER, Some(Self::kernel_root()?));
        let init = processes.spawn(&mut LockedFrameAlloc::new(&FRAMES), Pid::new(1))?;
        INIT_PROCESS.with_lock(|slot| *slot = Some(init));
        Ok(())
    }
}

impl BootPlatform for KernelPlatform {
    fn init(&mut self, stage: BootStage) -> Result<(), StageError> {
        match stage {
            BootStage::EarlyConsole => LOGGER
                .install()
                .map_err(|_| StageError::AlreadyInitialized),
            BootStage::PhysicalAllocator => {
                self.init_allocator();
                Ok(())
            }
            BootStage::KernelPageTable => {
                let root = PhysicalPage::containing(PhysicalAddress::new(
                    self.boot_info.kernel_page_table,
                ));
                KERNEL_ROOT
                    .set(root)
                    .map_err(|_| StageError::AlreadyInitialized)?;
                KernelCore.switch_to_kernel_page_table();
                Ok(())
            }
            BootStage::ProcessorDetection => self.detect_processors(),
            BootStage::LocalApic => {
                KernelCore.init_local_apic();
                Ok(())
            }
            BootStage::TrapVectors => IDT
                .set(Idt::uniform(unexpected_trap as usize as u64))
                .map_err(|_| StageError::AlreadyInitialized),
            BootStage::Segments => {
                KernelCore.init_segments();
                Ok(())
            }
            BootStage::IoApic
            | BootStage::Console
            | BootStage::Serial
            | BootStage::ProcessTable
            | BootStage::BufferCache
            | BootStage::FileTable
            | BootStage::Disk => {
                debug!("{stage}: not present in this kernel");
                Ok(())
            }
            BootStage::StartOthers => self.start_others(),
            BootStage::LateAllocator => {
                if let Some((first, count)) = self.late_frames.take() {
                    FRAMES.with_lock(|f| f.free_contiguous_4k(first, count));
                }
                Ok(())
            }
            BootStage::FirstProcess => Self::spawn_first_process(),
            BootStage::JoinScheduler => Err(StageError::Unsupported("entered through join_scheduler")),
        }
    }

    fn join_scheduler(&mut self) -> ! {
        match CORES.get() {
            Some(cores) => kernel_smp::join_scheduler(cores, &KernelCore),
            None => KernelCore.enter_scheduler(),
        }
    }
}

/// Per-core hooks, acting on whichever core calls them.
#[derive(Debug, Clone, Copy)]
pub struct KernelCore;

impl CoreServices for KernelCore {
    fn switch_to_kernel_page_table(&self) {
        match KERNEL_ROOT.get() {
            // SAFETY: the kernel page table maps the kernel image, the HHDM and every stack.
            Some(root) => unsafe { AddressSpace::from_root(&MAPPER, *root).activate() },
            None => error!("no kernel page table to switch to"),
        }
    }

    fn init_segments(&self) {
        // SAFETY: `GDT` is a static.
        unsafe { GDT.load() }
    }

    fn init_local_apic(&self) {
        // SAFETY: ring 0; the processor table only lists x2APIC-capable cores.
        let id = unsafe { X2Apic::enable() };
        debug!("local APIC {id} enabled");
    }

    fn install_idt(&self) {
        match IDT.get() {
            // SAFETY: the table is never modified once set.
            Some(idt) => unsafe { idt.load() },
            None => warn!("no interrupt table built yet"),
        }
    }

    fn init_syscall(&self) {
        // SAFETY: ring 0, after `init_segments`.
        unsafe { syscall::init() }
    }

    fn current_apic_id(&self) -> u32 {
        X2Apic::id()
    }

    fn enter_scheduler(&self) -> ! {
        // No runnable processes are scheduled yet: idle until interrupted.
        loop {
            // SAFETY: enabling interrupts with a loaded IDT, then halting.
            unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
        }
    }
}

/// Bootstrap processor entry, on the boot stack.
pub fn kernel_main(boot_info: &KernelBootInfo) -> ! {
    let mut platform = KernelPlatform::new(boot_info.clone());
    let Err(e) = BootSequence::new().run(&mut platform);
    error!("kernel boot failed: {e}");
    halt()
}

/// Application processor entry, on its own kernel stack. Reached from
/// [`ap_boot::ap_long_mode_entry`].
pub extern "C" fn ap_main() -> ! {
    match CORES.get() {
        Some(cores) => kernel_smp::core_entry(cores, &KernelCore),
        None => halt(),
    }
}

/// Stop the calling core for good.
pub fn halt() -> ! {
    loop {
        // SAFETY: masking interrupts and halting has no other effect.
        unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

/// Target of every interrupt gate.
#[unsafe(naked)]
unsafe extern "C" fn unexpected_trap() {
    core::arch::naked_asm!(
        "cli",
        "and rsp, -16",
        "call {report}",
        "2:",
        "hlt",
        "jmp 2b",
        report = sym report_unexpected_trap,
    );
}

extern "C" fn report_unexpected_trap() {
    error!("APIC {}: unexpected interrupt, halting", X2Apic::id());
}
