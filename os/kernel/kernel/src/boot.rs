//! # Boot Stages
//!
//! The bootstrap processor initialises the kernel in one fixed order. Each
//! stage may rely on everything before it: the kernel page table needs the
//! physical allocator, trap vectors need the local APIC, starting the other
//! processors needs the trap vectors and the process table, and so on.
//!
//! [`BootSequence`] enforces that order against a [`BootPlatform`], which
//! owns the actual hardware work. The last stage, [`BootStage::JoinScheduler`],
//! hands the bootstrap processor to the scheduler and never returns.

use core::convert::Infallible;
use core::fmt;
use kernel_acpi::AcpiError;
use kernel_smp::SmpError;
use kernel_vmem::MapError;
use log::info;

use crate::process::ProcessError;

/// One step of kernel initialisation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BootStage {
    EarlyConsole,
    PhysicalAllocator,
    KernelPageTable,
    ProcessorDetection,
    LocalApic,
    TrapVectors,
    Segments,
    IoApic,
    Console,
    Serial,
    ProcessTable,
    BufferCache,
    FileTable,
    Disk,
    StartOthers,
    LateAllocator,
    FirstProcess,
    JoinScheduler,
}

impl BootStage {
    /// Every stage, in the order it runs.
    pub const ALL: [Self; 18] = [
        Self::EarlyConsole,
        Self::PhysicalAllocator,
        Self::KernelPageTable,
        Self::ProcessorDetection,
        Self::LocalApic,
        Self::TrapVectors,
        Self::Segments,
        Self::IoApic,
        Self::Console,
        Self::Serial,
        Self::ProcessTable,
        Self::BufferCache,
        Self::FileTable,
        Self::Disk,
        Self::StartOthers,
        Self::LateAllocator,
        Self::FirstProcess,
        Self::JoinScheduler,
    ];

    /// Position in [`BootStage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EarlyConsole => "early console",
            Self::PhysicalAllocator => "physical allocator",
            Self::KernelPageTable => "kernel page table",
            Self::ProcessorDetection => "processor detection",
            Self::LocalApic => "local APIC",
            Self::TrapVectors => "trap vectors",
            Self::Segments => "segments",
            Self::IoApic => "I/O APIC",
            Self::Console => "console",
            Self::Serial => "serial port",
            Self::ProcessTable => "process table",
            Self::BufferCache => "buffer cache",
            Self::FileTable => "file table",
            Self::Disk => "disk",
            Self::StartOthers => "start other processors",
            Self::LateAllocator => "late allocator",
            Self::FirstProcess => "first process",
            Self::JoinScheduler => "join scheduler",
        }
    }
}

impl fmt::Display for BootStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a single stage failed.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("firmware tables: {0}")]
    Acpi(#[from] AcpiError),
    #[error("multiprocessor start-up: {0}")]
    Smp(#[from] SmpError),
    #[error("page tables: {0}")]
    Map(#[from] MapError),
    #[error("process: {0}")]
    Process(#[from] ProcessError),
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("already initialised")]
    AlreadyInitialized,
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("boot stage '{stage}' failed: {source}")]
    Stage {
        stage: BootStage,
        #[source]
        source: StageError,
    },
    #[error("boot stage '{0}' already ran")]
    Repeated(BootStage),
    #[error("boot stage '{found}' requested before '{expected}'")]
    OutOfOrder {
        expected: BootStage,
        found: BootStage,
    },
    #[error("boot stage '{0}' is not the final stage")]
    NotFinal(BootStage),
}

/// The hardware side of kernel initialisation.
pub trait BootPlatform {
    /// Perform `stage`. Never called with [`BootStage::JoinScheduler`].
    ///
    /// # Errors
    /// Whatever keeps the stage from completing. Boot stops there.
    fn init(&mut self, stage: BootStage) -> Result<(), StageError>;

    /// Hand the calling processor to the scheduler.
    fn join_scheduler(&mut self) -> !;
}

/// Tracks which stages have run and refuses to run them out of order.
#[derive(Debug, Default)]
pub struct BootSequence {
    next: usize,
}

impl BootSequence {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// The stage that runs next, or `None` once the scheduler was joined.
    #[must_use]
    pub const fn next_stage(&self) -> Option<BootStage> {
        if self.next < BootStage::ALL.len() {
            Some(BootStage::ALL[self.next])
        } else {
            None
        }
    }

    /// Whether `stage` has already been started.
    #[must_use]
    pub const fn has_run(&self, stage: BootStage) -> bool {
        stage.index() < self.next
    }

    /// Claim `stage` as the one about to run.
    ///
    /// # Errors
    /// [`BootError::Repeated`] for a stage that already ran and
    /// [`BootError::OutOfOrder`] for one whose predecessors have not.
    pub fn begin(&mut self, stage: BootStage) -> Result<(), BootError> {
        if self.has_run(stage) {
            return Err(BootError::Repeated(stage));
        }
        match self.next_stage() {
            Some(expected) if expected != stage => Err(BootError::OutOfOrder {
                expected,
                found: stage,
            }),
            _ => {
                self.next += 1;
                Ok(())
            }
        }
    }

    /// Run `stage` on `platform`.
    ///
    /// # Errors
    /// As [`begin`](Self::begin), plus [`BootError::Stage`] when the platform
    /// fails it and [`BootError::NotFinal`] for the scheduler stage, which
    /// only [`run`](Self::run) may enter.
    pub fn step<P: BootPlatform + ?Sized>(
        &mut self,
        platform: &mut P,
        stage: BootStage,
    ) -> Result<(), BootError> {
        if stage == BootStage::JoinScheduler {
            return Err(BootError::NotFinal(stage));
        }
        self.begin(stage)?;
        info!("boot: {stage}");
        platform
            .init(stage)
            .map_err(|source| BootError::Stage { stage, source })
    }

    /// Run every remaining stage and enter the scheduler.
    ///
    /// Returns only if a stage fails.
    ///
    /// # Errors
    /// The first failing stage, see [`step`](Self::step).
    pub fn run<P: BootPlatform + ?Sized>(
        mut self,
        platform: &mut P,
    ) -> Result<Infallible, BootError> {
        while let Some(stage) = self.next_stage() {
            if stage == BootStage::JoinScheduler {
                break;
            }
            self.step(platform, stage)?;
        }
        self.begin(BootStage::JoinScheduler)?;
        info!("boot: {}", BootStage::JoinScheduler);
        platform.join_scheduler()
    }
}
