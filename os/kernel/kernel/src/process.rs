//! # Process Address Spaces
//!
//! The part of the process lifecycle that touches memory: each process gets
//! its own page tables sharing the kernel half, plus a VDSO page naming its
//! pid. Creating, forking, re-identifying and destroying a process keep the
//! two in step.
//!
//! | Event           | Address space            | VDSO page                        |
//! |-----------------|--------------------------|----------------------------------|
//! | [`spawn`]       | new                      | new; on failure, none            |
//! | [`fork`]        | new                      | copied; on failure, fork fails   |
//! | [`exec`]        | kept                     | pid rewritten                    |
//! | [`set_pid`]     | kept                     | pid rewritten                    |
//! | [`exit`]        | torn down                | freed with it                    |
//!
//! [`spawn`]: Processes::spawn
//! [`fork`]: Processes::fork
//! [`exec`]: Processes::exec
//! [`set_pid`]: Processes::set_pid
//! [`exit`]: Processes::exit

use kernel_info::process::Pid;
use kernel_memory_addresses::{PhysicalPage, Size4K};
use kernel_vdso::{ForkCopy, Refresh, VdsoError, VdsoManager, VdsoProcess};
use kernel_vmem::{AddressSpace, FrameAlloc, MapError, PhysMapper, RootPage};
use log::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cannot build address space: {0}")]
    AddressSpace(#[from] MapError),
    #[error("cannot copy VDSO page: {0}")]
    Vdso(#[from] VdsoError),
}

/// The memory-side state of one process.
///
/// Owns its address space and VDSO page, so it cannot be cloned; [`Processes::exit`]
/// consumes it.
///
/// ```compile_fail
/// fn duplicate(p: &kernel::Process) -> kernel::Process {
///     p.clone()
/// }
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Process {
    pid: Pid,
    root: RootPage,
    vdso: Option<PhysicalPage<Size4K>>,
}

impl Process {
    #[must_use]
    pub const fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub const fn root(&self) -> RootPage {
        self.root
    }

    /// The page backing this process's VDSO, if it has one.
    #[must_use]
    pub const fn vdso_page(&self) -> Option<PhysicalPage<Size4K>> {
        self.vdso
    }
}

impl VdsoProcess for Process {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn address_space(&self) -> RootPage {
        self.root
    }
}

/// Creates and destroys process address spaces.
pub struct Processes<'m, M: PhysMapper> {
    mapper: &'m M,
    vdso: VdsoManager<'m, M>,
    kernel_root: Option<RootPage>,
}

impl<'m, M: PhysMapper> Processes<'m, M> {
    /// `kernel_root`, when given, is the page table whose upper half every
    /// process shares.
    pub const fn new(mapper: &'m M, kernel_root: Option<RootPage>) -> Self {
        Self {
            mapper,
            vdso: VdsoManager::new(mapper),
            kernel_root,
        }
    }

    #[must_use]
    pub const fn vdso(&self) -> &VdsoManager<'m, M> {
        &self.vdso
    }

    fn new_address_space<A: FrameAlloc>(&self, alloc: &mut A) -> Result<RootPage, MapError> {
        let aspace = AddressSpace::allocate(self.mapper, alloc)?;
        if let Some(kernel) = self.kernel_root {
            aspace.share_kernel_half(kernel);
        }
        Ok(aspace.root_page())
    }

    /// Create a process with a fresh address space.
    ///
    /// A process whose VDSO page cannot be set up still runs; it just has no
    /// page at the VDSO address.
    ///
    /// # Errors
    /// [`ProcessError::AddressSpace`] if no page table can be allocated.
    pub fn spawn<A: FrameAlloc>(&self, alloc: &mut A, pid: Pid) -> Result<Process, ProcessError> {
        let root = self.new_address_space(alloc)?;
        let mut process = Process {
            pid,
            root,
            vdso: None,
        };
        match self.vdso.setup(alloc, root, &process) {
            Ok(page) => process.vdso = Some(page),
            Err(e) => warn!("pid {pid}: running without a VDSO page: {e}"),
        }
        info!("pid {pid}: created");
        Ok(process)
    }

    /// Duplicate `parent` as `child_pid`.
    ///
    /// # Errors
    /// [`ProcessError`] if the child's page tables or its VDSO copy cannot be
    /// allocated. Everything allocated for the child is released again.
    pub fn fork<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        parent: &Process,
        child_pid: Pid,
    ) -> Result<Process, ProcessError> {
        let root = self.new_address_space(alloc)?;
        let mut child = Process {
            pid: child_pid,
            root,
            vdso: None,
        };

        match self.vdso.copy_on_fork(alloc, root, parent.root, &child) {
            Ok(ForkCopy::Copied(page)) => child.vdso = Some(page),
            Ok(ForkCopy::NoVdso) => {}
            Err(e) => {
                warn!("pid {}: fork of {child_pid} failed: {e}", parent.pid);
                AddressSpace::from_root(self.mapper, root).teardown(alloc);
                return Err(e.into());
            }
        }
        info!("pid {}: forked {child_pid}", parent.pid);
        Ok(child)
    }

    /// Bring the VDSO page in line after `exec` replaced the program image.
    pub fn exec(&self, process: &mut Process) -> Refresh {
        self.refresh(process)
    }

    /// Change the pid of `process` and publish it through the VDSO page.
    pub fn set_pid(&self, process: &mut Process, pid: Pid) -> Refresh {
        process.pid = pid;
        self.refresh(process)
    }

    fn refresh(&self, process: &mut Process) -> Refresh {
        let outcome = self.vdso.refresh(process);
        match outcome {
            Refresh::Updated(page) => process.vdso = Some(page),
            Refresh::NotMapped | Refresh::ForeignPage(_) => process.vdso = None,
        }
        outcome
    }

    /// Destroy `process`, freeing its page tables, user pages and VDSO page.
    pub fn exit<A: FrameAlloc>(&self, alloc: &mut A, process: Process) {
        AddressSpace::from_root(self.mapper, process.root).teardown(alloc);
        info!("pid {}: exited", process.pid);
    }
}
