use kernel_vmem::MapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VdsoError {
    /// No physical page for the VDSO data.
    #[error("out of memory for the VDSO page")]
    OutOfMemory,
    /// The page could not be mapped; it has been freed again.
    #[error("cannot map the VDSO page: {0}")]
    Map(#[from] MapError),
}
