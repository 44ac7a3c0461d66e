//! Backend adapter: the narrow interface the pipeline uses to reach a
//! compute device.
//!
//! A backend owns everything device-specific (device and queue selection,
//! kernel compilation, build logs). The multiply stage and the reduction
//! scheduler only see buffers, blocking copies, tagged launches and a
//! barrier.

use crate::element::Element;
use thiserror::Error;

/// Failures surfaced by a compute backend. Always fatal to the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// No usable device, or the request exceeds what the device supports.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Kernel compilation failed. `log` holds the build log.
    #[error("failed to build kernel {kernel}: {log}")]
    Compile { kernel: String, log: String },
    #[error("buffer allocation failed: {0}")]
    Allocation(String),
    #[error("host/device transfer failed: {0}")]
    Transfer(String),
    #[error("kernel launch failed: {0}")]
    Launch(String),
    #[error("device synchronization failed: {0}")]
    Sync(String),
}

/// How a kernel accesses a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Kernels the pipeline can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `out[k] = a[k] * b[k]`; inputs `[a, b]`.
    Multiply,
    /// `out[g] = Σ in[g*G .. (g+1)*G]`; inputs `[in]`, group-local tree sum.
    Reduce,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Multiply => "multiply",
            Operation::Reduce => "reduce",
        }
    }
}

/// Two-level launch geometry: `global` lanes split into groups of `group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRanges {
    pub global: usize,
    pub group: usize,
}

impl LaunchRanges {
    /// Number of groups; `global` is always a multiple of `group`.
    pub fn groups(&self) -> usize {
        self.global / self.group
    }
}

/// Buffer and scalar arguments for one launch.
///
/// Scalars are operation-specific: both kernels receive the logical
/// element count as `scalars[0]`.
pub struct LaunchArgs<'a, B> {
    pub inputs: &'a [&'a B],
    pub output: &'a B,
    pub scalars: &'a [u32],
}

/// Convert an element count to the `u32` kernels take as a scalar.
pub(crate) fn len_scalar(len: usize) -> Result<u32, BackendError> {
    u32::try_from(len)
        .map_err(|_| BackendError::Unsupported(format!("length {len} exceeds u32 range")))
}

/// Minimal capability set required by the pipeline.
///
/// Copies are blocking. `launch` may return before the kernel finishes;
/// callers must call [`Backend::barrier`] before another launch reads its
/// output or the host reads it back.
pub trait Backend<T: Element> {
    type Buffer;

    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Largest group size a reduce launch supports.
    fn max_group_size(&self) -> usize;

    /// Check that `group_size` can be used for reduce launches.
    fn check_group_size(&self, group_size: usize) -> Result<(), BackendError> {
        if group_size > self.max_group_size() {
            return Err(BackendError::Unsupported(format!(
                "group size {group_size} exceeds device maximum {}",
                self.max_group_size()
            )));
        }
        Ok(())
    }

    /// Allocate a buffer of `len` elements. Contents are unspecified.
    fn alloc(&self, len: usize, access: Access) -> Result<Self::Buffer, BackendError>;

    /// Copy `data` to the device at element offset `offset`.
    fn write(&self, buf: &mut Self::Buffer, offset: usize, data: &[T])
        -> Result<(), BackendError>;

    /// Copy `len` elements starting at `offset` back to the host.
    fn read(&self, buf: &Self::Buffer, offset: usize, len: usize)
        -> Result<Vec<T>, BackendError>;

    /// Enqueue one kernel launch.
    fn launch(
        &self,
        op: Operation,
        ranges: LaunchRanges,
        args: LaunchArgs<'_, Self::Buffer>,
    ) -> Result<(), BackendError>;

    /// Block until every enqueued command has completed.
    fn barrier(&self) -> Result<(), BackendError>;
}
