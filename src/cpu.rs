//! Host-resident backend.
//!
//! Emulates the two device kernels on the CPU: lanes of a multiply launch
//! and groups of a reduce launch run in parallel on the rayon pool, and
//! each group combines its elements with the same halving-stride tree the
//! device kernels use. Launches complete before `launch` returns, so
//! `barrier` only bumps a counter.
//!
//! Every call is counted in [`CpuStats`], which lets callers check that a
//! rejected run never touched the backend.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::backend::{Access, Backend, BackendError, LaunchArgs, LaunchRanges, Operation};
use crate::element::Element;

/// Default largest group size, matching common device limits.
pub const DEFAULT_MAX_GROUP_SIZE: usize = 1024;

/// A host vector standing in for a device buffer.
#[derive(Debug)]
pub struct HostBuffer<T> {
    data: RefCell<Vec<T>>,
    access: Access,
}

impl<T> HostBuffer<T> {
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of the calls a [`CpuBackend`] has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub allocations: usize,
    pub writes: usize,
    pub reads: usize,
    pub launches: usize,
    pub barriers: usize,
}

impl CpuStats {
    /// Total number of backend calls.
    pub fn interactions(&self) -> usize {
        self.allocations + self.writes + self.reads + self.launches + self.barriers
    }
}

/// CPU implementation of [`Backend`].
#[derive(Debug)]
pub struct CpuBackend {
    max_group_size: usize,
    allocations: AtomicUsize,
    writes: AtomicUsize,
    reads: AtomicUsize,
    launches: AtomicUsize,
    barriers: AtomicUsize,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_max_group_size(DEFAULT_MAX_GROUP_SIZE)
    }

    /// Create a backend that rejects group sizes above `max_group_size`.
    pub fn with_max_group_size(max_group_size: usize) -> Self {
        CpuBackend {
            max_group_size,
            allocations: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            launches: AtomicUsize::new(0),
            barriers: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> CpuStats {
        CpuStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
            barriers: self.barriers.load(Ordering::Relaxed),
        }
    }
}

/// Sum a group in place with a halving-stride tree, leaving the result in
/// `scratch[0]`.
///
/// Works for any group length: the first stride is half the next power of
/// two, and lanes whose partner falls past the end sit out that step.
pub(crate) fn tree_sum<T: Element>(scratch: &mut [T]) -> T {
    let n = scratch.len();
    if n == 0 {
        return T::zero();
    }
    let mut stride = n.next_power_of_two() / 2;
    while stride > 0 {
        for i in 0..stride {
            if i + stride < n {
                scratch[i] = scratch[i].add(scratch[i + stride]);
            }
        }
        stride /= 2;
    }
    scratch[0]
}

/// Launches must honour the access declared at allocation.
fn check_access<T>(buf: &HostBuffer<T>, denied: Access, what: &str) -> Result<(), BackendError> {
    if buf.access == denied {
        return Err(BackendError::Launch(format!(
            "{what} buffer is {:?}",
            buf.access
        )));
    }
    Ok(())
}

fn check_len<T>(buf: &HostBuffer<T>, needed: usize, what: &str) -> Result<(), BackendError> {
    if buf.len() < needed {
        return Err(BackendError::Launch(format!(
            "{what} buffer holds {} elements, launch needs {needed}",
            buf.len()
        )));
    }
    Ok(())
}

impl<T: Element> Backend<T> for CpuBackend {
    type Buffer = HostBuffer<T>;

    fn name(&self) -> &str {
        "cpu"
    }

    fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    fn alloc(&self, len: usize, access: Access) -> Result<HostBuffer<T>, BackendError> {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        if len == 0 {
            return Err(BackendError::Allocation("zero-length buffer".into()));
        }
        Ok(HostBuffer {
            data: RefCell::new(vec![T::zero(); len]),
            access,
        })
    }

    fn write(
        &self,
        buf: &mut HostBuffer<T>,
        offset: usize,
        data: &[T],
    ) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut dst = buf.data.borrow_mut();
        let end = offset + data.len();
        if end > dst.len() {
            return Err(BackendError::Transfer(format!(
                "write of {}..{end} past buffer end {}",
                offset,
                dst.len()
            )));
        }
        dst[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read(
        &self,
        buf: &HostBuffer<T>,
        offset: usize,
        len: usize,
    ) -> Result<Vec<T>, BackendError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let src = buf.data.borrow();
        let end = offset + len;
        if end > src.len() {
            return Err(BackendError::Transfer(format!(
                "read of {offset}..{end} past buffer end {}",
                src.len()
            )));
        }
        Ok(src[offset..end].to_vec())
    }

    fn launch(
        &self,
        op: Operation,
        ranges: LaunchRanges,
        args: LaunchArgs<'_, HostBuffer<T>>,
    ) -> Result<(), BackendError> {
        self.launches.fetch_add(1, Ordering::Relaxed);
        if ranges.group == 0 || ranges.global % ranges.group != 0 {
            return Err(BackendError::Launch(format!(
                "global range {} is not a multiple of group range {}",
                ranges.global, ranges.group
            )));
        }
        for input in args.inputs {
            check_access(input, Access::WriteOnly, "input")?;
        }
        check_access(args.output, Access::ReadOnly, "output")?;
        let n = args.scalars.first().map_or(ranges.global, |&n| n as usize);

        let result: Vec<T> = match op {
            Operation::Multiply => {
                let [a, b] = args.inputs else {
                    return Err(BackendError::Launch("multiply takes two inputs".into()));
                };
                check_len(a, ranges.global, "multiply input")?;
                check_len(b, ranges.global, "multiply input")?;
                let a = a.data.borrow();
                let b = b.data.borrow();
                a[..ranges.global]
                    .par_iter()
                    .zip(b[..ranges.global].par_iter())
                    .enumerate()
                    .map(|(k, (&x, &y))| if k < n { x.mul(y) } else { T::zero() })
                    .collect()
            }
            Operation::Reduce => {
                let [input] = args.inputs else {
                    return Err(BackendError::Launch("reduce takes one input".into()));
                };
                check_len(input, ranges.global, "reduce input")?;
                let input = input.data.borrow();
                input[..ranges.global]
                    .par_chunks(ranges.group)
                    .enumerate()
                    .map(|(g, chunk)| {
                        let base = g * ranges.group;
                        let mut scratch: Vec<T> = chunk
                            .iter()
                            .enumerate()
                            .map(|(i, &v)| if base + i < n { v } else { T::zero() })
                            .collect();
                        tree_sum(&mut scratch)
                    })
                    .collect()
            }
        };

        check_len(args.output, result.len(), "output")?;
        args.output.data.borrow_mut()[..result.len()].copy_from_slice(&result);
        Ok(())
    }

    fn barrier(&self) -> Result<(), BackendError> {
        self.barriers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
