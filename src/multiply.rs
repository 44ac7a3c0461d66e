//! Elementwise multiply stage.

use tracing::debug;

use crate::backend::{len_scalar, Access, Backend, LaunchArgs, LaunchRanges, Operation};
use crate::element::Element;
use crate::padding::is_aligned;
use crate::{ConfigError, DotError, DotResult};

/// Launch `out[k] = a[k] * b[k]` over `len` lanes and wait for it.
///
/// `a` and `b` must already hold `len` elements on the device, and `len`
/// must be a multiple of `group_size`. The product stays device-resident.
pub fn multiply<T, B>(
    backend: &B,
    a: &B::Buffer,
    b: &B::Buffer,
    len: usize,
    group_size: usize,
) -> DotResult<B::Buffer>
where
    T: Element,
    B: Backend<T> + ?Sized,
{
    if len == 0 {
        return Err(ConfigError::EmptyInput.into());
    }
    if !is_aligned(len, group_size) {
        return Err(DotError::AlignmentDefect {
            pass: 0,
            len,
            group_size,
        });
    }

    let n = len_scalar(len)?;
    // Read by the first reduce pass, so not write-only.
    let out = backend.alloc(len, Access::ReadWrite)?;
    let ranges = LaunchRanges {
        global: len,
        group: group_size,
    };
    debug!(len, groups = ranges.groups(), "multiply launch");
    backend.launch(
        Operation::Multiply,
        ranges,
        LaunchArgs {
            inputs: &[a, b],
            output: &out,
            scalars: &[n],
        },
    )?;
    backend.barrier()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuBackend, HostBuffer};

    #[test]
    fn test_multiply_products() {
        let cpu = CpuBackend::new();
        let mut a: HostBuffer<i32> = cpu.alloc(4, Access::ReadOnly).unwrap();
        let mut b: HostBuffer<i32> = cpu.alloc(4, Access::ReadOnly).unwrap();
        cpu.write(&mut a, 0, &[1, 2, 3, 0]).unwrap();
        cpu.write(&mut b, 0, &[4, 5, 6, 0]).unwrap();
        let out = multiply::<i32, _>(&cpu, &a, &b, 4, 4).unwrap();
        assert_eq!(cpu.read(&out, 0, 4).unwrap(), vec![4, 10, 18, 0]);
        let stats = cpu.stats();
        assert_eq!(stats.launches, 1);
        assert_eq!(stats.barriers, 1);
    }

    #[test]
    fn test_multiply_wraps_int_overflow() {
        let cpu = CpuBackend::new();
        let mut a: HostBuffer<i32> = cpu.alloc(2, Access::ReadOnly).unwrap();
        let mut b: HostBuffer<i32> = cpu.alloc(2, Access::ReadOnly).unwrap();
        cpu.write(&mut a, 0, &[i32::MAX, 3]).unwrap();
        cpu.write(&mut b, 0, &[2, -3]).unwrap();
        let out = multiply::<i32, _>(&cpu, &a, &b, 2, 2).unwrap();
        assert_eq!(cpu.read(&out, 0, 2).unwrap(), vec![-2, -9]);
    }

    #[test]
    fn test_multiply_rejects_unaligned_len() {
        let cpu = CpuBackend::new();
        let a: HostBuffer<i32> = cpu.alloc(6, Access::ReadOnly).unwrap();
        let b: HostBuffer<i32> = cpu.alloc(6, Access::ReadOnly).unwrap();
        let err = multiply::<i32, _>(&cpu, &a, &b, 6, 4).unwrap_err();
        assert!(matches!(err, DotError::AlignmentDefect { len: 6, .. }));
    }
}
