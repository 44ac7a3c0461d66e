/// End-to-end validation of the dot-product pipeline on the CPU backend.
///
/// These tests verify:
/// 1. **Reference scenarios** - all-ones, single element, large random floats
/// 2. **Length coverage** - aligned, unaligned, exact powers, power-plus-remainder
/// 3. **Group sizes** - small and non-power-of-two groups exercise re-padding
/// 4. **Error taxonomy** - configuration errors never reach the backend
#[cfg(test)]
mod tests {
    use crate::cpu::CpuBackend;
    use crate::generate::Fill;
    use crate::pipeline::{DotConfig, DotEngine};
    use crate::reduce::plan_passes;
    use crate::verify::Verdict;
    use crate::{ConfigError, DotError};

    // ---------------------------------------------------------------
    // 1. Reference scenarios
    // ---------------------------------------------------------------

    #[test]
    fn scenario_all_ones_65536() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        let ones = vec![1i32; 65536];
        let outcome = engine.run(&ones, &ones).unwrap();
        assert_eq!(outcome.value, 65536);
        assert_eq!(outcome.verdict, Verdict::Match);
        assert_eq!(outcome.verdict.to_string(), "match");
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.padded_len, 65536);
    }

    #[test]
    fn scenario_single_element() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        let outcome = engine.run(&[1i32], &[1]).unwrap();
        assert_eq!(outcome.value, 1);
        assert_eq!(outcome.padded_len, 256);
        assert_eq!(outcome.passes, 1);
    }

    #[test]
    fn scenario_random_floats_one_million() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        let (a, b): (Vec<f32>, Vec<f32>) = Fill::Random { seed: 2024 }.pair(1_000_000);
        let outcome = engine.run(&a, &b).unwrap();
        assert!(
            outcome.verdict.is_match(),
            "device {} vs host {}",
            outcome.value,
            outcome.reference
        );
        assert_eq!(outcome.padded_len, 1_000_192);
        assert_eq!(outcome.passes, 3);
    }

    // ---------------------------------------------------------------
    // 2. Length coverage
    // ---------------------------------------------------------------

    #[test]
    fn all_ones_across_lengths() {
        let g = 256;
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default().with_group_size(g));
        for len in [1, 2, g - 1, g, g + 1, 2 * g, g * g - 1, g * g, g * g + 7] {
            let ones = vec![1i32; len];
            let outcome = engine.run(&ones, &ones).unwrap();
            assert_eq!(outcome.value, len as i32, "len = {len}");
            assert!(outcome.passes >= 1);
        }
    }

    #[test]
    fn exact_powers_take_k_passes() {
        let cpu = CpuBackend::new();
        for (g, k) in [(2usize, 10u32), (4, 6), (16, 4), (256, 2)] {
            let len = g.pow(k);
            let engine = DotEngine::new(&cpu, DotConfig::default().with_group_size(g));
            let ones = vec![1i32; len];
            let outcome = engine.run(&ones, &ones).unwrap();
            assert_eq!(outcome.value, len as i32);
            assert_eq!(outcome.passes, k as usize, "g = {g}");
            assert!(plan_passes(len, g).unwrap().iter().all(|p| p.pad == 0));
        }
    }

    #[test]
    fn random_ints_exact() {
        let cpu = CpuBackend::new();
        for len in [1, 17, 255, 4097, 70_001] {
            let (a, b): (Vec<i32>, Vec<i32>) = Fill::Random { seed: len as u64 }.pair(len);
            let outcome = DotEngine::new(&cpu, DotConfig::default())
                .run(&a, &b)
                .unwrap();
            assert_eq!(outcome.value, outcome.reference, "len = {len}");
        }
    }

    #[test]
    fn ramp_fill_cancels() {
        let cpu = CpuBackend::new();
        let (a, b): (Vec<f32>, Vec<f32>) = Fill::Ramp.pair(7 * 1000);
        let outcome = DotEngine::new(&cpu, DotConfig::default())
            .run(&a, &b)
            .unwrap();
        // Each period of (-3..=3)^2 sums to 28.
        assert_eq!(outcome.value, 28_000.0);
    }

    // ---------------------------------------------------------------
    // 3. Group sizes
    // ---------------------------------------------------------------

    #[test]
    fn small_and_irregular_groups() {
        let cpu = CpuBackend::new();
        let (a, b): (Vec<i32>, Vec<i32>) = Fill::Random { seed: 5 }.pair(10_000);
        let expected = crate::verify::reference(&a, &b);
        for g in [2, 3, 5, 7, 64, 100, 1000] {
            let outcome = DotEngine::new(&cpu, DotConfig::default().with_group_size(g))
                .run(&a, &b)
                .unwrap();
            assert_eq!(outcome.value, expected, "g = {g}");
        }
    }

    #[test]
    fn integer_overflow_wraps_consistently() {
        let cpu = CpuBackend::new();
        let a = vec![i32::MAX; 513];
        let b = vec![7i32; 513];
        let outcome = DotEngine::new(&cpu, DotConfig::default())
            .run(&a, &b)
            .unwrap();
        assert_eq!(outcome.value, outcome.reference);
        assert!(outcome.verdict.is_match());
    }

    // ---------------------------------------------------------------
    // 4. Error taxonomy
    // ---------------------------------------------------------------

    #[test]
    fn mismatched_lengths_never_touch_backend() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        let err = engine.run(&vec![1i32; 100], &vec![1; 99]).unwrap_err();
        assert!(matches!(
            err,
            DotError::Config(ConfigError::LengthMismatch { a: 100, b: 99 })
        ));
        assert_eq!(cpu.stats().interactions(), 0);
    }

    #[test]
    fn empty_input_rejected() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        let err = engine.run::<f32>(&[], &[]).unwrap_err();
        assert_eq!(err.to_string(), "configuration error: input vectors must not be empty");
        assert_eq!(cpu.stats().interactions(), 0);
    }

    #[test]
    fn engine_is_reusable_across_runs() {
        let cpu = CpuBackend::new();
        let engine = DotEngine::new(&cpu, DotConfig::default());
        assert_eq!(engine.run(&[2i32; 10], &[3; 10]).unwrap().value, 60);
        assert_eq!(engine.run(&[0.5f32; 4], &[4.0; 4]).unwrap().value, 8.0);
        assert!(engine.run(&[1i32], &[1, 2]).is_err());
        assert_eq!(engine.run(&[1i32; 3], &[1; 3]).unwrap().value, 3);
    }
}
