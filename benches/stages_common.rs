use criterion::measurement::WallTime;
use criterion::BenchmarkGroup;
use std::time::Duration;

use gpudot::element::Element;
use gpudot::generate::Fill;

pub const SIZES_ALL: &[usize] = &[8192, 65536, 4_194_304];

pub fn cap(group: &mut BenchmarkGroup<'_, WallTime>) {
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(10);
}

/// Seeded random input pair; the same size always yields the same vectors.
pub fn get_test_pair<T: Element>(size: usize) -> (Vec<T>, Vec<T>) {
    Fill::Random { seed: size as u64 }.pair(size)
}
