//! Zero-padding to a multiple of the group size.
//!
//! Zeros are neutral under summation, so padding never changes the dot
//! product. Every kernel launch runs over a padded length.

use crate::element::Element;

/// Number of zeros needed to bring `len` up to a multiple of `group_size`.
///
/// Zero when `len` is already aligned.
pub fn pad_count(len: usize, group_size: usize) -> usize {
    debug_assert!(group_size > 0);
    (group_size - len % group_size) % group_size
}

/// Smallest multiple of `group_size` that is `>= len`.
pub fn padded_len(len: usize, group_size: usize) -> usize {
    len + pad_count(len, group_size)
}

/// Whether `len` is already a multiple of `group_size`.
pub fn is_aligned(len: usize, group_size: usize) -> bool {
    len % group_size == 0
}

/// Return `input` extended with zeros to a multiple of `group_size`.
pub fn pad<T: Element>(input: &[T], group_size: usize) -> Vec<T> {
    let mut padded = Vec::with_capacity(padded_len(input.len(), group_size));
    padded.extend_from_slice(input);
    padded.resize(padded_len(input.len(), group_size), T::zero());
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_count() {
        assert_eq!(pad_count(1, 256), 255);
        assert_eq!(pad_count(256, 256), 0);
        assert_eq!(pad_count(257, 256), 255);
        assert_eq!(pad_count(65536, 256), 0);
        assert_eq!(pad_count(0, 256), 0);
        assert_eq!(pad_count(3, 2), 1);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(1, 256), 256);
        assert_eq!(padded_len(1_000_000, 256), 1_000_192);
        assert_eq!(padded_len(512, 256), 512);
    }

    #[test]
    fn test_pad_appends_zeros() {
        let v = pad(&[1i32, 2, 3], 4);
        assert_eq!(v, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_pad_aligned_is_noop() {
        let v = vec![1.5f32; 8];
        assert_eq!(pad(&v, 4), v);
        assert_eq!(pad(&pad(&v, 4), 4), pad(&v, 4));
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(512, 256));
        assert!(!is_aligned(513, 256));
    }
}
