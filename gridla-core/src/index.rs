//! Index arithmetic of element-cyclic distributions.
//!
//! A dimension of length `n` is dealt round-robin over `stride` ranks. The rank that owns global
//! index 0 is the `align`ment. Rank `k` then owns the indices
//! `shift(k, align, stride) + t * stride`.

/// Position of `rank` in the cyclic pattern, i.e. the first global index owned by `rank`.
#[inline]
pub fn shift(rank: usize, align: usize, stride: usize) -> usize {
    debug_assert!(rank < stride && align < stride);
    (rank + stride - align) % stride
}

/// Number of indices in `0..n` owned by a rank with the given shift.
#[inline]
pub fn length(n: usize, shift: usize, stride: usize) -> usize {
    if n > shift {
        (n - shift - 1) / stride + 1
    } else {
        0
    }
}

/// Number of indices in `0..n` owned by `rank`.
#[inline]
pub fn length_of(n: usize, rank: usize, align: usize, stride: usize) -> usize {
    length(n, shift(rank, align, stride), stride)
}

/// Largest local length over all ranks.
#[inline]
pub fn max_length(n: usize, stride: usize) -> usize {
    crate::util::div_ceil(n, stride)
}

/// Rank that owns global index `i`.
#[inline]
pub fn owner(i: usize, align: usize, stride: usize) -> usize {
    (i + align) % stride
}

#[inline]
pub fn global_index(local: usize, shift: usize, stride: usize) -> usize {
    shift + local * stride
}

/// Number of owned indices strictly below `i0`. This is the local offset of the first owned index
/// at or after `i0`.
#[inline]
pub fn local_offset(i0: usize, shift: usize, stride: usize) -> usize {
    length(i0, shift, stride)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn test_shift_length() {
        assert_eq!(shift(0, 0, 3), 0);
        assert_eq!(shift(0, 1, 3), 2);
        assert_eq!(shift(2, 1, 3), 1);

        assert_eq!(length(7, 0, 3), 3);
        assert_eq!(length(7, 1, 3), 2);
        assert_eq!(length(7, 2, 3), 2);
        assert_eq!(length(0, 0, 3), 0);
        assert_eq!(length(2, 2, 3), 0);

        assert_eq!(max_length(7, 3), 3);
        assert_eq!(max_length(6, 3), 2);
        assert_eq!(max_length(0, 3), 0);
    }

    #[test]
    fn test_ownership_randomize() {
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..200 {
            let n = rng.gen_range(0..40);
            let stride = rng.gen_range(1..7);
            let align = rng.gen_range(0..stride);

            let mut total = 0;
            for rank in 0..stride {
                let s = shift(rank, align, stride);
                let len = length_of(n, rank, align, stride);
                assert!(len <= max_length(n, stride));

                for t in 0..len {
                    let i = global_index(t, s, stride);
                    assert!(i < n);
                    assert_eq!(owner(i, align, stride), rank);
                }

                for i0 in 0..=n {
                    let expected = (0..i0).filter(|&i| owner(i, align, stride) == rank).count();
                    assert_eq!(local_offset(i0, s, stride), expected);
                }

                total += len;
            }

            assert_eq!(total, n);
        }
    }
}
