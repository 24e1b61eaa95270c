//! Generic block-cyclic strided pack and unpack kernels.
//!
//! A matrix axis is divided into parts by an [`AxisPartition`]. Part `k` selects the local indices
//! `offset + t * stride` for `t < len`. Packing a row partition and a column partition moves every
//! (row part, column part) pair into its own portion of a contiguous buffer. Portions have a
//! uniform size, so that fixed-size collectives can exchange them, and are laid out column-major:
//! portion `kr + kc * row_parts`. Within a portion, the selected elements are stored column-major
//! with leading dimension equal to the part's row length.

use crate::host::reduce::host_copy;
use crate::host::Policy;
use crate::{HostAccessor, HostMutAccessor};
use gridla_core::prelude::*;
use gridla_core::{length, max_length, shift};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AxisPart {
    pub offset: usize,
    pub stride: usize,
    pub len: usize,
}

impl AxisPart {
    pub fn new(offset: usize, stride: usize, len: usize) -> Self {
        Self {
            offset,
            stride,
            len,
        }
    }

    pub fn contiguous(len: usize) -> Self {
        Self::new(0, 1, len)
    }
}

/// Division of an axis of global length `len`, dealt cyclically over `stride` ranks, into the
/// pieces owned by the ranks `rank_part + k * part_stride`. The local data being partitioned is
/// itself distributed with stride `part_stride` and shift `base_shift`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AxisPartition {
    len: usize,
    align: usize,
    stride: usize,
    part_stride: usize,
    rank_part: usize,
    base_shift: usize,
}

impl AxisPartition {
    /// A single part covering `0..n`.
    pub fn whole(n: usize) -> Self {
        Self::cyclic(n, 0, 1)
    }

    /// `stride` parts, part `k` holding the indices owned by rank `k`.
    pub fn cyclic(n: usize, align: usize, stride: usize) -> Self {
        Self::partial(n, align, stride, 1, 0, 0)
    }

    /// `stride / part_stride` parts of data that is distributed with stride `part_stride` and
    /// shift `base_shift`. Part `k` holds the indices of rank `rank_part + k * part_stride`.
    pub fn partial(
        n: usize,
        align: usize,
        stride: usize,
        part_stride: usize,
        rank_part: usize,
        base_shift: usize,
    ) -> Self {
        assert!(stride > 0 && part_stride > 0 && stride % part_stride == 0);
        assert!(align < stride && rank_part < part_stride);

        Self {
            len: n,
            align,
            stride,
            part_stride,
            rank_part,
            base_shift,
        }
    }

    pub fn num_parts(&self) -> usize {
        self.stride / self.part_stride
    }

    pub fn max_len(&self) -> usize {
        max_length(self.len, self.stride)
    }

    pub fn part(&self, k: usize) -> AxisPart {
        assert!(k < self.num_parts());

        let s = shift(
            self.rank_part + k * self.part_stride,
            self.align,
            self.stride,
        );
        debug_assert!(s >= self.base_shift && (s - self.base_shift) % self.part_stride == 0);

        AxisPart {
            offset: (s - self.base_shift) / self.part_stride,
            stride: self.num_parts(),
            len: length(self.len, s, self.stride),
        }
    }
}

/// Copies the elements selected by `rows` and `cols` from `src` into `out`, column-major.
pub fn pack_part<T: Scalar>(
    policy: impl Policy,
    src: HostAccessor<'_, T>,
    rows: AxisPart,
    cols: AxisPart,
    out: &mut [T],
) {
    assert!(rows.len * cols.len <= out.len());
    if rows.len == 0 || cols.len == 0 {
        return;
    }

    let src = src.subview(
        [rows.offset, cols.offset],
        [rows.len, cols.len],
        [rows.stride, cols.stride],
    );
    let dst = HostMutAccessor::column_major(out, rows.len, cols.len, rows.len);
    host_copy(policy, src, dst);
}

/// Inverse of [`pack_part`].
pub fn unpack_part<T: Scalar>(
    policy: impl Policy,
    input: &[T],
    rows: AxisPart,
    cols: AxisPart,
    mut dst: HostMutAccessor<'_, T>,
) {
    assert!(rows.len * cols.len <= input.len());
    if rows.len == 0 || cols.len == 0 {
        return;
    }

    let src = HostAccessor::column_major(input, rows.len, cols.len, rows.len);
    let dst = dst.subview(
        [rows.offset, cols.offset],
        [rows.len, cols.len],
        [rows.stride, cols.stride],
    );
    host_copy(policy, src, dst);
}

pub fn strided_pack<T: Scalar>(
    policy: impl Policy,
    src: HostAccessor<'_, T>,
    rows: &AxisPartition,
    cols: &AxisPartition,
    portion: usize,
    buffer: &mut [T],
) {
    let (row_parts, col_parts) = (rows.num_parts(), cols.num_parts());
    assert_eq!(buffer.len(), row_parts * col_parts * portion);

    for (index, out) in buffer.chunks_mut(portion.max(1)).enumerate() {
        let (kr, kc) = (index % row_parts, index / row_parts);
        pack_part(policy, src, rows.part(kr), cols.part(kc), out);
    }
}

pub fn strided_unpack<T: Scalar>(
    policy: impl Policy,
    buffer: &[T],
    rows: &AxisPartition,
    cols: &AxisPartition,
    portion: usize,
    mut dst: HostMutAccessor<'_, T>,
) {
    let (row_parts, col_parts) = (rows.num_parts(), cols.num_parts());
    assert_eq!(buffer.len(), row_parts * col_parts * portion);

    for (index, input) in buffer.chunks(portion.max(1)).enumerate() {
        let (kr, kc) = (index % row_parts, index / row_parts);
        unpack_part(policy, input, rows.part(kr), cols.part(kc), dst.reborrow());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SequentialPolicy;
    use rand::prelude::*;

    #[test]
    fn test_cyclic_parts() {
        let p = AxisPartition::cyclic(7, 1, 3);
        assert_eq!(p.num_parts(), 3);
        assert_eq!(p.max_len(), 3);
        assert_eq!(p.part(0), AxisPart::new(2, 3, 2));
        assert_eq!(p.part(1), AxisPart::new(0, 3, 3));
        assert_eq!(p.part(2), AxisPart::new(1, 3, 2));

        let w = AxisPartition::whole(5);
        assert_eq!(w.num_parts(), 1);
        assert_eq!(w.part(0), AxisPart::contiguous(5));
    }

    #[test]
    fn test_partial_parts() {
        // Global length 11 over 6 ranks with alignment 4. The local data belongs to a rank with
        // stride 2 and rank 1 (shift 1), i.e. it holds the global indices 1, 3, 5, 7, 9.
        let base_shift = shift(1, 4 % 2, 2);
        let p = AxisPartition::partial(11, 4, 6, 2, 1, base_shift);
        assert_eq!(p.num_parts(), 3);

        for k in 0..3 {
            let part = p.part(k);
            let rank = 1 + 2 * k;
            let s = shift(rank, 4, 6);

            for t in 0..part.len {
                let global = base_shift + (part.offset + t * part.stride) * 2;
                assert_eq!(global, s + t * 6);
            }
            assert_eq!(part.len, length(11, s, 6));
        }
    }

    #[test]
    fn test_pack_unpack_randomize() {
        let mut rng = SmallRng::seed_from_u64(0);

        for _ in 0..100 {
            let height = rng.gen_range(0..12);
            let width = rng.gen_range(0..12);
            let ldim = height + rng.gen_range(1..3);
            let row_stride = rng.gen_range(1..4);
            let col_stride = rng.gen_range(1..4);
            let rows = AxisPartition::cyclic(height, rng.gen_range(0..row_stride), row_stride);
            let cols = AxisPartition::cyclic(width, rng.gen_range(0..col_stride), col_stride);
            let portion = rows.max_len() * cols.max_len();

            let src: Vec<i32> = (0..ldim * width).map(|x| x as i32).collect();
            let mut buffer = vec![-1; row_stride * col_stride * portion];
            strided_pack(
                SequentialPolicy,
                HostAccessor::column_major(&src, height, width, ldim),
                &rows,
                &cols,
                portion,
                &mut buffer,
            );

            // Every portion starts with the expected element.
            for kc in 0..col_stride {
                for kr in 0..row_stride {
                    let (rp, cp) = (rows.part(kr), cols.part(kc));
                    if rp.len > 0 && cp.len > 0 {
                        let index = kr + kc * row_stride;
                        assert_eq!(
                            buffer[index * portion],
                            src[rp.offset + cp.offset * ldim]
                        );
                    }
                }
            }

            let mut dst = vec![-1; ldim * width];
            strided_unpack(
                SequentialPolicy,
                &buffer,
                &rows,
                &cols,
                portion,
                HostMutAccessor::column_major(&mut dst, height, width, ldim),
            );

            for j in 0..width {
                for i in 0..height {
                    assert_eq!(dst[i + j * ldim], src[i + j * ldim]);
                }
            }
        }
    }
}
