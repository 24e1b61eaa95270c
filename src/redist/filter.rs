//! Local steps that keep a subset of the entries held by every process.

use super::orient;
use crate::dist::{dist_rank, dist_stride, Axis, Dist, DistMatrix, DistView};
use crate::prelude::*;
use gridla_core::shift;
use gridla_memops::{host_copy, AxisPartition};

// Copies the local entries `offset + t * step` along `axis` of `src` into the local block of `dst`.
fn select<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
    offset: usize,
    step: usize,
) {
    let (h, w) = (dst.local_height(), dst.local_width());
    if h == 0 || w == 0 {
        return;
    }

    let (offsets, steps) = (orient(axis, offset, 0), orient(axis, step, 1));
    let input = src.local().accessor().subview(
        [offsets.0, offsets.1],
        [h, w],
        [steps.0, steps.1],
    );

    host_copy(RayonPolicy, input, dst.local_mut().accessor_mut());
}

/// `STAR -> X` along `axis`.
pub(super) fn filter<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let layout = match dst.info().local_layout() {
        Some((cl, rl)) => orient(axis, cl, rl).0,
        None => return Ok(()),
    };

    select(axis, src, dst, layout.shift, layout.stride);
    Ok(())
}

/// `MC -> VC` or `MR -> VR` along `axis`. The source alignment must equal the destination alignment
/// modulo the source stride.
pub(super) fn partial_filter<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let info = src.info();
    let grid = info.grid().clone();
    let me = grid.comms()?.vc.rank();

    let across = match info.dist(axis) {
        Dist::Mc => Dist::Mr,
        Dist::Mr => Dist::Mc,
        dist => bail!("cannot filter {} partially", dist),
    };

    let n = info.extent(axis);
    let (coarse, stride) = (info.dist(axis), info.stride(axis));
    let rank_part = dist_rank(&grid, coarse, me);
    let base_shift = shift(rank_part, info.align(axis), stride);

    let partition = AxisPartition::partial(
        n,
        dst.info().align(axis),
        dst.info().stride(axis),
        stride,
        rank_part,
        base_shift,
    );
    let part = partition.part(dist_rank(&grid, across, me));
    debug_assert_eq!(part.len, super::local_len(dst.info(), axis));
    debug_assert_eq!(dist_stride(&grid, across), partition.num_parts());

    select(axis, src, dst, part.offset, part.stride);
    Ok(())
}
