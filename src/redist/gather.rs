//! Gathering steps: `X -> STAR` and `VC -> MC`, `VR -> MR` along one axis.

use super::{local_len, orient, pack_block};
use crate::comm;
use crate::dist::{dist_comm, dist_rank, dist_stride, Axis, Dist, DistMatrix, DistView};
use crate::prelude::*;
use gridla_core::{max_length, shift};
use gridla_memops::{strided_unpack, AxisPartition};

pub(super) fn all_gather<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let info = src.info();
    let grid = info.grid().clone();
    let comms = grid.comms()?;
    let me = comms.vc.rank();
    let sync = dst.sync().clone();

    let dist = info.dist(axis);
    let (n, align, stride) = (info.extent(axis), info.align(axis), info.stride(axis));
    let other_len = local_len(dst.info(), axis.other());
    let portion = max_length(n, stride) * other_len;
    let mut buffer = zeros::<T>(portion * stride);

    if dist == Dist::Md {
        // Only the root path holds data. It gathers along the path and then hands the result to
        // the processes at the same position on every other path.
        if info.participates(me) {
            let mut send = zeros::<T>(portion);
            pack_block(src.local(), &mut send);
            comm::all_gather(&*comms.md, &send, &mut buffer, &sync)?;
        }

        comm::broadcast(&*comms.md_perp, &mut buffer, info.root(), &sync)?;
    } else {
        let mut send = zeros::<T>(portion);
        pack_block(src.local(), &mut send);
        comm::all_gather(&**dist_comm(comms, dist), &send, &mut buffer, &sync)?;
    }

    let (rows, cols) = orient(
        axis,
        AxisPartition::cyclic(n, align, stride),
        AxisPartition::whole(other_len),
    );
    strided_unpack(RayonPolicy, &buffer, &rows, &cols, portion, dst.local_mut().accessor_mut());

    Ok(())
}

/// `VC -> MC` over the grid rows or `VR -> MR` over the grid columns. The source alignment must be
/// congruent to the destination alignment modulo the destination stride.
pub(super) fn partial_gather<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let info = src.info();
    let grid = info.grid().clone();
    let comms = grid.comms()?;
    let me = comms.vc.rank();
    let sync = dst.sync().clone();

    let (coarse, across) = match info.dist(axis) {
        Dist::Vc => (Dist::Mc, Dist::Mr),
        Dist::Vr => (Dist::Mr, Dist::Mc),
        dist => bail!("cannot gather {} partially", dist),
    };

    let n = info.extent(axis);
    let (align, p) = (info.align(axis), info.stride(axis));
    let part_stride = dist_stride(&grid, coarse);
    let rank_part = dist_rank(&grid, coarse, me);
    let base_shift = shift(rank_part, dst.info().align(axis), part_stride);
    debug_assert_eq!(align % part_stride, dst.info().align(axis));

    let other_len = local_len(dst.info(), axis.other());
    let portion = max_length(n, p) * other_len;

    let comm = dist_comm(comms, across);
    let mut send = zeros::<T>(portion);
    pack_block(src.local(), &mut send);
    let mut buffer = zeros::<T>(portion * comm.size());
    comm::all_gather(&**comm, &send, &mut buffer, &sync)?;

    let (rows, cols) = orient(
        axis,
        AxisPartition::partial(n, align, p, part_stride, rank_part, base_shift),
        AxisPartition::whole(other_len),
    );
    strided_unpack(RayonPolicy, &buffer, &rows, &cols, portion, dst.local_mut().accessor_mut());

    Ok(())
}
