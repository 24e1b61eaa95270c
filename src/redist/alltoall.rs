//! Partial all-to-all between a matrix distribution and a vector distribution:
//! `[MC,MR] <-> [VC,STAR]`, `[MR,MC] <-> [VR,STAR]`, `[MC,MR] <-> [STAR,VR]` and
//! `[MR,MC] <-> [STAR,VC]`.
//!
//! Along the vector axis, VC rank `x + k * r` lies in grid column `k` (similarly for VR and grid
//! rows), so every exchange stays within a single grid row or column.

use super::{local_len, orient};
use crate::comm;
use crate::dist::{dist_comm, dist_rank, dist_stride, Axis, Dist, DistInfo, DistMatrix, DistView};
use crate::grid::Grid;
use crate::prelude::*;
use gridla_core::{max_length, shift};
use gridla_memops::{strided_pack, strided_unpack, AxisPartition};

// Matrix distributions matching the vector distribution `vector`: the one along the vector axis
// and the one across it.
fn matrix_dists(vector: Dist) -> Result<(Dist, Dist)> {
    match vector {
        Dist::Vc => Ok((Dist::Mc, Dist::Mr)),
        Dist::Vr => Ok((Dist::Mr, Dist::Mc)),
        dist => bail!("{} is not a vector distribution", dist),
    }
}

struct Plan {
    along: Dist,
    across: Dist,
    portion: usize,
}

fn plan(grid: &Grid, vector: &DistInfo, axis: Axis) -> Result<Plan> {
    let (along, across) = matrix_dists(vector.dist(axis))?;
    let other = axis.other();

    let portion = max_length(vector.extent(axis), grid.size())
        * max_length(vector.extent(other), dist_stride(grid, across));

    Ok(Plan {
        along,
        across,
        portion,
    })
}

// Parts of the local entries of a matrix distribution along the vector axis. Part `k` holds the
// entries of the vector rank `rank + k * stride(along)`, which is the process with rank `k` in the
// communicator across.
fn vector_partition(
    grid: &Grid,
    vector: &DistInfo,
    matrix: &DistInfo,
    axis: Axis,
    along: Dist,
) -> Result<AxisPartition> {
    let me = grid.comms()?.vc.rank();
    let part_stride = dist_stride(grid, along);
    let rank_part = dist_rank(grid, along, me);

    Ok(AxisPartition::partial(
        vector.extent(axis),
        vector.align(axis),
        vector.stride(axis),
        part_stride,
        rank_part,
        shift(rank_part, matrix.align(axis), part_stride),
    ))
}

/// Matrix distribution to vector distribution along `axis`.
pub(super) fn promote<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let grid = src.grid().clone();
    let comms = grid.comms()?;
    let sync = dst.sync().clone();
    let plan = plan(&grid, dst.info(), axis)?;
    let other = axis.other();
    debug_assert_eq!(src.info().dist(axis), plan.along);

    let comm = dist_comm(comms, plan.across);
    let parts = comm.size();

    let (rows, cols) = orient(
        axis,
        vector_partition(&grid, dst.info(), src.info(), axis, plan.along)?,
        AxisPartition::whole(local_len(src.info(), other)),
    );
    let mut send = zeros::<T>(plan.portion * parts);
    strided_pack(RayonPolicy, src.local().accessor(), &rows, &cols, plan.portion, &mut send);

    let mut recv = zeros::<T>(plan.portion * parts);
    comm::all_to_all(&**comm, &send, &mut recv, &sync)?;

    let info = src.info();
    let (rows, cols) = orient(
        axis,
        AxisPartition::whole(local_len(dst.info(), axis)),
        AxisPartition::cyclic(info.extent(other), info.align(other), info.stride(other)),
    );
    strided_unpack(RayonPolicy, &recv, &rows, &cols, plan.portion, dst.local_mut().accessor_mut());

    Ok(())
}

/// Vector distribution to matrix distribution along `axis`.
pub(super) fn demote<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let grid = src.grid().clone();
    let comms = grid.comms()?;
    let sync = dst.sync().clone();
    let plan = plan(&grid, src.info(), axis)?;
    let other = axis.other();
    debug_assert_eq!(dst.info().dist(axis), plan.along);

    let comm = dist_comm(comms, plan.across);
    let parts = comm.size();

    let target = dst.info().clone();
    let (rows, cols) = orient(
        axis,
        AxisPartition::whole(local_len(src.info(), axis)),
        AxisPartition::cyclic(target.extent(other), target.align(other), target.stride(other)),
    );
    let mut send = zeros::<T>(plan.portion * parts);
    strided_pack(RayonPolicy, src.local().accessor(), &rows, &cols, plan.portion, &mut send);

    let mut recv = zeros::<T>(plan.portion * parts);
    comm::all_to_all(&**comm, &send, &mut recv, &sync)?;

    let (rows, cols) = orient(
        axis,
        vector_partition(&grid, src.info(), &target, axis, plan.along)?,
        AxisPartition::whole(local_len(&target, other)),
    );
    strided_unpack(RayonPolicy, &recv, &rows, &cols, plan.portion, dst.local_mut().accessor_mut());

    Ok(())
}
