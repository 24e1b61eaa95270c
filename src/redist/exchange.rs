//! `VC <-> VR` along one axis. Every process holds exactly one block before and after, so the step
//! is a single point-to-point exchange over the VC communicator.

use super::{pack_block, unpack_block};
use crate::comm;
use crate::dist::{dist_rank, Axis, Dist, DistMatrix, DistView};
use crate::grid::Grid;
use crate::prelude::*;

fn vc_of(grid: &Grid, dist: Dist, rank: usize) -> usize {
    match dist {
        Dist::Vr => grid.vc_of_vr(rank),
        _ => rank,
    }
}

pub(super) fn exchange<T: Scalar>(
    axis: Axis,
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let grid = src.grid().clone();
    let comms = grid.comms()?;
    let me = comms.vc.rank();
    let p = grid.size();
    let sync = dst.sync().clone();

    let (from_dist, to_dist) = (src.info().dist(axis), dst.info().dist(axis));
    let (a, b) = (src.info().align(axis), dst.info().align(axis));

    // The block with shift `sigma` is held by source rank `sigma + a` and by target rank
    // `sigma + b`.
    let target = (dist_rank(&grid, from_dist, me) + b + p - a) % p;
    let source = (dist_rank(&grid, to_dist, me) + a + p - b) % p;
    let to = vc_of(&grid, to_dist, target);
    let from = vc_of(&grid, from_dist, source);

    let local = src.local();
    let mut send = zeros::<T>(local.height() * local.width());
    pack_block(local, &mut send);

    let mut recv = zeros::<T>(dst.local_height() * dst.local_width());
    comm::send_recv(&*comms.vc, &send, to, &mut recv, from, &sync)?;

    unpack_block(&recv, dst.local_mut().view_mut());
    Ok(())
}
