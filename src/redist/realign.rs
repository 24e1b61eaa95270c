//! Changing the alignments or the root of a matrix without changing its distribution pair.

use super::{general, pack_block, temporary, unpack_block};
use crate::comm;
use crate::dist::{dist_comm, Axis, Dist, DistMatrix, DistView};
use crate::prelude::*;

pub(super) fn realign_into<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    debug_assert_eq!(src.pair(), dst.pair());
    let (s, d) = (src.info(), dst.info().clone());

    if s.data == d.data {
        dst.local_mut().view_mut().copy_from(src.local());
        return Ok(());
    }

    if s.root() != d.root() {
        return if s.pair().col() == Dist::Circ {
            move_root(src, dst)
        } else {
            general::copy(src, dst)
        };
    }

    let col_differs = s.align(Axis::Col) != d.align(Axis::Col);
    let row_differs = s.align(Axis::Row) != d.align(Axis::Row);

    if col_differs && row_differs {
        let mut tmp = temporary(s, s.pair(), d.align(Axis::Col), s.align(Axis::Row), s.root());
        shift_axis(Axis::Col, src, &mut tmp)?;
        shift_axis(Axis::Row, &tmp.view(), dst)
    } else if col_differs {
        shift_axis(Axis::Col, src, dst)
    } else {
        shift_axis(Axis::Row, src, dst)
    }
}

// Cyclic exchange along one axis: the block of the process with rank `k` in the communicator of
// the axis belongs to rank `k + new - old` afterwards.
fn shift_axis<T: Scalar>(axis: Axis, src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let info = src.info();
    let grid = info.grid().clone();
    let me = grid.comms()?.vc.rank();

    if !info.participates(me) {
        return Ok(());
    }

    let comm = dist_comm(grid.comms()?, info.dist(axis));
    let (k, s) = (comm.rank(), comm.size());
    let (a, b) = (info.align(axis), dst.info().align(axis));
    debug_assert_eq!(s, info.stride(axis));

    let to = (k + b + s - a) % s;
    let from = (k + a + s - b) % s;
    trace!("shifting {} {} alignment {} -> {}", info.pair(), axis.name(), a, b);

    let local = src.local();
    let mut send = zeros::<T>(local.height() * local.width());
    pack_block(local, &mut send);

    let mut recv = zeros::<T>(dst.local_height() * dst.local_width());
    let sync = dst.sync().clone();
    comm::send_recv(&**comm, &send, to, &mut recv, from, &sync)?;

    unpack_block(&recv, dst.local_mut().view_mut());
    Ok(())
}

// Moves a [CIRC,CIRC] matrix from its root to the root of `dst`.
fn move_root<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let comms = src.grid().comms()?;
    let me = comms.vc.rank();
    let (old, new) = (src.root(), dst.root());
    let sync = dst.sync().clone();
    trace!("moving [CIRC,CIRC] root {} -> {}", old, new);

    if me == old {
        let local = src.local();
        let mut send = zeros::<T>(local.height() * local.width());
        pack_block(local, &mut send);
        comm::send(&*comms.vc, &send, new, &sync)?;
    } else if me == new {
        let mut recv = zeros::<T>(src.height() * src.width());
        comm::recv(&*comms.vc, &mut recv, old, &sync)?;
        unpack_block(&recv, dst.local_mut().view_mut());
    }

    Ok(())
}
