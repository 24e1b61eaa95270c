//! Steps into and out of `[CIRC,CIRC]`, where a single root process holds the whole matrix.

use super::{pack_block, unpack_block};
use crate::comm;
use crate::dist::{AxisLayout, DistMatrix, DistView};
use crate::prelude::*;
use gridla_memops::{host_copy, pack_part, unpack_part, AxisPart};

fn axis_part(layout: AxisLayout, n: usize) -> AxisPart {
    AxisPart::new(layout.shift, layout.stride, layout.len(n))
}

/// Gathers every local block over the VC communicator at the root of `dst`.
pub(super) fn gather_to_circ<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let comms = src.grid().comms()?;
    let me = comms.vc.rank();
    let root = dst.root();
    let sync = dst.sync().clone();

    let info = src.info().clone();
    let (mh, mw) = info.max_local_dims();
    let portion = mh * mw;

    let mut send = zeros::<T>(portion);
    pack_block(src.local(), &mut send);

    let p = comms.vc.size();
    let mut recv = zeros::<T>(if me == root { portion * p } else { 0 });
    comm::gather(&*comms.vc, &send, &mut recv, root, &sync)?;

    if me == root {
        let mut out = dst.local_mut().accessor_mut();

        for (q, input) in recv.chunks(portion.max(1)).enumerate().take(p) {
            if let Some((cl, rl)) = info.layout_of(q) {
                let rows = axis_part(cl, info.height);
                let cols = axis_part(rl, info.width);
                unpack_part(RayonPolicy, input, rows, cols, out.reborrow());
            }
        }
    }

    Ok(())
}

/// Scatters the matrix held by the root of `src` into the distribution of `dst`.
pub(super) fn scatter_from_circ<T: Scalar>(
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
) -> Result {
    let comms = src.grid().comms()?;
    let me = comms.vc.rank();
    let root = src.root();
    let sync = dst.sync().clone();

    let info = dst.info().clone();
    let (mh, mw) = info.max_local_dims();
    let portion = mh * mw;
    let p = comms.vc.size();

    let mut send = zeros::<T>(if me == root { portion * p } else { 0 });
    if me == root {
        let input = src.local().accessor();

        for (q, out) in send.chunks_mut(portion.max(1)).enumerate().take(p) {
            if let Some((cl, rl)) = info.layout_of(q) {
                let rows = axis_part(cl, info.height);
                let cols = axis_part(rl, info.width);
                pack_part(RayonPolicy, input, rows, cols, out);
            }
        }
    }

    let mut recv = zeros::<T>(portion);
    comm::scatter(&*comms.vc, &send, &mut recv, root, &sync)?;

    unpack_block(&recv, dst.local_mut().view_mut());
    Ok(())
}

/// `[CIRC,CIRC] -> [STAR,STAR]`.
pub(super) fn broadcast_circ<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let comms = src.grid().comms()?;
    let sync = dst.sync().clone();
    let mut buffer = zeros::<T>(src.height() * src.width());

    if comms.vc.rank() == src.root() {
        pack_block(src.local(), &mut buffer);
    }

    comm::broadcast(&*comms.vc, &mut buffer, src.root(), &sync)?;
    unpack_block(&buffer, dst.local_mut().view_mut());
    Ok(())
}

/// `[STAR,STAR] -> [CIRC,CIRC]`. Only the root copies.
pub(super) fn local_to_circ<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    if dst.local().is_empty() {
        return Ok(());
    }

    host_copy(RayonPolicy, src.local().accessor(), dst.local_mut().accessor_mut());
    Ok(())
}
