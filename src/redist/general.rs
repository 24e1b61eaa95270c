//! General redistribution between any two distributions.
//!
//! Every process derives the same owner maps from the distribution data. The entries that
//! destination process `d` holds are taken from `d` itself whenever its source block contains them
//! and from the lowest VC rank holding them otherwise. Streams are ordered column-major over the
//! local block of the destination and exchanged in `p` pairwise rounds.

use crate::comm;
use crate::dist::{DistInfo, DistMatrix, DistView};
use crate::prelude::*;

// Process that sends entry `(i, j)` to destination process `d`.
fn chosen_source(src: &DistInfo, d: usize, i: usize, j: usize) -> Result<usize> {
    if src.holds(d, i, j) {
        return Ok(d);
    }

    src.owner(i, j)
        .ok_or_else(|| anyhow!("no process holds entry ({}, {})", i, j))
}

// Global indices held by process `q` under `info`, column-major.
fn held_entries(info: &DistInfo, q: usize) -> Vec<(usize, usize)> {
    match info.layout_of(q) {
        Some((cl, rl)) => {
            let (h, w) = (cl.len(info.height), rl.len(info.width));
            (0..w)
                .flat_map(|jl| (0..h).map(move |il| (cl.global_index(il), rl.global_index(jl))))
                .collect()
        }
        None => vec![],
    }
}

pub(super) fn copy<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let grid = src.grid().clone();
    let comms = grid.comms()?;
    let (me, p) = (comms.vc.rank(), comms.vc.size());
    let sync = dst.sync().clone();

    let source = src.info().clone();
    let target = dst.info().clone();
    let local = src.local();
    let layout = source.local_layout();

    let mine = held_entries(&target, me);

    for k in 0..p {
        let to = (me + k) % p;
        let from = (me + p - k) % p;

        let mut send = vec![];
        if let Some((cl, rl)) = layout {
            for (i, j) in held_entries(&target, to) {
                if chosen_source(&source, to, i, j)? == me {
                    send.push(local.get(cl.local_index(i), rl.local_index(j)));
                }
            }
        }

        let mut positions = vec![];
        for (index, &(i, j)) in enumerate(&mine) {
            if chosen_source(&source, me, i, j)? == from {
                positions.push(index);
            }
        }

        let mut recv = zeros::<T>(positions.len());
        comm::send_recv(&*comms.vc, &send, to, &mut recv, from, &sync)?;

        let h = dst.local_height();
        for (index, value) in zip(positions, recv) {
            dst.set_local(index % h, index / h, value);
        }
    }

    Ok(())
}
