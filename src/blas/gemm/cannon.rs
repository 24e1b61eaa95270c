//! Cannon's algorithm on a square grid: after an initial skew, every process multiplies the
//! blocks it holds and passes `A` one step left along its grid row and `B` one step up along its
//! grid column.

use crate::blas::{local, Orientation};
use crate::comm::{self, Communicator};
use super::GemmContext;
use crate::dist::{materialize, DistPair, DistView, DistViewMut};
use crate::matrix::{Matrix, MatrixView};
use crate::prelude::*;
use crate::sync::SyncInfo;
use gridla_core::length;

// Sends `block` to `to` and receives a `height x width` block from `from`.
fn rotate<T: Scalar>(
    comm: &dyn Communicator,
    block: MatrixView<'_, T>,
    to: usize,
    from: usize,
    height: usize,
    width: usize,
    sync: &SyncInfo,
) -> Result<Matrix<T>> {
    let mut recv = zeros::<T>(height * width);
    comm::send_recv(comm, &block.to_vec(), to, &mut recv, from, sync)?;
    Matrix::attach(recv, height, width, max(height, 1))
}

pub(super) fn cannon<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    let (r, width) = (grid.height(), grid.width());
    if r != width {
        bail!(LogicError::NonSquareGrid("cannon", r, width));
    }

    let comms = grid.comms()?;
    let me = comms.vc.rank();
    let (x, y) = (grid.row_of(me), grid.col_of(me));
    let k = a.width();
    let sync = c.sync().clone();

    // Inner index classes of both operands start at process 0.
    let a = materialize(
        a,
        &ctx.target(DistPair::MC_MR)
            .col_align(c.data().col_align)
            .row_align(0),
    )?;
    let b = materialize(
        b,
        &ctx.target(DistPair::MC_MR)
            .col_align(0)
            .row_align(c.data().row_align),
    )?;

    let (m_local, n_local) = (c.local().height(), c.local().width());
    let depth = |class: usize| length(k, class, r);

    let mut class = (x + y) % r;
    let mut a_block = rotate(
        &*comms.row,
        a.view().local(),
        (y + r - x) % r,
        class,
        m_local,
        depth(class),
        &sync,
    )?;
    let mut b_block = rotate(
        &*comms.col,
        b.view().local(),
        (x + r - y) % r,
        class,
        depth(class),
        n_local,
        &sync,
    )?;

    for round in 0..r {
        trace!("cannon: round {} with class {}", round, class);

        local::gemm(
            Orientation::Normal,
            Orientation::Normal,
            alpha,
            a_block.view(),
            b_block.view(),
            T::one(),
            c.local_mut(),
        )?;

        if round + 1 < r {
            class = (class + 1) % r;

            a_block = rotate(
                &*comms.row,
                a_block.view(),
                (y + r - 1) % r,
                (y + 1) % r,
                m_local,
                depth(class),
                &sync,
            )?;
            b_block = rotate(
                &*comms.col,
                b_block.view(),
                (x + r - 1) % r,
                (x + 1) % r,
                depth(class),
                n_local,
                &sync,
            )?;
        }
    }

    Ok(())
}
