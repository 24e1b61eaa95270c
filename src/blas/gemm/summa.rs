//! SUMMA variants. Every function computes `C += alpha * A * B` where `A`, `B` and `C` are
//! `[MC,MR]`, `A` is aligned with the rows of `C` and `B` with the columns of `C`.

use super::GemmContext;
use crate::blas::{axpy_contract, local, Orientation};
use crate::dist::{materialize, DistMatrix, DistPair, DistView, DistViewMut};
use crate::prelude::*;
use crate::redist;
use crate::sync::SyncInfo;

const N: Orientation = Orientation::Normal;

fn panels(n: usize, blocksize: usize) -> impl Iterator<Item = (usize, usize)> {
    let blocksize = max(blocksize, 1);
    (0..n).step_by(blocksize).map(move |start| (start, min(blocksize, n - start)))
}

/// Stationary `A`: column panels of `B` are replicated across the rows of the grid, multiplied
/// locally and summed into `C`.
pub(super) fn summa_a<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    let (m, n, k) = (a.height(), b.width(), a.width());

    let mut b1_star = DistMatrix::new(&grid, DistPair::MR_STAR);
    b1_star.align_cols(a.row_align())?;

    let mut d1 = DistMatrix::new(&grid, DistPair::MC_STAR);
    d1.align_cols(a.col_align())?;

    for (j0, width) in panels(n, ctx.config.blocksize) {
        trace!("summa A: columns {}..{}", j0, j0 + width);

        redist::copy_with(&b.view_range(0, j0, k, width)?, &mut b1_star, ctx.redist_mode())?;
        d1.resize(m, width);

        local::gemm(
            N,
            N,
            T::one(),
            a.local(),
            b1_star.local().view(),
            T::zero(),
            d1.local_mut().view_mut(),
        )?;

        axpy_contract(alpha, &d1.view(), &mut c.view_range_mut(0, j0, m, width)?)?;
    }

    Ok(())
}

/// Stationary `B`: row panels of `A` are replicated across the columns of the grid, multiplied
/// locally and summed into `C`.
pub(super) fn summa_b<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    let (m, n, k) = (a.height(), b.width(), a.width());

    let mut a1_star = DistMatrix::new(&grid, DistPair::STAR_MC);
    a1_star.align_rows(b.col_align())?;

    let mut d1 = DistMatrix::new(&grid, DistPair::STAR_MR);
    d1.align_rows(b.row_align())?;

    for (i0, height) in panels(m, ctx.config.blocksize) {
        trace!("summa B: rows {}..{}", i0, i0 + height);

        redist::copy_with(&a.view_range(i0, 0, height, k)?, &mut a1_star, ctx.redist_mode())?;
        d1.resize(height, n);

        local::gemm(
            N,
            N,
            T::one(),
            a1_star.local().view(),
            b.local(),
            T::zero(),
            d1.local_mut().view_mut(),
        )?;

        axpy_contract(alpha, &d1.view(), &mut c.view_range_mut(i0, 0, height, n)?)?;
    }

    Ok(())
}

/// Stationary `C`: rank-`blocksize` updates with panels of `A` replicated across the grid
/// columns and panels of `B` replicated across the grid rows.
pub(super) fn summa_c<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    let (m, n, k) = (a.height(), b.width(), a.width());

    let mut a1_star = DistMatrix::new(&grid, DistPair::MC_STAR);
    a1_star.align_cols(c.data().col_align)?;

    let mut b1_star = DistMatrix::new(&grid, DistPair::STAR_MR);
    b1_star.align_rows(c.data().row_align)?;

    for (index, (l0, depth)) in panels(k, ctx.config.blocksize).enumerate() {
        // With a pool, the panels of one step are gathered on a pooled context and the local
        // update of `C` is ordered after it.
        let pooled = ctx.pool.map(|pool| pool.acquire()).transpose()?;
        if let Some(sync) = &pooled {
            trace!("summa C: panel {} on stream {:?}", index, sync.stream());
            a1_star.local_mut().set_sync(SyncInfo::clone(sync));
            b1_star.local_mut().set_sync(SyncInfo::clone(sync));
        }

        redist::copy_with(&a.view_range(0, l0, m, depth)?, &mut a1_star, ctx.redist_mode())?;
        redist::copy_with(&b.view_range(l0, 0, depth, n)?, &mut b1_star, ctx.redist_mode())?;
        c.sync().sync_with(a1_star.sync())?;
        c.sync().sync_with(b1_star.sync())?;

        local::gemm(
            N,
            N,
            alpha,
            a1_star.local().view(),
            b1_star.local().view(),
            T::one(),
            c.local_mut(),
        )?;
    }

    if let Some(pool) = ctx.pool {
        pool.synchronize()?;
    }

    Ok(())
}

/// Tiles of `C` computed as inner products of `[STAR,VC]` and `[VC,STAR]` operands and summed
/// over the whole grid.
pub(super) fn summa_dot<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    let (m, n) = (a.height(), b.width());

    let a = materialize(a, &ctx.target(DistPair::STAR_VC).row_align(0))?;
    let b = materialize(b, &ctx.target(DistPair::VC_STAR).col_align(0))?;
    let (local_a, local_b) = (a.view().local(), b.view().local());

    let mut d = DistMatrix::new(&grid, DistPair::STAR_STAR);

    for (j0, width) in panels(n, ctx.config.gemm.block_size_dot) {
        for (i0, height) in panels(m, ctx.config.gemm.block_size_dot) {
            trace!("summa dot: tile ({}, {}) of {}x{}", i0, j0, height, width);
            d.resize(height, width);

            local::gemm(
                N,
                N,
                T::one(),
                local_a.sub_view(i0, 0, height, local_a.width()),
                local_b.sub_view(0, j0, local_b.height(), width),
                T::zero(),
                d.local_mut().view_mut(),
            )?;

            axpy_contract(alpha, &d.view(), &mut c.view_range_mut(i0, j0, height, width)?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_panels() {
        assert_eq!(panels(7, 3).collect_vec(), vec![(0, 3), (3, 3), (6, 1)]);
        assert_eq!(panels(4, 0).count(), 4);
        assert_eq!(panels(0, 128).count(), 0);
    }
}
