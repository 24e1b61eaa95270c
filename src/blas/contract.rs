//! Accumulation of partial results into an `[MC,MR]` matrix.
//!
//! A partially reduced matrix is summed over the processes that hold copies of the same entries
//! and the sum is scattered into the `[MC,MR]` distribution in a single reduce-scatter.

use super::local;
use crate::comm::{self, Communicator};
use crate::dist::{materialize, DistPair, DistTarget, DistView, DistViewMut};
use crate::matrix::MatrixView;
use crate::prelude::*;
use gridla_memops::{strided_pack, AxisPartition, Reduction};

/// `B = B + alpha * sum(A)`, where `A` is `[MC,STAR]`, `[STAR,MR]` or `[STAR,STAR]` and holds a
/// different partial sum on every process of the replicating communicator. `B` must be `[MC,MR]`.
pub fn axpy_contract<T: Scalar>(
    alpha: T,
    a: &DistView<'_, T>,
    b: &mut DistViewMut<'_, T>,
) -> Result {
    if !a.grid().same(b.grid()) {
        bail!(LogicError::GridMismatch);
    }

    if (a.height(), a.width()) != (b.height(), b.width()) {
        bail!(LogicError::Nonconformal(format!(
            "contraction of a {}x{} matrix into a {}x{} matrix",
            a.height(),
            a.width(),
            b.height(),
            b.width()
        )));
    }

    if b.pair() != DistPair::MC_MR {
        bail!("contraction into {} is not supported", b.pair());
    }

    a.sync().check("axpy_contract")?;
    b.sync().check("axpy_contract")?;

    let grid = b.grid().clone();
    let comms = match grid.comms() {
        Ok(comms) => comms,
        Err(_) => return Ok(()),
    };

    let (h, w) = (b.height(), b.width());
    let (r, c) = (grid.height(), grid.width());
    let (col_align, row_align) = (b.data().col_align, b.data().row_align);

    // Only the axis that stays distributed has to line up with `B`.
    let target = match a.pair() {
        DistPair::MC_STAR => DistTarget::new(DistPair::MC_STAR).col_align(col_align),
        DistPair::STAR_MR => DistTarget::new(DistPair::STAR_MR).row_align(row_align),
        DistPair::STAR_STAR => DistTarget::new(DistPair::STAR_STAR),
        pair => bail!("contraction from {} is not supported", pair),
    };

    let a = materialize(a, &target)?;
    let a = a.view();
    let local_a = a.local();

    let (group, rows, cols) = match a.pair() {
        DistPair::MC_STAR => (
            &comms.row,
            AxisPartition::whole(local_a.height()),
            AxisPartition::cyclic(w, row_align, c),
        ),
        DistPair::STAR_MR => (
            &comms.col,
            AxisPartition::cyclic(h, col_align, r),
            AxisPartition::whole(local_a.width()),
        ),
        _ => (
            &comms.vc,
            AxisPartition::cyclic(h, col_align, r),
            AxisPartition::cyclic(w, row_align, c),
        ),
    };

    let portion = rows.max_len() * cols.max_len();
    let parts = rows.num_parts() * cols.num_parts();
    debug_assert_eq!(parts, group.size());

    let mut send = zeros::<T>(portion * parts);
    strided_pack(RayonPolicy, local_a.accessor(), &rows, &cols, portion, &mut send);

    let mut recv = zeros::<T>(portion);
    comm::reduce_scatter(&**group, &send, &mut recv, Reduction::sum::<T>(), a.sync())?;

    let (lh, lw) = (b.local().height(), b.local().width());
    let sum = MatrixView::new(&recv, lh, lw, max(lh, 1))?;
    local::axpy(alpha, sum, b.local_mut())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::run_local;
    use crate::dist::DistMatrix;
    use crate::grid::Grid;

    fn value(i: usize, j: usize) -> f64 {
        (3 * i + j) as f64
    }

    #[test]
    fn test_contract() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 2)?;
            let (r, c) = (grid.height(), grid.width());

            for &(pair, copies) in &[
                (DistPair::MC_STAR, c),
                (DistPair::STAR_MR, r),
                (DistPair::STAR_STAR, r * c),
            ] {
                let a = DistMatrix::from_fn(&grid, pair, 5, 7, value);
                let mut b = DistMatrix::new_aligned(&grid, DistPair::MC_MR, 5, 7, 1, 2, 0)?;
                b.set(0, 0, 1.0)?;

                axpy_contract(2.0, &a.view(), &mut b.view_mut())?;

                for i in 0..5 {
                    for j in 0..7 {
                        let base = if (i, j) == (0, 0) { 1.0 } else { 0.0 };
                        assert_eq!(b.get(i, j)?, base + 2.0 * copies as f64 * value(i, j));
                    }
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_contract_into_view() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let a = DistMatrix::from_fn(&grid, DistPair::STAR_STAR, 2, 3, value);
            let mut b = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 5, 6);

            axpy_contract(1.0, &a.view(), &mut b.view_range_mut(3, 2, 2, 3)?)?;

            for i in 0..5 {
                for j in 0..6 {
                    let expected = if i >= 3 && (2..5).contains(&j) {
                        4.0 * value(i - 3, j - 2)
                    } else {
                        0.0
                    };
                    assert_eq!(b.get(i, j)?, expected);
                }
            }

            let v = DistMatrix::<f64>::zeros(&grid, DistPair::VC_STAR, 2, 3);
            assert!(axpy_contract(1.0, &v.view(), &mut b.view_range_mut(0, 0, 2, 3)?).is_err());

            Ok(())
        })
        .unwrap();
    }
}
