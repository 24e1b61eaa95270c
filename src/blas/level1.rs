use super::local;
use crate::comm::{self, Communicator};
use crate::dist::{materialize, Dist, DistMatrix, DistPair, DistTarget, DistView, DistViewMut};
use crate::grid::{Grid, GridComms};
use crate::matrix::MatrixView;
use crate::prelude::*;
use crate::sync::SyncInfo;
use gridla_memops::Reduction;
use rand::prelude::*;

/// `A = alpha * A`. Local.
pub fn scale<T: Scalar>(alpha: T, a: &mut DistViewMut<'_, T>) -> Result {
    a.sync().check("scale")?;
    local::scale(alpha, a.local_mut());
    Ok(())
}

pub fn fill<T: Scalar>(a: &mut DistViewMut<'_, T>, value: T) -> Result {
    a.sync().check("fill")?;
    a.local_mut().fill(value);
    Ok(())
}

pub fn zero<T: Scalar>(a: &mut DistViewMut<'_, T>) -> Result {
    fill(a, T::zero())
}

/// `Y = alpha * X + Y`. `X` is redistributed first unless it is distributed exactly like `Y`.
pub fn axpy<T: Scalar>(alpha: T, x: &DistView<'_, T>, y: &mut DistViewMut<'_, T>) -> Result {
    if !x.grid().same(y.grid()) {
        bail!(LogicError::GridMismatch);
    }

    if (x.height(), x.width()) != (y.height(), y.width()) {
        bail!(LogicError::Nonconformal(format!(
            "axpy of a {}x{} matrix into a {}x{} matrix",
            x.height(),
            x.width(),
            y.height(),
            y.width()
        )));
    }

    x.sync().check("axpy")?;
    y.sync().check("axpy")?;

    let data = y.data();
    let target = DistTarget::new(y.pair())
        .col_align(data.col_align)
        .row_align(data.row_align)
        .root(data.root);

    let x = materialize(x, &target)?;
    let view = x.view();
    local::axpy(alpha, view.local(), y.local_mut())
}

/// The transposed matrix. Involves no communication.
pub fn transpose<T: Scalar>(a: &DistView<'_, T>) -> DistMatrix<T> {
    a.transpose()
}

// Hands a value known to the grid members to the viewers as well.
fn share(grid: &Grid, value: f64) -> Result<f64> {
    let mut buffer = [value];
    comm::broadcast(&**grid.viewing_comm(), &mut buffer, 0, &SyncInfo::cpu())?;
    Ok(buffer[0])
}

// Runs `f` on the [MC,MR] form of `a` if this process is a grid member and shares the result.
fn reduce_norm<T: Scalar>(
    name: &'static str,
    a: &DistView<'_, T>,
    f: impl FnOnce(&GridComms, MatrixView<'_, T>, &SyncInfo) -> Result<f64>,
) -> Result<f64> {
    a.sync().check(name)?;

    let m = materialize(a, &DistTarget::new(DistPair::MC_MR))?;
    let view = m.view();
    let value = match view.grid().comms() {
        Ok(comms) => f(comms, view.local(), view.sync())?,
        Err(_) => 0.0,
    };

    share(view.grid(), value)
}

fn abs_sum<'a, T: Scalar>(values: impl Iterator<Item = &'a T>) -> f64 {
    values.map(|x| x.abs().to_f64()).sum()
}

fn max_of(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, &x| f64::max(acc, x))
}

/// Largest absolute column sum.
pub fn one_norm<T: Scalar>(a: &DistView<'_, T>) -> Result<f64> {
    reduce_norm("one_norm", a, |comms, local, sync| {
        let mut sums = (0..local.width())
            .map(|j| abs_sum(local.column(j).iter()))
            .collect_vec();
        comm::all_reduce(&*comms.col, &mut sums, Reduction::sum::<f64>(), sync)?;

        let mut max = [max_of(&sums)];
        comm::all_reduce(&*comms.row, &mut max, Reduction::max::<f64>(), sync)?;
        Ok(max[0])
    })
}

/// Largest absolute row sum.
pub fn infinity_norm<T: Scalar>(a: &DistView<'_, T>) -> Result<f64> {
    reduce_norm("infinity_norm", a, |comms, local, sync| {
        let mut sums = (0..local.height())
            .map(|i| (0..local.width()).map(|j| local.get(i, j).abs().to_f64()).sum())
            .collect_vec();
        comm::all_reduce(&*comms.row, &mut sums, Reduction::sum::<f64>(), sync)?;

        let mut max = [max_of(&sums)];
        comm::all_reduce(&*comms.col, &mut max, Reduction::max::<f64>(), sync)?;
        Ok(max[0])
    })
}

/// Largest absolute entry.
pub fn max_norm<T: Scalar>(a: &DistView<'_, T>) -> Result<f64> {
    reduce_norm("max_norm", a, |comms, local, sync| {
        let values = (0..local.width())
            .flat_map(|j| local.column(j).iter().map(|x| x.abs().to_f64()))
            .collect_vec();

        let mut max = [max_of(&values)];
        comm::all_reduce(&*comms.vc, &mut max, Reduction::max::<f64>(), sync)?;
        Ok(max[0])
    })
}

pub fn frobenius_norm<T: Scalar>(a: &DistView<'_, T>) -> Result<f64> {
    reduce_norm("frobenius_norm", a, |comms, local, sync| {
        let mut sum = [(0..local.width())
            .flat_map(|j| local.column(j).iter())
            .map(|x| x.to_f64() * x.to_f64())
            .sum::<f64>()];

        comm::all_reduce(&*comms.vc, &mut sum, Reduction::sum::<f64>(), sync)?;
        Ok(sum[0].sqrt())
    })
}

/// Number of entries on diagonal `offset` of a `height x width` matrix. Positive offsets are
/// above the main diagonal.
pub fn diagonal_length(height: usize, width: usize, offset: isize) -> usize {
    let (skip_rows, skip_cols) = diagonal_start(offset);
    min(height.saturating_sub(skip_rows), width.saturating_sub(skip_cols))
}

fn diagonal_start(offset: isize) -> (usize, usize) {
    if offset >= 0 {
        (0, offset as usize)
    } else {
        (offset.unsigned_abs(), 0)
    }
}

/// Diagonal `offset` of `a` mapped through `f`, as a column vector in `[MD,STAR]`.
///
/// The vector is aligned so that entry `k` lives on the process holding entry `k` of the diagonal
/// of the `[MC,MR]` form of `a`, so apart from that redistribution no data moves.
pub fn get_mapped_diagonal<T: Scalar, S: Scalar>(
    a: &DistView<'_, T>,
    offset: isize,
    f: impl Fn(T) -> S,
) -> Result<DistMatrix<S>> {
    a.sync().check("get_diagonal")?;

    let m = materialize(a, &DistTarget::new(DistPair::MC_MR))?;
    let a = m.view();
    let grid = a.grid().clone();

    let len = diagonal_length(a.height(), a.width(), offset);
    let (i0, j0) = diagonal_start(offset);

    // The diagonal advances one row and one column per entry, which is one step along the
    // diagonal path of the process holding its first entry.
    let (root, align) = if len == 0 {
        (0, 0)
    } else {
        let data = a.data();
        let row = (i0 + data.col_align) % grid.height();
        let col = (j0 + data.row_align) % grid.width();
        let first = grid.vc_of(row, col);
        (grid.path_of(first), grid.md_pos_of(first))
    };

    let mut d = DistMatrix::new_aligned(&grid, DistPair::MD_STAR, len, 1, align, 0, root)?;
    let (dl, al) = match (d.info().local_layout(), a.info().local_layout()) {
        (Some(dl), Some(al)) => (dl.0, al),
        _ => return Ok(d),
    };

    let local = a.local();
    for k in 0..d.local_height() {
        let t = dl.global_index(k);
        let (i, j) = (i0 + t, j0 + t);
        debug_assert!(al.0.contains(i) && al.1.contains(j));

        let value = local.get(al.0.local_index(i), al.1.local_index(j));
        d.set_local(k, 0, f(value));
    }

    Ok(d)
}

/// Diagonal `offset` of `a` as a column vector in `[MD,STAR]`.
pub fn get_diagonal<T: Scalar>(a: &DistView<'_, T>, offset: isize) -> Result<DistMatrix<T>> {
    get_mapped_diagonal(a, offset, |x| x)
}

// Processes holding the same local block as the calling process, ranked so that rank 0 is unique
// within the group.
fn redundant_comm(comms: &GridComms, pair: DistPair) -> &Arc<dyn Communicator> {
    match (pair.col(), pair.row()) {
        (Dist::Star, Dist::Star) => &comms.vc,
        (Dist::Mc, Dist::Star) | (Dist::Star, Dist::Mc) => &comms.row,
        (Dist::Mr, Dist::Star) | (Dist::Star, Dist::Mr) => &comms.col,
        _ => &comms.self_,
    }
}

/// Resizes `a` to `height x width` and fills it with values drawn uniformly from
/// `center - radius ..= center + radius`. Replicated entries are equal on every process.
pub fn uniform<T: Scalar>(
    a: &mut DistMatrix<T>,
    height: usize,
    width: usize,
    center: T,
    radius: f64,
    seed: u64,
) -> Result {
    a.sync().check("uniform")?;
    a.resize(height, width);

    let grid = a.grid().clone();
    let comms = match grid.comms() {
        Ok(comms) => comms,
        Err(_) => return Ok(()),
    };

    let redundant = redundant_comm(comms, a.pair());
    let mut buffer = zeros::<T>(a.local_height() * a.local_width());

    if redundant.rank() == 0 {
        let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(comms.vc.rank() as u64));

        for x in &mut buffer {
            let offset = radius * (2.0 * rng.gen::<f64>() - 1.0);
            *x = T::from_f64(center.to_f64() + offset);
        }
    }

    let sync = a.sync().clone();
    comm::broadcast(&**redundant, &mut buffer, 0, &sync)?;

    let local = a.local_mut();
    let h = local.height();
    for (index, value) in enumerate(buffer) {
        local.set(index % h, index / h, value);
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::run_local;
    use crate::redist;

    fn value(i: usize, j: usize) -> f64 {
        i as f64 - 2.0 * j as f64
    }

    #[test]
    fn test_norms() {
        let (h, w) = (5, 4);
        let one = (0..w)
            .map(|j| (0..h).map(|i| value(i, j).abs()).sum::<f64>())
            .fold(0.0, f64::max);
        let inf = (0..h)
            .map(|i| (0..w).map(|j| value(i, j).abs()).sum::<f64>())
            .fold(0.0, f64::max);
        let frob = (0..h)
            .flat_map(|i| (0..w).map(move |j| value(i, j).powi(2)))
            .sum::<f64>()
            .sqrt();

        run_local(5, |comm| {
            let grid = Grid::with_shape(comm, 2, 2)?;

            for &pair in &[
                DistPair::MC_MR,
                DistPair::VR_STAR,
                DistPair::CIRC_CIRC,
                DistPair::STAR_STAR,
            ] {
                let a = DistMatrix::from_fn(&grid, pair, h, w, value);

                assert_eq!(one_norm(&a.view())?, one);
                assert_eq!(infinity_norm(&a.view())?, inf);
                assert_eq!(max_norm(&a.view())?, 6.0);
                assert!((frobenius_norm(&a.view())? - frob).abs() < 1e-12);
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_axpy_realigns() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let x = DistMatrix::from_fn(&grid, DistPair::VC_STAR, 6, 3, value);
            let mut y = DistMatrix::new_aligned(&grid, DistPair::MC_MR, 6, 3, 1, 1, 0)?;
            fill(&mut y.view_mut(), 1.0)?;

            axpy(2.0, &x.view(), &mut y.view_mut())?;
            scale(-1.0, &mut y.view_mut())?;

            for i in 0..6 {
                for j in 0..3 {
                    assert_eq!(y.get(i, j)?, -(1.0 + 2.0 * value(i, j)));
                }
            }

            let small = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 2, 3);
            let err = axpy(1.0, &small.view(), &mut y.view_mut()).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<LogicError>(),
                Some(LogicError::Nonconformal(_))
            ));

            zero(&mut y.view_mut())?;
            assert_eq!(max_norm(&y.view())?, 0.0);

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_diagonal_length() {
        assert_eq!(diagonal_length(4, 6, 0), 4);
        assert_eq!(diagonal_length(4, 6, 3), 3);
        assert_eq!(diagonal_length(4, 6, -1), 3);
        assert_eq!(diagonal_length(4, 6, 6), 0);
        assert_eq!(diagonal_length(4, 6, -5), 0);
    }

    #[test]
    fn test_get_diagonal() {
        run_local(8, |comm| {
            let grid = Grid::with_shape(comm, 2, 3)?;
            let (h, w) = (7, 9);

            let mut aligned = DistMatrix::new_aligned(&grid, DistPair::MC_MR, h, w, 1, 2, 0)?;
            let a = DistMatrix::from_fn(&grid, DistPair::MC_MR, h, w, value);
            redist::copy(&a.view(), &mut aligned)?;
            let cases = [
                aligned,
                DistMatrix::from_fn(&grid, DistPair::VC_STAR, h, w, value),
                DistMatrix::from_fn(&grid, DistPair::STAR_STAR, h, w, value),
            ];

            for a in &cases {
                for &offset in &[0isize, 2, -3, 8, -7] {
                    let d = get_diagonal(&a.view(), offset)?;
                    assert_eq!(d.pair(), DistPair::MD_STAR);
                    assert_eq!((d.height(), d.width()), (diagonal_length(h, w, offset), 1));

                    let (i0, j0) = diagonal_start(offset);
                    for k in 0..d.height() {
                        assert_eq!(d.get(k, 0)?, a.get(i0 + k, j0 + k)?);
                    }
                }
            }

            let squares = get_mapped_diagonal(&cases[0].view(), 1, |x: f64| (x * x) as i64)?;
            for k in 0..squares.height() {
                assert_eq!(squares.get(k, 0)?, (value(k, k + 1) * value(k, k + 1)) as i64);
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_uniform() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let sync = SyncInfo::cpu();

            for &pair in &[DistPair::STAR_STAR, DistPair::MC_STAR, DistPair::MC_MR] {
                let mut a = DistMatrix::new(&grid, pair);
                uniform(&mut a, 5, 3, 10.0, 0.5, 42)?;
                assert_eq!((a.height(), a.width()), (5, 3));
                assert!(a.local().to_vec().iter().all(|x| (9.5..=10.5).contains(x)));

                // Every replica of an entry is equal to the one held by its owner.
                let mut star = DistMatrix::new(&grid, DistPair::STAR_STAR);
                crate::redist::copy(&a.view(), &mut star)?;
                for jl in 0..a.local_width() {
                    for il in 0..a.local_height() {
                        let (i, j) = (a.global_row(il), a.global_col(jl));
                        assert_eq!(a.get_local(il, jl), star.get_local(i, j));
                    }
                }
            }

            let mut a = DistMatrix::new(&grid, DistPair::STAR_STAR);
            uniform(&mut a, 2, 2, 0.0, 1.0, 7)?;
            let mine = a.local().to_vec();
            let mut all = vec![0.0; 16];
            comm::all_gather(&*grid.comms()?.vc, &mine, &mut all, &sync)?;
            assert!(all.chunks(4).all(|chunk| chunk == &mine[..]));

            Ok(())
        })
        .unwrap();
    }
}
