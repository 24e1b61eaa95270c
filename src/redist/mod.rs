//! Redistribution engine.
//!
//! [`copy`] moves the contents of a distributed matrix into another distribution over the same
//! grid. Equal pairs are realigned in place, different pairs follow the cheapest route of
//! specialized steps found by the planner, and everything else goes through the general
//! element-shuffling path. Every process takes the same decisions from the same distribution
//! data, so all of them enter the same collectives in the same order.

use crate::config::RedistMode;
use crate::dist::{Axis, Dist, DistInfo, DistMatrix, DistPair, DistView, DistViewMut};
use crate::grid::Grid;
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::prelude::*;
use gridla_memops::{pack_part, unpack_part, AxisPart};

mod alltoall;
mod circ;
mod exchange;
mod filter;
mod gather;
mod general;
mod plan;
mod realign;

pub use self::plan::{edges, route, route_cost, Route, Step, StepKind};

/// Copies `src` into `dst`, which is resized to the dimensions of `src`. Free alignments and a
/// free root of `dst` are replaced by values compatible with `src`.
///
/// Collective over the grid. Viewer processes return immediately.
pub fn copy<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    copy_with(src, dst, RedistMode::Auto)
}

pub fn copy_with<T: Scalar>(
    src: &DistView<'_, T>,
    dst: &mut DistMatrix<T>,
    mode: RedistMode,
) -> Result {
    if !src.grid().same(dst.grid()) {
        bail!(LogicError::GridMismatch);
    }

    src.sync().check("redistribute")?;
    dst.sync().check("redistribute")?;

    inherit_layout(src.info(), dst);
    dst.resize(src.height(), src.width());

    if src.is_empty() || !src.grid().in_grid() {
        return Ok(());
    }

    dst.sync().sync_with(src.sync())?;

    if mode == RedistMode::General {
        debug!("redistributing {} -> {} through the general path", src.pair(), dst.pair());
        return general::copy(src, dst);
    }

    if src.pair() == dst.pair() {
        return realign::realign_into(src, dst);
    }

    match route(src.pair(), dst.pair()) {
        Some(route) => execute(src, dst, &route),
        None => {
            debug!("no route from {} to {}, using the general path", src.pair(), dst.pair());
            general::copy(src, dst)
        }
    }
}

/// Copies `src` into a view with the same dimensions. The distribution of the view is fixed.
pub fn copy_to_view<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistViewMut<'_, T>) -> Result {
    copy_to_view_with(src, dst, RedistMode::Auto)
}

pub fn copy_to_view_with<T: Scalar>(
    src: &DistView<'_, T>,
    dst: &mut DistViewMut<'_, T>,
    mode: RedistMode,
) -> Result {
    if (src.height(), src.width()) != (dst.height(), dst.width()) {
        bail!(LogicError::Nonconformal(format!(
            "cannot copy a {}x{} matrix into a {}x{} view",
            src.height(),
            src.width(),
            dst.height(),
            dst.width()
        )));
    }

    let data = dst.data().clone();
    let mut tmp = DistMatrix::new_aligned(
        dst.grid(),
        dst.pair(),
        0,
        0,
        data.col_align,
        data.row_align,
        data.root,
    )?;

    copy_with(src, &mut tmp, mode)?;
    dst.local_mut().copy_from(tmp.local().view());
    Ok(())
}

// Alignment of `dist` that is compatible with alignment `align` of `from`.
fn compatible_align(grid: &Grid, from: Dist, align: usize, dist: Dist) -> Option<usize> {
    match (from, dist) {
        (a, b) if a == b => Some(align),
        (Dist::Vc, Dist::Mc) => Some(align % grid.height()),
        (Dist::Vr, Dist::Mr) => Some(align % grid.width()),
        (Dist::Mc, Dist::Vc) | (Dist::Mr, Dist::Vr) => Some(align),
        _ => None,
    }
}

fn same_root_kind(a: DistPair, b: DistPair) -> bool {
    let circ = |p: DistPair| p.col() == Dist::Circ;
    a.has_root() && b.has_root() && circ(a) == circ(b)
}

fn inherit_layout<T: Scalar>(src: &DistInfo, dst: &mut DistMatrix<T>) {
    let grid = src.grid().clone();
    let pair = dst.pair();

    let mut aligns = [dst.col_align(), dst.row_align()];
    for (index, &axis) in enumerate(&[Axis::Col, Axis::Row]) {
        if !dst.is_constrained(axis) {
            aligns[index] =
                compatible_align(&grid, src.dist(axis), src.align(axis), pair.dist(axis))
                    .unwrap_or(0);
        }
    }

    let mut root = dst.root();
    if !dst.is_root_constrained() {
        root = if same_root_kind(src.pair(), pair) {
            src.root()
        } else {
            0
        };
    }

    dst.set_layout(aligns[0], aligns[1], root);
}

fn intermediate_align(axis: Axis, dist: Dist, src: &DistInfo, dst: &DistInfo) -> usize {
    let grid = dst.grid();

    if dist == dst.dist(axis) {
        dst.align(axis)
    } else if dist == src.dist(axis) {
        src.align(axis)
    } else {
        compatible_align(grid, dst.dist(axis), dst.align(axis), dist)
            .or_else(|| compatible_align(grid, src.dist(axis), src.align(axis), dist))
            .unwrap_or(0)
    }
}

fn intermediate_root(pair: DistPair, src: &DistInfo, dst: &DistInfo) -> usize {
    if same_root_kind(pair, dst.pair()) {
        dst.root()
    } else if same_root_kind(pair, src.pair()) {
        src.root()
    } else {
        0
    }
}

// Empty-valued matrix with the given layout and the dimensions of `like`.
fn temporary<T: Scalar>(
    like: &DistInfo,
    pair: DistPair,
    col_align: usize,
    row_align: usize,
    root: usize,
) -> DistMatrix<T> {
    let mut out = DistMatrix::new(like.grid(), pair);
    out.set_layout(col_align, row_align, root);
    out.resize(like.height, like.width);
    out
}

fn execute<T: Scalar>(src: &DistView<'_, T>, dst: &mut DistMatrix<T>, route: &[Step]) -> Result {
    debug!(
        "redistributing {}x{} from {} to {} in {} steps (cost {})",
        src.height(),
        src.width(),
        src.pair(),
        dst.pair(),
        route.len(),
        route_cost(route)
    );

    let target = dst.info().clone();
    let mut current: Option<DistMatrix<T>> = None;

    for (index, step) in enumerate(route) {
        trace!("step {}: {:?} {} -> {}", index, step.kind, step.from, step.to);

        let input = match &current {
            Some(matrix) => matrix.view(),
            None => src.clone(),
        };

        if index + 1 == route.len() {
            run_step(step, &input, dst)?;
        } else {
            let mut next = temporary(
                &target,
                step.to,
                intermediate_align(Axis::Col, step.to.col(), src.info(), &target),
                intermediate_align(Axis::Row, step.to.row(), src.info(), &target),
                intermediate_root(step.to, src.info(), &target),
            );

            run_step(step, &input, &mut next)?;
            drop(input);
            current = Some(next);
        }
    }

    Ok(())
}

// Alignments the source of `step` must have for the step to be applicable.
fn required_aligns(step: &Step, src: &DistInfo, dst: &DistInfo) -> [usize; 2] {
    use StepKind::*;

    let index = |axis: Axis| match axis {
        Axis::Col => 0,
        Axis::Row => 1,
    };

    let mut want = [src.align(Axis::Col), src.align(Axis::Row)];

    match step.kind {
        AllGather(axis) | Filter(axis) | PartialGather(axis) | PartialFilter(axis) => {
            let other = axis.other();
            want[index(other)] = dst.align(other);

            match step.kind {
                PartialGather(_) if src.align(axis) % dst.stride(axis) != dst.align(axis) => {
                    want[index(axis)] = dst.align(axis);
                }
                PartialFilter(_) => {
                    want[index(axis)] = dst.align(axis) % src.stride(axis);
                }
                _ => {}
            }
        }
        Promote(axis) => {
            want[index(axis)] = dst.align(axis) % src.stride(axis);
        }
        Demote(axis) => {
            if src.align(axis) % dst.stride(axis) != dst.align(axis) {
                want[index(axis)] = dst.align(axis);
            }
        }
        Exchange(_) | GatherToCirc | ScatterFromCirc | BroadcastCirc | LocalToCirc => {}
    }

    want
}

fn run_step<T: Scalar>(step: &Step, src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    let [col_align, row_align] = required_aligns(step, src.info(), dst.info());

    if (col_align, row_align) != (src.col_align(), src.row_align()) {
        trace!(
            "realigning {} from ({}, {}) to ({}, {})",
            src.pair(),
            src.col_align(),
            src.row_align(),
            col_align,
            row_align
        );

        let mut tmp = temporary(src.info(), src.pair(), col_align, row_align, src.root());
        realign::realign_into(src, &mut tmp)?;
        return dispatch(step, &tmp.view(), dst);
    }

    dispatch(step, src, dst)
}

fn dispatch<T: Scalar>(step: &Step, src: &DistView<'_, T>, dst: &mut DistMatrix<T>) -> Result {
    use StepKind::*;

    match step.kind {
        AllGather(axis) => gather::all_gather(axis, src, dst),
        Filter(axis) => filter::filter(axis, src, dst),
        PartialGather(axis) => gather::partial_gather(axis, src, dst),
        PartialFilter(axis) => filter::partial_filter(axis, src, dst),
        Promote(axis) => alltoall::promote(axis, src, dst),
        Demote(axis) => alltoall::demote(axis, src, dst),
        Exchange(axis) => exchange::exchange(axis, src, dst),
        GatherToCirc => circ::gather_to_circ(src, dst),
        ScatterFromCirc => circ::scatter_from_circ(src, dst),
        BroadcastCirc => circ::broadcast_circ(src, dst),
        LocalToCirc => circ::local_to_circ(src, dst),
    }
}

// `(rows, cols)` of something that is `along` the axis and `other` across it.
fn orient<X>(axis: Axis, along: X, other: X) -> (X, X) {
    match axis {
        Axis::Col => (along, other),
        Axis::Row => (other, along),
    }
}

fn local_len(info: &DistInfo, axis: Axis) -> usize {
    let (h, w) = info.local_dims();
    orient(axis, h, w).0
}

// Packs a whole local block column-major into the front of `out`.
fn pack_block<T: Scalar>(src: MatrixView<'_, T>, out: &mut [T]) {
    pack_part(
        RayonPolicy,
        src.accessor(),
        AxisPart::contiguous(src.height()),
        AxisPart::contiguous(src.width()),
        out,
    );
}

fn unpack_block<T: Scalar>(input: &[T], dst: MatrixViewMut<'_, T>) {
    let (h, w) = (dst.height(), dst.width());
    unpack_part(
        RayonPolicy,
        input,
        AxisPart::contiguous(h),
        AxisPart::contiguous(w),
        dst.into_accessor(),
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::run_local;
    use crate::dist::dist_stride;
    use itertools::iproduct;
    use rand::prelude::*;

    fn value(i: usize, j: usize) -> f64 {
        (100 * i + j) as f64
    }

    // Checks the local block of `m` against `f` without communication.
    fn check_local(m: &DistMatrix<f64>, f: impl Fn(usize, usize) -> f64) {
        assert_eq!(m.info().local_dims(), (m.local_height(), m.local_width()));

        for jl in 0..m.local_width() {
            for il in 0..m.local_height() {
                let (i, j) = (m.global_row(il), m.global_col(jl));
                assert_eq!(
                    m.get_local(il, jl),
                    f(i, j),
                    "{} aligned ({}, {}) root {} at ({}, {})",
                    m.pair(),
                    m.col_align(),
                    m.row_align(),
                    m.root(),
                    i,
                    j
                );
            }
        }
    }

    fn random_layout(rng: &mut SmallRng, grid: &Grid, pair: DistPair) -> (usize, usize, usize) {
        let col = rng.gen_range(0..dist_stride(grid, pair.col()));
        let row = rng.gen_range(0..dist_stride(grid, pair.row()));
        let root = if pair.col() == Dist::Circ {
            rng.gen_range(0..grid.size())
        } else if pair.has_root() {
            rng.gen_range(0..grid.gcd())
        } else {
            0
        };

        (col, row, root)
    }

    // Every alignment and root `pair` admits on `grid`.
    fn all_layouts(grid: &Grid, pair: DistPair) -> Vec<(usize, usize, usize)> {
        let roots = if pair.col() == Dist::Circ {
            grid.size()
        } else if pair.has_root() {
            grid.gcd()
        } else {
            1
        };

        iproduct!(
            0..dist_stride(grid, pair.col()),
            0..dist_stride(grid, pair.row()),
            0..roots
        )
        .collect()
    }

    #[test]
    fn test_every_alignment() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 3)?;
            let (h, w) = (5, 7);
            let b = DistMatrix::from_fn(&grid, DistPair::MC_MR, h, w, value);

            for &from in &DistPair::ALL {
                for (ca, ra, root) in all_layouts(&grid, from) {
                    let mut a = DistMatrix::new_aligned(&grid, from, h, w, ca, ra, root)?;
                    copy(&b.view(), &mut a)?;
                    check_local(&a, value);

                    for &to in &DistPair::ALL {
                        for (ca, ra, root) in all_layouts(&grid, to) {
                            let mut c = DistMatrix::new_aligned(&grid, to, 0, 0, ca, ra, root)?;
                            copy(&a.view(), &mut c)?;
                            assert_eq!((c.col_align(), c.row_align(), c.root()), (ca, ra, root));
                            check_local(&c, value);
                        }
                    }
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_all_pairs() {
        for &(p, r) in &[(4, 2), (6, 3), (4, 1)] {
            run_local(p, |comm| {
                let grid = Grid::with_height(comm, r)?;

                for &from in &DistPair::ALL {
                    let a = DistMatrix::from_fn(&grid, from, 7, 5, value);

                    for &to in &DistPair::ALL {
                        let mut b = DistMatrix::new(&grid, to);
                        copy(&a.view(), &mut b)?;
                        assert_eq!((b.height(), b.width()), (7, 5));
                        check_local(&b, value);

                        let mut c = DistMatrix::new(&grid, to);
                        copy_with(&a.view(), &mut c, RedistMode::General)?;
                        assert_eq!(c.data(), b.data());
                        assert_eq!(c.local().to_vec(), b.local().to_vec());
                    }
                }

                Ok(())
            })
            .unwrap();
        }
    }

    #[test]
    fn test_round_trip() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 2)?;
            let a = DistMatrix::from_fn(&grid, DistPair::MC_MR, 9, 4, value);

            for &via in &DistPair::ALL {
                let mut b = DistMatrix::new(&grid, via);
                copy(&a.view(), &mut b)?;

                let mut c = DistMatrix::new(&grid, DistPair::MC_MR);
                copy(&b.view(), &mut c)?;
                check_local(&c, value);
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_alignment_sweep() {
        for &(p, r) in &[(4, 2), (6, 2), (8, 4)] {
            run_local(p, |comm| {
                let grid = Grid::with_height(comm, r)?;
                let mut rng = SmallRng::seed_from_u64(0);

                for _ in 0..60 {
                    let from = DistPair::ALL[rng.gen_range(0..DistPair::ALL.len())];
                    let to = DistPair::ALL[rng.gen_range(0..DistPair::ALL.len())];
                    let (h, w) = (rng.gen_range(1..11), rng.gen_range(1..11));

                    let (ca, ra, root) = random_layout(&mut rng, &grid, from);
                    let mut a = DistMatrix::new_aligned(&grid, from, h, w, ca, ra, root)?;
                    let b = DistMatrix::from_fn(&grid, from, h, w, value);
                    copy(&b.view(), &mut a)?;
                    assert_eq!((a.col_align(), a.row_align(), a.root()), (ca, ra, root));
                    check_local(&a, value);

                    let (ca, ra, root) = random_layout(&mut rng, &grid, to);
                    let mut c = DistMatrix::new_aligned(&grid, to, 0, 0, ca, ra, root)?;
                    copy(&a.view(), &mut c)?;
                    assert_eq!((c.col_align(), c.row_align(), c.root()), (ca, ra, root));
                    check_local(&c, value);

                    // Copying out of a view realigns as well.
                    let (i0, j0) = (rng.gen_range(0..h), rng.gen_range(0..w));
                    let v = a.view_range(i0, j0, h - i0, w - j0)?;
                    let mut d = DistMatrix::new(&grid, to);
                    copy(&v, &mut d)?;
                    check_local(&d, |i, j| value(i + i0, j + j0));
                }

                Ok(())
            })
            .unwrap();
        }
    }

    #[test]
    fn test_gather_to_star() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let a = DistMatrix::from_fn(&grid, DistPair::MC_MR, 4, 4, |i, j| (i * 4 + j) as i32);

            let mut b = DistMatrix::new(&grid, DistPair::STAR_STAR);
            copy(&a.view(), &mut b)?;

            let expected = (0..4)
                .flat_map(|j| (0..4).map(move |i| (i * 4 + j) as i32))
                .collect_vec();
            assert_eq!(b.local().to_vec(), expected);

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_inherit_alignment() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 2)?;

            let mut a = DistMatrix::new(&grid, DistPair::VC_STAR);
            a.align_cols(5)?;
            a.resize(8, 3);
            let b = DistMatrix::from_fn(&grid, DistPair::VC_STAR, 8, 3, value);
            copy(&b.view(), &mut a)?;

            let mut c = DistMatrix::new(&grid, DistPair::MC_STAR);
            copy(&a.view(), &mut c)?;
            assert_eq!(c.col_align(), 1);
            assert!(!c.is_constrained(Axis::Col));
            check_local(&c, value);

            let mut d = DistMatrix::new(&grid, DistPair::VC_STAR);
            copy(&c.view(), &mut d)?;
            assert_eq!(d.col_align(), 1);
            check_local(&d, value);

            // Constrained alignments are kept.
            let mut e = DistMatrix::new(&grid, DistPair::VC_STAR);
            e.align_cols(2)?;
            copy(&a.view(), &mut e)?;
            assert_eq!(e.col_align(), 2);
            check_local(&e, value);

            let mut f = DistMatrix::new(&grid, DistPair::CIRC_CIRC);
            f.set_root(4)?;
            copy(&a.view(), &mut f)?;
            let mut g = DistMatrix::new(&grid, DistPair::CIRC_CIRC);
            copy(&f.view(), &mut g)?;
            assert_eq!(g.root(), 4);
            check_local(&g, value);

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_zero_size() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let a = DistMatrix::<f64>::from_fn(&grid, DistPair::MC_MR, 0, 5, value);

            for &to in &DistPair::ALL {
                let mut b = DistMatrix::new(&grid, to);
                copy(&a.view(), &mut b)?;
                assert_eq!((b.height(), b.width()), (0, 5));
                assert_eq!(b.local_height(), 0);
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_viewer() {
        run_local(5, |comm| {
            let rank = comm.rank();
            let grid = Grid::with_shape(comm, 2, 2)?;

            for &from in &DistPair::ALL {
                let a = DistMatrix::from_fn(&grid, from, 5, 3, value);

                for &to in &DistPair::ALL {
                    let mut b = DistMatrix::new(&grid, to);
                    copy(&a.view(), &mut b)?;
                    assert_eq!((b.height(), b.width()), (5, 3));

                    if rank == 4 {
                        assert!(b.local().is_empty());
                    } else {
                        check_local(&b, value);
                    }

                    assert_eq!(b.get(4, 2)?, value(4, 2), "{} -> {}", from, to);
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_diagonal_root_change() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            assert_eq!(grid.gcd(), 2);

            for &pair in &[DistPair::MD_STAR, DistPair::STAR_MD] {
                let a = DistMatrix::from_fn(&grid, pair, 6, 5, value);
                assert_eq!(a.root(), 0);

                let mut b = DistMatrix::new(&grid, pair);
                b.set_root(1)?;
                if pair == DistPair::MD_STAR {
                    b.align_cols(1)?;
                } else {
                    b.align_rows(1)?;
                }
                copy(&a.view(), &mut b)?;
                assert_eq!(b.root(), 1);
                check_local(&b, value);

                let q = grid.vc_rank().unwrap_or(0);
                let holds = grid.path_of(q) == 1;
                assert_eq!(!b.local().is_empty(), holds);
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_copy_to_view() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let mut a = DistMatrix::from_fn(&grid, DistPair::MC_MR, 6, 6, |_, _| 0.0);
            let b = DistMatrix::from_fn(&grid, DistPair::STAR_VC, 3, 2, value);

            {
                let mut v = a.view_range_mut(2, 3, 3, 2)?;
                copy_to_view(&b.view(), &mut v)?;

                let err = copy_to_view(&b.view_range(0, 0, 2, 2)?, &mut v).unwrap_err();
                assert!(matches!(
                    err.downcast_ref::<LogicError>(),
                    Some(LogicError::Nonconformal(_))
                ));
            }

            check_local(&a, |i, j| {
                if (2..5).contains(&i) && (3..5).contains(&j) {
                    value(i - 2, j - 3)
                } else {
                    0.0
                }
            });

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_grid_mismatch() {
        run_local(2, |comm| {
            let g1 = Grid::new(comm.clone())?;
            let g2 = Grid::new(comm)?;

            let a = DistMatrix::from_fn(&g1, DistPair::MC_MR, 3, 3, value);
            let mut b = DistMatrix::new(&g2, DistPair::MC_MR);
            let err = copy(&a.view(), &mut b).unwrap_err();
            assert_eq!(err.downcast_ref::<LogicError>(), Some(&LogicError::GridMismatch));

            Ok(())
        })
        .unwrap();
    }
}
