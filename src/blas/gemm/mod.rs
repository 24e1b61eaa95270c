//! Distributed `C = alpha * op(A) * op(B) + beta * C`.
//!
//! The product is computed on `[MC,MR]` operands by one of the SUMMA variants or by Cannon's
//! algorithm. The variants differ in which operand stays in place:
//!
//! * `SummaA` keeps `A` stationary and loops over column panels of `C`.
//! * `SummaB` keeps `B` stationary and loops over row panels of `C`.
//! * `SummaC` keeps `C` stationary and loops over the inner dimension.
//! * `SummaDot` splits `C` into tiles that are each an inner product over a 1D distribution.
//!   It is only used when requested, never by the default selection unless the configuration
//!   allows it.

use super::Orientation;
use crate::config::{GemmTuning, PerformanceConfig, RedistMode};
use crate::dist::{materialize, DistMatrix, DistPair, DistTarget, DistView, DistViewMut};
use crate::prelude::*;
use crate::redist;
use crate::sync::SyncPool;
use serde::{Deserialize, Serialize};

mod cannon;
mod summa;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GemmAlgorithm {
    /// Picked from the shape of the product, see [`select`].
    Default,
    SummaA,
    SummaB,
    SummaC,
    SummaDot,
    Cannon,
}

impl Default for GemmAlgorithm {
    fn default() -> Self {
        GemmAlgorithm::Default
    }
}

/// Tuning and execution resources of a product. The pool, if any, is owned by the caller.
#[derive(Debug, Copy, Clone)]
pub struct GemmContext<'a> {
    pub config: &'a PerformanceConfig,
    pub pool: Option<&'a SyncPool>,
}

impl<'a> GemmContext<'a> {
    pub fn new(config: &'a PerformanceConfig) -> Self {
        Self { config, pool: None }
    }

    pub fn with_pool(self, pool: &'a SyncPool) -> Self {
        Self {
            pool: Some(pool),
            ..self
        }
    }

    pub fn redist_mode(&self) -> RedistMode {
        self.config.redist_mode
    }

    /// Target in `pair` whose copies follow the configured redistribution mode.
    pub fn target(&self, pair: DistPair) -> DistTarget {
        DistTarget::new(pair).mode(self.redist_mode())
    }
}

/// Variant used for an `m x n x k` product when none is requested.
pub fn select(m: usize, n: usize, k: usize, tuning: &GemmTuning) -> GemmAlgorithm {
    let (m, n, k) = (m as f64, n as f64, k as f64);
    let dot = tuning.weight_away_from_dot;
    let towards_c = tuning.weight_towards_c;

    if tuning.allow_dot && dot * m <= k && dot * n <= k {
        GemmAlgorithm::SummaDot
    } else if m <= n && towards_c * m <= k {
        GemmAlgorithm::SummaB
    } else if n <= m && towards_c * n <= k {
        GemmAlgorithm::SummaA
    } else {
        GemmAlgorithm::SummaC
    }
}

fn op_dims<T: Scalar>(orient: Orientation, a: &DistView<'_, T>) -> (usize, usize) {
    if orient.is_transposed() {
        (a.width(), a.height())
    } else {
        (a.height(), a.width())
    }
}

pub fn gemm<T: Scalar>(
    orient_a: Orientation,
    orient_b: Orientation,
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    beta: T,
    c: &mut DistViewMut<'_, T>,
    algorithm: GemmAlgorithm,
    ctx: &GemmContext<'_>,
) -> Result {
    let grid = c.grid().clone();
    if !a.grid().same(&grid) || !b.grid().same(&grid) {
        bail!(LogicError::GridMismatch);
    }

    let (m, k) = op_dims(orient_a, a);
    let (kb, n) = op_dims(orient_b, b);
    if k != kb || (m, n) != (c.height(), c.width()) {
        bail!(LogicError::Nonconformal(format!(
            "gemm: op(A) is {}x{}, op(B) is {}x{} and C is {}x{}",
            m,
            k,
            kb,
            n,
            c.height(),
            c.width()
        )));
    }

    a.sync().check("gemm")?;
    b.sync().check("gemm")?;
    c.sync().check("gemm")?;

    if algorithm == GemmAlgorithm::Cannon && grid.height() != grid.width() {
        bail!(LogicError::NonSquareGrid(
            "cannon",
            grid.height(),
            grid.width()
        ));
    }

    super::scale(beta, c)?;

    if m == 0 || n == 0 || k == 0 || alpha == T::zero() || !grid.in_grid() {
        return Ok(());
    }

    let algorithm = match algorithm {
        GemmAlgorithm::Default => select(m, n, k, &ctx.config.gemm),
        algorithm => algorithm,
    };

    debug!(
        "gemm {:?}{:?} of size {}x{}x{} using {:?}",
        orient_a, orient_b, m, n, k, algorithm
    );

    // Transposing only swaps the roles of the process axes, which the variants undo while
    // redistributing the operands.
    let a_t;
    let a = if orient_a.is_transposed() {
        a_t = a.transpose();
        a_t.view()
    } else {
        a.clone()
    };

    let b_t;
    let b = if orient_b.is_transposed() {
        b_t = b.transpose();
        b_t.view()
    } else {
        b.clone()
    };

    if c.pair() == DistPair::MC_MR {
        run(algorithm, alpha, &a, &b, c, ctx)
    } else {
        let mut tmp = DistMatrix::new(&grid, DistPair::MC_MR);
        redist::copy_with(&c.as_view(), &mut tmp, ctx.redist_mode())?;
        run(algorithm, alpha, &a, &b, &mut tmp.view_mut(), ctx)?;
        redist::copy_to_view_with(&tmp.view(), c, ctx.redist_mode())
    }
}

// `C += alpha * A * B` with `C` in `[MC,MR]`.
fn run<T: Scalar>(
    algorithm: GemmAlgorithm,
    alpha: T,
    a: &DistView<'_, T>,
    b: &DistView<'_, T>,
    c: &mut DistViewMut<'_, T>,
    ctx: &GemmContext<'_>,
) -> Result {
    let (col_align, row_align) = (c.data().col_align, c.data().row_align);

    let a = materialize(a, &ctx.target(DistPair::MC_MR).col_align(col_align))?;
    let b = materialize(b, &ctx.target(DistPair::MC_MR).row_align(row_align))?;
    let (a, b) = (a.view(), b.view());

    match algorithm {
        GemmAlgorithm::SummaA => summa::summa_a(alpha, &a, &b, c, ctx),
        GemmAlgorithm::SummaB => summa::summa_b(alpha, &a, &b, c, ctx),
        GemmAlgorithm::SummaDot => summa::summa_dot(alpha, &a, &b, c, ctx),
        GemmAlgorithm::Cannon => cannon::cannon(alpha, &a, &b, c, ctx),
        GemmAlgorithm::Default | GemmAlgorithm::SummaC => summa::summa_c(alpha, &a, &b, c, ctx),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blas::local;
    use crate::comm::run_local;
    use crate::grid::Grid;
    use crate::matrix::Matrix;
    use crate::sync::Device;
    use rand::prelude::*;

    const ALGORITHMS: [GemmAlgorithm; 6] = [
        GemmAlgorithm::Default,
        GemmAlgorithm::SummaA,
        GemmAlgorithm::SummaB,
        GemmAlgorithm::SummaC,
        GemmAlgorithm::SummaDot,
        GemmAlgorithm::Cannon,
    ];

    const ORIENTATIONS: [(Orientation, Orientation); 4] = [
        (Orientation::Normal, Orientation::Normal),
        (Orientation::Transpose, Orientation::Normal),
        (Orientation::Normal, Orientation::Transpose),
        (Orientation::Adjoint, Orientation::Transpose),
    ];

    const N: Orientation = Orientation::Normal;

    fn small_config() -> PerformanceConfig {
        let mut config = PerformanceConfig::default();
        config.blocksize = 2;
        config.gemm.block_size_dot = 3;
        config
    }

    #[test]
    fn test_select() {
        let mut tuning = GemmTuning::default();
        assert_eq!(select(100, 100, 100, &tuning), GemmAlgorithm::SummaC);
        assert_eq!(select(10, 100, 100, &tuning), GemmAlgorithm::SummaB);
        assert_eq!(select(100, 10, 100, &tuning), GemmAlgorithm::SummaA);
        assert_eq!(select(10, 10, 1000, &tuning), GemmAlgorithm::SummaB);

        tuning.allow_dot = true;
        assert_eq!(select(10, 10, 1000, &tuning), GemmAlgorithm::SummaDot);
        assert_eq!(select(10, 200, 1000, &tuning), GemmAlgorithm::SummaB);
    }

    #[test]
    fn test_square_product() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let config = PerformanceConfig::default();
            let pool = SyncPool::new(2, Device::Cpu)?;
            let ctx = GemmContext::new(&config).with_pool(&pool);

            let f = |i: usize, j: usize| (i * 4 + j) as f64;
            let a = DistMatrix::from_fn(&grid, DistPair::MC_MR, 4, 4, f);

            let mut star = DistMatrix::new(&grid, DistPair::STAR_STAR);
            redist::copy(&a.view(), &mut star)?;
            assert_eq!(
                star.local().to_vec(),
                (0..16)
                    .map(|x| ((x % 4) * 4 + x / 4) as f64)
                    .collect_vec()
            );

            let mut c = DistMatrix::zeros(&grid, DistPair::MC_MR, 4, 4);
            gemm(
                Orientation::Normal,
                Orientation::Normal,
                1.0,
                &a.view(),
                &a.view(),
                0.0,
                &mut c.view_mut(),
                GemmAlgorithm::SummaC,
                &ctx,
            )?;
            assert_eq!(pool.in_use(), 0);

            for i in 0..4 {
                for j in 0..4 {
                    let expected = (0..4).map(|l| f(i, l) * f(l, j)).sum::<f64>();
                    assert_eq!(c.get(i, j)?, expected);
                }
            }

            Ok(())
        })
        .unwrap();
    }

    fn check_variants(procs: usize, height: usize, mode: RedistMode) {
        let (m, n, k) = (7, 5, 6);
        let mut rng = SmallRng::seed_from_u64(0);
        let mut random =
            |h: usize, w: usize| Matrix::from_fn(h, w, |_, _| rng.gen_range(-4..=4) as f64);

        let cases = ORIENTATIONS
            .iter()
            .map(|&(oa, ob)| {
                let a = if oa.is_transposed() { random(k, m) } else { random(m, k) };
                let b = if ob.is_transposed() { random(n, k) } else { random(k, n) };
                let c = random(m, n);

                let mut expected = c.clone();
                local::gemm(oa, ob, 2.0, a.view(), b.view(), -1.0, expected.view_mut()).unwrap();

                (oa, ob, a, b, c, expected)
            })
            .collect_vec();

        run_local(procs, |comm| {
            let grid = Grid::with_height(comm, height)?;
            let mut config = small_config();
            config.redist_mode = mode;
            let pool = SyncPool::from_config(&config)?;
            let ctx = GemmContext::new(&config).with_pool(&pool);
            assert_eq!(ctx.target(DistPair::MC_MR).redist_mode(), mode);

            for (oa, ob, a, b, c, expected) in &cases {
                for &algorithm in &ALGORITHMS {
                    if algorithm == GemmAlgorithm::Cannon && grid.height() != grid.width() {
                        continue;
                    }

                    for &pair in &[DistPair::MC_MR, DistPair::VR_STAR] {
                        let (ah, aw, bh, bw) = (a.height(), a.width(), b.height(), b.width());
                        let a = DistMatrix::from_fn(&grid, DistPair::MC_MR, ah, aw, |i, j| {
                            a.get(i, j)
                        });
                        let b = DistMatrix::from_fn(&grid, DistPair::STAR_VC, bh, bw, |i, j| {
                            b.get(i, j)
                        });
                        let mut out = DistMatrix::from_fn(&grid, pair, m, n, |i, j| c.get(i, j));

                        gemm(
                            *oa,
                            *ob,
                            2.0,
                            &a.view(),
                            &b.view(),
                            -1.0,
                            &mut out.view_mut(),
                            algorithm,
                            &ctx,
                        )?;

                        let mut result = DistMatrix::new(&grid, DistPair::STAR_STAR);
                        redist::copy(&out.view(), &mut result)?;
                        assert_eq!(
                            result.local().to_vec(),
                            expected.to_vec(),
                            "{:?} {:?} {:?} {}",
                            oa,
                            ob,
                            algorithm,
                            pair
                        );
                    }
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_variants_square_grid() {
        check_variants(4, 2, RedistMode::Auto);
    }

    #[test]
    fn test_variants_rectangular_grid() {
        check_variants(6, 2, RedistMode::Auto);
    }

    #[test]
    fn test_variants_general_redistribution() {
        check_variants(4, 2, RedistMode::General);
        check_variants(6, 2, RedistMode::General);
    }

    #[test]
    fn test_aligned_output_view() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 3)?;
            let config = small_config();
            let ctx = GemmContext::new(&config);

            let a = DistMatrix::from_fn(&grid, DistPair::VC_STAR, 4, 3, |i, j| (i + j) as f64);
            let b = DistMatrix::from_fn(&grid, DistPair::STAR_STAR, 3, 2, |i, j| {
                (i * j) as f64 + 1.0
            });
            let mut c = DistMatrix::new_aligned(&grid, DistPair::MC_MR, 6, 5, 2, 1, 0)?;

            for &algorithm in &ALGORITHMS[..5] {
                c.local_mut().fill(0.0);
                let mut view = c.view_range_mut(1, 2, 4, 2)?;
                gemm(N, N, 1.0, &a.view(), &b.view(), 1.0, &mut view, algorithm, &ctx)?;

                for i in 0..6 {
                    for j in 0..5 {
                        let expected = if (1..5).contains(&i) && (2..4).contains(&j) {
                            (0..3).map(|l| ((i - 1 + l) * (l * (j - 2) + 1)) as f64).sum::<f64>()
                        } else {
                            0.0
                        };
                        assert_eq!(c.get(i, j)?, expected, "{:?}", algorithm);
                    }
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_empty_inner_dimension() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let config = PerformanceConfig::default();
            let ctx = GemmContext::new(&config);

            let a = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 3, 0);
            let b = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 0, 4);
            let mut c = DistMatrix::from_fn(&grid, DistPair::MC_MR, 3, 4, |i, j| (i + j) as f64);

            gemm(
                N,
                N,
                1.0,
                &a.view(),
                &b.view(),
                3.0,
                &mut c.view_mut(),
                GemmAlgorithm::Default,
                &ctx,
            )?;

            for i in 0..3 {
                for j in 0..4 {
                    assert_eq!(c.get(i, j)?, 3.0 * (i + j) as f64);
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_errors() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm.clone(), 2)?;
            let other = Grid::with_height(comm, 2)?;
            let config = PerformanceConfig::default();
            let ctx = GemmContext::new(&config);

            let a = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 3, 2);
            let b = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 3, 4);
            let mut c = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 3, 4);

            let (dflt, cannon) = (GemmAlgorithm::Default, GemmAlgorithm::Cannon);
            let err = gemm(N, N, 1.0, &a.view(), &b.view(), 0.0, &mut c.view_mut(), dflt, &ctx)
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<LogicError>(), Some(LogicError::Nonconformal(_))));

            let t = Orientation::Transpose;
            let err = gemm(t, N, 1.0, &b.view(), &b.view(), 0.0, &mut c.view_mut(), cannon, &ctx);
            assert!(err.is_err());

            let sq = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 4, 4);
            let mut out = DistMatrix::<f64>::zeros(&grid, DistPair::MC_MR, 4, 4);
            let mut out_view = out.view_mut();
            let err = gemm(N, N, 1.0, &sq.view(), &sq.view(), 0.0, &mut out_view, cannon, &ctx)
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<LogicError>(),
                Some(LogicError::NonSquareGrid("cannon", 2, 3))
            ));

            let foreign = DistMatrix::<f64>::zeros(&other, DistPair::MC_MR, 4, 4);
            let err = gemm(N, N, 1.0, &foreign.view(), &sq.view(), 0.0, &mut out_view, dflt, &ctx)
                .unwrap_err();
            assert!(matches!(err.downcast_ref::<LogicError>(), Some(LogicError::GridMismatch)));

            Ok(())
        })
        .unwrap();
    }
}
