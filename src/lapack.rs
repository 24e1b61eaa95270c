//! Inverse and condition number of small distributed matrices.
//!
//! The matrix is replicated on every process and inverted locally, which is only sensible when it
//! fits in the memory of a single process.

use crate::blas;
use crate::comm;
use crate::dist::{DistMatrix, DistPair, DistView};
use crate::error::SingularMatrixError;
use crate::matrix::Matrix;
use crate::prelude::*;
use crate::redist;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormType {
    One,
    Infinity,
    Max,
    Frobenius,
}

pub fn norm<T: Scalar>(a: &DistView<'_, T>, kind: NormType) -> Result<f64> {
    match kind {
        NormType::One => blas::one_norm(a),
        NormType::Infinity => blas::infinity_norm(a),
        NormType::Max => blas::max_norm(a),
        NormType::Frobenius => blas::frobenius_norm(a),
    }
}

fn swap_rows<T: Scalar>(a: &mut Matrix<T>, x: usize, y: usize) {
    for j in 0..a.width() {
        let (u, v) = (a.get(x, j), a.get(y, j));
        a.set(x, j, v);
        a.set(y, j, u);
    }
}

/// Inverts `a` in place by Gauss-Jordan elimination with partial pivoting.
pub fn local_inverse<T: Float>(a: &mut Matrix<T>) -> Result {
    let n = a.height();
    if a.width() != n {
        bail!(LogicError::Nonconformal(format!(
            "inverse of a {}x{} matrix",
            n,
            a.width()
        )));
    }

    let mut inv = Matrix::from_fn(n, n, |i, j| if i == j { T::one() } else { T::zero() });

    for col in 0..n {
        let mut pivot = col;
        for i in col + 1..n {
            if a.get(i, col).abs() > a.get(pivot, col).abs() {
                pivot = i;
            }
        }

        if a.get(pivot, col) == T::zero() {
            bail!(SingularMatrixError { column: col });
        }

        if pivot != col {
            swap_rows(a, pivot, col);
            swap_rows(&mut inv, pivot, col);
        }

        let d = a.get(col, col);
        for j in 0..n {
            a.set(col, j, a.get(col, j) / d);
            inv.set(col, j, inv.get(col, j) / d);
        }

        for i in 0..n {
            let f = a.get(i, col);
            if i == col || f == T::zero() {
                continue;
            }

            for j in 0..n {
                a.set(i, j, a.get(i, j) - f * a.get(col, j));
                inv.set(i, j, inv.get(i, j) - f * inv.get(col, j));
            }
        }
    }

    a.view_mut().copy_from(inv.view());
    Ok(())
}

/// Replaces `a` by its inverse, keeping its distribution. Collective over the viewing
/// communicator so that every process reports a singular matrix.
pub fn inverse<T: Float>(a: &mut DistMatrix<T>) -> Result {
    if a.height() != a.width() {
        bail!(LogicError::Nonconformal(format!(
            "inverse of a {}x{} matrix",
            a.height(),
            a.width()
        )));
    }

    let sync = a.sync().clone();
    sync.check("inverse")?;

    let grid = a.grid().clone();
    let mut full = DistMatrix::new(&grid, DistPair::STAR_STAR);
    redist::copy(&a.view(), &mut full)?;

    // Index of the singular column, negative if the inverse exists.
    let mut status = [-1i64];
    if grid.in_grid() {
        if let Err(e) = local_inverse(full.local_mut()) {
            match e.downcast_ref::<SingularMatrixError>() {
                Some(singular) => status[0] = singular.column as i64,
                None => return Err(e),
            }
        }
    }

    comm::broadcast(&**grid.viewing_comm(), &mut status, 0, &sync)?;
    if status[0] >= 0 {
        debug!("inverse: matrix is singular in column {}", status[0]);
        bail!(SingularMatrixError {
            column: status[0] as usize
        });
    }

    redist::copy_to_view(&full.view(), &mut a.view_mut())
}

/// `norm(A) * norm(inverse(A))`, infinite for a singular matrix.
pub fn condition<T: Float>(a: &DistView<'_, T>, kind: NormType) -> Result<f64> {
    let norm_a = norm(a, kind)?;

    let mut inv = a.to_matrix();
    match inverse(&mut inv) {
        Ok(()) => Ok(norm_a * norm(&inv.view(), kind)?),
        Err(e) if e.is::<SingularMatrixError>() => Ok(f64::INFINITY),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blas::{gemm, GemmAlgorithm, GemmContext, Orientation};
    use crate::comm::run_local;
    use crate::config::PerformanceConfig;
    use crate::grid::Grid;

    #[test]
    fn test_local_inverse() {
        let mut a = Matrix::from_fn(2, 2, |i, j| [[4.0, 7.0], [2.0, 6.0]][i][j]);
        local_inverse(&mut a).unwrap();

        let expected = [[0.6, -0.7], [-0.2, 0.4]];
        for i in 0..2 {
            for j in 0..2 {
                assert!((a.get(i, j) - expected[i][j]).abs() < 1e-12);
            }
        }

        let mut singular = Matrix::from_fn(3, 3, |i, j| ((i + 1) * (j + 1)) as f64);
        let err = local_inverse(&mut singular).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SingularMatrixError>(),
            Some(&SingularMatrixError { column: 1 })
        );

        let mut rect = Matrix::<f32>::new(2, 3);
        assert!(local_inverse(&mut rect).is_err());
    }

    #[test]
    fn test_inverse() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let n = 6;
            let f = |i: usize, j: usize| {
                if i == j {
                    2.0 * n as f64
                } else {
                    ((i + 2 * j) % 3) as f64
                }
            };

            let mut a = DistMatrix::new(&grid, DistPair::MC_MR);
            a.align(1, 0)?;
            a.resize(n, n);
            for i in 0..n {
                for j in 0..n {
                    a.set(i, j, f(i, j))?;
                }
            }

            let original = a.clone();
            inverse(&mut a)?;
            assert_eq!((a.col_align(), a.row_align()), (1, 0));

            let config = PerformanceConfig::default();
            let mut product = DistMatrix::zeros(&grid, DistPair::MC_MR, n, n);
            gemm(
                Orientation::Normal,
                Orientation::Normal,
                1.0,
                &original.view(),
                &a.view(),
                0.0,
                &mut product.view_mut(),
                GemmAlgorithm::SummaC,
                &GemmContext::new(&config),
            )?;

            for i in 0..n {
                for j in 0..n {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((product.get(i, j)? - expected).abs() < 1e-12);
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_condition() {
        run_local(5, |comm| {
            let grid = Grid::with_shape(comm, 2, 2)?;

            let diagonal = DistMatrix::from_fn(&grid, DistPair::VC_STAR, 2, 2, |i, j| {
                if i != j {
                    0.0
                } else if i == 0 {
                    2.0
                } else {
                    4.0
                }
            });
            assert_eq!(condition(&diagonal.view(), NormType::One)?, 2.0);
            assert_eq!(condition(&diagonal.view(), NormType::Max)?, 2.0);

            let singular = DistMatrix::from_fn(&grid, DistPair::MC_MR, 3, 3, |i, j| {
                ((i + 1) * (j + 1)) as f64
            });
            assert_eq!(condition(&singular.view(), NormType::Infinity)?, f64::INFINITY);

            let mut copy = singular.clone();
            let err = inverse(&mut copy).unwrap_err();
            assert!(err.is::<SingularMatrixError>());

            Ok(())
        })
        .unwrap();
    }
}
