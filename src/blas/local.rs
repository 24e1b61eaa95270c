//! Sequential-semantics kernels on local matrices. The work is spread over the rayon pool.

use super::Orientation;
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::prelude::*;
use gridla_memops::{host_axpy, host_copy, host_scale};
use rayon::prelude::*;

fn dims(orient: Orientation, a: MatrixView<'_, impl Scalar>) -> (usize, usize) {
    match orient {
        Orientation::Normal => (a.height(), a.width()),
        Orientation::Transpose | Orientation::Adjoint => (a.width(), a.height()),
    }
}

/// `C = alpha * op(A) * op(B) + beta * C`. A zero `beta` overwrites `C`.
pub fn gemm<T: Scalar>(
    orient_a: Orientation,
    orient_b: Orientation,
    alpha: T,
    a: MatrixView<'_, T>,
    b: MatrixView<'_, T>,
    beta: T,
    mut c: MatrixViewMut<'_, T>,
) -> Result {
    let (m, k) = dims(orient_a, a);
    let (kb, n) = dims(orient_b, b);

    if k != kb || (m, n) != (c.height(), c.width()) {
        bail!(LogicError::Nonconformal(format!(
            "local gemm: op(A) is {}x{}, op(B) is {}x{} and C is {}x{}",
            m,
            k,
            kb,
            n,
            c.height(),
            c.width()
        )));
    }

    let op_b = move |l: usize, j: usize| match orient_b {
        Orientation::Normal => b.get(l, j),
        _ => b.get(j, l),
    };

    c.par_columns_mut().enumerate().for_each(|(j, column)| {
        if beta == T::zero() {
            column.iter_mut().for_each(|x| *x = T::zero());
        } else if beta != T::one() {
            column.iter_mut().for_each(|x| *x = beta * *x);
        }

        match orient_a {
            Orientation::Normal => {
                for l in 0..k {
                    let factor = alpha * op_b(l, j);
                    for (x, &y) in zip(column.iter_mut(), a.column(l)) {
                        *x = *x + factor * y;
                    }
                }
            }
            Orientation::Transpose | Orientation::Adjoint => {
                for (i, x) in enumerate(column.iter_mut()) {
                    let mut sum = T::zero();
                    for (l, &y) in enumerate(a.column(i)) {
                        sum = sum + y * op_b(l, j);
                    }
                    *x = *x + alpha * sum;
                }
            }
        }
    });

    Ok(())
}

pub fn transpose<T: Scalar>(src: MatrixView<'_, T>, dst: MatrixViewMut<'_, T>) {
    assert_eq!((src.height(), src.width()), (dst.width(), dst.height()));
    host_copy(RayonPolicy, src.accessor().transposed(), dst.into_accessor());
}

pub fn scale<T: Scalar>(alpha: T, dst: MatrixViewMut<'_, T>) {
    host_scale(RayonPolicy, alpha, dst.into_accessor());
}

/// `Y = alpha * X + Y`
pub fn axpy<T: Scalar>(alpha: T, x: MatrixView<'_, T>, y: MatrixViewMut<'_, T>) -> Result {
    if (x.height(), x.width()) != (y.height(), y.width()) {
        bail!(LogicError::Nonconformal(format!(
            "axpy of a {}x{} matrix into a {}x{} matrix",
            x.height(),
            x.width(),
            y.height(),
            y.width()
        )));
    }

    host_axpy(RayonPolicy, alpha, x.accessor(), y.into_accessor());
    Ok(())
}
