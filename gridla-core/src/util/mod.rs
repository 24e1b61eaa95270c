//! Collection of utility functions.

pub use self::drop_guard::*;
use crate::scalar::{One, Zero};
use std::ops::{Add, Div, Rem};

mod drop_guard;

/// Divide `x` by `y` and round up towards infinity. For example, `21/5 =  4.2` thus
/// `div_ceil(21,5) == 5`.
pub fn div_ceil<T>(x: T, y: T) -> T
where
    T: One + Zero + Div<Output = T> + Rem<Output = T> + Add<Output = T> + PartialOrd + Copy,
{
    let (q, r) = (x / y, x % y);
    if r != T::zero() && (x >= T::zero()) == (y >= T::zero()) {
        q + T::one()
    } else {
        q
    }
}

pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }

    a
}

pub fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}
