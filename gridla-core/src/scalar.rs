//! Element types that can be stored in a matrix and sent over a communicator.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::{mem, slice};

pub trait Zero {
    fn zero() -> Self;
}

pub trait One {
    fn one() -> Self;
}

macro_rules! impl_one_zero {
    ($($t:ident)*) => {
        $(
        impl One for $t {
            fn one() -> Self { 1 as $t }
        }

        impl Zero for $t {
            fn zero() -> Self { 0 as $t }
        }
        )*
    }
}

impl_one_zero!(i8 i16 i32 i64 isize u8 u16 u32 u64 usize f32 f64);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum DataType {
    I32,
    I64,
    F32,
    F64,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        use DataType::*;
        match self {
            I32 => "int32",
            I64 => "int64",
            F32 => "float32",
            F64 => "float64",
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        use DataType::*;
        match self {
            I32 | F32 => 4,
            I64 | F64 => 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::I32 | DataType::I64)
    }

    pub fn is_float(&self) -> bool {
        !self.is_integer()
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod private {
    pub trait Sealed {}
}

/// A plain-old-data number. The trait is sealed: every implementor has no padding and no
/// invalid bit patterns, which is what makes [`as_bytes`] and [`as_bytes_mut`] sound.
pub trait Scalar:
    private::Sealed
    + Copy
    + Send
    + Sync
    + Debug
    + Display
    + Default
    + PartialEq
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    fn data_type() -> DataType;
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;

    /// Smallest value, negative infinity for floats.
    fn min_value() -> Self;

    /// Largest value, positive infinity for floats.
    fn max_value() -> Self;

    fn bit_and(self, rhs: Self) -> Self;
    fn bit_or(self, rhs: Self) -> Self;
}

/// Marker for floating-point scalars.
pub trait Float: Scalar {}

macro_rules! impl_scalar_int {
    ($($t:ident => $dtype:ident),*) => {
        $(
            impl private::Sealed for $t {}

            impl Scalar for $t {
                fn data_type() -> DataType { DataType::$dtype }
                fn from_f64(value: f64) -> Self { value as $t }
                fn to_f64(self) -> f64 { self as f64 }
                fn abs(self) -> Self { <$t>::abs(self) }
                fn min_value() -> Self { <$t>::MIN }
                fn max_value() -> Self { <$t>::MAX }
                fn bit_and(self, rhs: Self) -> Self { self & rhs }
                fn bit_or(self, rhs: Self) -> Self { self | rhs }
            }
        )*
    };
}

macro_rules! impl_scalar_float {
    ($($t:ident => $dtype:ident),*) => {
        $(
            impl private::Sealed for $t {}

            impl Scalar for $t {
                fn data_type() -> DataType { DataType::$dtype }
                fn from_f64(value: f64) -> Self { value as $t }
                fn to_f64(self) -> f64 { self as f64 }
                fn abs(self) -> Self { <$t>::abs(self) }
                fn min_value() -> Self { <$t>::NEG_INFINITY }
                fn max_value() -> Self { <$t>::INFINITY }
                fn bit_and(self, rhs: Self) -> Self {
                    <$t>::from_bits(self.to_bits() & rhs.to_bits())
                }
                fn bit_or(self, rhs: Self) -> Self {
                    <$t>::from_bits(self.to_bits() | rhs.to_bits())
                }
            }

            impl Float for $t {}
        )*
    };
}

impl_scalar_int!(i32 => I32, i64 => I64);
impl_scalar_float!(f32 => F32, f64 => F64);

pub fn as_bytes<T: Scalar>(data: &[T]) -> &[u8] {
    let len = data.len() * mem::size_of::<T>();
    unsafe { slice::from_raw_parts(data.as_ptr() as *const u8, len) }
}

pub fn as_bytes_mut<T: Scalar>(data: &mut [T]) -> &mut [u8] {
    let len = data.len() * mem::size_of::<T>();
    unsafe { slice::from_raw_parts_mut(data.as_mut_ptr() as *mut u8, len) }
}
