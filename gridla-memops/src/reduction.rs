use gridla_core::{DataType, Scalar};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReductionFunction {
    Max,
    Min,
    Sum,
    Product,
    And,
    Or,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Reduction {
    fun: ReductionFunction,
    dtype: DataType,
}

impl Reduction {
    /// Returns `None` if `fun` is not defined for `dtype`: bitwise reductions of floats.
    pub fn new(fun: ReductionFunction, dtype: DataType) -> Option<Self> {
        use ReductionFunction::*;

        let supported = match fun {
            Min | Max | Sum | Product => true,
            And | Or => dtype.is_integer(),
        };

        if supported {
            Some(Self { fun, dtype })
        } else {
            None
        }
    }

    pub fn sum<T: Scalar>() -> Self {
        Self {
            fun: ReductionFunction::Sum,
            dtype: T::data_type(),
        }
    }

    pub fn max<T: Scalar>() -> Self {
        Self {
            fun: ReductionFunction::Max,
            dtype: T::data_type(),
        }
    }

    pub fn function(&self) -> ReductionFunction {
        self.fun
    }

    pub fn data_type(&self) -> DataType {
        self.dtype
    }

    pub fn identity<T: Scalar>(&self) -> T {
        use ReductionFunction::*;
        debug_assert_eq!(T::data_type(), self.dtype);

        match self.fun {
            Sum | Or => T::zero(),
            Product => T::one(),
            And => T::zero() - T::one(),
            Max => T::min_value(),
            Min => T::max_value(),
        }
    }

    #[inline]
    pub fn combine<T: Scalar>(&self, lhs: T, rhs: T) -> T {
        use ReductionFunction::*;

        match self.fun {
            Sum => lhs + rhs,
            Product => lhs * rhs,
            Min => {
                if rhs < lhs {
                    rhs
                } else {
                    lhs
                }
            }
            Max => {
                if rhs > lhs {
                    rhs
                } else {
                    lhs
                }
            }
            And => lhs.bit_and(rhs),
            Or => lhs.bit_or(rhs),
        }
    }
}
