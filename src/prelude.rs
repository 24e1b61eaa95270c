pub use crate::error::{LogicError, RuntimeError};
pub use gridla_core::prelude::*;
pub use gridla_core::util::{div_ceil, gcd, lcm};
pub use gridla_memops::RayonPolicy;
