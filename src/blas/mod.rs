//! Basic linear algebra on local and distributed matrices.

use serde::{Deserialize, Serialize};

mod contract;
pub mod gemm;
mod level1;
pub mod local;

pub use self::contract::axpy_contract;
pub use self::gemm::{gemm, GemmAlgorithm, GemmContext};
pub use self::level1::{
    axpy, diagonal_length, fill, frobenius_norm, get_diagonal, get_mapped_diagonal, infinity_norm,
    max_norm, one_norm, scale, transpose, uniform, zero,
};

/// How an operand enters a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Normal,
    Transpose,

    /// Conjugate transpose. Identical to `Transpose` for the real scalars supported here.
    Adjoint,
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Normal
    }
}

impl Orientation {
    pub fn is_transposed(self) -> bool {
        self != Orientation::Normal
    }
}
