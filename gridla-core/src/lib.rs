mod index;
pub mod prelude;
mod scalar;
pub mod util;

pub use index::*;
pub use scalar::*;
