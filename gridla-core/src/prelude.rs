pub use crate::scalar::{Float, One, Scalar, Zero};
pub use anyhow::{anyhow, bail, ensure, Context as _, Error};
pub use itertools::{all, any, enumerate, rev as reversed, zip, Itertools as _};
pub use log::{debug, error, info, trace, warn};
pub use parking_lot::Mutex;
pub use std::cmp::{max, min};
pub use std::convert::{TryFrom, TryInto};
pub use std::error::Error as StdError;
pub use std::mem::{replace, swap, take};
pub use std::sync::Arc;
pub use thiserror::Error;

pub type HashSet<K> = std::collections::HashSet<K, fxhash::FxBuildHasher>;
pub type HashMap<K, V> = std::collections::HashMap<K, V, fxhash::FxBuildHasher>;
pub type Result<T = (), E = Error> = std::result::Result<T, E>;

#[inline(always)]
pub fn default<T: Default>() -> T {
    T::default()
}

/// Allocates a vector of `n` zeros. Used for every temporary pack buffer.
pub fn zeros<T: Scalar>(n: usize) -> Vec<T> {
    vec![T::zero(); n]
}
