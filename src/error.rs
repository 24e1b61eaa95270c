//! Error taxonomy.
//!
//! Every operation returns an [`anyhow::Error`] wrapping one of the types below, so callers can
//! use `downcast_ref` to tell them apart. Logic and runtime errors are fatal: in an SPMD program
//! the only sane reaction is to abort the whole job. [`SingularMatrixError`] is the exception and
//! is meant to be caught.

use crate::comm::CommError;
use crate::dist::Dist;
use crate::prelude::*;
use crate::sync::Device;

/// Violated precondition, always detected before any communication takes place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogicError {
    #[error("nonconformal matrices: {0}")]
    Nonconformal(String),

    #[error("matrices are not defined over the same process grid")]
    GridMismatch,

    #[error("[{0},{1}] is not a valid distribution pair")]
    InvalidDistPair(Dist, Dist),

    #[error("{axis} alignment {align} is invalid for a {dist} distribution with stride {stride}")]
    InvalidAlignment {
        axis: &'static str,
        dist: Dist,
        align: usize,
        stride: usize,
    },

    #[error("root {root} is invalid for a [{col},{row}] distribution")]
    InvalidRoot { col: Dist, row: Dist, root: usize },

    #[error("{0} is not implemented for device {1:?}")]
    UnsupportedDevice(&'static str, Device),

    #[error("this process is not a member of the process grid")]
    NotInGrid,

    #[error("{0} requires a square process grid, found {1}x{2}")]
    NonSquareGrid(&'static str, usize, usize),

    #[error("process grid of {height}x{width} does not fit in a communicator of size {size}")]
    InvalidGridShape {
        height: usize,
        width: usize,
        size: usize,
    },

    #[error("index ({i}, {j}) is out of bounds for a {height}x{width} matrix")]
    OutOfBounds {
        i: usize,
        j: usize,
        height: usize,
        width: usize,
    },
}

/// Failure discovered during execution.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("buffer size mismatch in {context}: expected {expected} elements, found {actual}")]
    BufferSizeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Comm(#[from] CommError),
}

/// Numerical exception raised when a matrix that must be inverted is singular.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("matrix is singular: no nonzero pivot in column {column}")]
pub struct SingularMatrixError {
    pub column: usize,
}

pub(crate) fn check_size(context: &'static str, expected: usize, actual: usize) -> Result {
    if expected != actual {
        bail!(RuntimeError::BufferSizeMismatch {
            context,
            expected,
            actual
        });
    }

    Ok(())
}
