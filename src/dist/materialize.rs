//! Explicit two-step conversion of a matrix into a required distribution.
//!
//! [`needs_redistribution`] tells whether a matrix already satisfies a [`DistTarget`], and
//! [`materialize`] either borrows it or produces a redistributed copy.

use super::{DistInfo, DistMatrix, DistPair, DistView};
use crate::config::RedistMode;
use crate::prelude::*;
use crate::redist;

/// Distribution pair plus the alignments and root that a consumer requires. Unspecified values
/// accept whatever the matrix has. The mode only affects how a copy is produced.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DistTarget {
    pair: DistPair,
    col_align: Option<usize>,
    row_align: Option<usize>,
    root: Option<usize>,
    mode: RedistMode,
}

impl DistTarget {
    pub fn new(pair: DistPair) -> Self {
        Self {
            pair,
            col_align: None,
            row_align: None,
            root: None,
            mode: RedistMode::Auto,
        }
    }

    pub fn col_align(mut self, align: usize) -> Self {
        self.col_align = Some(align);
        self
    }

    pub fn row_align(mut self, align: usize) -> Self {
        self.row_align = Some(align);
        self
    }

    pub fn root(mut self, root: usize) -> Self {
        self.root = Some(root);
        self
    }

    pub fn mode(mut self, mode: RedistMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn pair(&self) -> DistPair {
        self.pair
    }

    pub fn redist_mode(&self) -> RedistMode {
        self.mode
    }

    pub fn is_satisfied_by(&self, info: &DistInfo) -> bool {
        let data = &info.data;
        let accepts = |want: Option<usize>, have: usize| want.map_or(true, |w| w == have);

        info.pair() == self.pair
            && accepts(self.col_align, data.col_align)
            && accepts(self.row_align, data.row_align)
            && (!self.pair.has_root() || accepts(self.root, data.root))
    }

    /// Empty matrix with this distribution, constrained where the target is specific.
    pub fn allocate<T: Scalar>(&self, like: &DistInfo) -> Result<DistMatrix<T>> {
        let mut out = DistMatrix::new(like.grid(), self.pair);

        if let Some(root) = self.root {
            out.set_root(root)?;
        }
        if let Some(align) = self.col_align {
            out.align_cols(align)?;
        }
        if let Some(align) = self.row_align {
            out.align_rows(align)?;
        }

        Ok(out)
    }
}

pub fn needs_redistribution<T: Scalar>(view: &DistView<'_, T>, target: &DistTarget) -> bool {
    !target.is_satisfied_by(view.info())
}

/// Either the original matrix or an owned copy in the target distribution.
#[derive(Debug)]
pub enum Materialized<'a, T> {
    Borrowed(DistView<'a, T>),
    Owned(DistMatrix<T>),
}

impl<'a, T: Scalar> Materialized<'a, T> {
    pub fn view(&self) -> DistView<'_, T> {
        match self {
            Materialized::Borrowed(view) => view.clone(),
            Materialized::Owned(matrix) => matrix.view(),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Materialized::Owned(_))
    }

    pub fn into_matrix(self) -> DistMatrix<T> {
        match self {
            Materialized::Borrowed(view) => view.to_matrix(),
            Materialized::Owned(matrix) => matrix,
        }
    }
}

/// Returns `view` itself if it satisfies `target` and a redistributed copy otherwise. Collective
/// over the grid whenever a copy is needed, which every process decides identically.
pub fn materialize<'a, T: Scalar>(
    view: &DistView<'a, T>,
    target: &DistTarget,
) -> Result<Materialized<'a, T>> {
    if !needs_redistribution(view, target) {
        return Ok(Materialized::Borrowed(view.clone()));
    }

    trace!("materializing {} as {:?}", view.pair(), target);
    let mut out = target.allocate(view.info())?;
    redist::copy_with(view, &mut out, target.mode)?;

    Ok(Materialized::Owned(out))
}
