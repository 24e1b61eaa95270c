//! Distributions of a matrix over a process grid.
//!
//! A distribution is a pair of per-axis rules. The column distribution decides which processes
//! hold which rows (the index along the height). The row distribution decides the same for the
//! columns (the index along the width).

use crate::grid::Grid;
use crate::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

mod info;
mod materialize;
mod matrix;

pub use self::info::{dist_comm, dist_rank, dist_stride, AxisLayout, DistInfo};
pub use self::materialize::{materialize, needs_redistribution, DistTarget, Materialized};
pub use self::matrix::{DistMatrix, DistView, DistViewMut};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dist {
    /// Cyclic over the grid rows.
    Mc,

    /// Cyclic over the grid columns.
    Mr,

    /// Cyclic over all processes in column-major order.
    Vc,

    /// Cyclic over all processes in row-major order.
    Vr,

    /// Replicated.
    Star,

    /// Held entirely by a single process.
    Circ,

    /// Cyclic along one diagonal path of the grid.
    Md,
}

impl Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dist::Mc => "MC",
            Dist::Mr => "MR",
            Dist::Vc => "VC",
            Dist::Vr => "VR",
            Dist::Star => "STAR",
            Dist::Circ => "CIRC",
            Dist::Md => "MD",
        };

        f.write_str(name)
    }
}

/// Matrix axis. `Col` is the axis governed by the column distribution, i.e. the height.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Axis {
    Col,
    Row,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::Col => Axis::Row,
            Axis::Row => Axis::Col,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::Col => "column",
            Axis::Row => "row",
        }
    }
}

/// A valid combination of a column and a row distribution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DistPair {
    col: Dist,
    row: Dist,
}

macro_rules! pair {
    ($col:ident, $row:ident) => {
        DistPair {
            col: Dist::$col,
            row: Dist::$row,
        }
    };
}

impl DistPair {
    pub const CIRC_CIRC: DistPair = pair!(Circ, Circ);
    pub const MC_MR: DistPair = pair!(Mc, Mr);
    pub const MC_STAR: DistPair = pair!(Mc, Star);
    pub const MD_STAR: DistPair = pair!(Md, Star);
    pub const MR_MC: DistPair = pair!(Mr, Mc);
    pub const MR_STAR: DistPair = pair!(Mr, Star);
    pub const STAR_MC: DistPair = pair!(Star, Mc);
    pub const STAR_MD: DistPair = pair!(Star, Md);
    pub const STAR_MR: DistPair = pair!(Star, Mr);
    pub const STAR_STAR: DistPair = pair!(Star, Star);
    pub const STAR_VC: DistPair = pair!(Star, Vc);
    pub const STAR_VR: DistPair = pair!(Star, Vr);
    pub const VC_STAR: DistPair = pair!(Vc, Star);
    pub const VR_STAR: DistPair = pair!(Vr, Star);

    /// Every valid pair. The order is used to break ties deterministically.
    pub const ALL: [DistPair; 14] = [
        Self::CIRC_CIRC,
        Self::MC_MR,
        Self::MC_STAR,
        Self::MD_STAR,
        Self::MR_MC,
        Self::MR_STAR,
        Self::STAR_MC,
        Self::STAR_MD,
        Self::STAR_MR,
        Self::STAR_STAR,
        Self::STAR_VC,
        Self::STAR_VR,
        Self::VC_STAR,
        Self::VR_STAR,
    ];

    pub fn new(col: Dist, row: Dist) -> Result<Self> {
        let pair = DistPair { col, row };

        if !Self::ALL.contains(&pair) {
            bail!(LogicError::InvalidDistPair(col, row));
        }

        Ok(pair)
    }

    pub fn col(&self) -> Dist {
        self.col
    }

    pub fn row(&self) -> Dist {
        self.row
    }

    pub fn dist(&self, axis: Axis) -> Dist {
        match axis {
            Axis::Col => self.col,
            Axis::Row => self.row,
        }
    }

    /// Position in [`DistPair::ALL`].
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }

    /// The pair with both distributions swapped. This is valid for every valid pair.
    pub fn transposed(&self) -> DistPair {
        DistPair {
            col: self.row,
            row: self.col,
        }
    }

    /// The pair with the distribution of `axis` replaced, if that pair is valid.
    pub fn with(&self, axis: Axis, dist: Dist) -> Option<DistPair> {
        let pair = match axis {
            Axis::Col => DistPair { col: dist, row: self.row },
            Axis::Row => DistPair { col: self.col, row: dist },
        };

        if Self::ALL.contains(&pair) {
            Some(pair)
        } else {
            None
        }
    }

    /// Whether the `root` of the distribution data has a meaning for this pair.
    pub fn has_root(&self) -> bool {
        self.col == Dist::Circ || self.col == Dist::Md || self.row == Dist::Md
    }
}

impl Display for DistPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.col, self.row)
    }
}

/// Compatibility key of a distributed matrix. Grids are compared by identity.
#[derive(Debug, Clone)]
pub struct DistData {
    pub col_dist: Dist,
    pub row_dist: Dist,
    pub col_align: usize,
    pub row_align: usize,
    pub root: usize,
    pub grid: Grid,
}

impl PartialEq for DistData {
    fn eq(&self, other: &Self) -> bool {
        self.col_dist == other.col_dist
            && self.row_dist == other.row_dist
            && self.col_align == other.col_align
            && self.row_align == other.row_align
            && self.root == other.root
            && self.grid.same(&other.grid)
    }
}

impl DistData {
    pub fn pair(&self) -> DistPair {
        DistPair {
            col: self.col_dist,
            row: self.row_dist,
        }
    }

    pub fn align(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.col_align,
            Axis::Row => self.row_align,
        }
    }

    pub(crate) fn set_align(&mut self, axis: Axis, align: usize) {
        match axis {
            Axis::Col => self.col_align = align,
            Axis::Row => self.row_align = align,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_valid_pairs() {
        let dists = [
            Dist::Mc,
            Dist::Mr,
            Dist::Vc,
            Dist::Vr,
            Dist::Star,
            Dist::Circ,
            Dist::Md,
        ];

        let valid = dists
            .iter()
            .cartesian_product(dists.iter())
            .filter(|&(&c, &r)| DistPair::new(c, r).is_ok())
            .count();
        assert_eq!(valid, 14);

        let err = DistPair::new(Dist::Vc, Dist::Vr).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LogicError>(),
            Some(&LogicError::InvalidDistPair(Dist::Vc, Dist::Vr))
        );
        assert_eq!(err.to_string(), "[VC,VR] is not a valid distribution pair");

        for (index, pair) in enumerate(&DistPair::ALL) {
            assert_eq!(pair.index(), index);
            assert!(DistPair::ALL.contains(&pair.transposed()));
        }

        assert_eq!(DistPair::MC_MR.with(Axis::Row, Dist::Star), Some(DistPair::MC_STAR));
        assert_eq!(DistPair::MC_MR.with(Axis::Row, Dist::Vc), None);
        assert!(DistPair::STAR_MD.has_root());
        assert!(!DistPair::VC_STAR.has_root());
    }
}
