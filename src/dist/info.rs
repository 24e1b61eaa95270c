use super::{Axis, Dist, DistData, DistPair};
use crate::comm::Communicator;
use crate::grid::{Grid, GridComms};
use crate::prelude::*;
use gridla_core::{length, max_length, owner, shift};

/// Number of processes an axis with distribution `dist` is dealt over.
pub fn dist_stride(grid: &Grid, dist: Dist) -> usize {
    match dist {
        Dist::Star | Dist::Circ => 1,
        Dist::Mc => grid.height(),
        Dist::Mr => grid.width(),
        Dist::Vc | Dist::Vr => grid.size(),
        Dist::Md => grid.lcm(),
    }
}

/// Position of VC rank `q` in the cyclic pattern of `dist`.
pub fn dist_rank(grid: &Grid, dist: Dist, q: usize) -> usize {
    match dist {
        Dist::Star | Dist::Circ => 0,
        Dist::Mc => grid.row_of(q),
        Dist::Mr => grid.col_of(q),
        Dist::Vc => q,
        Dist::Vr => grid.vr_of(q),
        Dist::Md => grid.md_pos_of(q),
    }
}

/// Communicator over the processes among which an axis with distribution `dist` is divided. The
/// rank of a process in it equals its [`dist_rank`].
pub fn dist_comm(comms: &GridComms, dist: Dist) -> &Arc<dyn Communicator> {
    match dist {
        Dist::Star | Dist::Circ => &comms.self_,
        Dist::Mc => &comms.col,
        Dist::Mr => &comms.row,
        Dist::Vc => &comms.vc,
        Dist::Vr => &comms.vr,
        Dist::Md => &comms.md,
    }
}

/// Indices `shift + t * stride` of one axis held by one process.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AxisLayout {
    pub shift: usize,
    pub stride: usize,
}

impl AxisLayout {
    pub fn len(&self, n: usize) -> usize {
        length(n, self.shift, self.stride)
    }

    pub fn contains(&self, i: usize) -> bool {
        i % self.stride == self.shift
    }

    pub fn local_index(&self, i: usize) -> usize {
        debug_assert!(self.contains(i));
        (i - self.shift) / self.stride
    }

    pub fn global_index(&self, local: usize) -> usize {
        self.shift + local * self.stride
    }
}

// Set of VC ranks holding one index of one axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Holders {
    Any,
    Row(usize),
    Col(usize),
    Exactly(usize),
    Nobody,
}

/// Dimensions and distribution data of a distributed matrix, from which the layout held by every
/// process can be computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DistInfo {
    pub height: usize,
    pub width: usize,
    pub data: DistData,
}

impl DistInfo {
    pub fn new(height: usize, width: usize, data: DistData) -> Self {
        Self {
            height,
            width,
            data,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.data.grid
    }

    pub fn pair(&self) -> DistPair {
        self.data.pair()
    }

    pub fn dist(&self, axis: Axis) -> Dist {
        self.pair().dist(axis)
    }

    pub fn align(&self, axis: Axis) -> usize {
        self.data.align(axis)
    }

    pub fn root(&self) -> usize {
        self.data.root
    }

    pub fn extent(&self, axis: Axis) -> usize {
        match axis {
            Axis::Col => self.height,
            Axis::Row => self.width,
        }
    }

    pub fn stride(&self, axis: Axis) -> usize {
        dist_stride(self.grid(), self.dist(axis))
    }

    pub fn col_stride(&self) -> usize {
        self.stride(Axis::Col)
    }

    pub fn row_stride(&self) -> usize {
        self.stride(Axis::Row)
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Whether VC rank `q` holds any part of the matrix's index space.
    pub fn participates(&self, q: usize) -> bool {
        if q >= self.grid().size() {
            return false;
        }

        let pair = self.pair();
        if pair.col() == Dist::Circ {
            q == self.root()
        } else if pair.col() == Dist::Md || pair.row() == Dist::Md {
            self.grid().path_of(q) == self.root()
        } else {
            true
        }
    }

    pub fn axis_layout(&self, axis: Axis, q: usize) -> AxisLayout {
        let stride = self.stride(axis);
        let rank = dist_rank(self.grid(), self.dist(axis), q);

        AxisLayout {
            shift: shift(rank, self.align(axis), stride),
            stride,
        }
    }

    /// Layouts of both axes held by VC rank `q`, or `None` if it holds nothing.
    pub fn layout_of(&self, q: usize) -> Option<(AxisLayout, AxisLayout)> {
        if !self.participates(q) {
            return None;
        }

        Some((self.axis_layout(Axis::Col, q), self.axis_layout(Axis::Row, q)))
    }

    /// Layout held by the calling process.
    pub fn local_layout(&self) -> Option<(AxisLayout, AxisLayout)> {
        self.grid().vc_rank().and_then(|q| self.layout_of(q))
    }

    pub fn local_dims_of(&self, q: usize) -> (usize, usize) {
        match self.layout_of(q) {
            Some((cl, rl)) => (cl.len(self.height), rl.len(self.width)),
            None => (0, 0),
        }
    }

    pub fn local_dims(&self) -> (usize, usize) {
        match self.local_layout() {
            Some((cl, rl)) => (cl.len(self.height), rl.len(self.width)),
            None => (0, 0),
        }
    }

    /// Largest local dimensions over all processes.
    pub fn max_local_dims(&self) -> (usize, usize) {
        (
            max_length(self.height, self.col_stride()),
            max_length(self.width, self.row_stride()),
        )
    }

    pub fn holds(&self, q: usize, i: usize, j: usize) -> bool {
        match self.layout_of(q) {
            Some((cl, rl)) => cl.contains(i) && rl.contains(j),
            None => false,
        }
    }

    fn axis_holders(&self, axis: Axis, i: usize) -> Holders {
        let grid = self.grid();
        let dist = self.dist(axis);
        let o = owner(i, self.align(axis), dist_stride(grid, dist));

        match dist {
            Dist::Star => Holders::Any,
            Dist::Mc => Holders::Row(o),
            Dist::Mr => Holders::Col(o),
            Dist::Vc => Holders::Exactly(o),
            Dist::Vr => Holders::Exactly(grid.vc_of_vr(o)),
            Dist::Md => Holders::Exactly(grid.md_vc(self.root(), o)),
            Dist::Circ => Holders::Exactly(self.root()),
        }
    }

    /// Lowest VC rank holding entry `(i, j)`.
    pub fn owner(&self, i: usize, j: usize) -> Option<usize> {
        let grid = self.grid();
        let admits = |h: Holders, q: usize| match h {
            Holders::Any => true,
            Holders::Row(x) => grid.row_of(q) == x,
            Holders::Col(y) => grid.col_of(q) == y,
            Holders::Exactly(x) => x == q,
            Holders::Nobody => false,
        };

        let a = self.axis_holders(Axis::Col, i);
        let b = self.axis_holders(Axis::Row, j);

        let both = match (a, b) {
            (Holders::Any, x) | (x, Holders::Any) => x,
            (Holders::Row(x), Holders::Col(y)) | (Holders::Col(y), Holders::Row(x)) => {
                Holders::Exactly(grid.vc_of(x, y))
            }
            (Holders::Exactly(q), other) | (other, Holders::Exactly(q)) => {
                if admits(other, q) {
                    Holders::Exactly(q)
                } else {
                    Holders::Nobody
                }
            }
            (x, y) if x == y => x,
            _ => Holders::Nobody,
        };

        match both {
            Holders::Any => Some(0),
            Holders::Row(x) => Some(grid.vc_of(x, 0)),
            Holders::Col(y) => Some(grid.vc_of(0, y)),
            Holders::Exactly(q) => Some(q),
            Holders::Nobody => None,
        }
    }

    /// Checks that `align` is valid for the distribution of `axis`.
    pub fn check_align(&self, axis: Axis, align: usize) -> Result {
        let stride = self.stride(axis);

        if align >= stride {
            bail!(LogicError::InvalidAlignment {
                axis: axis.name(),
                dist: self.dist(axis),
                align,
                stride,
            });
        }

        Ok(())
    }

    pub fn check_root(&self, root: usize) -> Result {
        let pair = self.pair();
        let limit = if pair.col() == Dist::Circ {
            self.grid().size()
        } else if pair.has_root() {
            self.grid().gcd()
        } else {
            1
        };

        if root >= limit {
            bail!(LogicError::InvalidRoot {
                col: pair.col(),
                row: pair.row(),
                root,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::run_local;
    use rand::prelude::*;

    fn info(
        grid: &Grid,
        pair: DistPair,
        h: usize,
        w: usize,
        ca: usize,
        ra: usize,
        root: usize,
    ) -> DistInfo {
        DistInfo::new(
            h,
            w,
            DistData {
                col_dist: pair.col(),
                row_dist: pair.row(),
                col_align: ca,
                row_align: ra,
                root,
                grid: grid.clone(),
            },
        )
    }

    #[test]
    fn test_every_entry_has_owner() {
        run_local(6, |comm| {
            let grid = Grid::with_height(comm, 2)?;
            let mut rng = SmallRng::seed_from_u64(0);

            for &pair in &DistPair::ALL {
                for _ in 0..5 {
                    let ca = rng.gen_range(0..dist_stride(&grid, pair.col()));
                    let ra = rng.gen_range(0..dist_stride(&grid, pair.row()));
                    let root = if pair.col() == Dist::Circ {
                        rng.gen_range(0..6)
                    } else if pair.has_root() {
                        rng.gen_range(0..grid.gcd())
                    } else {
                        0
                    };

                    let info = info(&grid, pair, 7, 5, ca, ra, root);
                    let mut total = 0;
                    for q in 0..6 {
                        let (lh, lw) = info.local_dims_of(q);
                        total += lh * lw;
                    }

                    for i in 0..7 {
                        for j in 0..5 {
                            let q = info.owner(i, j).unwrap();
                            assert!(info.holds(q, i, j), "{} ({}, {})", pair, i, j);
                            assert!((0..q).all(|x| !info.holds(x, i, j)));
                        }
                    }

                    // Distinct entries times the number of replicas.
                    let replicas = (0..6).filter(|&q| info.holds(q, 0, 0)).count();
                    assert_eq!(total, 35 * replicas, "{}", pair);
                }
            }

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_local_dims() {
        run_local(4, |comm| {
            let grid = Grid::new(comm)?;
            let q = grid.vc_rank().unwrap();

            let a = info(&grid, DistPair::MC_MR, 7, 5, 1, 0, 0);
            let (row, col) = (grid.row_of(q), grid.col_of(q));
            let expected_h = if row == 1 { 4 } else { 3 };
            let expected_w = if col == 0 { 3 } else { 2 };
            assert_eq!(a.local_dims(), (expected_h, expected_w));
            assert_eq!(a.max_local_dims(), (4, 3));

            let c = info(&grid, DistPair::CIRC_CIRC, 7, 5, 0, 0, 3);
            assert_eq!(c.local_dims(), if q == 3 { (7, 5) } else { (0, 0) });
            assert!(c.check_root(4).is_err());

            assert!(a.check_align(Axis::Col, 2).is_err());
            assert!(a.check_align(Axis::Row, 1).is_ok());

            Ok(())
        })
        .unwrap();
    }
}
