//! Two-dimensional process grid.
//!
//! Processes are arranged column-major over an `r x c` grid: the process with VC rank `q` sits at
//! row `q mod r` and column `q div r`. The grid owns every sub-communicator that the
//! distributions need. Constructing a grid is a collective over the communicator it is built
//! from. Processes of that communicator that do not fit in the grid become viewers: they own no
//! data but still take part in the operations over the viewing communicator.

use crate::comm::Communicator;
use crate::prelude::*;
use std::fmt;

/// Sub-communicators of a process that is a member of the grid.
#[derive(Debug)]
pub struct GridComms {
    /// All grid members ranked column-major.
    pub vc: Arc<dyn Communicator>,

    /// All grid members ranked row-major.
    pub vr: Arc<dyn Communicator>,

    /// Members of the same grid column, ranked by grid row.
    pub col: Arc<dyn Communicator>,

    /// Members of the same grid row, ranked by grid column.
    pub row: Arc<dyn Communicator>,

    /// Members of the same diagonal path, ranked by position along the path.
    pub md: Arc<dyn Communicator>,

    /// Members at the same position of every diagonal path, ranked by path.
    pub md_perp: Arc<dyn Communicator>,

    pub self_: Arc<dyn Communicator>,
}

struct GridInner {
    height: usize,
    width: usize,
    viewing: Arc<dyn Communicator>,
    comms: Option<GridComms>,
}

/// Shared handle to a process grid. Cloning is cheap and clones compare equal under
/// [`Grid::same`].
#[derive(Clone)]
pub struct Grid {
    inner: Arc<GridInner>,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("height", &self.inner.height)
            .field("width", &self.inner.width)
            .field("vc_rank", &self.vc_rank())
            .finish()
    }
}

/// Largest divisor of `p` that does not exceed `sqrt(p)`.
fn near_square_height(p: usize) -> usize {
    let mut r = max((p as f64).sqrt() as usize, 1);
    while r * r > p {
        r -= 1;
    }

    while r > 1 && p % r != 0 {
        r -= 1;
    }

    max(r, 1)
}

impl Grid {
    /// Builds the most square grid that uses every process of `comm`.
    pub fn new(comm: Arc<dyn Communicator>) -> Result<Self> {
        let r = near_square_height(comm.size());
        Self::with_height(comm, r)
    }

    pub fn with_height(comm: Arc<dyn Communicator>, height: usize) -> Result<Self> {
        let size = comm.size();
        if height == 0 || size % height != 0 {
            bail!(LogicError::InvalidGridShape {
                height,
                width: if height == 0 { 0 } else { size / height },
                size,
            });
        }

        Self::with_shape(comm, height, size / height)
    }

    /// Builds an `height x width` grid over the first `height * width` processes of `comm`.
    pub fn with_shape(comm: Arc<dyn Communicator>, height: usize, width: usize) -> Result<Self> {
        let size = comm.size();
        if height == 0 || width == 0 || height * width > size {
            bail!(LogicError::InvalidGridShape {
                height,
                width,
                size,
            });
        }

        let rank = comm.rank();
        let owner_color = if rank < height * width { Some(0) } else { None };
        let vc = comm.split(owner_color, rank).map_err(RuntimeError::from)?;

        let comms = match vc {
            Some(vc) => Some(Self::build_comms(vc, height, width)?),
            None => None,
        };

        debug!(
            "created {}x{} grid over {} processes (member: {})",
            height,
            width,
            size,
            comms.is_some()
        );

        Ok(Self {
            inner: Arc::new(GridInner {
                height,
                width,
                viewing: comm,
                comms,
            }),
        })
    }

    fn build_comms(vc: Arc<dyn Communicator>, r: usize, c: usize) -> Result<GridComms> {
        let q = vc.rank();
        let (row, col) = (q % r, q / r);
        let g = gcd(r, c);
        let path = (col % g + g - row % g) % g;
        let pos = md_position(r, c, row, col, path);

        let split = |color: usize, key: usize| -> Result<Arc<dyn Communicator>> {
            vc.split(Some(color), key)
                .map_err(RuntimeError::from)?
                .ok_or_else(|| anyhow!("split with a color returned no communicator"))
        };

        let vr = split(0, col + row * c)?;
        let col_comm = split(col, row)?;
        let row_comm = split(row, col)?;
        let md = split(path, pos)?;
        let md_perp = split(pos, path)?;
        let self_ = split(q, 0)?;

        Ok(GridComms {
            vc,
            vr,
            col: col_comm,
            row: row_comm,
            md,
            md_perp,
            self_,
        })
    }

    pub fn height(&self) -> usize {
        self.inner.height
    }

    pub fn width(&self) -> usize {
        self.inner.width
    }

    /// Number of processes in the grid, excluding viewers.
    pub fn size(&self) -> usize {
        self.inner.height * self.inner.width
    }

    pub fn gcd(&self) -> usize {
        gcd(self.height(), self.width())
    }

    /// Length of a diagonal path.
    pub fn lcm(&self) -> usize {
        lcm(self.height(), self.width())
    }

    /// Returns true if both handles refer to the same grid.
    pub fn same(&self, other: &Grid) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Communicator over every process, including viewers. The VC rank of a grid member equals
    /// its rank in this communicator.
    pub fn viewing_comm(&self) -> &Arc<dyn Communicator> {
        &self.inner.viewing
    }

    pub fn in_grid(&self) -> bool {
        self.inner.comms.is_some()
    }

    pub fn comms(&self) -> Result<&GridComms> {
        match &self.inner.comms {
            Some(comms) => Ok(comms),
            None => bail!(LogicError::NotInGrid),
        }
    }

    pub fn vc_rank(&self) -> Option<usize> {
        self.inner.comms.as_ref().map(|c| c.vc.rank())
    }

    pub fn row_of(&self, vc: usize) -> usize {
        vc % self.height()
    }

    pub fn col_of(&self, vc: usize) -> usize {
        vc / self.height()
    }

    pub fn vr_of(&self, vc: usize) -> usize {
        self.col_of(vc) + self.row_of(vc) * self.width()
    }

    pub fn vc_of_vr(&self, vr: usize) -> usize {
        let (row, col) = (vr / self.width(), vr % self.width());
        row + col * self.height()
    }

    pub fn vc_of(&self, row: usize, col: usize) -> usize {
        row + col * self.height()
    }

    /// Diagonal path through the process: `(col - row) mod gcd(r, c)`.
    pub fn path_of(&self, vc: usize) -> usize {
        let g = self.gcd();
        let (row, col) = (self.row_of(vc), self.col_of(vc));
        (col % g + g - row % g) % g
    }

    /// Position of the process along its diagonal path.
    pub fn md_pos_of(&self, vc: usize) -> usize {
        let (row, col) = (self.row_of(vc), self.col_of(vc));
        md_position(self.height(), self.width(), row, col, self.path_of(vc))
    }

    /// Process at position `pos` of diagonal path `path`.
    pub fn md_vc(&self, path: usize, pos: usize) -> usize {
        let (r, c) = (self.height(), self.width());
        self.vc_of(pos % r, (pos + path) % c)
    }
}

// Path `path` visits `(t mod r, (t + path) mod c)` for `t` in `0..lcm(r, c)`.
fn md_position(r: usize, c: usize, row: usize, col: usize, path: usize) -> usize {
    let l = lcm(r, c);

    (0..l / r)
        .map(|k| row + k * r)
        .find(|t| (t + path) % c == col)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comm::run_local;

    #[test]
    fn test_near_square() {
        assert_eq!(near_square_height(1), 1);
        assert_eq!(near_square_height(4), 2);
        assert_eq!(near_square_height(6), 2);
        assert_eq!(near_square_height(7), 1);
        assert_eq!(near_square_height(12), 3);
        assert_eq!(near_square_height(16), 4);
    }

    #[test]
    fn test_comm_sizes() {
        for &(p, r) in &[(6, 2), (8, 2), (6, 3), (4, 1)] {
            run_local(p, |comm| {
                let grid = Grid::with_height(comm, r)?;
                let c = p / r;
                let comms = grid.comms()?;
                let q = comms.vc.rank();

                assert_eq!(comms.vc.size(), p);
                assert_eq!(comms.vr.size(), p);
                assert_eq!(comms.vr.rank(), grid.vr_of(q));
                assert_eq!(grid.vc_of_vr(grid.vr_of(q)), q);

                assert_eq!(comms.col.size(), r);
                assert_eq!(comms.col.rank(), grid.row_of(q));
                assert_eq!(comms.row.size(), c);
                assert_eq!(comms.row.rank(), grid.col_of(q));

                assert_eq!(comms.md.size(), lcm(r, c));
                assert_eq!(comms.md.rank(), grid.md_pos_of(q));
                assert_eq!(comms.md_perp.size(), gcd(r, c));
                assert_eq!(comms.md_perp.rank(), grid.path_of(q));
                assert_eq!(comms.self_.size(), 1);

                Ok(())
            })
            .unwrap();
        }
    }

    #[test]
    fn test_members() {
        run_local(6, |comm| {
            let grid = Grid::new(comm)?;
            assert_eq!((grid.height(), grid.width()), (2, 3));

            let comms = grid.comms()?;
            let q = comms.vc.rank() as u8;
            let mut members = vec![0u8; 3];
            comms.row.all_gather(&[q], &mut members)?;

            // Same grid row, increasing column.
            let row = grid.row_of(q as usize);
            let expected = (0..3).map(|col| grid.vc_of(row, col) as u8).collect_vec();
            assert_eq!(members, expected);

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_diagonal_paths() {
        for &(r, c) in &[(2, 2), (2, 4), (3, 2), (4, 6)] {
            run_local(r * c, |comm| {
                let grid = Grid::with_height(comm, r)?;

                for q in 0..r * c {
                    let (path, pos) = (grid.path_of(q), grid.md_pos_of(q));
                    assert!(path < grid.gcd() && pos < grid.lcm());
                    assert_eq!(grid.md_vc(path, pos), q);
                }

                Ok(())
            })
            .unwrap();
        }
    }

    #[test]
    fn test_viewers() {
        let members = run_local(5, |comm| {
            let rank = comm.rank();
            let grid = Grid::with_shape(comm, 2, 2)?;
            assert_eq!(grid.viewing_comm().size(), 5);

            if rank == 4 {
                assert!(!grid.in_grid());
                let err = grid.comms().unwrap_err();
                assert_eq!(err.downcast_ref::<LogicError>(), Some(&LogicError::NotInGrid));
            } else {
                assert_eq!(grid.vc_rank(), Some(rank));
            }

            Ok(grid.in_grid())
        })
        .unwrap();

        assert_eq!(members, vec![true, true, true, true, false]);

        let err = run_local(4, |comm| Grid::with_height(comm, 3).map(|_| ())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LogicError>(),
            Some(LogicError::InvalidGridShape { .. })
        ));
    }
}
