use super::{Axis, DistData, DistInfo, DistPair};
use crate::blas::local;
use crate::comm;
use crate::grid::Grid;
use crate::matrix::{Matrix, MatrixView, MatrixViewMut};
use crate::prelude::*;
use crate::sync::{Device, StreamId, SyncInfo};
use gridla_core::local_offset;

fn check_range(info: &DistInfo, i0: usize, j0: usize, height: usize, width: usize) -> Result {
    if i0 + height > info.height || j0 + width > info.width {
        bail!(LogicError::Nonconformal(format!(
            "range of {}x{} at ({}, {}) exceeds a {}x{} matrix",
            height, width, i0, j0, info.height, info.width
        )));
    }

    Ok(())
}

fn check_index(info: &DistInfo, i: usize, j: usize) -> Result {
    if i >= info.height || j >= info.width {
        bail!(LogicError::OutOfBounds {
            i,
            j,
            height: info.height,
            width: info.width,
        });
    }

    Ok(())
}

// Local offset and length of the global range `start..start + len` along `axis`.
fn local_range(info: &DistInfo, axis: Axis, start: usize, len: usize) -> (usize, usize) {
    let layout = match (info.local_layout(), axis) {
        (Some((cl, _)), Axis::Col) => cl,
        (Some((_, rl)), Axis::Row) => rl,
        (None, _) => return (0, 0),
    };

    let begin = local_offset(start, layout.shift, layout.stride);
    let end = local_offset(start + len, layout.shift, layout.stride);
    (begin, end - begin)
}

// Distribution of the submatrix starting at `(i0, j0)`. Global index 0 of the submatrix is index
// `i0` of the parent, so the alignment moves along with the offset.
fn sub_info(info: &DistInfo, i0: usize, j0: usize, height: usize, width: usize) -> DistInfo {
    let mut data = info.data.clone();
    data.col_align = (data.col_align + i0) % info.col_stride();
    data.row_align = (data.row_align + j0) % info.row_stride();

    DistInfo::new(height, width, data)
}

/// Matrix distributed over a process grid. Every process owns the local block selected by the
/// distribution pair, the alignments and the root.
///
/// Alignments and the root are either constrained by the user or free. A redistribution into a
/// matrix overwrites the free ones with values compatible with the source.
#[derive(Debug, Clone)]
pub struct DistMatrix<T> {
    info: DistInfo,
    col_constrained: bool,
    row_constrained: bool,
    root_constrained: bool,
    local: Matrix<T>,
}

impl<T: Scalar> DistMatrix<T> {
    /// Empty matrix with free alignments.
    pub fn new(grid: &Grid, pair: DistPair) -> Self {
        Self::with_sync(grid, pair, SyncInfo::cpu())
    }

    /// Empty matrix whose local data lives on `device`.
    pub fn with_device(grid: &Grid, pair: DistPair, device: Device) -> Self {
        Self::with_sync(grid, pair, SyncInfo::new(device, StreamId::DEFAULT))
    }

    fn with_sync(grid: &Grid, pair: DistPair, sync: SyncInfo) -> Self {
        let data = DistData {
            col_dist: pair.col(),
            row_dist: pair.row(),
            col_align: 0,
            row_align: 0,
            root: 0,
            grid: grid.clone(),
        };

        Self {
            info: DistInfo::new(0, 0, data),
            col_constrained: false,
            row_constrained: false,
            root_constrained: false,
            local: Matrix::with_sync(0, 0, sync),
        }
    }

    /// Zero matrix with constrained alignments and root.
    pub fn new_aligned(
        grid: &Grid,
        pair: DistPair,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        root: usize,
    ) -> Result<Self> {
        let mut out = Self::new(grid, pair);
        out.set_root(root)?;
        out.align(col_align, row_align)?;
        out.resize(height, width);
        out.local.zero();

        Ok(out)
    }

    pub fn zeros(grid: &Grid, pair: DistPair, height: usize, width: usize) -> Self {
        let mut out = Self::new(grid, pair);
        out.resize(height, width);
        out.local.zero();
        out
    }

    /// Matrix whose entry `(i, j)` is `f(i, j)`. Every process only evaluates the entries it holds.
    pub fn from_fn(
        grid: &Grid,
        pair: DistPair,
        height: usize,
        width: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        let mut out = Self::zeros(grid, pair, height, width);

        if let Some((cl, rl)) = out.info.local_layout() {
            for jl in 0..out.local.width() {
                for il in 0..out.local.height() {
                    let value = f(cl.global_index(il), rl.global_index(jl));
                    out.local.set(il, jl, value);
                }
            }
        }

        out
    }

    pub fn info(&self) -> &DistInfo {
        &self.info
    }

    pub fn data(&self) -> &DistData {
        &self.info.data
    }

    pub fn grid(&self) -> &Grid {
        self.info.grid()
    }

    pub fn pair(&self) -> DistPair {
        self.info.pair()
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn col_align(&self) -> usize {
        self.info.data.col_align
    }

    pub fn row_align(&self) -> usize {
        self.info.data.row_align
    }

    pub fn root(&self) -> usize {
        self.info.data.root
    }

    pub fn local(&self) -> &Matrix<T> {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Matrix<T> {
        &mut self.local
    }

    pub fn local_height(&self) -> usize {
        self.local.height()
    }

    pub fn local_width(&self) -> usize {
        self.local.width()
    }

    pub fn sync(&self) -> &SyncInfo {
        self.local.sync()
    }

    pub fn is_constrained(&self, axis: Axis) -> bool {
        match axis {
            Axis::Col => self.col_constrained,
            Axis::Row => self.row_constrained,
        }
    }

    pub fn is_root_constrained(&self) -> bool {
        self.root_constrained
    }

    /// Changes the global dimensions. Local contents are unspecified afterwards.
    pub fn resize(&mut self, height: usize, width: usize) {
        self.info.height = height;
        self.info.width = width;
        self.refresh_local();
    }

    fn refresh_local(&mut self) {
        let (lh, lw) = self.info.local_dims();
        self.local.resize(lh, lw);
    }

    pub fn align(&mut self, col_align: usize, row_align: usize) -> Result {
        self.info.check_align(Axis::Col, col_align)?;
        self.info.check_align(Axis::Row, row_align)?;

        self.info.data.col_align = col_align;
        self.info.data.row_align = row_align;
        self.col_constrained = true;
        self.row_constrained = true;
        self.refresh_local();

        Ok(())
    }

    pub fn align_cols(&mut self, align: usize) -> Result {
        self.align_axis(Axis::Col, align)
    }

    pub fn align_rows(&mut self, align: usize) -> Result {
        self.align_axis(Axis::Row, align)
    }

    fn align_axis(&mut self, axis: Axis, align: usize) -> Result {
        self.info.check_align(axis, align)?;

        self.info.data.set_align(axis, align);
        match axis {
            Axis::Col => self.col_constrained = true,
            Axis::Row => self.row_constrained = true,
        }
        self.refresh_local();

        Ok(())
    }

    pub fn set_root(&mut self, root: usize) -> Result {
        self.info.check_root(root)?;

        self.info.data.root = root;
        self.root_constrained = true;
        self.refresh_local();

        Ok(())
    }

    /// Lets the next redistribution into this matrix choose the alignments and the root.
    pub fn free_alignments(&mut self) {
        self.col_constrained = false;
        self.row_constrained = false;
        self.root_constrained = false;
    }

    // Sets the layout without changing the constraints. Local contents are unspecified afterwards.
    pub(crate) fn set_layout(&mut self, col_align: usize, row_align: usize, root: usize) {
        self.info.data.col_align = col_align;
        self.info.data.row_align = row_align;
        self.info.data.root = root;
        self.refresh_local();
    }

    /// Entry `(i, j)`. Collective over the viewing communicator of the grid: the owner broadcasts.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        self.view().get(i, j)
    }

    /// Sets entry `(i, j)` on every process holding it. Involves no communication.
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result {
        check_index(&self.info, i, j)?;
        self.sync().check("set")?;

        if let Some((cl, rl)) = self.info.local_layout() {
            if cl.contains(i) && rl.contains(j) {
                self.local
                    .set(cl.local_index(i), rl.local_index(j), value);
            }
        }

        Ok(())
    }

    pub fn get_local(&self, il: usize, jl: usize) -> T {
        self.local.get(il, jl)
    }

    pub fn set_local(&mut self, il: usize, jl: usize, value: T) {
        self.local.set(il, jl, value);
    }

    /// Global row of local row `il`.
    pub fn global_row(&self, il: usize) -> usize {
        assert!(il < self.local.height());
        self.info
            .local_layout()
            .map_or(il, |(cl, _)| cl.global_index(il))
    }

    /// Global column of local column `jl`.
    pub fn global_col(&self, jl: usize) -> usize {
        assert!(jl < self.local.width());
        self.info
            .local_layout()
            .map_or(jl, |(_, rl)| rl.global_index(jl))
    }

    pub fn view(&self) -> DistView<'_, T> {
        DistView {
            info: self.info.clone(),
            local: self.local.view(),
            sync: self.local.sync().clone(),
        }
    }

    pub fn view_mut(&mut self) -> DistViewMut<'_, T> {
        let sync = self.local.sync().clone();

        DistViewMut {
            info: self.info.clone(),
            local: self.local.view_mut(),
            sync,
        }
    }

    pub fn view_range(
        &self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> Result<DistView<'_, T>> {
        self.view().view_range(i0, j0, height, width)
    }

    pub fn view_range_mut(
        &mut self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> Result<DistViewMut<'_, T>> {
        self.view_mut().into_range(i0, j0, height, width)
    }

    /// The transposed matrix, distributed with the swapped pair. Involves no communication.
    pub fn transpose(&self) -> DistMatrix<T> {
        let mut out = self.view().transpose();
        out.col_constrained = self.row_constrained;
        out.row_constrained = self.col_constrained;
        out.root_constrained = self.root_constrained;
        out
    }
}

/// Read-only view of a rectangular part of a distributed matrix.
#[derive(Debug, Clone)]
pub struct DistView<'a, T> {
    info: DistInfo,
    local: MatrixView<'a, T>,
    sync: SyncInfo,
}

impl<'a, T: Scalar> DistView<'a, T> {
    pub fn info(&self) -> &DistInfo {
        &self.info
    }

    pub fn data(&self) -> &DistData {
        &self.info.data
    }

    pub fn grid(&self) -> &Grid {
        self.info.grid()
    }

    pub fn pair(&self) -> DistPair {
        self.info.pair()
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn col_align(&self) -> usize {
        self.info.data.col_align
    }

    pub fn row_align(&self) -> usize {
        self.info.data.row_align
    }

    pub fn root(&self) -> usize {
        self.info.data.root
    }

    pub fn local(&self) -> MatrixView<'a, T> {
        self.local
    }

    pub fn sync(&self) -> &SyncInfo {
        &self.sync
    }

    pub fn view_range(
        &self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> Result<DistView<'a, T>> {
        check_range(&self.info, i0, j0, height, width)?;

        let (li, lh) = local_range(&self.info, Axis::Col, i0, height);
        let (lj, lw) = local_range(&self.info, Axis::Row, j0, width);

        Ok(DistView {
            info: sub_info(&self.info, i0, j0, height, width),
            local: self.local.sub_view(li, lj, lh, lw),
            sync: self.sync.clone(),
        })
    }

    /// Entry `(i, j)`. Collective over the viewing communicator of the grid: the owner broadcasts.
    pub fn get(&self, i: usize, j: usize) -> Result<T> {
        check_index(&self.info, i, j)?;
        self.sync.check("get")?;

        let owner = self
            .info
            .owner(i, j)
            .ok_or_else(|| anyhow!("no process holds entry ({}, {})", i, j))?;

        let mut value = [T::zero()];
        if self.grid().vc_rank() == Some(owner) {
            if let Some((cl, rl)) = self.info.local_layout() {
                value[0] = self.local.get(cl.local_index(i), rl.local_index(j));
            }
        }

        comm::broadcast(&**self.grid().viewing_comm(), &mut value, owner, &self.sync)?;
        Ok(value[0])
    }

    /// Copy of the viewed entries, distributed exactly like the view.
    pub fn to_matrix(&self) -> DistMatrix<T> {
        DistMatrix {
            info: self.info.clone(),
            col_constrained: true,
            row_constrained: true,
            root_constrained: true,
            local: {
                let mut local = self.local.to_matrix();
                local.set_sync(self.sync.clone());
                local
            },
        }
    }

    /// The transposed entries, distributed with the swapped pair.
    pub fn transpose(&self) -> DistMatrix<T> {
        let data = &self.info.data;
        let info = DistInfo::new(
            self.info.width,
            self.info.height,
            DistData {
                col_dist: data.row_dist,
                row_dist: data.col_dist,
                col_align: data.row_align,
                row_align: data.col_align,
                root: data.root,
                grid: data.grid.clone(),
            },
        );

        let mut local = Matrix::with_sync(
            self.local.width(),
            self.local.height(),
            self.sync.clone(),
        );
        local::transpose(self.local, local.view_mut());

        DistMatrix {
            info,
            col_constrained: false,
            row_constrained: false,
            root_constrained: false,
            local,
        }
    }
}

/// Mutable view of a rectangular part of a distributed matrix. The view cannot be resized or
/// realigned.
#[derive(Debug)]
pub struct DistViewMut<'a, T> {
    info: DistInfo,
    local: MatrixViewMut<'a, T>,
    sync: SyncInfo,
}

impl<'a, T: Scalar> DistViewMut<'a, T> {
    pub fn info(&self) -> &DistInfo {
        &self.info
    }

    pub fn data(&self) -> &DistData {
        &self.info.data
    }

    pub fn grid(&self) -> &Grid {
        self.info.grid()
    }

    pub fn pair(&self) -> DistPair {
        self.info.pair()
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn sync(&self) -> &SyncInfo {
        &self.sync
    }

    pub fn as_view(&self) -> DistView<'_, T> {
        DistView {
            info: self.info.clone(),
            local: self.local.as_view(),
            sync: self.sync.clone(),
        }
    }

    pub fn reborrow(&mut self) -> DistViewMut<'_, T> {
        DistViewMut {
            info: self.info.clone(),
            local: self.local.reborrow(),
            sync: self.sync.clone(),
        }
    }

    pub fn local(&self) -> MatrixView<'_, T> {
        self.local.as_view()
    }

    pub fn local_mut(&mut self) -> MatrixViewMut<'_, T> {
        self.local.reborrow()
    }

    pub fn view_range_mut(
        &mut self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> Result<DistViewMut<'_, T>> {
        self.reborrow().into_range(i0, j0, height, width)
    }

    pub fn into_range(
        self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> Result<DistViewMut<'a, T>> {
        check_range(&self.info, i0, j0, height, width)?;

        let (li, lh) = local_range(&self.info, Axis::Col, i0, height);
        let (lj, lw) = local_range(&self.info, Axis::Row, j0, width);

        Ok(DistViewMut {
            info: sub_info(&self.info, i0, j0, height, width),
            local: self.local.into_sub_view(li, lj, lh, lw),
            sync: self.sync,
        })
    }
}
