//! Local column-major matrices and borrowed views into them.

use crate::prelude::*;
use crate::sync::SyncInfo;
use gridla_memops::{host_copy, host_fill, HostAccessor, HostMutAccessor};
use rayon::prelude::*;

// Number of elements spanned by a column-major `height x width` block.
fn span(height: usize, width: usize, ldim: usize) -> usize {
    if height == 0 || width == 0 {
        0
    } else {
        (width - 1) * ldim + height
    }
}

fn check_layout(
    context: &'static str,
    height: usize,
    width: usize,
    ldim: usize,
    len: usize,
) -> Result {
    if ldim < max(height, 1) {
        bail!(LogicError::Nonconformal(format!(
            "{}: leading dimension {} is smaller than height {}",
            context, ldim, height
        )));
    }

    let needed = span(height, width, ldim);
    if needed > len {
        bail!(RuntimeError::BufferSizeMismatch {
            context,
            expected: needed,
            actual: len,
        });
    }

    Ok(())
}

/// Owned, resizable, column-major matrix.
///
/// The buffer is only reallocated when a resize needs more elements than are available or fewer
/// than a quarter of them. Contents are unspecified after a resize.
#[derive(Debug, Clone)]
pub struct Matrix<T> {
    height: usize,
    width: usize,
    ldim: usize,
    data: Vec<T>,
    sync: SyncInfo,
}

impl<T: Scalar> Default for Matrix<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<T: Scalar> Matrix<T> {
    pub fn new(height: usize, width: usize) -> Self {
        Self::with_sync(height, width, SyncInfo::cpu())
    }

    pub fn with_sync(height: usize, width: usize, sync: SyncInfo) -> Self {
        let ldim = max(height, 1);

        Self {
            height,
            width,
            ldim,
            data: zeros(span(height, width, ldim)),
            sync,
        }
    }

    pub fn from_fn(height: usize, width: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut out = Self::new(height, width);
        for j in 0..width {
            for i in 0..height {
                out.data[i + j * out.ldim] = f(i, j);
            }
        }

        out
    }

    /// Takes ownership of an existing column-major buffer.
    pub fn attach(data: Vec<T>, height: usize, width: usize, ldim: usize) -> Result<Self> {
        check_layout("attach", height, width, ldim, data.len())?;

        Ok(Self {
            height,
            width,
            ldim,
            data,
            sync: SyncInfo::cpu(),
        })
    }

    /// Releases the underlying buffer, which has a leading dimension of `ldim()`.
    pub fn detach(self) -> Vec<T> {
        self.data
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ldim(&self) -> usize {
        self.ldim
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn sync(&self) -> &SyncInfo {
        &self.sync
    }

    pub fn set_sync(&mut self, sync: SyncInfo) {
        self.sync = sync;
    }

    pub fn resize(&mut self, height: usize, width: usize) {
        let ldim = max(height, 1);
        self.reshape(height, width, ldim);
    }

    pub fn resize_with_ldim(&mut self, height: usize, width: usize, ldim: usize) -> Result {
        if ldim < max(height, 1) {
            bail!(LogicError::Nonconformal(format!(
                "resize: leading dimension {} is smaller than height {}",
                ldim, height
            )));
        }

        self.reshape(height, width, ldim);
        Ok(())
    }

    fn reshape(&mut self, height: usize, width: usize, ldim: usize) {
        let needed = span(height, width, ldim);
        let capacity = self.data.len();

        if needed > capacity || needed * 4 < capacity {
            self.data = zeros(needed);
        }

        self.height = height;
        self.width = width;
        self.ldim = ldim;
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.view().get(i, j)
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        self.view_mut().set(i, j, value)
    }

    pub fn view(&self) -> MatrixView<'_, T> {
        MatrixView {
            height: self.height,
            width: self.width,
            ldim: self.ldim,
            data: &self.data[..span(self.height, self.width, self.ldim)],
        }
    }

    pub fn view_mut(&mut self) -> MatrixViewMut<'_, T> {
        let len = span(self.height, self.width, self.ldim);

        MatrixViewMut {
            height: self.height,
            width: self.width,
            ldim: self.ldim,
            data: &mut self.data[..len],
        }
    }

    pub fn sub_view(&self, i0: usize, j0: usize, height: usize, width: usize) -> MatrixView<'_, T> {
        self.view().sub_view(i0, j0, height, width)
    }

    pub fn sub_view_mut(
        &mut self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> MatrixViewMut<'_, T> {
        self.view_mut().into_sub_view(i0, j0, height, width)
    }

    pub fn accessor(&self) -> HostAccessor<'_, T> {
        self.view().accessor()
    }

    pub fn accessor_mut(&mut self) -> HostMutAccessor<'_, T> {
        self.view_mut().into_accessor()
    }

    pub fn fill(&mut self, value: T) {
        self.view_mut().fill(value);
    }

    pub fn zero(&mut self) {
        self.fill(T::zero());
    }

    /// Dense column-major copy of the contents, without padding.
    pub fn to_vec(&self) -> Vec<T> {
        self.view().to_vec()
    }
}

/// Borrowed, read-only view of a column-major block.
#[derive(Debug, Copy, Clone)]
pub struct MatrixView<'a, T> {
    height: usize,
    width: usize,
    ldim: usize,
    data: &'a [T],
}

impl<'a, T: Scalar> MatrixView<'a, T> {
    pub fn new(data: &'a [T], height: usize, width: usize, ldim: usize) -> Result<Self> {
        check_layout("MatrixView::new", height, width, ldim, data.len())?;

        Ok(Self {
            height,
            width,
            ldim,
            data: &data[..span(height, width, ldim)],
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ldim(&self) -> usize {
        self.ldim
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(
            i < self.height && j < self.width,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.height,
            self.width
        );

        self.data[i + j * self.ldim]
    }

    pub fn sub_view(&self, i0: usize, j0: usize, height: usize, width: usize) -> MatrixView<'a, T> {
        assert!(i0 + height <= self.height && j0 + width <= self.width);
        let len = span(height, width, self.ldim);

        let data = if len == 0 {
            &self.data[..0]
        } else {
            &self.data[i0 + j0 * self.ldim..][..len]
        };

        MatrixView {
            height,
            width,
            ldim: self.ldim,
            data,
        }
    }

    pub fn accessor(&self) -> HostAccessor<'a, T> {
        HostAccessor::column_major(self.data, self.height, self.width, self.ldim)
    }

    pub fn column(&self, j: usize) -> &'a [T] {
        assert!(j < self.width);
        &self.data[j * self.ldim..][..self.height]
    }

    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.height * self.width);
        for j in 0..self.width {
            out.extend_from_slice(self.column(j));
        }

        out
    }

    pub fn to_matrix(&self) -> Matrix<T> {
        let mut out = Matrix::new(self.height, self.width);
        out.view_mut().copy_from(*self);
        out
    }
}

/// Borrowed, mutable view of a column-major block. A view cannot be resized.
#[derive(Debug)]
pub struct MatrixViewMut<'a, T> {
    height: usize,
    width: usize,
    ldim: usize,
    data: &'a mut [T],
}

impl<'a, T: Scalar> MatrixViewMut<'a, T> {
    pub fn new(data: &'a mut [T], height: usize, width: usize, ldim: usize) -> Result<Self> {
        check_layout("MatrixViewMut::new", height, width, ldim, data.len())?;
        let len = span(height, width, ldim);

        Ok(Self {
            height,
            width,
            ldim,
            data: &mut data[..len],
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn ldim(&self) -> usize {
        self.ldim
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    pub fn as_view(&self) -> MatrixView<'_, T> {
        MatrixView {
            height: self.height,
            width: self.width,
            ldim: self.ldim,
            data: &*self.data,
        }
    }

    pub fn reborrow(&mut self) -> MatrixViewMut<'_, T> {
        MatrixViewMut {
            height: self.height,
            width: self.width,
            ldim: self.ldim,
            data: &mut *self.data,
        }
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.as_view().get(i, j)
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        assert!(
            i < self.height && j < self.width,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.height,
            self.width
        );

        self.data[i + j * self.ldim] = value;
    }

    pub fn sub_view_mut(
        &mut self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> MatrixViewMut<'_, T> {
        self.reborrow().into_sub_view(i0, j0, height, width)
    }

    pub fn into_sub_view(
        self,
        i0: usize,
        j0: usize,
        height: usize,
        width: usize,
    ) -> MatrixViewMut<'a, T> {
        assert!(i0 + height <= self.height && j0 + width <= self.width);
        let len = span(height, width, self.ldim);
        let ldim = self.ldim;
        let data = self.data;

        let data = if len == 0 {
            &mut data[..0]
        } else {
            &mut data[i0 + j0 * ldim..][..len]
        };

        MatrixViewMut {
            height,
            width,
            ldim,
            data,
        }
    }

    pub fn accessor(&self) -> HostAccessor<'_, T> {
        self.as_view().accessor()
    }

    pub fn accessor_mut(&mut self) -> HostMutAccessor<'_, T> {
        self.reborrow().into_accessor()
    }

    pub fn into_accessor(self) -> HostMutAccessor<'a, T> {
        HostMutAccessor::column_major(self.data, self.height, self.width, self.ldim)
    }

    pub fn column_mut(&mut self, j: usize) -> &mut [T] {
        assert!(j < self.width);
        &mut self.data[j * self.ldim..][..self.height]
    }

    /// Parallel iterator over the columns, in order.
    pub fn par_columns_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [T]> + '_ {
        let (height, ldim) = (self.height, self.ldim);
        self.data
            .par_chunks_mut(ldim)
            .map(move |column| &mut column[..height])
    }

    pub fn fill(&mut self, value: T) {
        host_fill(RayonPolicy, self.accessor_mut(), value);
    }

    pub fn copy_from(&mut self, src: MatrixView<'_, T>) {
        assert_eq!((self.height, self.width), (src.height(), src.width()));
        host_copy(RayonPolicy, src.accessor(), self.accessor_mut());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resize_policy() {
        let mut m = Matrix::<f64>::new(10, 10);
        assert_eq!(m.capacity(), 100);

        // Shrinking a little keeps the buffer.
        m.resize(6, 5);
        assert_eq!(m.capacity(), 100);
        assert_eq!(m.ldim(), 6);

        // Shrinking below a quarter reallocates.
        m.resize(4, 4);
        assert_eq!(m.capacity(), 16);

        m.resize(5, 5);
        assert_eq!(m.capacity(), 25);

        m.resize(0, 7);
        assert_eq!(m.ldim(), 1);
        assert_eq!(m.capacity(), 0);
        assert!(m.is_empty());

        assert!(m.resize_with_ldim(4, 2, 3).is_err());
        m.resize_with_ldim(4, 2, 8).unwrap();
        assert_eq!(m.capacity(), 12);
    }

    #[test]
    fn test_attach_detach() {
        let data: Vec<i32> = (0..12).collect();
        let m = Matrix::attach(data, 3, 3, 4).unwrap();
        assert_eq!(m.get(2, 1), 6);
        assert_eq!(m.to_vec(), vec![0, 1, 2, 4, 5, 6, 8, 9, 10]);
        assert_eq!(m.detach().len(), 12);

        let err = Matrix::attach(vec![0i32; 5], 3, 3, 3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RuntimeError>(),
            Some(RuntimeError::BufferSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_views() {
        let mut m = Matrix::from_fn(5, 4, |i, j| (10 * i + j) as i64);

        let v = m.sub_view(1, 2, 3, 2);
        assert_eq!(v.ldim(), 5);
        assert_eq!(v.get(0, 0), 12);
        assert_eq!(v.get(2, 1), 33);
        assert_eq!(v.sub_view(1, 1, 2, 1).to_vec(), vec![23, 33]);
        assert!(m.sub_view(5, 0, 0, 4).is_empty());

        let mut w = m.sub_view_mut(3, 0, 2, 4);
        w.fill(-1);
        w.set(0, 3, 99);
        assert_eq!(m.get(3, 3), 99);
        assert_eq!(m.get(4, 0), -1);
        assert_eq!(m.get(2, 0), 20);

        let copy = m.sub_view(0, 1, 2, 2).to_matrix();
        assert_eq!(copy.to_vec(), vec![1, 11, 2, 12]);
    }
}
