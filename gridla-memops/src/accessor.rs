//! Borrowed two-dimensional strided views over host memory.
//!
//! Both accessors are bounds-checked when they are created, which is what allows the kernels in
//! this crate to work with raw pointers internally.

use gridla_core::prelude::*;
use std::fmt;
use std::marker::PhantomData;

fn fits(len: usize, extents: [usize; 2], strides: [usize; 2]) -> bool {
    if extents[0] == 0 || extents[1] == 0 {
        return true;
    }

    (extents[0] - 1) * strides[0] + (extents[1] - 1) * strides[1] < len
}

// Two distinct index pairs never map onto the same element.
fn is_injective(extents: [usize; 2], strides: [usize; 2]) -> bool {
    let [n0, n1] = extents;
    let [s0, s1] = strides;

    if n0 <= 1 && n1 <= 1 {
        true
    } else if n1 <= 1 {
        s0 > 0
    } else if n0 <= 1 {
        s1 > 0
    } else {
        (s0 > 0 && s1 >= n0 * s0) || (s1 > 0 && s0 >= n1 * s1)
    }
}

fn check_subview(
    extents: [usize; 2],
    offset: [usize; 2],
    new_extents: [usize; 2],
    step: [usize; 2],
) -> bool {
    (0..2).all(|i| new_extents[i] == 0 || offset[i] + (new_extents[i] - 1) * step[i] < extents[i])
}

#[derive(Copy, Clone)]
pub struct HostAccessor<'a, T> {
    ptr: *const T,
    extents: [usize; 2],
    strides: [usize; 2],
    phantom: PhantomData<&'a [T]>,
}

impl<'a, T: Scalar> HostAccessor<'a, T> {
    pub fn new(data: &'a [T], extents: [usize; 2], strides: [usize; 2]) -> Self {
        assert!(
            fits(data.len(), extents, strides),
            "accessor {:?} with strides {:?} exceeds buffer of length {}",
            extents,
            strides,
            data.len()
        );

        Self {
            ptr: data.as_ptr(),
            extents,
            strides,
            phantom: PhantomData,
        }
    }

    pub fn column_major(data: &'a [T], height: usize, width: usize, ldim: usize) -> Self {
        Self::new(data, [height, width], [1, ldim])
    }

    pub fn extents(&self) -> [usize; 2] {
        self.extents
    }

    pub fn strides(&self) -> [usize; 2] {
        self.strides
    }

    pub fn is_empty(&self) -> bool {
        self.extents[0] == 0 || self.extents[1] == 0
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.extents[0] && j < self.extents[1]);
        unsafe { *self.ptr.add(i * self.strides[0] + j * self.strides[1]) }
    }

    /// Selects the elements `offset + t * step` along both axes.
    pub fn subview(&self, offset: [usize; 2], extents: [usize; 2], step: [usize; 2]) -> Self {
        assert!(check_subview(self.extents, offset, extents, step));

        let (ptr, strides) = if extents[0] == 0 || extents[1] == 0 {
            (self.ptr, self.strides)
        } else {
            let delta = offset[0] * self.strides[0] + offset[1] * self.strides[1];
            let ptr = self.ptr.wrapping_add(delta);
            (ptr, [self.strides[0] * step[0], self.strides[1] * step[1]])
        };

        Self {
            ptr,
            extents,
            strides,
            phantom: PhantomData,
        }
    }

    /// The same elements with both axes swapped.
    pub fn transposed(&self) -> Self {
        Self {
            ptr: self.ptr,
            extents: [self.extents[1], self.extents[0]],
            strides: [self.strides[1], self.strides[0]],
            phantom: PhantomData,
        }
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }
}

impl<T> fmt::Debug for HostAccessor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAccessor")
            .field("extents", &self.extents)
            .field("strides", &self.strides)
            .finish()
    }
}

pub struct HostMutAccessor<'a, T> {
    ptr: *mut T,
    extents: [usize; 2],
    strides: [usize; 2],
    phantom: PhantomData<&'a mut [T]>,
}

impl<'a, T: Scalar> HostMutAccessor<'a, T> {
    pub fn new(data: &'a mut [T], extents: [usize; 2], strides: [usize; 2]) -> Self {
        assert!(
            fits(data.len(), extents, strides),
            "accessor {:?} with strides {:?} exceeds buffer of length {}",
            extents,
            strides,
            data.len()
        );
        assert!(
            is_injective(extents, strides),
            "mutable accessor {:?} with strides {:?} aliases itself",
            extents,
            strides
        );

        Self {
            ptr: data.as_mut_ptr(),
            extents,
            strides,
            phantom: PhantomData,
        }
    }

    pub fn column_major(data: &'a mut [T], height: usize, width: usize, ldim: usize) -> Self {
        Self::new(data, [height, width], [1, ldim])
    }

    pub fn extents(&self) -> [usize; 2] {
        self.extents
    }

    pub fn strides(&self) -> [usize; 2] {
        self.strides
    }

    pub fn is_empty(&self) -> bool {
        self.extents[0] == 0 || self.extents[1] == 0
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.as_const().get(i, j)
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        assert!(i < self.extents[0] && j < self.extents[1]);
        unsafe {
            *self.ptr.add(i * self.strides[0] + j * self.strides[1]) = value;
        }
    }

    pub fn as_const(&self) -> HostAccessor<'_, T> {
        HostAccessor {
            ptr: self.ptr,
            extents: self.extents,
            strides: self.strides,
            phantom: PhantomData,
        }
    }

    pub fn reborrow(&mut self) -> HostMutAccessor<'_, T> {
        HostMutAccessor {
            ptr: self.ptr,
            extents: self.extents,
            strides: self.strides,
            phantom: PhantomData,
        }
    }

    /// Selects the elements `offset + t * step` along both axes.
    pub fn subview(
        &mut self,
        offset: [usize; 2],
        extents: [usize; 2],
        step: [usize; 2],
    ) -> HostMutAccessor<'_, T> {
        assert!(check_subview(self.extents, offset, extents, step));

        let (ptr, strides) = if extents[0] == 0 || extents[1] == 0 {
            (self.ptr, self.strides)
        } else {
            let delta = offset[0] * self.strides[0] + offset[1] * self.strides[1];
            let ptr = self.ptr.wrapping_add(delta);
            (ptr, [self.strides[0] * step[0], self.strides[1] * step[1]])
        };

        HostMutAccessor {
            ptr,
            extents,
            strides,
            phantom: PhantomData,
        }
    }

    pub fn as_ptr_mut(&mut self) -> *mut T {
        self.ptr
    }
}

impl<T> fmt::Debug for HostMutAccessor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMutAccessor")
            .field("extents", &self.extents)
            .field("strides", &self.strides)
            .finish()
    }
}
