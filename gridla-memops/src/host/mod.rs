use crate::simplify_strides;
use crate::{HostAccessor, HostMutAccessor};
use gridla_core::prelude::*;
use std::mem;

pub(crate) mod elementwise;
pub(crate) mod fill;
pub(crate) mod pack;
pub(crate) mod reduce;

const WORK_SPLIT_THRESHOLD: usize = 1024 * 4;

#[derive(Copy, Clone)]
pub(super) struct UnsafeSendable<T>(pub(super) T);
unsafe impl<T> Send for UnsafeSendable<*mut T> {}
unsafe impl<T> Send for UnsafeSendable<*const T> {}
unsafe impl<T> Sync for UnsafeSendable<*mut T> {}
unsafe impl<T> Sync for UnsafeSendable<*const T> {}

fn count_bytes<T>(extents: [usize; 2]) -> usize {
    extents[0] * extents[1] * mem::size_of::<T>()
}

fn to_i64(values: [usize; 2]) -> [i64; 2] {
    [values[0] as i64, values[1] as i64]
}

pub trait Policy: Sized + Copy + Send {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send;
}

#[derive(Debug, Clone, Copy)]
pub struct RayonPolicy;
impl Policy for RayonPolicy {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(|| left(Self), || right(Self))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SequentialPolicy;
impl Policy for SequentialPolicy {
    fn join<A, B, RA, RB>(self, left: A, right: B) -> (RA, RB)
    where
        A: FnOnce(Self) -> RA + Send,
        B: FnOnce(Self) -> RB + Send,
        RA: Send,
        RB: Send,
    {
        (left(Self), right(Self))
    }
}

// Splits the index space `start..end` in halves along its longest axis until the amount of work
// drops below the threshold, then invokes `callback` on every leaf.
fn host_recur<P: Policy, const D: usize>(
    policy: P,
    work_amount: usize,
    start: [i64; D],
    end: [i64; D],
    callback: &(dyn Fn([i64; D], [i64; D]) + Sync),
) {
    let split_axis = (0..D)
        .map(|i| end[i] - start[i])
        .position_max()
        .unwrap_or(0);
    let half = (end[split_axis] - start[split_axis]) / 2;

    if work_amount > WORK_SPLIT_THRESHOLD && half >= 1 {
        let mut middle = start;
        middle[split_axis] += half;

        policy.join(
            move |policy| host_recur(policy, work_amount / 2, start, middle, callback),
            move |policy| host_recur(policy, work_amount / 2, middle, end, callback),
        );

        return;
    }

    callback(start, end);
}

// Visits `dst[i0, i1] = combine(src[i0, i1], dst[i0, i1])` for the leaf `start..end`.
unsafe fn zip_leaf<T: Copy, F: Fn(T, T) -> T>(
    start: [i64; 2],
    end: [i64; 2],
    src_ptr: *const T,
    src_strides: [i64; 2],
    dst_ptr: *mut T,
    dst_strides: [i64; 2],
    combine: F,
) {
    for i1 in start[1]..end[1] {
        for i0 in start[0]..end[0] {
            let src = src_ptr.offset((i0 * src_strides[0] + i1 * src_strides[1]) as isize);
            let dst = dst_ptr.offset((i0 * dst_strides[0] + i1 * dst_strides[1]) as isize);
            *dst = combine(*src, *dst);
        }
    }
}

// Visits `dst[i0, i1] = update(dst[i0, i1])` for the leaf `start..end`.
unsafe fn map_leaf<T: Copy, F: Fn(T) -> T>(
    start: [i64; 2],
    end: [i64; 2],
    dst_ptr: *mut T,
    dst_strides: [i64; 2],
    update: F,
) {
    for i1 in start[1]..end[1] {
        for i0 in start[0]..end[0] {
            let dst = dst_ptr.offset((i0 * dst_strides[0] + i1 * dst_strides[1]) as isize);
            *dst = update(*dst);
        }
    }
}

pub(super) fn host_zip<T, P, F>(
    policy: P,
    src: HostAccessor<'_, T>,
    mut dst: HostMutAccessor<'_, T>,
    combine: F,
) where
    T: Scalar,
    P: Policy,
    F: Fn(T, T) -> T + Sync,
{
    assert_eq!(src.extents(), dst.extents());

    let mut src_strides = to_i64(src.strides());
    let mut dst_strides = to_i64(dst.strides());
    let mut counts = to_i64(dst.extents());

    let (_, [dst_offset, src_offset]) =
        simplify_strides([&mut dst_strides, &mut src_strides], &mut counts);

    let src_ptr = UnsafeSendable(src.as_ptr().wrapping_offset(src_offset as isize));
    let dst_ptr = UnsafeSendable(dst.as_ptr_mut().wrapping_offset(dst_offset as isize));

    host_recur(
        policy,
        count_bytes::<T>(dst.extents()),
        [0; 2],
        counts,
        &move |p, q| unsafe {
            zip_leaf(
                p,
                q,
                src_ptr.0,
                src_strides,
                dst_ptr.0,
                dst_strides,
                &combine,
            )
        },
    );
}

pub(super) fn host_map<T, P, F>(policy: P, mut dst: HostMutAccessor<'_, T>, update: F)
where
    T: Scalar,
    P: Policy,
    F: Fn(T) -> T + Sync,
{
    let mut strides = to_i64(dst.strides());
    let mut counts = to_i64(dst.extents());

    let (_, [dst_offset]) = simplify_strides([&mut strides], &mut counts);
    let dst_ptr = UnsafeSendable(dst.as_ptr_mut().wrapping_offset(dst_offset as isize));

    host_recur(
        policy,
        count_bytes::<T>(dst.extents()),
        [0; 2],
        counts,
        &move |p, q| unsafe { map_leaf(p, q, dst_ptr.0, strides, &update) },
    );
}
