use crate::host::{host_map, host_zip, Policy};
use crate::{HostAccessor, HostMutAccessor};
use gridla_core::prelude::*;

/// `dst = alpha * dst`
pub fn host_scale<T: Scalar>(policy: impl Policy, alpha: T, dst: HostMutAccessor<'_, T>) {
    if alpha == T::one() {
        return;
    }

    // A zero alpha overwrites, so that garbage such as NaN does not survive.
    if alpha == T::zero() {
        host_map(policy, dst, |_| T::zero());
    } else {
        host_map(policy, dst, move |x| alpha * x);
    }
}

/// `dst = alpha * src + dst`
pub fn host_axpy<T: Scalar>(
    policy: impl Policy,
    alpha: T,
    src: HostAccessor<'_, T>,
    dst: HostMutAccessor<'_, T>,
) {
    if alpha == T::one() {
        host_zip(policy, src, dst, |x, y| x + y);
    } else {
        host_zip(policy, src, dst, move |x, y| alpha * x + y);
    }
}
