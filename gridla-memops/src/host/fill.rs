use crate::host::{host_map, Policy};
use crate::HostMutAccessor;
use gridla_core::prelude::*;

pub fn host_fill<T: Scalar>(policy: impl Policy, dst: HostMutAccessor<'_, T>, value: T) {
    host_map(policy, dst, move |_| value);
}
