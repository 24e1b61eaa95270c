use crate::host::{host_zip, Policy};
use crate::{HostAccessor, HostMutAccessor, Reduction};
use gridla_core::prelude::*;

pub fn host_copy<T: Scalar>(
    policy: impl Policy,
    src: HostAccessor<'_, T>,
    dst: HostMutAccessor<'_, T>,
) {
    host_zip(policy, src, dst, |src, _| src);
}

/// Combines `src` into `dst` elementwise: `dst = reduction(dst, src)`.
pub fn host_fold<T: Scalar>(
    policy: impl Policy,
    src: HostAccessor<'_, T>,
    dst: HostMutAccessor<'_, T>,
    reduction: Reduction,
) -> Result {
    if reduction.data_type() != T::data_type() {
        bail!(
            "reduction {:?} cannot be applied to elements of type {}",
            reduction,
            T::data_type()
        );
    }

    host_zip(policy, src, dst, move |src, dst| reduction.combine(dst, src));
    Ok(())
}
