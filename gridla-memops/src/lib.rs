pub use accessor::{HostAccessor, HostMutAccessor};
pub use host::elementwise::{host_axpy, host_scale};
pub use host::fill::host_fill;
pub use host::pack::{pack_part, strided_pack, strided_unpack, unpack_part, AxisPart, AxisPartition};
pub use host::reduce::{host_copy, host_fold};
pub use host::{Policy, RayonPolicy, SequentialPolicy};
pub use reduction::{Reduction, ReductionFunction};

mod accessor;
mod host;
mod reduction;

// This function simplifies the strides of arrays when applying element-wise functions to them.
// It takes two inputs:
//  * An array of D strides for N arrays. It is assumed that strides[0] is the `leading' stride,
//    i.e. the array for which it is most important that access is contiguous.
//  * An array of D counts (i.e, number of elements along each axis)
//
// It performs the following operations
//  * Negative value of the leading strides are inverted
//  * Axes are sorted according to the leading strides (Fortran order, lowest stride first)
//  * Axes are merged if possible.
//
// For a column-major matrix whose leading dimension equals its height, both axes merge into a
// single contiguous run.
//
// The function returns
//  * The number of dimensions that result after merging (in range 1..D)
//  * The offsets that must be added to each pointer to compensate for correcting negative strides.
fn simplify_strides<const N: usize, const D: usize>(
    strides: [&mut [i64; D]; N],
    counts: &mut [i64; D],
) -> (usize, [i64; N]) {
    assert!(D > 0);

    // If any count is zero, early exit
    for i in 0..D {
        if counts[i] <= 0 {
            *counts = [0; D];
            return (0, [0; N]);
        }
    }

    // Convert strides to positive
    let mut ptr_offsets = [0; N];
    for i in 0..D {
        if strides[0][i] < 0 && counts[i] > 0 {
            for j in 0..N {
                ptr_offsets[j] += strides[j][i] * (counts[i] - 1);
                strides[j][i] *= -1;
            }
        }
    }

    // Set stride to zero for unit dimensions.
    for i in 0..D {
        if counts[i] == 1 {
            for j in 0..N {
                strides[j][i] = 0;
            }
        }
    }

    // Sort strides from lowest to highest
    for _ in 0..D {
        for i in 1..D {
            if (strides[0][i - 1] > strides[0][i] || counts[i - 1] == 1) && counts[i] != 1 {
                counts.swap(i - 1, i);

                for j in 0..N {
                    strides[j].swap(i - 1, i);
                }
            }
        }
    }

    // Attempt to merge axes
    let mut ndims = 1;
    for i in 1..D {
        let mut mergeable = true;

        for j in 0..N {
            mergeable &= strides[j][ndims - 1] * counts[ndims - 1] == strides[j][i];
        }

        if mergeable {
            counts[ndims - 1] *= counts[i];
            counts[i] = 1;

            for j in 0..N {
                strides[j][i] = 0;
            }
        } else if counts[i] > 1 {
            counts.swap(ndims, i);

            for j in 0..N {
                strides[j].swap(ndims, i);
            }

            ndims += 1;
        }
    }

    (ndims, ptr_offsets)
}
