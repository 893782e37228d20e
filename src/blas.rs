//! Dense array kernels: AXPY variants, inner products and norms.
//!
//! These are the hot inner loops shared by every driver and smoother.
//! Reductions under the `parallel` feature are chunk-local partial sums
//! merged in chunk order, so the result is deterministic for a fixed
//! worker count.

use num_traits::Float;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum length before the parallel paths kick in.
#[cfg(feature = "parallel")]
const PAR_HOLDS: usize = 4096;

/// y += a * x.
pub fn axpy<T: Float + Send + Sync>(a: T, x: &[T], y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    #[cfg(feature = "parallel")]
    if x.len() > PAR_HOLDS {
        y.par_iter_mut().zip(x.par_iter()).for_each(|(yi, &xi)| *yi = *yi + a * xi);
        return;
    }
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = *yi + a * xi;
    }
}

/// y = a*x + b*y.
pub fn axpby<T: Float + Send + Sync>(a: T, x: &[T], b: T, y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = a * xi + b * *yi;
    }
}

/// z = a*x + y.
pub fn axpyz<T: Float>(a: T, x: &[T], y: &[T], z: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    for ((zi, &xi), &yi) in z.iter_mut().zip(x).zip(y) {
        *zi = a * xi + yi;
    }
}

/// Inner product x' y.
pub fn dot<T: Float + Send + Sync + std::iter::Sum>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    #[cfg(feature = "parallel")]
    if x.len() > PAR_HOLDS {
        return x
            .par_chunks(PAR_HOLDS)
            .zip(y.par_chunks(PAR_HOLDS))
            .map(|(xs, ys)| xs.iter().zip(ys).map(|(&a, &b)| a * b).sum::<T>())
            .collect::<Vec<_>>()
            .into_iter()
            .sum();
    }
    x.iter().zip(y).map(|(&a, &b)| a * b).sum()
}

/// l1 norm.
pub fn norm1<T: Float + Send + Sync + std::iter::Sum>(x: &[T]) -> T {
    x.iter().map(|v| v.abs()).sum()
}

/// Euclidean norm.
pub fn norm2<T: Float + Send + Sync + std::iter::Sum>(x: &[T]) -> T {
    dot(x, x).sqrt()
}

/// Max norm.
pub fn norminf<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |m, v| m.max(v.abs()))
}

/// Any NaN component? Used by the safe-net drivers.
pub fn has_nan<T: Float>(x: &[T]) -> bool {
    x.iter().any(|v| v.is_nan())
}
