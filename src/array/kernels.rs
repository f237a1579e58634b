//! Element-wise device kernels (broadcast fill, bulk copy)

use crate::config::ExecutionConfig;
use rayon::prelude::*;

/// Broadcast `value` into every element of `dst`
pub(crate) fn fill<T: Copy + Send + Sync>(dst: &mut [T], value: T) {
    let config = ExecutionConfig::global();
    if config.use_parallel(dst.len()) {
        log::debug!("Parallel fill over {} elements", dst.len());
        dst.par_chunks_mut(config.parallel_threshold.max(1))
            .for_each(|chunk| chunk.fill(value));
    } else {
        dst.fill(value);
    }
}

/// Bulk copy between two non-overlapping ranges of equal length
pub(crate) fn copy<T: Copy + Send + Sync>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    let config = ExecutionConfig::global();
    if config.use_parallel(dst.len()) {
        log::debug!("Parallel copy over {} elements", dst.len());
        let chunk = config.parallel_threshold.max(1);
        dst.par_chunks_mut(chunk)
            .zip(src.par_chunks(chunk))
            .for_each(|(d, s)| d.copy_from_slice(s));
    } else {
        dst.copy_from_slice(src);
    }
}
