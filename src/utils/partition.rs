//! Work-range partitioning for the data-parallel kernels.
//!
//! Rows are split into disjoint contiguous chunks, one per worker; partial
//! reductions stay chunk-local and are merged once, in chunk order, so a
//! fixed worker count gives deterministic results.

/// Split `0..n` into `parts` contiguous ranges, the first `n % parts` of
/// them one element longer.
pub fn chunk_ranges(n: usize, parts: usize) -> Vec<std::ops::Range<usize>> {
    let parts = parts.max(1);
    let base = n / parts;
    let extra = n % parts;
    let mut out = Vec::with_capacity(parts);
    let mut start = 0;
    for p in 0..parts {
        let len = base + usize::from(p < extra);
        out.push(start..start + len);
        start += len;
    }
    out
}
