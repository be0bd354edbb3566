// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Per-NUMA capacity accounting.
//!
//! Capacity is tracked as plain `NUMA ID -> CPU count` maps. The helpers
//! below sum such a map over a set of NUMA nodes; IDs absent from the map
//! count as zero and sums saturate at the `i64` bounds.

use std::collections::BTreeMap;

use crate::NumaMask;

/// Sum `values` over every NUMA ID set in `numas`.
pub fn sum_numa_values(values: &BTreeMap<usize, i64>, numas: &NumaMask) -> i64 {
    numas
        .iter()
        .filter_map(|numa| values.get(&numa))
        .fold(0i64, |acc, &v| acc.saturating_add(v))
}

/// Allocatable, non-reserved CPUs on `numas`.
pub fn sum_available(numa_available: &BTreeMap<usize, i64>, numas: &NumaMask) -> i64 {
    sum_numa_values(numa_available, numas)
}

/// CPUs statically reserved for the reclaim pool on `numas`.
pub fn sum_reserved(reserved_for_reclaim: &BTreeMap<usize, i64>, numas: &NumaMask) -> i64 {
    sum_numa_values(reserved_for_reclaim, numas)
}
