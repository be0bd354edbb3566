// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Share and isolated pool size regulation.
//!
//! All quantities in this module are whole CPUs. Pools are keyed by name,
//! and iteration follows name order, which makes every result reproducible
//! for identical input.
//!
//! # Problem
//!
//! Share and isolation regions size themselves independently. Their
//! combined demand lands on the NUMA nodes that no dedicated region claims,
//! and nothing stops that demand from exceeding what those nodes can offer.
//! When it does, every pool has to give something back.
//!
//! # Approach
//!
//! If the total demand fits, nothing is changed. Otherwise `available` is
//! split in proportion to each pool's demand, using largest-remainder
//! (Hamilton's method) so the integer sizes sum to exactly `available`:
//!
//! ```text
//! quota[P] = available * demand[P] / total_demand
//! size[P]  = floor(quota[P])
//! left     = available - sum(size)
//! give one CPU each to the `left` pools with the largest fractional part
//! of quota[P]; ties go to the larger demand, then to the smaller name
//! ```
//!
//! # Properties
//!
//! - **Deterministic**: integer arithmetic only, with a total order on ties.
//! - **Non-negative**: negative demands are treated as zero, and a negative
//!   `available` regulates every pool to zero.
//! - **Bounded**: the regulated total never exceeds `available`, and equals
//!   it whenever regulation kicked in.
//! - **Zero stays zero**: a pool without demand has no quota and never wins
//!   a remainder CPU.
//! - **Never above demand**: a pool's quota is at most its demand, and the
//!   rounding adds at most one CPU to a strictly fractional quota.
//! - **Saturating**: demand totals saturate at `i64::MAX` instead of
//!   overflowing, so absurd knob values are scaled down like any other
//!   oversubscription.

use std::collections::BTreeMap;

use log::debug;

/// Regulated share and isolated pool sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegulatedPools {
    pub sizes: BTreeMap<String, i64>,
    /// True if the demand fit and was left untouched.
    pub bound_upper: bool,
}

impl RegulatedPools {
    pub fn total(&self) -> i64 {
        self.sizes.values().fold(0i64, |acc, &size| acc.saturating_add(size))
    }
}

/// Split `total` units in proportion to `weights`, rounding with the
/// largest-remainder method. The result always sums to exactly `total`
/// unless every weight is zero, in which case everything is zero.
pub fn largest_remainder(total: u64, weights: &[u64]) -> Vec<u64> {
    let weight_sum: u128 = weights.iter().map(|&w| w as u128).sum();
    if weight_sum == 0 {
        return vec![0; weights.len()];
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, &w) in weights.iter().enumerate() {
        let scaled = total as u128 * w as u128;
        shares.push((scaled / weight_sum) as u64);
        remainders.push((scaled % weight_sum, w, idx));
    }

    let assigned: u64 = shares.iter().sum();
    let mut left = total - assigned;

    // Largest remainder first, then larger weight, then lower index.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
    for &(rem, _, idx) in remainders.iter() {
        if left == 0 || rem == 0 {
            break;
        }
        shares[idx] += 1;
        left -= 1;
    }

    shares
}

/// Fit the combined share and isolated pool demand into `available` CPUs.
///
/// Demand that fits is returned unchanged with `bound_upper` set. Demand
/// that does not fit is scaled down proportionally, see the module
/// documentation for the exact rule.
pub fn regulate_pool_sizes(
    demand: &BTreeMap<String, i64>,
    available: i64,
    reclaim_enabled: bool,
) -> RegulatedPools {
    let demand: BTreeMap<String, i64> = demand
        .iter()
        .map(|(name, &size)| (name.clone(), size.max(0)))
        .collect();
    let total = demand.values().fold(0i64, |acc, &size| acc.saturating_add(size));

    if total <= available {
        debug!(
            "pool demand {} fits in {} available CPUs (reclaim={})",
            total, available, reclaim_enabled
        );
        return RegulatedPools {
            sizes: demand,
            bound_upper: true,
        };
    }

    let weights: Vec<u64> = demand.values().map(|&size| size as u64).collect();
    let shares = largest_remainder(available.max(0) as u64, &weights);
    let sizes: BTreeMap<String, i64> = demand
        .keys()
        .cloned()
        .zip(shares.into_iter().map(|s| s as i64))
        .collect();

    debug!(
        "pool demand {} exceeds {} available CPUs (reclaim={}), regulated to {:?}",
        total, available, reclaim_enabled, sizes
    );

    RegulatedPools {
        sizes,
        bound_upper: false,
    }
}

/// Grow `sizes` in proportion to their current values until they sum to
/// `available`. Pools at zero stay at zero, and nothing changes if the
/// pools already cover `available` or are all empty.
pub fn spread_pool_sizes(sizes: &mut BTreeMap<String, i64>, available: i64) {
    let total = sizes
        .values()
        .fold(0i64, |acc, &s| acc.saturating_add(s.max(0)));
    if total == 0 || total >= available {
        return;
    }

    let weights: Vec<u64> = sizes.values().map(|&s| s.max(0) as u64).collect();
    let extra = largest_remainder((available - total) as u64, &weights);
    for (size, extra) in sizes.values_mut().zip(extra) {
        *size += extra as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools(entries: &[(&str, i64)]) -> BTreeMap<String, i64> {
        entries
            .iter()
            .map(|(name, size)| (name.to_string(), *size))
            .collect()
    }

    // =====================================================================
    // largest_remainder tests
    // =====================================================================

    #[test]
    fn test_lr_exact_split() {
        assert_eq!(largest_remainder(10, &[1, 1]), vec![5, 5]);
        assert_eq!(largest_remainder(20, &[3, 1]), vec![15, 5]);
    }

    #[test]
    fn test_lr_conservation() {
        let shares = largest_remainder(50, &[2, 3, 5, 7]);
        assert_eq!(shares.iter().sum::<u64>(), 50);
    }

    #[test]
    fn test_lr_remainder_to_largest_fraction() {
        // Quotas 10*3/7=4.29, 10*4/7=5.71 -> 4, 5, remainder to the second.
        assert_eq!(largest_remainder(10, &[3, 4]), vec![4, 6]);
    }

    #[test]
    fn test_lr_tie_goes_to_larger_weight_then_index() {
        // Quotas 1.5, 1.5: tie on fraction and weight -> lower index.
        assert_eq!(largest_remainder(3, &[1, 1]), vec![2, 1]);
        // 5 over [2, 2, 1]: quotas 2, 2, 1, no remainder.
        assert_eq!(largest_remainder(5, &[2, 2, 1]), vec![2, 2, 1]);
        // 1 over [1, 2, 1]: fractions 1/4, 2/4, 1/4 -> middle wins.
        assert_eq!(largest_remainder(1, &[1, 2, 1]), vec![0, 1, 0]);
    }

    #[test]
    fn test_lr_zero_weights() {
        assert_eq!(largest_remainder(10, &[0, 0]), vec![0, 0]);
        assert_eq!(largest_remainder(10, &[0, 3]), vec![0, 10]);
        assert!(largest_remainder(10, &[]).is_empty());
    }

    // =====================================================================
    // regulate_pool_sizes tests
    // =====================================================================

    #[test]
    fn test_regulate_fits_unchanged() {
        let demand = pools(&[("share", 4), ("iso-a", 3)]);
        let regulated = regulate_pool_sizes(&demand, 10, true);
        assert!(regulated.bound_upper);
        assert_eq!(regulated.sizes, demand);
        assert_eq!(regulated.total(), 7);
    }

    #[test]
    fn test_regulate_exact_fit_unchanged() {
        let demand = pools(&[("share", 6), ("iso-a", 4)]);
        let regulated = regulate_pool_sizes(&demand, 10, false);
        assert!(regulated.bound_upper);
        assert_eq!(regulated.sizes, demand);
    }

    #[test]
    fn test_regulate_proportional_scale_down() {
        // 8:4:4 over 8 -> 4:2:2.
        let demand = pools(&[("iso-a", 4), ("iso-b", 4), ("share", 8)]);
        let regulated = regulate_pool_sizes(&demand, 8, true);
        assert!(!regulated.bound_upper);
        assert_eq!(regulated.sizes, pools(&[("iso-a", 2), ("iso-b", 2), ("share", 4)]));
    }

    #[test]
    fn test_regulate_rounding_is_deterministic() {
        // Quotas 7*5/9=3.89, 7*4/9=3.11 -> 3, 3, remainder to "a".
        let demand = pools(&[("a", 5), ("b", 4)]);
        let first = regulate_pool_sizes(&demand, 7, true);
        let second = regulate_pool_sizes(&demand, 7, true);
        assert_eq!(first, second);
        assert_eq!(first.sizes, pools(&[("a", 4), ("b", 3)]));
    }

    #[test]
    fn test_regulate_zero_demand_stays_zero() {
        let demand = pools(&[("idle", 0), ("busy", 20)]);
        let regulated = regulate_pool_sizes(&demand, 5, true);
        assert_eq!(regulated.sizes["idle"], 0);
        assert_eq!(regulated.sizes["busy"], 5);
    }

    #[test]
    fn test_regulate_negative_inputs() {
        let demand = pools(&[("neg", -3), ("share", 4)]);
        let regulated = regulate_pool_sizes(&demand, 10, true);
        assert_eq!(regulated.sizes["neg"], 0);
        assert_eq!(regulated.sizes["share"], 4);

        let regulated = regulate_pool_sizes(&demand, -2, true);
        assert!(!regulated.bound_upper);
        assert!(regulated.sizes.values().all(|&s| s == 0));
    }

    #[test]
    fn test_regulate_sum_bound() {
        let demand = pools(&[("a", 7), ("b", 11), ("c", 1), ("d", 0), ("e", 23)]);
        let total: i64 = demand.values().sum();
        for available in 0..60 {
            let regulated = regulate_pool_sizes(&demand, available, true);
            assert!(regulated.total() <= available);
            assert!(regulated.sizes.values().all(|&s| s >= 0));
            for (name, size) in &regulated.sizes {
                assert!(*size <= demand[name]);
            }
            if total > available {
                assert_eq!(regulated.total(), available);
                assert!(!regulated.bound_upper);
            } else {
                assert_eq!(regulated.total(), total);
                assert!(regulated.bound_upper);
            }
        }
    }

    #[test]
    fn test_regulate_saturated_demand() {
        // The total saturates, both pools weigh i64::MAX -> even split.
        let demand = pools(&[("a", i64::MAX), ("b", i64::MAX), ("c", 0)]);
        let regulated = regulate_pool_sizes(&demand, 21, true);
        assert!(!regulated.bound_upper);
        assert_eq!(regulated.sizes, pools(&[("a", 11), ("b", 10), ("c", 0)]));
        assert_eq!(regulated.total(), 21);

        let unregulated = RegulatedPools {
            sizes: demand,
            bound_upper: true,
        };
        assert_eq!(unregulated.total(), i64::MAX);
    }

    #[test]
    fn test_regulate_empty() {
        let regulated = regulate_pool_sizes(&BTreeMap::new(), 10, true);
        assert!(regulated.bound_upper);
        assert!(regulated.sizes.is_empty());
    }

    // =====================================================================
    // spread_pool_sizes tests
    // =====================================================================

    #[test]
    fn test_spread_fills_available() {
        let mut sizes = pools(&[("iso-a", 2), ("share", 4), ("zero", 0)]);
        spread_pool_sizes(&mut sizes, 12);
        assert_eq!(sizes, pools(&[("iso-a", 4), ("share", 8), ("zero", 0)]));
    }

    #[test]
    fn test_spread_noop_cases() {
        let mut sizes = pools(&[("share", 10)]);
        spread_pool_sizes(&mut sizes, 8);
        assert_eq!(sizes["share"], 10);

        let mut sizes = pools(&[("share", 0)]);
        spread_pool_sizes(&mut sizes, 8);
        assert_eq!(sizes["share"], 0);
    }
}
