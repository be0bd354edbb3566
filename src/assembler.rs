// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Provision assembler
//!
//! Turns the per-region sizing decisions of one control cycle into a single
//! CPU allocation plan for the node.
//!
//! The node's NUMA nodes fall into two groups:
//!
//! - **Binding** NUMA nodes, each claimed by one dedicated NUMA-exclusive
//!   region. Whatever the region's pod does not need may be lent to the
//!   reclaim pool on that node, if the pod allows it.
//! - **Non-binding** NUMA nodes, shared by all share and isolation regions.
//!   Their combined demand is regulated against the non-binding capacity
//!   and whatever is left over forms the node-wide reclaim pool.
//!
//! Isolation regions report an upper and a lower size. The upper sizes are
//! used when share and isolation demand fits on the non-binding nodes,
//! otherwise the lower sizes are used and regulated further if needed.
//!
//! Every pool entry lands in a fresh `CalculationResult`. The reserve pool
//! and the node-wide entries use `NumaScope::NodeWide`; reclaim entries of
//! binding NUMA nodes use that node's ID.
//!
//! The assembler is a pure function of the snapshot it is handed. It keeps
//! no reference to the snapshot after returning, and the first error aborts
//! the cycle without producing a partial plan.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use log::info;
use log::warn;

use crate::accounting::sum_available;
use crate::accounting::sum_reserved;
use crate::knob_cpus;
use crate::regulator::regulate_pool_sizes;
use crate::regulator::spread_pool_sizes;
use crate::AdvisorConfig;
use crate::AssignmentFault;
use crate::CalculationResult;
use crate::ControlKnobKind;
use crate::MetaReader;
use crate::NumaMask;
use crate::NumaScope;
use crate::ProvisionError;
use crate::QosRegion;
use crate::ReclaimPolicy;
use crate::RegionType;
use crate::POOL_NAME_RECLAIM;
use crate::POOL_NAME_RESERVE;

/// Point-in-time view of the regions and NUMA capacity of the node.
#[derive(Clone, Default)]
pub struct NodeSnapshot {
    /// region name -> region
    pub regions: BTreeMap<String, Arc<dyn QosRegion>>,
    /// NUMA ID -> CPUs reserved for the reclaim pool regardless of demand
    pub reserved_for_reclaim: BTreeMap<usize, i64>,
    /// NUMA ID -> allocatable, non-reserved CPUs
    pub numa_available: BTreeMap<usize, i64>,
    /// NUMA nodes not claimed by any dedicated NUMA-exclusive region
    pub non_binding_numas: NumaMask,
}

impl NodeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region<R: QosRegion + 'static>(mut self, region: R) -> Self {
        self.regions
            .insert(region.name().to_string(), Arc::new(region));
        self
    }

    pub fn with_numa_available(mut self, numa: usize, cpus: i64) -> Self {
        self.numa_available.insert(numa, cpus);
        self
    }

    pub fn with_reserved_for_reclaim(mut self, numa: usize, cpus: i64) -> Self {
        self.reserved_for_reclaim.insert(numa, cpus);
        self
    }

    pub fn with_non_binding_numas(mut self, numas: NumaMask) -> Self {
        self.non_binding_numas = numas;
        self
    }

    /// NUMA nodes of `topology` not bound to a dedicated NUMA-exclusive
    /// region.
    pub fn non_binding_of(&self, topology: &NumaMask) -> NumaMask {
        let mut binding = NumaMask::new();
        for region in self.regions.values() {
            if region.region_type() == RegionType::DedicatedNumaExclusive {
                binding |= region.binding_numas();
            }
        }
        topology.not_in(&binding)
    }
}

pub struct ProvisionAssembler {
    config: AdvisorConfig,
    meta_reader: Arc<dyn MetaReader>,
    reclaim_policy: Arc<dyn ReclaimPolicy>,
}

impl ProvisionAssembler {
    pub fn new(
        config: AdvisorConfig,
        meta_reader: Arc<dyn MetaReader>,
        reclaim_policy: Arc<dyn ReclaimPolicy>,
    ) -> Self {
        Self {
            config,
            meta_reader,
            reclaim_policy,
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AdvisorConfig) {
        self.config = config;
    }

    /// Build the allocation plan for `snapshot`.
    ///
    /// Returns the plan and whether the combined share and isolation demand
    /// fit without regulation. The same flag is recorded in the plan's
    /// `bound_upper`.
    pub fn assemble_provision(
        &self,
        snapshot: &NodeSnapshot,
    ) -> Result<(CalculationResult, bool), ProvisionError> {
        let node_enable_reclaim = self.config.enable_reclaim;
        let mut result = CalculationResult::new();

        let reserve_pool_size = self.meta_reader.get_pool_size(POOL_NAME_RESERVE).unwrap_or(0);
        result.set_pool_entry(POOL_NAME_RESERVE, NumaScope::NodeWide, reserve_pool_size);

        let mut shares: i64 = 0;
        let mut isolation_uppers: i64 = 0;

        let mut share_pool_sizes: BTreeMap<String, i64> = BTreeMap::new();
        let mut isolation_upper_sizes: BTreeMap<String, i64> = BTreeMap::new();
        let mut isolation_lower_sizes: BTreeMap<String, i64> = BTreeMap::new();

        for (name, region) in snapshot.regions.iter() {
            let knob = region
                .provision()
                .map_err(|source| ProvisionError::RegionProvision {
                    region: name.clone(),
                    source,
                })?;

            match region.region_type() {
                RegionType::Share => {
                    let size = knob_cpus(&knob, ControlKnobKind::NonReclaimedCpuSize);
                    let pool_size = share_pool_sizes
                        .entry(region.owner_pool_name().to_string())
                        .or_default();
                    *pool_size = pool_size.saturating_add(size);
                    shares = shares.saturating_add(size);
                }
                RegionType::Isolation => {
                    let upper = knob_cpus(&knob, ControlKnobKind::NonReclaimedCpuSizeUpper);
                    let lower = knob_cpus(&knob, ControlKnobKind::NonReclaimedCpuSizeLower);
                    isolation_upper_sizes.insert(name.clone(), upper);
                    isolation_lower_sizes.insert(name.clone(), lower);
                    isolation_uppers = isolation_uppers.saturating_add(upper);
                }
                RegionType::DedicatedNumaExclusive => {
                    self.assemble_numa_exclusive(
                        snapshot,
                        name,
                        &**region,
                        knob_cpus(&knob, ControlKnobKind::NonReclaimedCpuSize),
                        &mut result,
                    )?;
                }
                RegionType::Other(region_type) => {
                    debug!("region {}: type {} not provisioned, skipping", name, region_type);
                }
            }
        }

        let share_and_isolated_available =
            sum_available(&snapshot.numa_available, &snapshot.non_binding_numas);

        let use_upper = shares.saturating_add(isolation_uppers) <= share_and_isolated_available;
        let mut share_and_isolated_sizes = share_pool_sizes.clone();
        if use_upper {
            share_and_isolated_sizes.extend(isolation_upper_sizes.clone());
        } else {
            share_and_isolated_sizes.extend(isolation_lower_sizes.clone());
        }

        let mut regulated = regulate_pool_sizes(
            &share_and_isolated_sizes,
            share_and_isolated_available,
            node_enable_reclaim,
        );
        if !node_enable_reclaim && self.config.spread_idle_without_reclaim {
            spread_pool_sizes(&mut regulated.sizes, share_and_isolated_available);
        }
        let bound_upper = regulated.bound_upper;

        info!(
            "pool sizes: share={:?} isolation-upper={:?} isolation-lower={:?} \
             use_upper={} demand={:?} regulated={:?} available={} bound_upper={}",
            share_pool_sizes,
            isolation_upper_sizes,
            isolation_lower_sizes,
            use_upper,
            share_and_isolated_sizes,
            regulated.sizes,
            share_and_isolated_available,
            bound_upper,
        );

        for (pool_name, pool_size) in regulated.sizes.iter() {
            result.set_pool_entry(pool_name, NumaScope::NodeWide, *pool_size);
        }

        let reserved_non_binding =
            sum_reserved(&snapshot.reserved_for_reclaim, &snapshot.non_binding_numas);
        let reclaim_pool_size = if node_enable_reclaim {
            share_and_isolated_available
                .saturating_sub(regulated.total())
                .saturating_add(reserved_non_binding)
        } else {
            reserved_non_binding
        };
        result.set_pool_entry(POOL_NAME_RECLAIM, NumaScope::NodeWide, reclaim_pool_size);

        result.bound_upper = bound_upper;
        Ok((result, bound_upper))
    }

    /// Fill in the reclaim pool entry of a dedicated NUMA-exclusive region's
    /// NUMA node.
    fn assemble_numa_exclusive(
        &self,
        snapshot: &NodeSnapshot,
        name: &str,
        region: &dyn QosRegion,
        non_reclaimed_size: i64,
        result: &mut CalculationResult,
    ) -> Result<(), ProvisionError> {
        let binding = region.binding_numas();
        let numa = match (binding.weight(), binding.first()) {
            (1, Some(numa)) => numa,
            (n, _) => {
                return Err(ProvisionError::InvalidRegionAssignment {
                    region: name.to_string(),
                    fault: AssignmentFault::BindingNumaCount(n),
                })
            }
        };
        let reserved = sum_reserved(&snapshot.reserved_for_reclaim, binding);

        let pods = region.pods();
        let pod_uid = pods
            .only()
            .ok_or_else(|| ProvisionError::InvalidRegionAssignment {
                region: name.to_string(),
                fault: AssignmentFault::PodCount(pods.len()),
            })?;

        let enable_reclaim = self
            .reclaim_policy
            .pod_reclaim_enabled(pod_uid, self.config.enable_reclaim)
            .map_err(|source| ProvisionError::ReclaimPolicyLookup {
                region: name.to_string(),
                pod: pod_uid.to_string(),
                source,
            })?;

        if !enable_reclaim {
            if reserved > 0 {
                result.set_pool_entry(POOL_NAME_RECLAIM, NumaScope::Numa(numa), reserved);
            }
            return Ok(());
        }

        let available = sum_available(&snapshot.numa_available, binding);
        let reclaimed = available
            .saturating_sub(non_reclaimed_size)
            .saturating_add(reserved);
        if reclaimed < 0 {
            warn!(
                "region {}: reclaim pool on NUMA {} is negative ({}): available={} non-reclaimed={} reserved={}",
                name, numa, reclaimed, available, non_reclaimed_size, reserved
            );
        }
        debug!(
            "region {}: pod {} lends {} CPUs of NUMA {} to reclaim",
            name, pod_uid, reclaimed, numa
        );
        result.set_pool_entry(POOL_NAME_RECLAIM, NumaScope::Numa(numa), reclaimed);
        Ok(())
    }
}
