// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! CPU sub-advisor driving the provision assembler once per control tick.
//!
//! The advisor owns the last plan that was assembled successfully. A cycle
//! that fails leaves that plan in effect; the next tick simply tries again.

use anyhow::bail;
use anyhow::Result;
use log::info;
use log::warn;

use crate::AdvisorConfig;
use crate::CalculationResult;
use crate::NodeSnapshot;
use crate::ProvisionAssembler;
use crate::ProvisionError;
use crate::POOL_NAME_RECLAIM;

pub const CPU_ADVISOR_NAME: &str = "cpu";

/// Per-resource advisor as seen by a resource advisor registry.
pub trait SubResourceAdvisor {
    fn name(&self) -> &str;

    /// Recompute the resource provision from the latest snapshot.
    fn update(&mut self);

    /// Spare capacity that can be offered to best-effort workloads.
    fn headroom(&self) -> Result<i64>;
}

/// Supplies a consistent snapshot of the node for one provisioning cycle.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> NodeSnapshot;
}

impl<F> SnapshotSource for F
where
    F: Fn() -> NodeSnapshot + Send + Sync,
{
    fn snapshot(&self) -> NodeSnapshot {
        self()
    }
}

pub struct CpuProvisionAdvisor {
    assembler: ProvisionAssembler,
    source: Box<dyn SnapshotSource>,
    latest: Option<CalculationResult>,
    nr_failures: u64,
}

impl CpuProvisionAdvisor {
    pub fn new(assembler: ProvisionAssembler, source: Box<dyn SnapshotSource>) -> Self {
        Self {
            assembler,
            source,
            latest: None,
            nr_failures: 0,
        }
    }

    /// Last successfully assembled plan.
    pub fn latest(&self) -> Option<&CalculationResult> {
        self.latest.as_ref()
    }

    /// Number of failed cycles since the last successful one.
    pub fn nr_failures(&self) -> u64 {
        self.nr_failures
    }

    pub fn set_config(&mut self, config: AdvisorConfig) {
        self.assembler.set_config(config);
    }

    /// Run one cycle and publish the plan on success. Returns whether the
    /// upper isolation sizes were honored.
    pub fn try_update(&mut self) -> Result<bool, ProvisionError> {
        let snapshot = self.source.snapshot();
        match self.assembler.assemble_provision(&snapshot) {
            Ok((result, bound_upper)) => {
                if self.nr_failures > 0 {
                    info!(
                        "cpu provision recovered after {} failed cycles",
                        self.nr_failures
                    );
                }
                self.nr_failures = 0;
                self.latest = Some(result);
                Ok(bound_upper)
            }
            Err(e) => {
                self.nr_failures += 1;
                Err(e)
            }
        }
    }
}

impl SubResourceAdvisor for CpuProvisionAdvisor {
    fn name(&self) -> &str {
        CPU_ADVISOR_NAME
    }

    fn update(&mut self) {
        if let Err(e) = self.try_update() {
            warn!(
                "cpu provision failed ({} in a row), keeping previous plan: {}",
                self.nr_failures, e
            );
        }
    }

    fn headroom(&self) -> Result<i64> {
        let latest = match &self.latest {
            Some(latest) => latest,
            None => bail!("No cpu provision has been published yet"),
        };

        Ok(latest
            .pool_entries
            .get(POOL_NAME_RECLAIM)
            .map_or(0, |entries| entries.values().map(|&v| v.max(0)).sum()))
    }
}
