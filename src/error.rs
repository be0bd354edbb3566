// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::error::Error;
use std::fmt;

/// Why a dedicated NUMA-exclusive region cannot be provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentFault {
    /// The region must hold exactly one pod.
    PodCount(usize),
    /// The region must be bound to exactly one NUMA node.
    BindingNumaCount(usize),
}

impl fmt::Display for AssignmentFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentFault::PodCount(n) => write!(f, "{n} pods assigned, expected 1"),
            AssignmentFault::BindingNumaCount(n) => {
                write!(f, "{n} binding NUMA nodes, expected 1")
            }
        }
    }
}

/// Errors that abort a provisioning cycle.
#[derive(Debug)]
pub enum ProvisionError {
    /// A region failed to produce its control knobs.
    RegionProvision {
        region: String,
        source: anyhow::Error,
    },
    /// A dedicated NUMA-exclusive region is not bound to a single pod and
    /// a single NUMA node.
    InvalidRegionAssignment {
        region: String,
        fault: AssignmentFault,
    },
    /// The per-pod reclaim policy lookup failed.
    ReclaimPolicyLookup {
        region: String,
        pod: String,
        source: anyhow::Error,
    },
}

impl ProvisionError {
    /// Name of the region that caused the error.
    pub fn region(&self) -> &str {
        match self {
            ProvisionError::RegionProvision { region, .. }
            | ProvisionError::InvalidRegionAssignment { region, .. }
            | ProvisionError::ReclaimPolicyLookup { region, .. } => region,
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::RegionProvision { region, source } => {
                write!(f, "region {region} failed to provide control knobs: {source}")
            }
            ProvisionError::InvalidRegionAssignment { region, fault } => {
                write!(f, "invalid assignment of numa exclusive region {region}: {fault}")
            }
            ProvisionError::ReclaimPolicyLookup {
                region,
                pod,
                source,
            } => write!(
                f,
                "reclaim policy lookup for pod {pod} of region {region} failed: {source}"
            ),
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        let source: &(dyn Error + 'static) = match self {
            ProvisionError::RegionProvision { source, .. }
            | ProvisionError::ReclaimPolicyLookup { source, .. } => &**source,
            ProvisionError::InvalidRegionAssignment { .. } => return None,
        };
        Some(source)
    }
}
