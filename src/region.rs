// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # QoS regions
//!
//! A region groups one or more pods that share a single CPU sizing decision.
//! Regions are created, bound to NUMA nodes and populated with pods by the
//! region subsystem; the provision assembler only reads them. Each cycle a
//! region reports its sizing decision as a set of control knobs.
//!
//! `QosRegion` is the seam between the two. `StaticRegion` is a plain-data
//! implementation with fixed knobs, suitable for snapshots loaded from JSON
//! and for tests.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::ControlKnob;
use crate::ControlKnobKind;
use crate::ControlKnobValue;
use crate::NumaMask;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegionType {
    /// Fungible pool shared by the region's pods.
    Share,
    /// Isolated pool sized within an upper/lower range.
    Isolation,
    /// One pod pinned to one NUMA node exclusively.
    DedicatedNumaExclusive,
    /// Region types this crate does not provision.
    Other(String),
}

impl From<String> for RegionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "share" => RegionType::Share,
            "isolation" => RegionType::Isolation,
            "dedicated-numa-exclusive" => RegionType::DedicatedNumaExclusive,
            _ => RegionType::Other(s),
        }
    }
}

impl From<RegionType> for String {
    fn from(t: RegionType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionType::Share => write!(f, "share"),
            RegionType::Isolation => write!(f, "isolation"),
            RegionType::DedicatedNumaExclusive => write!(f, "dedicated-numa-exclusive"),
            RegionType::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Set of pod UIDs assigned to a region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodSet {
    pods: BTreeSet<String>,
}

impl PodSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pod_uid: &str) -> bool {
        self.pods.insert(pod_uid.to_string())
    }

    pub fn contains(&self, pod_uid: &str) -> bool {
        self.pods.contains(pod_uid)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// The pod UID if the set holds exactly one pod.
    pub fn only(&self) -> Option<&str> {
        match self.pods.len() {
            1 => self.pods.iter().next().map(String::as_str),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.pods.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for PodSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            pods: iter.into_iter().map(str::to_string).collect(),
        }
    }
}

impl fmt::Display for PodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().collect::<Vec<_>>().join(","))
    }
}

/// Read-only view of a region for one provisioning cycle.
pub trait QosRegion: Send + Sync {
    fn name(&self) -> &str;

    fn region_type(&self) -> RegionType;

    /// Pool the region's CPUs are accounted to. Share regions with the same
    /// owner pool report into the same pool.
    fn owner_pool_name(&self) -> &str;

    /// NUMA nodes bound exclusively to this region for the cycle.
    fn binding_numas(&self) -> &NumaMask;

    fn pods(&self) -> &PodSet;

    /// The region's latest sizing decision.
    fn provision(&self) -> Result<ControlKnob>;
}

/// A region whose control knobs are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRegion {
    pub name: String,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    #[serde(default)]
    pub owner_pool_name: String,
    #[serde(default)]
    pub binding_numas: NumaMask,
    #[serde(default)]
    pub pods: PodSet,
    #[serde(default)]
    pub control_knob: ControlKnob,
}

impl StaticRegion {
    pub fn new(name: &str, region_type: RegionType) -> Self {
        Self {
            name: name.to_string(),
            region_type,
            owner_pool_name: name.to_string(),
            binding_numas: NumaMask::new(),
            pods: PodSet::new(),
            control_knob: ControlKnob::new(),
        }
    }

    /// A share region reporting `size` CPUs into `owner_pool`.
    pub fn share(name: &str, owner_pool: &str, size: f64) -> Self {
        Self::new(name, RegionType::Share)
            .with_owner_pool(owner_pool)
            .with_knob(ControlKnobKind::NonReclaimedCpuSize, size)
    }

    /// An isolation region sized between `lower` and `upper` CPUs.
    pub fn isolation(name: &str, upper: f64, lower: f64) -> Self {
        Self::new(name, RegionType::Isolation)
            .with_knob(ControlKnobKind::NonReclaimedCpuSizeUpper, upper)
            .with_knob(ControlKnobKind::NonReclaimedCpuSizeLower, lower)
    }

    /// A region pinning `pod_uid` to `numa`, keeping `size` CPUs of it
    /// away from the reclaim pool.
    pub fn dedicated_numa_exclusive(name: &str, numa: usize, pod_uid: &str, size: f64) -> Self {
        Self::new(name, RegionType::DedicatedNumaExclusive)
            .with_binding_numas(NumaMask::from_ids([numa]))
            .with_pods(&[pod_uid])
            .with_knob(ControlKnobKind::NonReclaimedCpuSize, size)
    }

    pub fn with_owner_pool(mut self, owner_pool: &str) -> Self {
        self.owner_pool_name = owner_pool.to_string();
        self
    }

    pub fn with_binding_numas(mut self, numas: NumaMask) -> Self {
        self.binding_numas = numas;
        self
    }

    pub fn with_pods(mut self, pods: &[&str]) -> Self {
        self.pods = pods.iter().copied().collect();
        self
    }

    pub fn with_knob(mut self, kind: ControlKnobKind, value: f64) -> Self {
        self.control_knob.insert(kind, ControlKnobValue::new(value));
        self
    }
}

impl QosRegion for StaticRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn region_type(&self) -> RegionType {
        self.region_type.clone()
    }

    fn owner_pool_name(&self) -> &str {
        &self.owner_pool_name
    }

    fn binding_numas(&self) -> &NumaMask {
        &self.binding_numas
    }

    fn pods(&self) -> &PodSet {
        &self.pods
    }

    fn provision(&self) -> Result<ControlKnob> {
        Ok(self.control_knob.clone())
    }
}
