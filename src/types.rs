// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::bail;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

pub const POOL_NAME_RESERVE: &str = "reserve";
pub const POOL_NAME_RECLAIM: &str = "reclaim";
pub const POOL_NAME_SHARE: &str = "share";

const NODE_WIDE_STR: &str = "node";

/// NUMA scope of a pool entry.
///
/// `NodeWide` is used for pools that are not tied to a specific NUMA node.
/// It orders before every concrete NUMA ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NumaScope {
    NodeWide,
    Numa(usize),
}

impl fmt::Display for NumaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumaScope::NodeWide => write!(f, "{NODE_WIDE_STR}"),
            NumaScope::Numa(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for NumaScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        if s == NODE_WIDE_STR {
            return Ok(NumaScope::NodeWide);
        }
        match s.parse::<usize>() {
            Ok(id) => Ok(NumaScope::Numa(id)),
            Err(_) => bail!("Invalid NUMA scope {:?}", s),
        }
    }
}

// Pool entries are keyed by scope, so it has to serialize as a string to be
// usable as a JSON map key.
impl Serialize for NumaScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NumaScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Kinds of sizing outputs a region produces each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControlKnobKind {
    NonReclaimedCpuSize,
    NonReclaimedCpuSizeUpper,
    NonReclaimedCpuSizeLower,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlKnobValue {
    pub value: f64,
}

impl ControlKnobValue {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

pub type ControlKnob = BTreeMap<ControlKnobKind, ControlKnobValue>;

/// Read a knob as a whole CPU count. Missing knobs read as zero, fractional
/// values are truncated toward zero.
pub fn knob_cpus(knob: &ControlKnob, kind: ControlKnobKind) -> i64 {
    knob.get(&kind).map_or(0, |v| v.value as i64)
}

/// A complete CPU allocation plan for one control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    /// pool name -> NUMA scope -> CPU count
    pub pool_entries: BTreeMap<String, BTreeMap<NumaScope, i64>>,
    pub timestamp: SystemTime,
    /// Whether the upper isolation sizes were honored this cycle.
    pub bound_upper: bool,
}

impl CalculationResult {
    pub fn new() -> Self {
        Self {
            pool_entries: BTreeMap::new(),
            timestamp: SystemTime::now(),
            bound_upper: false,
        }
    }

    /// Set the CPU count of `pool` on `scope`, replacing any earlier value.
    pub fn set_pool_entry(&mut self, pool: &str, scope: NumaScope, size: i64) {
        self.pool_entries
            .entry(pool.to_string())
            .or_default()
            .insert(scope, size);
    }

    pub fn pool_entry(&self, pool: &str, scope: NumaScope) -> Option<i64> {
        self.pool_entries
            .get(pool)
            .and_then(|entries| entries.get(&scope))
            .copied()
    }

    /// Sum of a pool's entries across all scopes.
    pub fn pool_total(&self, pool: &str) -> i64 {
        self.pool_entries
            .get(pool)
            .map_or(0, |entries| entries.values().sum())
    }

    pub fn is_empty(&self) -> bool {
        self.pool_entries.is_empty()
    }
}
