// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # NUMA masks
//!
//! A NumaMask is a set of NUMA node IDs backed by a BitVec of u64's. It is
//! used for a region's binding NUMA nodes and for the set of NUMA nodes that
//! are not exclusively claimed by any region in the current cycle.
//!
//! Unlike a cpumask, a NumaMask is not sized to the host up front. It grows
//! as IDs are set, and two masks holding the same IDs compare equal no
//! matter how many trailing zero bits either carries.
//!
//! Masks are usually built from a numalist, the same `a-b,c` format the
//! kernel uses in /sys/devices/system/node/online:
//!
//!```
//!     use qos_cpu_provision::NumaMask;
//!     let mask = NumaMask::from_numalist("0-1,3").unwrap();
//!     assert!(mask.test_numa(1));
//!     assert!(!mask.test_numa(2));
//!     assert_eq!(mask.weight(), 3);
//!     assert_eq!(mask.to_numalist(), "0-1,3");
//!```

use anyhow::bail;
use anyhow::Result;
use bitvec::prelude::*;
use log::warn;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use sscanf::sscanf;
use std::fmt;
use std::ops::BitAndAssign;
use std::ops::BitOrAssign;

/// NUMA IDs accepted by a NumaMask are strictly below this bound.
pub const MAX_NUMA_NODES: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct NumaMask {
    mask: BitVec<u64, Lsb0>,
}

impl NumaMask {
    /// Build a new empty NumaMask object.
    pub fn new() -> NumaMask {
        NumaMask {
            mask: BitVec::new(),
        }
    }

    /// Build a NumaMask from a numalist string such as "0-3,6". An empty
    /// string yields an empty mask.
    pub fn from_numalist(numalist: &str) -> Result<NumaMask> {
        let mut mask = NumaMask::new();
        for id in read_numalist(numalist)? {
            mask.set_numa(id)?;
        }
        Ok(mask)
    }

    /// Build a NumaMask from a list of NUMA IDs. IDs at or above
    /// MAX_NUMA_NODES are dropped with a warning.
    pub fn from_ids<I: IntoIterator<Item = usize>>(ids: I) -> NumaMask {
        let mut mask = NumaMask::new();
        for id in ids {
            if let Err(e) = mask.set_numa(id) {
                warn!("{}", e);
            }
        }
        mask
    }

    fn check_numa(numa: usize) -> Result<()> {
        if numa >= MAX_NUMA_NODES {
            bail!(
                "NUMA ID {} exceeds the maximum of {}",
                numa,
                MAX_NUMA_NODES - 1
            );
        }
        Ok(())
    }

    /// Set a NUMA ID in the mask, growing it if needed. Returns an error if
    /// the ID is not below MAX_NUMA_NODES.
    pub fn set_numa(&mut self, numa: usize) -> Result<()> {
        Self::check_numa(numa)?;
        if numa >= self.mask.len() {
            self.mask.resize(numa + 1, false);
        }
        self.mask.set(numa, true);
        Ok(())
    }

    /// Clear a NUMA ID from the mask. Clearing an ID beyond the mask's
    /// length is a no-op.
    pub fn clear_numa(&mut self, numa: usize) {
        if numa < self.mask.len() {
            self.mask.set(numa, false);
        }
    }

    /// Test whether the specified NUMA ID is set in the mask.
    pub fn test_numa(&self, numa: usize) -> bool {
        match self.mask.get(numa) {
            Some(bit) => *bit,
            None => false,
        }
    }

    /// Count the number of NUMA IDs set in the mask.
    pub fn weight(&self) -> usize {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.not_any()
    }

    /// Lowest NUMA ID in the mask, if any.
    pub fn first(&self) -> Option<usize> {
        self.mask.first_one()
    }

    /// Iterate over the set NUMA IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask.iter_ones()
    }

    /// Create a NumaMask that is the AND of the current mask and another.
    pub fn and(&self, other: &NumaMask) -> NumaMask {
        let mut new = self.clone();
        new &= other;
        new
    }

    /// Create a NumaMask that is the OR of the current mask and another.
    pub fn or(&self, other: &NumaMask) -> NumaMask {
        let mut new = self.clone();
        new |= other;
        new
    }

    /// Create a NumaMask holding the IDs of the current mask that are not
    /// in `other`.
    pub fn not_in(&self, other: &NumaMask) -> NumaMask {
        NumaMask::from_ids(self.iter().filter(|id| !other.test_numa(*id)))
    }

    /// Format the mask as a numalist, collapsing consecutive IDs into
    /// ranges.
    pub fn to_numalist(&self) -> String {
        let mut groups = vec![];
        let mut ids = self.iter().peekable();
        while let Some(start) = ids.next() {
            let mut end = start;
            while ids.peek() == Some(&(end + 1)) {
                end += 1;
                ids.next();
            }
            if start == end {
                groups.push(format!("{start}"));
            } else {
                groups.push(format!("{start}-{end}"));
            }
        }
        groups.join(",")
    }
}

pub fn read_numalist(numalist: &str) -> Result<Vec<usize>> {
    let numalist = numalist.trim_end_matches('\0').trim();
    if numalist.is_empty() {
        return Ok(vec![]);
    }

    let mut numa_ids = vec![];
    for group in numalist.split(',') {
        let (min, max) = match sscanf!(group.trim(), "{usize}-{usize}") {
            Ok((x, y)) => (x, y),
            Err(_) => match sscanf!(group.trim(), "{usize}") {
                Ok(x) => (x, x),
                Err(_) => {
                    bail!("Failed to parse numalist {}", group.trim());
                }
            },
        };
        if min > max {
            bail!("Invalid NUMA range {}-{} in numalist {}", min, max, numalist);
        }
        if max >= MAX_NUMA_NODES {
            bail!(
                "NUMA ID {} in numalist {} exceeds the maximum of {}",
                max,
                numalist,
                MAX_NUMA_NODES - 1
            );
        }
        numa_ids.extend(min..=max);
    }

    Ok(numa_ids)
}

impl PartialEq for NumaMask {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for NumaMask {}

impl fmt::Display for NumaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_numalist())
    }
}

impl BitAndAssign<&Self> for NumaMask {
    fn bitand_assign(&mut self, rhs: &Self) {
        self.mask.truncate(self.mask.len().min(rhs.mask.len()));
        for id in 0..self.mask.len() {
            if !rhs.test_numa(id) {
                self.mask.set(id, false);
            }
        }
    }
}

impl BitOrAssign<&Self> for NumaMask {
    fn bitor_assign(&mut self, rhs: &Self) {
        if rhs.mask.len() > self.mask.len() {
            self.mask.resize(rhs.mask.len(), false);
        }
        for id in rhs.iter() {
            self.mask.set(id, true);
        }
    }
}

impl FromIterator<usize> for NumaMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        NumaMask::from_ids(iter)
    }
}

impl Serialize for NumaMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_numalist())
    }
}

impl<'de> Deserialize<'de> for NumaMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let numalist = String::deserialize(deserializer)?;
        NumaMask::from_numalist(&numalist).map_err(serde::de::Error::custom)
    }
}
