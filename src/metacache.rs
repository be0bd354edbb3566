// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Read access to the agent's metadata cache.
pub trait MetaReader: Send + Sync {
    /// Last recorded size of `pool_name`, if the pool is known.
    fn get_pool_size(&self, pool_name: &str) -> Option<i64>;
}

/// In-memory pool size table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaCache {
    pool_sizes: BTreeMap<String, i64>,
}

impl MetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pool_size(&mut self, pool_name: &str, size: i64) {
        self.pool_sizes.insert(pool_name.to_string(), size);
    }

    pub fn with_pool_size(mut self, pool_name: &str, size: i64) -> Self {
        self.set_pool_size(pool_name, size);
        self
    }
}

impl MetaReader for MetaCache {
    fn get_pool_size(&self, pool_name: &str) -> Option<i64> {
        self.pool_sizes.get(pool_name).copied()
    }
}
