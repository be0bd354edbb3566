// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Advisor configuration, loaded from inline JSON or from a JSON file.

use std::fs;
use std::io::Read;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

fn default_true() -> bool {
    true
}

/// Dynamic configuration consulted by the provision assembler each cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Node-level default for lending idle CPUs to the reclaim pool.
    #[serde(default = "default_true")]
    pub enable_reclaim: bool,
    /// With reclaim disabled, grow the share and isolated pools to cover
    /// all non-binding capacity instead of leaving it idle.
    #[serde(default)]
    pub spread_idle_without_reclaim: bool,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enable_reclaim: true,
            spread_idle_without_reclaim: false,
        }
    }
}

impl AdvisorConfig {
    /// Parse a JSON config. `f:PATH` and `file:PATH` read it from a file,
    /// anything else is taken as inline JSON.
    pub fn parse(input: &str) -> Result<Self> {
        let config: AdvisorConfig = if input.starts_with("f:") || input.starts_with("file:") {
            let path = input.split_once(':').map_or(input, |(_, path)| path);
            let mut f = fs::OpenOptions::new()
                .read(true)
                .open(path)
                .with_context(|| format!("Failed to open advisor config {}", path))?;
            let mut content = String::new();
            f.read_to_string(&mut content)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse advisor config {}", path))?
        } else {
            serde_json::from_str(input).context("Failed to parse inline advisor config")?
        };
        Ok(config)
    }
}
