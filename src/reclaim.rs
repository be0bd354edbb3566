// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! Per-pod reclaim eligibility.
//!
//! Whether the idle CPUs of a dedicated pod may be lent to the reclaim pool
//! is decided per pod, on top of the node-level default. The node default
//! always wins when it disables reclaim.

use std::collections::BTreeMap;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

/// Pod annotation that opts a pod out of reclaim when set to "false".
pub const ANNOTATION_RECLAIM_ENABLE: &str = "qos.reclaim/enable";

pub trait ReclaimPolicy: Send + Sync {
    /// Whether reclaim is enabled for `pod_uid` given the node-level
    /// default. May consult external pod metadata and fail.
    fn pod_reclaim_enabled(&self, pod_uid: &str, node_enable_reclaim: bool) -> Result<bool>;
}

/// Reclaim policy driven by pod annotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodReclaimPolicy {
    /// pod UID -> annotations
    pods: BTreeMap<String, BTreeMap<String, String>>,
}

impl PodReclaimPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pod without annotations.
    pub fn add_pod(&mut self, pod_uid: &str) {
        self.pods.entry(pod_uid.to_string()).or_default();
    }

    pub fn annotate(&mut self, pod_uid: &str, key: &str, value: &str) {
        self.pods
            .entry(pod_uid.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn with_pod(mut self, pod_uid: &str) -> Self {
        self.add_pod(pod_uid);
        self
    }

    pub fn with_reclaim_disabled(mut self, pod_uid: &str) -> Self {
        self.annotate(pod_uid, ANNOTATION_RECLAIM_ENABLE, "false");
        self
    }
}

impl ReclaimPolicy for PodReclaimPolicy {
    fn pod_reclaim_enabled(&self, pod_uid: &str, node_enable_reclaim: bool) -> Result<bool> {
        if !node_enable_reclaim {
            return Ok(false);
        }

        let annotations = self
            .pods
            .get(pod_uid)
            .ok_or_else(|| anyhow!("Pod {} not found", pod_uid))?;

        match annotations.get(ANNOTATION_RECLAIM_ENABLE) {
            Some(v) => Ok(!v.trim().eq_ignore_ascii_case("false")),
            None => Ok(true),
        }
    }
}
