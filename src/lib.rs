// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # NUMA-aware CPU provisioning for a node-local QoS agent
//!
//! Workloads on a node are grouped into regions, and each region sizes its
//! CPU needs on its own every control cycle. This crate turns those
//! independent decisions into one consistent plan: how many CPUs go to the
//! reserve pool, to every share and isolated pool, and to the reclaim pool
//! that best-effort workloads may use, both node-wide and on each NUMA node
//! claimed by a dedicated region.
//!
//! ## Provisioning
//!
//! `ProvisionAssembler` is the core. It reads a `NodeSnapshot`, asks each
//! region for its control knobs, regulates the share and isolated demand
//! against the capacity of the non-binding NUMA nodes and produces a
//! `CalculationResult`. `CpuProvisionAdvisor` runs it once per tick and keeps
//! the last good plan in effect across failed cycles.
//!
//! ## Collaborators
//!
//! Regions, the metadata cache and the per-pod reclaim policy live outside
//! this crate and are reached through the `QosRegion`, `MetaReader` and
//! `ReclaimPolicy` traits. Plain-data implementations of each are provided.

mod accounting;
pub use accounting::sum_available;
pub use accounting::sum_numa_values;
pub use accounting::sum_reserved;

mod advisor;
pub use advisor::CpuProvisionAdvisor;
pub use advisor::SnapshotSource;
pub use advisor::SubResourceAdvisor;
pub use advisor::CPU_ADVISOR_NAME;

mod assembler;
pub use assembler::NodeSnapshot;
pub use assembler::ProvisionAssembler;

mod config;
pub use config::AdvisorConfig;

mod error;
pub use error::AssignmentFault;
pub use error::ProvisionError;

mod metacache;
pub use metacache::MetaCache;
pub use metacache::MetaReader;

mod numamask;
pub use numamask::read_numalist;
pub use numamask::NumaMask;
pub use numamask::MAX_NUMA_NODES;

mod reclaim;
pub use reclaim::PodReclaimPolicy;
pub use reclaim::ReclaimPolicy;
pub use reclaim::ANNOTATION_RECLAIM_ENABLE;

mod region;
pub use region::PodSet;
pub use region::QosRegion;
pub use region::RegionType;
pub use region::StaticRegion;

pub mod regulator;
pub use regulator::regulate_pool_sizes;
pub use regulator::RegulatedPools;

mod types;
pub use types::knob_cpus;
pub use types::CalculationResult;
pub use types::ControlKnob;
pub use types::ControlKnobKind;
pub use types::ControlKnobValue;
pub use types::NumaScope;
pub use types::POOL_NAME_RECLAIM;
pub use types::POOL_NAME_RESERVE;
pub use types::POOL_NAME_SHARE;
