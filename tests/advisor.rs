// CPU ADVISOR TESTS
// PUBLISHING, FAILURE HANDLING AND HEADROOM ACROSS CONTROL TICKS.

use std::sync::Arc;
use std::sync::Mutex;

use qos_cpu_provision::{
    AdvisorConfig, CpuProvisionAdvisor, MetaCache, NodeSnapshot, NumaMask, NumaScope,
    PodReclaimPolicy, ProvisionAssembler, ProvisionError, StaticRegion, SubResourceAdvisor,
    CPU_ADVISOR_NAME, POOL_NAME_RECLAIM, POOL_NAME_RESERVE, POOL_NAME_SHARE,
};
use simplelog::{Config, LevelFilter, TestLogger};

fn healthy_snapshot() -> NodeSnapshot {
    NodeSnapshot::new()
        .with_numa_available(0, 10)
        .with_numa_available(1, 10)
        .with_reserved_for_reclaim(0, 1)
        .with_reserved_for_reclaim(1, 1)
        .with_non_binding_numas(NumaMask::from_ids([1]))
        .with_region(StaticRegion::share("share-region", POOL_NAME_SHARE, 4.0))
        .with_region(StaticRegion::dedicated_numa_exclusive("dedicated", 0, "pod-a", 6.0))
}

// SAME NODE, BUT THE DEDICATED REGION LOST ITS POD.
fn broken_snapshot() -> NodeSnapshot {
    healthy_snapshot().with_region(
        StaticRegion::dedicated_numa_exclusive("dedicated", 0, "pod-a", 6.0).with_pods(&[]),
    )
}

fn advisor(state: Arc<Mutex<NodeSnapshot>>) -> CpuProvisionAdvisor {
    let _ = TestLogger::init(LevelFilter::Debug, Config::default());
    let assembler = ProvisionAssembler::new(
        AdvisorConfig::default(),
        Arc::new(MetaCache::new().with_pool_size(POOL_NAME_RESERVE, 2)),
        Arc::new(PodReclaimPolicy::new().with_pod("pod-a")),
    );
    CpuProvisionAdvisor::new(
        assembler,
        Box::new(move || state.lock().unwrap().clone()),
    )
}

#[test]
fn advisor_name() {
    let advisor = advisor(Arc::new(Mutex::new(NodeSnapshot::new())));
    assert_eq!(advisor.name(), CPU_ADVISOR_NAME);
    assert_eq!(advisor.name(), "cpu");
}

#[test]
fn headroom_before_first_plan_fails() {
    let advisor = advisor(Arc::new(Mutex::new(healthy_snapshot())));
    assert!(advisor.latest().is_none());
    assert!(advisor.headroom().is_err());
}

#[test]
fn update_publishes_plan_and_headroom() {
    let mut advisor = advisor(Arc::new(Mutex::new(healthy_snapshot())));
    advisor.update();

    let latest = advisor.latest().unwrap();
    assert_eq!(latest.pool_entry(POOL_NAME_SHARE, NumaScope::NodeWide), Some(4));
    // NUMA 0: 10 - 6 + 1, NON-BINDING: 10 - 4 + 1
    assert_eq!(latest.pool_entry(POOL_NAME_RECLAIM, NumaScope::Numa(0)), Some(5));
    assert_eq!(latest.pool_entry(POOL_NAME_RECLAIM, NumaScope::NodeWide), Some(7));
    assert_eq!(advisor.headroom().unwrap(), 12);
    assert_eq!(advisor.nr_failures(), 0);
}

#[test]
fn negative_reclaim_entries_do_not_count_as_headroom() {
    let state = Arc::new(Mutex::new(healthy_snapshot().with_region(
        StaticRegion::dedicated_numa_exclusive("dedicated", 0, "pod-a", 15.0),
    )));
    let mut advisor = advisor(state);
    assert!(advisor.try_update().unwrap());

    let latest = advisor.latest().unwrap();
    assert_eq!(latest.pool_entry(POOL_NAME_RECLAIM, NumaScope::Numa(0)), Some(-4));
    assert_eq!(advisor.headroom().unwrap(), 7);
}

#[test]
fn failed_cycle_keeps_previous_plan() {
    let state = Arc::new(Mutex::new(healthy_snapshot()));
    let mut advisor = advisor(state.clone());
    advisor.update();
    let published = advisor.latest().unwrap().clone();

    *state.lock().unwrap() = broken_snapshot();
    let err = advisor.try_update().unwrap_err();
    assert!(matches!(err, ProvisionError::InvalidRegionAssignment { .. }));
    advisor.update();

    assert_eq!(advisor.nr_failures(), 2);
    assert_eq!(advisor.latest(), Some(&published));
    assert_eq!(advisor.headroom().unwrap(), 12);

    *state.lock().unwrap() = healthy_snapshot().with_region(StaticRegion::share(
        "share-region",
        POOL_NAME_SHARE,
        6.0,
    ));
    advisor.update();
    assert_eq!(advisor.nr_failures(), 0);
    assert_eq!(
        advisor
            .latest()
            .unwrap()
            .pool_entry(POOL_NAME_SHARE, NumaScope::NodeWide),
        Some(6)
    );
    assert_eq!(advisor.headroom().unwrap(), 10);
}

#[test]
fn config_change_applies_on_next_tick() {
    let mut advisor = advisor(Arc::new(Mutex::new(healthy_snapshot())));
    advisor.update();
    assert_eq!(advisor.headroom().unwrap(), 12);

    advisor.set_config(AdvisorConfig {
        enable_reclaim: false,
        ..Default::default()
    });
    advisor.update();

    // ONLY THE RESERVATIONS REMAIN IN THE RECLAIM POOL.
    let latest = advisor.latest().unwrap();
    assert_eq!(latest.pool_entry(POOL_NAME_RECLAIM, NumaScope::Numa(0)), Some(1));
    assert_eq!(latest.pool_entry(POOL_NAME_RECLAIM, NumaScope::NodeWide), Some(1));
    assert_eq!(advisor.headroom().unwrap(), 2);
}
