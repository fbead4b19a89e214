mod helpers;

use kubescaler::core::events::AutoscalerEvent;
use kubescaler::core::pod::Pod;
use kubescaler::scale_up::{scale_up, ScaleUpPlan};
use kubescaler::simulator::predicate::DefaultPredicateChecker;
use kubescaler::test_util::helpers::{
    bounds, build_node, build_pod, FakeCluster, FakeNodeGroupProvider,
};

use helpers::init_logger;

fn run_scale_up(
    pods: &[Pod],
    provider: &FakeNodeGroupProvider,
    cluster: &FakeCluster,
) -> Option<ScaleUpPlan> {
    let mut provider_handle = provider.clone();
    let mut recorder = cluster.clone();
    scale_up(
        pods,
        &mut provider_handle,
        &DefaultPredicateChecker::new(),
        &mut recorder,
    )
    .unwrap()
}

#[test]
fn test_scale_up_one_group_fits_all() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 1, 5),
        build_node("group_a_node", 4000, 17179869184),
        vec!["group_a_node_1".to_string()],
    );
    provider.add_group(
        bounds("group_b", 0, 5),
        build_node("group_b_node", 2000, 17179869184),
        vec![],
    );

    let pods = vec![
        build_pod("pod_1", 3000, 1073741824),
        build_pod("pod_2", 3000, 1073741824),
        build_pod("pod_3", 3000, 1073741824),
    ];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!("group_a", plan.group);
    assert_eq!(3, plan.delta);
    assert_eq!(4, provider.group_size("group_a"));
    assert_eq!(0, provider.group_size("group_b"));
    assert_eq!(vec![4], provider.resize_calls("group_a"));

    let triggered = cluster
        .events()
        .into_iter()
        .filter(|event| matches!(event, AutoscalerEvent::TriggeredScaleUp { .. }))
        .count();
    assert_eq!(3, triggered);
}

#[test]
fn test_scale_up_bounded_by_group_maximum() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 1, 2),
        build_node("group_a_node", 4000, 17179869184),
        vec!["group_a_node_1".to_string()],
    );

    let pods: Vec<Pod> = (0..5)
        .map(|i| build_pod(&format!("pod_{}", i), 3000, 1073741824))
        .collect();

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!(1, plan.delta);
    assert_eq!(2, provider.group_size("group_a"));

    let events = cluster.events();
    let triggered = events
        .iter()
        .filter(|event| matches!(event, AutoscalerEvent::TriggeredScaleUp { .. }))
        .count();
    let capacity_exhausted = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                AutoscalerEvent::NotTriggerScaleUp { reason, .. } if reason.contains("cannot grow")
            )
        })
        .count();
    assert_eq!(1, triggered);
    assert_eq!(4, capacity_exhausted);
}

#[test]
fn test_pod_fitting_no_template_gets_event_and_does_not_block() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 4000, 17179869184),
        vec![],
    );

    let pods = vec![
        build_pod("pod_huge", 9000, 1073741824),
        build_pod("pod_ok", 3000, 1073741824),
    ];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!(1, plan.delta);
    assert_eq!(1, provider.group_size("group_a"));

    assert!(cluster.events().iter().any(|event| matches!(
        event,
        AutoscalerEvent::NotTriggerScaleUp { pod_name, reason }
            if pod_name == "pod_huge" && reason.contains("any node group template")
    )));
}

#[test]
fn test_scale_up_picks_group_serving_most_pods() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 2000, 17179869184),
        vec![],
    );
    provider.add_group(
        bounds("group_b", 0, 5),
        build_node("group_b_node", 8000, 17179869184),
        vec![],
    );

    let pods = vec![
        build_pod("pod_small_1", 1500, 1073741824),
        build_pod("pod_small_2", 1500, 1073741824),
        build_pod("pod_big", 6000, 1073741824),
    ];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!("group_b", plan.group);
    assert_eq!(0, provider.group_size("group_a"));
    assert_eq!(2, provider.group_size("group_b"));
}

#[test]
fn test_scale_up_tie_break_prefers_smaller_increment() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    // Both groups serve both pods, but group_b fits them on one node.
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 2000, 17179869184),
        vec![],
    );
    provider.add_group(
        bounds("group_b", 0, 5),
        build_node("group_b_node", 4000, 17179869184),
        vec![],
    );

    let pods = vec![
        build_pod("pod_1", 1800, 1073741824),
        build_pod("pod_2", 1800, 1073741824),
    ];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!("group_b", plan.group);
    assert_eq!(1, plan.delta);
}

#[test]
fn test_scale_up_tie_break_is_lexicographic() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_b", 0, 5),
        build_node("group_b_node", 4000, 17179869184),
        vec![],
    );
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 4000, 17179869184),
        vec![],
    );

    let pods = vec![build_pod("pod", 3000, 1073741824)];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!("group_a", plan.group);
}

#[test]
fn test_groups_at_maximum_are_not_considered() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 1, 1),
        build_node("group_a_node", 4000, 17179869184),
        vec!["group_a_node_1".to_string()],
    );

    let pods = vec![build_pod("pod", 3000, 1073741824)];

    let plan = run_scale_up(&pods, &provider, &cluster);
    assert!(plan.is_none());
    assert!(provider.resize_calls("group_a").is_empty());
}

#[test]
fn test_provider_resize_failure_propagates() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 4000, 17179869184),
        vec![],
    );
    provider.set_fail_resize(true);

    let pods = vec![build_pod("pod", 3000, 1073741824)];
    let mut provider_handle = provider.clone();
    let mut recorder = cluster.clone();
    let result = scale_up(
        &pods,
        &mut provider_handle,
        &DefaultPredicateChecker::new(),
        &mut recorder,
    );
    assert!(result.is_err());
    assert_eq!(0, provider.group_size("group_a"));
}

#[test]
fn test_ram_dimension_constrains_the_estimate() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    // Plenty of cpu but only room for one pod's ram per node.
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_node", 16000, 2147483648),
        vec![],
    );

    let pods = vec![
        build_pod("pod_1", 1000, 2147483648),
        build_pod("pod_2", 1000, 2147483648),
    ];

    let plan = run_scale_up(&pods, &provider, &cluster).unwrap();
    assert_eq!(2, plan.delta);
    assert_eq!(2, provider.group_size("group_a"));
}
