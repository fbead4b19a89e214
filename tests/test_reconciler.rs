mod helpers;

use kubescaler::core::events::AutoscalerEvent;
use kubescaler::test_util::helpers::{
    bounds, build_node, build_node_available_since, build_reconciler, default_test_config,
    scheduled_pod, unschedulable_pod, FakeCluster, FakeNodeGroupProvider,
};

use helpers::{init_logger, three_underutilized_nodes};

#[test]
fn test_tick_aborts_on_empty_cluster() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10.0);

    assert_eq!(1, reconciler.metrics.accumulated.total_aborted_ticks);
    assert_eq!(0, reconciler.metrics.accumulated.total_ticks);
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_tick_aborts_on_node_listing_failure() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node("node_a", 10000, 17179869184));
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec!["node_a".to_string()],
    );
    cluster.set_fail_node_listing(true);
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10.0);

    assert_eq!(1, reconciler.metrics.accumulated.total_aborted_ticks);
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_tick_aborts_when_node_has_no_known_group() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node("node_a", 10000, 17179869184));
    cluster.add_node(build_node("node_rogue", 10000, 17179869184));
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec!["node_a".to_string()],
    );
    // An unschedulable pod that would otherwise trigger a scale up.
    cluster.add_unschedulable_pod(unschedulable_pod("pod", 3000, 1073741824, 5.0));
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10.0);

    assert_eq!(1, reconciler.metrics.accumulated.total_aborted_ticks);
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_scale_up_sets_timer_and_short_circuits_the_tick() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node("node_a", 4000, 17179869184));
    cluster.add_scheduled_pod(scheduled_pod("resident", 2000, 1073741824, "node_a"));
    cluster.add_unschedulable_pod(unschedulable_pod("pod", 3000, 1073741824, 5.0));
    provider.add_group(
        bounds("group_a", 1, 5),
        build_node("group_a_template", 4000, 17179869184),
        vec!["node_a".to_string()],
    );
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(1000.0);

    assert_eq!(2, provider.group_size("group_a"));
    assert_eq!(1000.0, reconciler.last_scale_up_time());
    assert_eq!(1, provider.total_mutations());
    assert_eq!(1, reconciler.metrics.accumulated.total_scaled_up_nodes);
    // Scale down was never reached this tick.
    assert!(reconciler.unneeded_nodes().is_empty());

    // The pod is still reported unschedulable (the provider mutation is
    // asynchronous), so the next tick scales up again and the timer moves
    // forward monotonically.
    reconciler.tick(2000.0);
    assert_eq!(3, provider.group_size("group_a"));
    assert_eq!(2000.0, reconciler.last_scale_up_time());
}

#[test]
fn test_scale_down_waits_for_delay_after_scale_up() {
    init_logger();
    let (cluster, provider, _, _) = three_underutilized_nodes();
    // Timers primed at 700: the last scale up was 300 seconds before the
    // first tick, with a 600 second delay configured.
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 700.0);

    reconciler.tick(1000.0);

    // Classification ran, action did not.
    assert_eq!(2, reconciler.unneeded_nodes().len());
    assert_eq!(Some(&1000.0), reconciler.unneeded_nodes().get("node_a"));
    assert_eq!(0, provider.total_mutations());

    // 700 seconds later the delay has passed and node_a has been unneeded
    // for the full window.
    reconciler.tick(1700.0);

    assert_eq!(1, provider.total_mutations());
    assert_eq!(
        vec!["node_a".to_string()],
        provider.deleted_nodes("group_a")
    );
    assert_eq!(vec!["pod_a".to_string()], cluster.evicted_pods());
    assert_eq!(1, reconciler.metrics.accumulated.total_scaled_down_nodes);
}

#[test]
fn test_schedulable_pods_suppress_scale_down_action() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node("node_a", 10000, 17179869184));
    cluster.add_node(build_node("node_b", 10000, 17179869184));
    cluster.add_scheduled_pod(scheduled_pod("pod_a", 1000, 1073741824, "node_a"));
    cluster.add_scheduled_pod(scheduled_pod("pod_b", 1000, 1073741824, "node_b"));
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec!["node_a".to_string(), "node_b".to_string()],
    );
    // One marked pod actually fits the current capacity; the other fits
    // nothing, not even a template.
    cluster.add_unschedulable_pod(unschedulable_pod("pod_fits", 500, 1073741824, 5.0));
    cluster.add_unschedulable_pod(unschedulable_pod("pod_giant", 20000, 1073741824, 5.0));
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10000.0);

    // Scale up was evaluated for the remaining pod and could not help.
    assert!(cluster.events().iter().any(|event| matches!(
        event,
        AutoscalerEvent::NotTriggerScaleUp { pod_name, .. } if pod_name == "pod_giant"
    )));
    // The filter disagreement gates the scale-down action off, but the
    // classification still ran.
    assert_eq!(
        1,
        reconciler.metrics.accumulated.total_pods_filtered_as_schedulable
    );
    assert!(!reconciler.unneeded_nodes().is_empty());
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_steady_state_produces_no_mutations() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node("node_a", 10000, 17179869184));
    cluster.add_scheduled_pod(scheduled_pod("pod_a", 6000, 1073741824, "node_a"));
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec!["node_a".to_string()],
    );
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10000.0);
    reconciler.tick(10000.0);

    assert_eq!(0, provider.total_mutations());
    assert!(reconciler.unneeded_nodes().is_empty());
    assert_eq!(2, reconciler.metrics.accumulated.total_ticks);
}

#[test]
fn test_stale_unschedulable_conditions_are_reset() {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    cluster.add_node(build_node_available_since("node_a", 10000, 17179869184, 100.0));
    cluster.add_scheduled_pod(scheduled_pod("pod_a", 6000, 1073741824, "node_a"));
    provider.add_group(
        bounds("group_a", 0, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec!["node_a".to_string()],
    );
    // Marked unschedulable before node_a became available.
    cluster.add_unschedulable_pod(unschedulable_pod("pod_stale", 30000, 1073741824, 50.0));
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(200.0);

    assert_eq!(vec!["pod_stale".to_string()], cluster.reset_pods());
    assert_eq!(1, reconciler.metrics.accumulated.total_pod_conditions_reset);
    // The reset pod is not acted on this tick.
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_at_most_one_mutation_per_tick() {
    init_logger();
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();
    // node_b and node_c are idle enough to remove, and a pod needs a new
    // node at the same time.
    cluster.add_node(build_node("node_a", 4000, 17179869184));
    cluster.add_node(build_node("node_b", 10000, 17179869184));
    cluster.add_node(build_node("node_c", 10000, 17179869184));
    cluster.add_scheduled_pod(scheduled_pod("resident", 3900, 1073741824, "node_a"));
    cluster.add_scheduled_pod(scheduled_pod("pod_b", 500, 1073741824, "node_b"));
    cluster.add_scheduled_pod(scheduled_pod("pod_c", 500, 1073741824, "node_c"));
    provider.add_group(
        bounds("group_a", 0, 10),
        build_node("group_a_template", 10000, 17179869184),
        vec![
            "node_a".to_string(),
            "node_b".to_string(),
            "node_c".to_string(),
        ],
    );
    cluster.add_unschedulable_pod(unschedulable_pod("pod_new", 9800, 1073741824, 5.0));
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    reconciler.tick(10000.0);

    // The successful scale up is the tick's only mutation.
    assert_eq!(1, provider.total_mutations());
    assert_eq!(4, provider.group_size("group_a"));
    assert!(provider.deleted_nodes("group_a").is_empty());
}

#[test]
fn test_failed_scale_down_backs_off_between_trials() {
    init_logger();
    let (cluster, provider, _, _) = three_underutilized_nodes();
    provider.set_fail_delete(true);
    let mut reconciler = build_reconciler(default_test_config(None), &cluster, &provider, 0.0);

    // Nothing is old enough yet: a trial that removes nothing still arms
    // the backoff.
    reconciler.tick(1000.0);
    assert_eq!(
        1,
        reconciler.metrics.accumulated.total_failed_scale_down_trials
    );

    // Old enough now, but the provider refuses the delete.
    reconciler.tick(1700.0);
    assert_eq!(
        2,
        reconciler.metrics.accumulated.total_failed_scale_down_trials
    );
    assert_eq!(vec!["pod_a".to_string()], cluster.evicted_pods());
    assert!(cluster
        .events()
        .iter()
        .any(|event| matches!(event, AutoscalerEvent::ScaleDownFailed { .. })));

    // Within the trial interval the action is not retried.
    reconciler.tick(1720.0);
    assert_eq!(
        2,
        reconciler.metrics.accumulated.total_failed_scale_down_trials
    );
    assert_eq!(1, cluster.evicted_pods().len());
    assert_eq!(0, provider.total_mutations());
}

#[test]
fn test_scale_down_can_be_disabled() {
    let (cluster, provider, _, _) = three_underutilized_nodes();
    let config = default_test_config(Some("\n    scale_down_enabled: false\n"));
    let mut reconciler = build_reconciler(config, &cluster, &provider, 0.0);

    reconciler.tick(10000.0);
    reconciler.tick(20000.0);

    assert_eq!(0, provider.total_mutations());
    assert!(reconciler.unneeded_nodes().is_empty());
}
