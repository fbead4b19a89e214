//! The reconciliation loop. One tick scans the cluster, re-tests pods the
//! scheduler gave up on, then scales up or, when hysteresis permits, scales
//! down. At most one node-group mutation is enacted per tick.

use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::cluster_api::ClusterApi;
use crate::config::AutoscalerConfig;
use crate::core::node::Node;
use crate::metrics::collector::MetricsCollector;
use crate::pod_filter::{
    filter_out_schedulable, newest_node_available_time, slice_pods_by_scheduled_time,
};
use crate::provider::NodeGroupProvider;
use crate::scale_down::{find_unneeded_nodes, scale_down, ScaleDownStatus};
use crate::scale_up::scale_up;
use crate::simulator::predicate::PredicateChecker;
use crate::simulator::usage_tracker::UsageTracker;

/// Owns every piece of cross-tick state: the hysteresis timers, the
/// unneeded-since map, location hints and the usage tracker. Nothing else
/// reads or writes them.
pub struct Reconciler {
    config: AutoscalerConfig,
    cluster: ClusterApi,
    provider: Box<dyn NodeGroupProvider>,
    predicate_checker: Box<dyn PredicateChecker>,

    last_scale_up_time: f64,
    last_scale_down_failed_trial: f64,
    /// Node name to the time it was first observed unneeded.
    unneeded_nodes: BTreeMap<String, f64>,
    /// Pod name to the node its last relocation plan chose, kept across
    /// scans as a warm start for the simulator.
    pod_location_hints: BTreeMap<String, String>,
    usage_tracker: UsageTracker,

    pub metrics: MetricsCollector,
}

impl Reconciler {
    /// `now` primes both hysteresis timers, so no scale down happens within
    /// `scale_down_delay` of startup.
    pub fn new(
        config: AutoscalerConfig,
        cluster: ClusterApi,
        provider: Box<dyn NodeGroupProvider>,
        predicate_checker: Box<dyn PredicateChecker>,
        now: f64,
    ) -> Self {
        Self {
            config,
            cluster,
            provider,
            predicate_checker,
            last_scale_up_time: now,
            last_scale_down_failed_trial: now,
            unneeded_nodes: Default::default(),
            pod_location_hints: Default::default(),
            usage_tracker: UsageTracker::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn last_scale_up_time(&self) -> f64 {
        self.last_scale_up_time
    }

    pub fn last_scale_down_failed_trial(&self) -> f64 {
        self.last_scale_down_failed_trial
    }

    pub fn unneeded_nodes(&self) -> &BTreeMap<String, f64> {
        &self.unneeded_nodes
    }

    pub fn pod_location_hints(&self) -> &BTreeMap<String, String> {
        &self.pod_location_hints
    }

    /// Runs ticks in real time, one per `scan_interval`. The timer is
    /// single-shot: a tick that overruns the interval is followed by the
    /// next one immediately, ticks never queue up. Terminates only with the
    /// process.
    pub fn run(&mut self) {
        info!(
            "Autoscaler started running every {} seconds",
            self.config.scan_interval
        );
        let epoch = Instant::now();
        loop {
            let tick_started = epoch.elapsed().as_secs_f64();
            self.tick(tick_started);
            let elapsed = epoch.elapsed().as_secs_f64() - tick_started;
            if elapsed < self.config.scan_interval {
                std::thread::sleep(std::time::Duration::from_secs_f64(
                    self.config.scan_interval - elapsed,
                ));
            }
        }
    }

    /// One scan of the cluster at time `now` (seconds, same clock as the
    /// node and pod timestamps).
    pub fn tick(&mut self, now: f64) {
        let tick_start = Instant::now();
        self.metrics.phase_started("main", now);
        self.run_tick(now);
        self.metrics
            .observe_phase_duration("main", tick_start.elapsed().as_secs_f64());
    }

    fn run_tick(&mut self, now: f64) {
        let nodes = match self.cluster.node_lister.list() {
            Ok(nodes) => nodes,
            Err(err) => {
                error!("Failed to list nodes: {}", err);
                self.metrics.accumulated.total_aborted_ticks += 1;
                return;
            }
        };
        if nodes.is_empty() {
            error!("No nodes in the cluster");
            self.metrics.accumulated.total_aborted_ticks += 1;
            return;
        }
        if let Err(reason) = self.check_groups_and_nodes(&nodes) {
            warn!("Cluster is not ready for autoscaling: {}", reason);
            self.metrics.accumulated.total_aborted_ticks += 1;
            return;
        }

        let all_unschedulable_pods = match self.cluster.unschedulable_pod_lister.list() {
            Ok(pods) => pods,
            Err(err) => {
                error!("Failed to list unschedulable pods: {}", err);
                self.metrics.accumulated.total_aborted_ticks += 1;
                return;
            }
        };
        let scheduled_pods = match self.cluster.scheduled_pod_lister.list() {
            Ok(pods) => pods,
            Err(err) => {
                error!("Failed to list scheduled pods: {}", err);
                self.metrics.accumulated.total_aborted_ticks += 1;
                return;
            }
        };

        // Markers older than the newest node are stale: the cluster has
        // changed since the scheduler gave up, so clear them and let it
        // retry instead of acting on them.
        let all_nodes_available_time = newest_node_available_time(&nodes);
        let (pods_to_reset, mut pods_to_help) =
            slice_pods_by_scheduled_time(all_unschedulable_pods, all_nodes_available_time);
        for pod in pods_to_reset.iter() {
            match self.cluster.condition_updater.reset_unschedulable(pod) {
                Ok(()) => self.metrics.accumulated.total_pod_conditions_reset += 1,
                Err(err) => warn!(
                    "Failed to reset unschedulable condition of pod {:?}: {}",
                    pod.metadata.name, err
                ),
            }
        }

        let mut schedulable_pods_present = false;
        if self.config.verify_unschedulable_pods {
            let before = pods_to_help.len();
            pods_to_help = filter_out_schedulable(
                pods_to_help,
                &nodes,
                &scheduled_pods,
                self.predicate_checker.as_ref(),
            );
            if pods_to_help.len() != before {
                debug!("Schedulable pods present");
                schedulable_pods_present = true;
                self.metrics.accumulated.total_pods_filtered_as_schedulable +=
                    (before - pods_to_help.len()) as u64;
            }
        }

        if pods_to_help.is_empty() {
            info!("No unschedulable pods");
        } else {
            self.metrics.phase_started("scale_up", now);
            let scale_up_start = Instant::now();
            let outcome = scale_up(
                &pods_to_help,
                self.provider.as_mut(),
                self.predicate_checker.as_ref(),
                self.cluster.event_recorder.as_mut(),
            );
            self.metrics
                .observe_phase_duration("scale_up", scale_up_start.elapsed().as_secs_f64());

            match outcome {
                Err(err) => {
                    error!("Failed to scale up: {}", err);
                    self.metrics.accumulated.total_ticks += 1;
                    return;
                }
                Ok(Some(plan)) => {
                    self.last_scale_up_time = now;
                    self.metrics.accumulated.total_scaled_up_nodes += plan.delta;
                    self.metrics.accumulated.total_ticks += 1;
                    // No scale down in the same tick as a scale up.
                    return;
                }
                Ok(None) => {}
            }
        }

        if self.config.scale_down_enabled {
            // In dry run only the unneeded classification is updated.
            let calculate_unneeded_only = now - self.last_scale_up_time
                < self.config.scale_down_delay
                || now - self.last_scale_down_failed_trial < self.config.scale_down_trial_interval
                || schedulable_pods_present;

            debug!(
                "Scale down status: unneeded_only={} last_scale_up_time={:.1} \
                 last_scale_down_failed_trial={:.1} schedulable_pods_present={}",
                calculate_unneeded_only,
                self.last_scale_up_time,
                self.last_scale_down_failed_trial,
                schedulable_pods_present
            );

            self.usage_tracker
                .cleanup(now - self.config.scale_down_unneeded_time);

            self.metrics.phase_started("find_unneeded", now);
            let find_start = Instant::now();
            let result = find_unneeded_nodes(
                &nodes,
                &scheduled_pods,
                &self.unneeded_nodes,
                self.config.scale_down_utilization_threshold,
                self.provider.as_ref(),
                self.predicate_checker.as_ref(),
                &self.pod_location_hints,
                &mut self.usage_tracker,
                now,
            );
            self.metrics
                .observe_phase_duration("find_unneeded", find_start.elapsed().as_secs_f64());
            self.unneeded_nodes = result.unneeded;
            self.pod_location_hints = result.hints;

            for (node_name, since) in self.unneeded_nodes.iter() {
                debug!(
                    "Node {:?} is unneeded since {:.1}, duration {:.1}",
                    node_name,
                    since,
                    now - since
                );
            }

            if !calculate_unneeded_only {
                debug!("Starting scale down");
                self.metrics.phase_started("scale_down", now);
                let scale_down_start = Instant::now();
                let result = scale_down(
                    &nodes,
                    &self.unneeded_nodes,
                    &scheduled_pods,
                    self.config.scale_down_unneeded_time,
                    self.provider.as_mut(),
                    self.predicate_checker.as_ref(),
                    &self.pod_location_hints,
                    &self.usage_tracker,
                    self.cluster.pod_evictor.as_mut(),
                    self.cluster.event_recorder.as_mut(),
                    now,
                );
                self.metrics
                    .observe_phase_duration("scale_down", scale_down_start.elapsed().as_secs_f64());

                match result {
                    Ok(ScaleDownStatus::NodeDeleted(node_name)) => {
                        info!("Scale down removed node {:?}", node_name);
                        self.metrics.accumulated.total_scaled_down_nodes += 1;
                    }
                    Ok(ScaleDownStatus::NoNodeDeleted) => {
                        self.last_scale_down_failed_trial = now;
                        self.metrics.accumulated.total_failed_scale_down_trials += 1;
                    }
                    Err(err) => {
                        error!("Failed to scale down: {}", err);
                        self.last_scale_down_failed_trial = now;
                        self.metrics.accumulated.total_failed_scale_down_trials += 1;
                    }
                }
            }
        }

        self.metrics.accumulated.total_ticks += 1;
    }

    /// Every node in the snapshot must belong to a node group known to the
    /// provider, otherwise the engine cannot reason about the cluster.
    fn check_groups_and_nodes(&self, nodes: &[Node]) -> Result<(), String> {
        for node in nodes.iter() {
            match self.provider.group_for_node(&node.metadata.name) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Err(format!(
                        "node {} does not belong to a known node group",
                        node.metadata.name
                    ));
                }
                Err(err) => {
                    return Err(format!(
                        "group lookup for node {} failed: {}",
                        node.metadata.name, err
                    ));
                }
            }
        }
        Ok(())
    }
}
