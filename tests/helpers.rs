use kubescaler::core::node::Node;
use kubescaler::core::pod::Pod;
use kubescaler::test_util::helpers::{
    bounds, build_node, scheduled_pod, FakeCluster, FakeNodeGroupProvider,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three 10-core nodes in one group, each hosting one pod, with utilizations
/// 10%, 20% and 20%. The starting point of most scale-down tests.
#[allow(dead_code)]
pub fn three_underutilized_nodes() -> (FakeCluster, FakeNodeGroupProvider, Vec<Node>, Vec<Pod>) {
    let cluster = FakeCluster::new();
    let provider = FakeNodeGroupProvider::new();

    let nodes = vec![
        build_node("node_a", 10000, 17179869184),
        build_node("node_b", 10000, 17179869184),
        build_node("node_c", 10000, 17179869184),
    ];
    let pods = vec![
        scheduled_pod("pod_a", 1000, 1073741824, "node_a"),
        scheduled_pod("pod_b", 2000, 1073741824, "node_b"),
        scheduled_pod("pod_c", 2000, 1073741824, "node_c"),
    ];
    for node in nodes.iter() {
        cluster.add_node(node.clone());
    }
    for pod in pods.iter() {
        cluster.add_scheduled_pod(pod.clone());
    }
    provider.add_group(
        bounds("group_a", 1, 5),
        build_node("group_a_template", 10000, 17179869184),
        vec![
            "node_a".to_string(),
            "node_b".to_string(),
            "node_c".to_string(),
        ],
    );

    (cluster, provider, nodes, pods)
}
