use numa_placement::core::common::{AssignmentMode, NumaTuneMode};
use numa_placement::core::config::PlacementConfig;
use numa_placement::core::error::LoadError;
use numa_placement::core::host::{HostNumaNode, HostTopology};
use numa_placement::core::host_filter::{HostSnapshot, NumaHostFilter};
use numa_placement::core::inventory::InventorySnapshot;
use numa_placement::core::plan::plan_placement;
use numa_placement::core::vm::{CpuTopology, VirtualMachine, VirtualNumaNode};

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// VM with four 1000 MB virtual nodes, each allowed on host nodes 0 and 1, and 8 vCPUs.
fn four_node_vm() -> VirtualMachine {
    let mut vm = VirtualMachine::new(
        7,
        (0..4).map(|i| VirtualNumaNode::new(i, 1000, vec![0, 1])).collect(),
    );
    vm.cpu_topology = CpuTopology::new(8, 1, 1);
    vm
}

fn two_node_host(id: u32, free_memory: u64) -> HostSnapshot {
    HostSnapshot::new(
        id,
        HostTopology::new(2, 64, 32),
        (0..2)
            .map(|i| HostNumaNode::with_cpus(i, free_memory, (0..=32).collect()))
            .collect(),
    )
}

#[test]
fn test_plan_on_single_host() {
    init_logger();
    let vms = vec![four_node_vm()];
    let host = two_node_host(1, 2500);

    let plan = plan_placement(&vms, &host.topology, &host.nodes, &PlacementConfig::default()).unwrap();
    assert_eq!(plan.assignment.host_node(7, 0), Some(1));
    assert_eq!(plan.assignment.host_node(7, 3), Some(0));
    assert_eq!(
        plan.pinnings[&7].as_ref().map(|p| p.to_string()),
        Some("0#1,33_1#1,33_2#2,34_3#2,34_4#17,49_5#17,49_6#18,50_7#18,50".to_string())
    );

    let host = two_node_host(1, 1500);
    assert_eq!(
        plan_placement(&vms, &host.topology, &host.nodes, &PlacementConfig::default()),
        None
    );
}

#[test]
// The memory assignment succeeds even if a VM has too few vCPUs to be pinned.
fn test_plan_without_pinning() {
    init_logger();
    let vms = vec![VirtualMachine::new(3, vec![VirtualNumaNode::new(0, 1000, vec![0, 1])])];
    let host = two_node_host(1, 2500);

    let plan = plan_placement(&vms, &host.topology, &host.nodes, &PlacementConfig::default()).unwrap();
    assert_eq!(plan.assignment.len(), 1);
    assert_eq!(plan.pinnings[&3], None);
}

#[test]
// The second VM is pinned on the cores left free by the first one.
fn test_plan_pins_vms_on_distinct_cores() {
    init_logger();
    let vms: Vec<VirtualMachine> = (1..=2)
        .map(|id| {
            let mut vm = VirtualMachine::new(id, vec![VirtualNumaNode::new(0, 1000, vec![0, 1])]);
            vm.cpu_topology = CpuTopology::new(8, 1, 1);
            vm
        })
        .collect();
    let host = two_node_host(1, 2500);

    let plan = plan_placement(&vms, &host.topology, &host.nodes, &PlacementConfig::default()).unwrap();
    assert_eq!(plan.assignment.len(), 2);
    let first = plan.pinnings[&1].clone().unwrap();
    let second = plan.pinnings[&2].clone().unwrap();
    assert_eq!(
        first.to_string(),
        "0#1,33_1#1,33_2#2,34_3#2,34_4#17,49_5#17,49_6#18,50_7#18,50"
    );
    assert_eq!(
        second.to_string(),
        "0#3,35_1#3,35_2#4,36_3#4,36_4#19,51_5#19,51_6#20,52_7#20,52"
    );
    assert!(first.cores().is_disjoint(&second.cores()));
}

#[test]
// A host whose pinning can not be computed is still suitable if the memory fits.
fn test_filter_keeps_host_without_pinning() {
    init_logger();
    let mut vm = VirtualMachine::new(5, vec![VirtualNumaNode::new(0, 1000, vec![0, 1])]);
    vm.cpu_topology = CpuTopology::new(65536, 65536, 1);
    let hosts = vec![two_node_host(10, 2500), two_node_host(20, 512)];

    let mut config = PlacementConfig::default();
    config.threads = 2;
    let suitable = NumaHostFilter::new(config).filter(&[vm], hosts);
    assert_eq!(suitable.len(), 1);
    assert_eq!(suitable[0].0, 10);
    assert_eq!(suitable[0].1.pinnings[&5], None);
}

#[test]
// Only hosts with room for two virtual nodes on each host node pass, in the order they were given.
fn test_filter_hosts() {
    init_logger();
    let vms = vec![four_node_vm()];
    let hosts = vec![
        two_node_host(10, 512),
        two_node_host(20, 2500),
        two_node_host(30, 1500),
        two_node_host(40, 2000),
    ];

    let mut config = PlacementConfig::default();
    config.threads = 4;
    let parallel = NumaHostFilter::new(config).filter(&vms, hosts.clone());
    assert_eq!(parallel.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![20, 40]);

    let sequential = NumaHostFilter::new(PlacementConfig::default()).filter(&vms, hosts);
    assert_eq!(parallel, sequential);

    assert!(NumaHostFilter::new(PlacementConfig::default())
        .filter(&vms, Vec::new())
        .is_empty());
}

#[test]
fn test_config_from_file() {
    init_logger();
    let config = PlacementConfig::from_file(&name_wrapper("config_cpu_aware.yaml")).unwrap();
    assert_eq!(config.assignment_mode, AssignmentMode::MemoryAndCpu);
    assert_eq!(config.reserved_cores_per_node, 1);
    assert_eq!(config.threads, 4);

    let missing = PlacementConfig::from_file(&name_wrapper("missing.yaml"));
    assert!(matches!(missing, Err(LoadError::Io(_))));
}

#[test]
fn test_yaml_snapshot() {
    init_logger();
    let snapshot = InventorySnapshot::from_file(&name_wrapper("snapshot_two_nodes.yaml")).unwrap();
    assert_eq!(snapshot.host, HostTopology::new(2, 64, 32));
    assert_eq!(snapshot.host_nodes.len(), 2);
    assert_eq!(snapshot.vm(7), Some(&four_node_vm()));

    let plan = snapshot.plan(&PlacementConfig::default()).unwrap();
    assert_eq!(plan.assignment.host_node(7, 0), Some(1));
    assert_eq!(plan.assignment.host_node(7, 1), Some(1));
    assert_eq!(plan.assignment.host_node(7, 2), Some(0));
    assert_eq!(plan.assignment.host_node(7, 3), Some(0));
    assert_eq!(plan.pinnings[&7].as_ref().map(|p| p.len()), Some(8));
}

#[test]
// The snapshot VM needs a host node per virtual node, both for memory and for CPUs.
fn test_json_snapshot() {
    init_logger();
    let snapshot = InventorySnapshot::from_file(&name_wrapper("snapshot_small.json")).unwrap();
    let vm = snapshot.vm(1).unwrap();
    assert_eq!(vm.numa_tune_mode, NumaTuneMode::Interleave);
    assert_eq!(vm.memory(), 2048);

    let config = PlacementConfig::from_file(&name_wrapper("config_cpu_aware.yaml")).unwrap();
    let plan = snapshot.plan(&config).unwrap();
    assert_eq!(plan.assignment.host_node(1, 0), Some(1));
    assert_eq!(plan.assignment.host_node(1, 1), Some(0));
    assert_eq!(
        plan.pinnings[&1].as_ref().map(|p| p.to_string()),
        Some("0#1,5_1#1,5_2#3,7_3#3,7".to_string())
    );

    assert!(matches!(
        InventorySnapshot::from_json_str("{\"host_nodes\": []}"),
        Err(LoadError::Json(_))
    ));
}
