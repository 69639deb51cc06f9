//! Placement of VM batch on a single host.

use std::collections::HashSet;

use indexmap::map::IndexMap;
use log::debug;

use crate::core::assignment::{find_assignment, NumaAssignment};
use crate::core::config::PlacementConfig;
use crate::core::host::{HostNumaNode, HostTopology};
use crate::core::pinning::CpuPinning;
use crate::core::vm::VirtualMachine;

/// Result of placing VM batch on a host: memory assignment and per-VM vCPU pinning.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementPlan {
    pub assignment: NumaAssignment,
    /// vCPU pinning of each VM by VM ID, `None` if VM vCPUs could not be pinned.
    ///
    /// Pinnings of different VMs never share a host core.
    pub pinnings: IndexMap<u32, Option<CpuPinning>>,
}

/// Assigns virtual NUMA nodes of VMs to the host nodes and, if it succeeds, pins vCPUs of each VM on the same host.
///
/// VMs are pinned in batch order, each one on the cores left by the previous ones.
/// Returns `None` if the memory assignment is infeasible. Pinning failure of a VM does not fail the plan.
pub fn plan_placement(
    vms: &[VirtualMachine],
    host: &HostTopology,
    host_nodes: &[HostNumaNode],
    config: &PlacementConfig,
) -> Option<PlacementPlan> {
    let assignment = find_assignment(vms, host_nodes, config.assignment_mode)?;
    let policy = config.pinning_policy();
    let mut used_cores = HashSet::new();
    let mut pinnings = IndexMap::new();
    for vm in vms {
        let pinning = policy.compute_excluding(vm, host, host_nodes, &used_cores);
        if let Some(pinning) = &pinning {
            used_cores.extend(pinning.cores());
        }
        pinnings.insert(vm.id, pinning);
    }
    debug!(
        "Planned {} VMs: {} of them pinned",
        vms.len(),
        pinnings.values().filter(|p| p.is_some()).count()
    );
    Some(PlacementPlan { assignment, pinnings })
}
