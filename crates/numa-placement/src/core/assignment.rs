//! Assignment of virtual NUMA nodes to host NUMA nodes.

use std::collections::HashSet;

use indexmap::map::IndexMap;
use log::{debug, trace};

use crate::core::common::{AssignmentMode, VirtualNodeKey};
use crate::core::host::HostNumaNode;
use crate::core::node_pool::{NodeDemand, NodePoolState};
use crate::core::vm::{VirtualMachine, VirtualNumaNode};

/// Mapping of virtual NUMA nodes to host NUMA node indices.
///
/// Entries are kept in the order the nodes were placed: VM order of the batch, then virtual node order of VM.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumaAssignment {
    nodes: IndexMap<VirtualNodeKey, u32>,
}

impl NumaAssignment {
    /// Returns the host node assigned to the specified virtual node.
    pub fn get(&self, key: &VirtualNodeKey) -> Option<u32> {
        self.nodes.get(key).copied()
    }

    /// Returns the host node assigned to the virtual node `node` of VM `vm`.
    pub fn host_node(&self, vm: u32, node: u32) -> Option<u32> {
        self.get(&VirtualNodeKey::new(vm, node))
    }

    /// Returns the number of assigned virtual nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VirtualNodeKey, &u32)> {
        self.nodes.iter()
    }

    /// Returns the host nodes used by the specified VM, without duplicates.
    pub fn host_nodes_of_vm(&self, vm: u32) -> Vec<u32> {
        let mut result = Vec::new();
        for (key, &host_node) in self.nodes.iter() {
            if key.vm == vm && !result.contains(&host_node) {
                result.push(host_node);
            }
        }
        result
    }

    pub fn into_map(self) -> IndexMap<VirtualNodeKey, u32> {
        self.nodes
    }
}

/// Returns candidate host nodes of the virtual node in the order they are tried by the search.
///
/// Candidates are tried starting from the last configured one.
pub fn candidate_order(node: &VirtualNumaNode) -> impl Iterator<Item = u32> + '_ {
    node.candidates.iter().rev().copied()
}

/// Finds assignment of every virtual NUMA node of the VM batch to one of its candidate host nodes,
/// so that the capacity of host nodes is not exceeded.
///
/// Uses depth-first search with backtracking and returns the first complete assignment found.
/// Returns `None` if either list is empty, the inputs are malformed (duplicate IDs, a virtual node without
/// candidates) or there is no feasible assignment. The inputs are not modified.
pub fn find_assignment(
    vms: &[VirtualMachine],
    host_nodes: &[HostNumaNode],
    mode: AssignmentMode,
) -> Option<NumaAssignment> {
    if vms.is_empty() || host_nodes.is_empty() {
        debug!("Nothing to assign: {} VMs, {} host nodes", vms.len(), host_nodes.len());
        return None;
    }
    let mut pool = match NodePoolState::from_host_nodes(host_nodes, mode) {
        Some(pool) => pool,
        None => {
            debug!("Host nodes snapshot contains duplicate indices");
            return None;
        }
    };
    let search = AssignmentSearch::new(vms)?;

    let mut chosen = Vec::with_capacity(search.nodes.len());
    if !search.place(&mut pool, &mut chosen) {
        debug!(
            "No feasible assignment of {} virtual nodes to {} host nodes ({} mode)",
            search.nodes.len(),
            host_nodes.len(),
            mode
        );
        return None;
    }

    let nodes: IndexMap<VirtualNodeKey, u32> = search
        .nodes
        .iter()
        .map(|(key, _)| *key)
        .zip(chosen.into_iter())
        .collect();
    debug!("Assigned {} virtual nodes: {:?}", nodes.len(), nodes);
    Some(NumaAssignment { nodes })
}

/// Virtual nodes of the batch flattened in search order.
struct AssignmentSearch<'a> {
    nodes: Vec<(VirtualNodeKey, &'a VirtualNumaNode)>,
}

impl<'a> AssignmentSearch<'a> {
    fn new(vms: &'a [VirtualMachine]) -> Option<Self> {
        let mut keys = HashSet::new();
        let mut nodes = Vec::new();
        for vm in vms {
            for node in &vm.numa_nodes {
                let key = vm.node_key(node);
                if !keys.insert(key) {
                    debug!("Virtual node {} is listed twice", key);
                    return None;
                }
                if node.candidates.is_empty() {
                    debug!("Virtual node {} has no candidate host nodes", key);
                    return None;
                }
                nodes.push((key, node));
            }
        }
        if nodes.is_empty() {
            debug!("VM batch has no virtual nodes");
            return None;
        }
        Some(Self { nodes })
    }

    /// Places the virtual node at position `chosen.len()` and all nodes after it.
    ///
    /// On success `chosen` holds a host node for every virtual node. On failure `chosen` and the pool
    /// are left as they were before the call.
    fn place(&self, pool: &mut NodePoolState, chosen: &mut Vec<u32>) -> bool {
        let (key, node) = match self.nodes.get(chosen.len()) {
            Some(entry) => entry,
            None => return true,
        };
        for host_node in candidate_order(node) {
            let mut reservation = match pool.reserve(NodeDemand::from(*node), host_node) {
                Ok(reservation) => reservation,
                Err(verdict) => {
                    trace!("{} does not fit host node {}: {:?}", key, host_node, verdict);
                    continue;
                }
            };
            trace!("{} tentatively placed on host node {}", key, host_node);
            chosen.push(host_node);
            if self.place(&mut reservation, chosen) {
                return true;
            }
            chosen.pop();
            trace!("Backtracking {} from host node {}", key, host_node);
        }
        false
    }
}
