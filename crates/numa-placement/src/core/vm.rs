//! Placement view of virtual machine.

use serde::{Deserialize, Serialize};

use crate::core::common::{NumaTuneMode, VirtualNodeKey};

/// Virtual NUMA node of VM.
///
/// Memory demand is in MB. `candidates` lists indices of host NUMA nodes the node may be placed on,
/// in the order they were configured.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualNumaNode {
    pub id: u32,
    pub memory: u64,
    #[serde(default)]
    pub cpu_count: u32,
    pub candidates: Vec<u32>,
}

impl VirtualNumaNode {
    /// Creates virtual node without vCPUs.
    pub fn new(id: u32, memory: u64, candidates: Vec<u32>) -> Self {
        Self {
            id,
            memory,
            cpu_count: 0,
            candidates,
        }
    }

    /// Creates virtual node carrying the specified number of vCPUs.
    pub fn with_cpus(id: u32, memory: u64, cpu_count: u32, candidates: Vec<u32>) -> Self {
        Self {
            id,
            memory,
            cpu_count,
            candidates,
        }
    }
}

/// CPU topology exposed to the guest.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuTopology {
    pub sockets: u32,
    pub cores_per_socket: u32,
    pub threads_per_core: u32,
}

impl CpuTopology {
    pub fn new(sockets: u32, cores_per_socket: u32, threads_per_core: u32) -> Self {
        Self {
            sockets,
            cores_per_socket,
            threads_per_core,
        }
    }

    /// Returns the total number of vCPUs, or `None` if it does not fit `u32`.
    pub fn vcpu_count(&self) -> Option<u32> {
        self.sockets
            .checked_mul(self.cores_per_socket)?
            .checked_mul(self.threads_per_core)
    }
}

impl Default for CpuTopology {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

/// Represents virtual machine (VM) as seen by NUMA placement.
///
// Only the data needed to place memory and pin vCPUs is kept here, the rest of VM state is owned by the caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VirtualMachine {
    pub id: u32,
    #[serde(default)]
    pub numa_tune_mode: NumaTuneMode,
    #[serde(default)]
    pub cpu_topology: CpuTopology,
    #[serde(default)]
    pub numa_nodes: Vec<VirtualNumaNode>,
}

impl VirtualMachine {
    /// Creates strictly tuned VM with specified virtual NUMA nodes.
    pub fn new(id: u32, numa_nodes: Vec<VirtualNumaNode>) -> Self {
        Self {
            id,
            numa_tune_mode: NumaTuneMode::Strict,
            cpu_topology: CpuTopology::default(),
            numa_nodes,
        }
    }

    /// Creates VM with specified CPU topology and no virtual NUMA nodes.
    pub fn with_topology(id: u32, cpu_topology: CpuTopology) -> Self {
        Self {
            id,
            numa_tune_mode: NumaTuneMode::Strict,
            cpu_topology,
            numa_nodes: Vec::new(),
        }
    }

    /// Returns the key of the specified virtual node of this VM.
    pub fn node_key(&self, node: &VirtualNumaNode) -> VirtualNodeKey {
        VirtualNodeKey::new(self.id, node.id)
    }

    /// Returns the total memory demand of VM.
    pub fn memory(&self) -> u64 {
        self.numa_nodes.iter().map(|n| n.memory).sum()
    }
}
