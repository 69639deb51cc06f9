use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Identifies a virtual NUMA node within a VM batch.
///
/// Virtual node IDs are only unique inside their VM, so the owning VM ID is a part of the key.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualNodeKey {
    pub vm: u32,
    pub node: u32,
}

impl VirtualNodeKey {
    pub fn new(vm: u32, node: u32) -> Self {
        Self { vm, node }
    }
}

impl Display for VirtualNodeKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "vm{}/vnode{}", self.vm, self.node)
    }
}

/// NUMA tuning mode requested for VM memory.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NumaTuneMode {
    #[default]
    Strict,
    Interleave,
    Preferred,
}

/// Resources accounted by the node assignment solver.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AssignmentMode {
    /// Only the free memory of host nodes is a capacity.
    #[default]
    Memory,
    /// The CPUs of host nodes are a capacity too, consumed by the vCPUs of virtual nodes.
    MemoryAndCpu,
}

impl Display for AssignmentMode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AssignmentMode::Memory => write!(f, "memory"),
            AssignmentMode::MemoryAndCpu => write!(f, "memory_and_cpu"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    Success,
    HostNodeNotFound,
}
