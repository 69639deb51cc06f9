//! Host NUMA node pool state.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use crate::core::common::{AllocationVerdict, AssignmentMode};
use crate::core::host::HostNumaNode;
use crate::core::vm::VirtualNumaNode;

/// Resources requested by a single virtual NUMA node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeDemand {
    pub memory: u64,
    pub cpus: u32,
}

impl NodeDemand {
    pub fn new(memory: u64, cpus: u32) -> Self {
        Self { memory, cpus }
    }
}

impl From<&VirtualNumaNode> for NodeDemand {
    fn from(node: &VirtualNumaNode) -> Self {
        Self::new(node.memory, node.cpu_count)
    }
}

/// Stores host node capacity and the part of it still available.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub memory_total: u64,
    pub cpu_total: u32,

    pub memory_available: u64,
    pub cpu_available: u32,
}

impl NodeInfo {
    pub fn new(memory_total: u64, cpu_total: u32) -> Self {
        Self {
            memory_total,
            cpu_total,
            memory_available: memory_total,
            cpu_available: cpu_total,
        }
    }
}

/// Remaining capacity counters of host NUMA nodes, local to one solve.
///
/// Allocations never overcommit: a demand is either fully satisfied by the node or rejected.
#[derive(Clone, Debug)]
pub struct NodePoolState {
    nodes: BTreeMap<u32, NodeInfo>,
    mode: AssignmentMode,
}

impl NodePoolState {
    fn new(mode: AssignmentMode) -> Self {
        Self {
            nodes: BTreeMap::new(),
            mode,
        }
    }

    /// Builds pool state from a host nodes snapshot.
    ///
    /// Returns `None` if the snapshot lists the same node index twice.
    pub fn from_host_nodes(host_nodes: &[HostNumaNode], mode: AssignmentMode) -> Option<Self> {
        let mut pool = Self::new(mode);
        for node in host_nodes {
            if pool.nodes.contains_key(&node.index) {
                return None;
            }
            pool.add_node(node.index, node.free_memory, node.cpu_count());
        }
        Some(pool)
    }

    fn add_node(&mut self, index: u32, memory_total: u64, cpu_total: u32) {
        self.nodes.insert(index, NodeInfo::new(memory_total, cpu_total));
    }

    /// Checks if the specified demand currently fits the specified node.
    pub fn can_allocate(&self, demand: &NodeDemand, index: u32) -> AllocationVerdict {
        let node = match self.nodes.get(&index) {
            Some(node) => node,
            None => return AllocationVerdict::HostNodeNotFound,
        };
        if node.memory_available < demand.memory {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.mode == AssignmentMode::MemoryAndCpu && node.cpu_available < demand.cpus {
            return AllocationVerdict::NotEnoughCPU;
        }
        AllocationVerdict::Success
    }

    /// Tentatively allocates the demand on the node.
    ///
    /// The allocation lasts as long as the returned reservation, which gives access to the rest of the pool
    /// and releases the demand when dropped.
    pub fn reserve(&mut self, demand: NodeDemand, index: u32) -> Result<NodeReservation<'_>, AllocationVerdict> {
        match self.can_allocate(&demand, index) {
            AllocationVerdict::Success => {
                self.allocate(&demand, index);
                Ok(NodeReservation {
                    pool: self,
                    index,
                    demand,
                })
            }
            verdict => Err(verdict),
        }
    }

    fn allocate(&mut self, demand: &NodeDemand, index: u32) {
        if let Some(node) = self.nodes.get_mut(&index) {
            node.memory_available -= demand.memory;
            if self.mode == AssignmentMode::MemoryAndCpu {
                node.cpu_available -= demand.cpus;
            }
        }
    }

    fn release(&mut self, demand: &NodeDemand, index: u32) {
        if let Some(node) = self.nodes.get_mut(&index) {
            node.memory_available += demand.memory;
            if self.mode == AssignmentMode::MemoryAndCpu {
                node.cpu_available += demand.cpus;
            }
        }
    }

    /// Returns the amount of available memory on the specified node.
    pub fn get_available_memory(&self, index: u32) -> Option<u64> {
        self.nodes.get(&index).map(|node| node.memory_available)
    }

    /// Returns the number of available CPUs on the specified node.
    pub fn get_available_cpu(&self, index: u32) -> Option<u32> {
        self.nodes.get(&index).map(|node| node.cpu_available)
    }

    /// Returns memory of the specified node currently taken by reservations.
    pub fn get_allocated_memory(&self, index: u32) -> Option<u64> {
        self.nodes
            .get(&index)
            .map(|node| node.memory_total - node.memory_available)
    }
}

/// Tentative allocation on a pool node, undone on drop.
pub struct NodeReservation<'a> {
    pool: &'a mut NodePoolState,
    index: u32,
    demand: NodeDemand,
}

impl NodeReservation<'_> {
    /// Returns the index of the reserved node.
    pub fn node(&self) -> u32 {
        self.index
    }
}

impl Deref for NodeReservation<'_> {
    type Target = NodePoolState;

    fn deref(&self) -> &Self::Target {
        &*self.pool
    }
}

impl DerefMut for NodeReservation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.pool
    }
}

impl Drop for NodeReservation<'_> {
    fn drop(&mut self) {
        self.pool.release(&self.demand, self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(mode: AssignmentMode) -> NodePoolState {
        let nodes = vec![
            HostNumaNode::with_cpus(0, 1000, vec![0, 1, 2, 3]),
            HostNumaNode::with_cpus(1, 500, vec![4, 5]),
        ];
        NodePoolState::from_host_nodes(&nodes, mode).unwrap()
    }

    #[test]
    fn test_reservation_is_released_on_drop() {
        let mut pool = pool(AssignmentMode::Memory);
        {
            let mut first = pool.reserve(NodeDemand::new(600, 0), 0).unwrap();
            assert_eq!(first.get_available_memory(0), Some(400));
            {
                let second = first.reserve(NodeDemand::new(400, 0), 0).unwrap();
                assert_eq!(second.node(), 0);
                assert_eq!(second.get_available_memory(0), Some(0));
                assert_eq!(second.get_allocated_memory(0), Some(1000));
            }
            assert_eq!(first.get_available_memory(0), Some(400));
            assert_eq!(
                first.reserve(NodeDemand::new(401, 0), 0).err(),
                Some(AllocationVerdict::NotEnoughMemory)
            );
        }
        assert_eq!(pool.get_available_memory(0), Some(1000));
        assert_eq!(pool.get_allocated_memory(0), Some(0));
    }

    #[test]
    fn test_cpu_capacity_depends_on_mode() {
        let demand = NodeDemand::new(100, 3);

        let memory_only = pool(AssignmentMode::Memory);
        assert_eq!(memory_only.can_allocate(&demand, 1), AllocationVerdict::Success);

        let mut with_cpus = pool(AssignmentMode::MemoryAndCpu);
        assert_eq!(with_cpus.can_allocate(&demand, 1), AllocationVerdict::NotEnoughCPU);
        let reservation = with_cpus.reserve(demand, 0).unwrap();
        assert_eq!(reservation.get_available_cpu(0), Some(1));
        drop(reservation);
        assert_eq!(with_cpus.get_available_cpu(0), Some(4));
    }

    #[test]
    fn test_unknown_and_duplicate_nodes() {
        let pool = pool(AssignmentMode::Memory);
        assert_eq!(pool.get_available_memory(1), Some(500));
        assert_eq!(pool.get_available_memory(7), None);
        assert_eq!(pool.get_available_cpu(7), None);
        assert_eq!(pool.get_allocated_memory(7), None);
        assert_eq!(
            pool.can_allocate(&NodeDemand::new(1, 0), 7),
            AllocationVerdict::HostNodeNotFound
        );

        let duplicated = vec![HostNumaNode::new(0, 10), HostNumaNode::new(0, 20)];
        assert!(NodePoolState::from_host_nodes(&duplicated, AssignmentMode::Memory).is_none());
    }
}
