//! Host topology and host NUMA nodes.

use serde::{Deserialize, Serialize};

/// Host-wide CPU counts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostTopology {
    pub sockets: u32,
    pub threads: u32,
    pub cores: u32,
}

impl HostTopology {
    pub fn new(sockets: u32, threads: u32, cores: u32) -> Self {
        Self { sockets, threads, cores }
    }

    /// Returns the number of hardware threads per physical core,
    /// or `None` if the counts do not describe a valid topology.
    pub fn threads_per_core(&self) -> Option<u32> {
        if self.sockets == 0 || self.cores == 0 || self.threads < self.cores || self.threads % self.cores != 0 {
            return None;
        }
        Some(self.threads / self.cores)
    }
}

/// NUMA node of physical host.
///
/// `free_memory` is in MB, `cpu_ids` are the logical CPUs belonging to the node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HostNumaNode {
    pub index: u32,
    pub free_memory: u64,
    #[serde(default)]
    pub cpu_ids: Vec<u32>,
}

impl HostNumaNode {
    /// Creates host node without CPUs.
    pub fn new(index: u32, free_memory: u64) -> Self {
        Self {
            index,
            free_memory,
            cpu_ids: Vec::new(),
        }
    }

    pub fn with_cpus(index: u32, free_memory: u64, cpu_ids: Vec<u32>) -> Self {
        Self {
            index,
            free_memory,
            cpu_ids,
        }
    }

    /// Returns the number of logical CPUs of the node.
    pub fn cpu_count(&self) -> u32 {
        self.cpu_ids.len() as u32
    }
}
