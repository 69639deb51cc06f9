//! Pinning of vCPUs to hyperthread siblings of host cores.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::host::{HostNumaNode, HostTopology};
use crate::core::vm::VirtualMachine;

/// Separates entries of the pinning string.
pub const ENTRY_DELIMITER: char = '_';
/// Separates vCPU from its physical CPUs inside an entry.
pub const VCPU_DELIMITER: char = '#';
/// Separates physical CPUs of an entry.
pub const CPU_DELIMITER: char = ',';

/// Physical CPUs a single vCPU is bound to: all hardware threads of one host core.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PinningEntry {
    pub vcpu: u32,
    pub cpus: Vec<u32>,
}

impl Display for PinningEntry {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.vcpu, VCPU_DELIMITER)?;
        for (i, cpu) in self.cpus.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", CPU_DELIMITER)?;
            }
            write!(f, "{}", cpu)?;
        }
        Ok(())
    }
}

/// vCPU pinning of VM, ordered by vCPU.
///
/// The string form is `vcpu#cpu,cpu` entries joined by `_`, e.g. `0#1,33_1#1,33_2#2,34`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuPinning {
    entries: Vec<PinningEntry>,
}

impl CpuPinning {
    pub fn entries(&self) -> &[PinningEntry] {
        &self.entries
    }

    /// Returns the number of pinned vCPUs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the host cores used by this pinning.
    ///
    /// The first CPU of an entry is the number of the core, the others are its hyperthread siblings.
    pub fn cores(&self) -> HashSet<u32> {
        self.entries.iter().filter_map(|entry| entry.cpus.first().copied()).collect()
    }

    /// Returns the physical CPUs the specified vCPU is pinned to.
    pub fn cpus_of(&self, vcpu: u32) -> Option<&[u32]> {
        self.entries
            .iter()
            .find(|entry| entry.vcpu == vcpu)
            .map(|entry| entry.cpus.as_slice())
    }
}

impl Display for CpuPinning {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ENTRY_DELIMITER)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Error returned when a pinning string can not be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinningParseError {
    Empty,
    MalformedEntry(String),
    InvalidNumber(String),
    UnorderedVcpu(u32),
}

impl Display for PinningParseError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PinningParseError::Empty => write!(f, "empty pinning string"),
            PinningParseError::MalformedEntry(entry) => write!(f, "malformed pinning entry '{}'", entry),
            PinningParseError::InvalidNumber(value) => write!(f, "invalid CPU number '{}'", value),
            PinningParseError::UnorderedVcpu(vcpu) => write!(f, "vCPU {} is out of ascending order", vcpu),
        }
    }
}

impl std::error::Error for PinningParseError {}

fn parse_cpu(value: &str) -> Result<u32, PinningParseError> {
    value
        .parse::<u32>()
        .map_err(|_| PinningParseError::InvalidNumber(value.to_string()))
}

impl FromStr for CpuPinning {
    type Err = PinningParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PinningParseError::Empty);
        }
        let mut entries: Vec<PinningEntry> = Vec::new();
        for entry_str in s.split(ENTRY_DELIMITER) {
            let (vcpu_str, cpus_str) = entry_str
                .split_once(VCPU_DELIMITER)
                .ok_or_else(|| PinningParseError::MalformedEntry(entry_str.to_string()))?;
            if cpus_str.is_empty() {
                return Err(PinningParseError::MalformedEntry(entry_str.to_string()));
            }
            let vcpu = parse_cpu(vcpu_str)?;
            if let Some(last) = entries.last() {
                if last.vcpu >= vcpu {
                    return Err(PinningParseError::UnorderedVcpu(vcpu));
                }
            }
            let cpus = cpus_str.split(CPU_DELIMITER).map(parse_cpu).collect::<Result<Vec<_>, _>>()?;
            entries.push(PinningEntry { vcpu, cpus });
        }
        Ok(Self { entries })
    }
}

/// Decides how many host cores are withheld and how vCPUs are spread over host NUMA nodes.
///
/// Host cores are numbered contiguously across NUMA nodes in the order of node indices, each node holding
/// `cpu_ids.len() / threads_per_core` of them. The hyperthread siblings of core `c` are
/// `c, c + total_cores, c + 2 * total_cores, ...`. Every pinnable core serves `threads_per_core` consecutive vCPUs,
/// all bound to the whole sibling group.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinningPolicy {
    /// Number of leading cores of each host node kept for the host.
    pub reserved_cores_per_node: u32,
}

impl Default for PinningPolicy {
    fn default() -> Self {
        Self {
            reserved_cores_per_node: 1,
        }
    }
}

impl PinningPolicy {
    pub fn new(reserved_cores_per_node: u32) -> Self {
        Self { reserved_cores_per_node }
    }

    /// Returns the number of vCPUs each host node is asked to take.
    ///
    /// vCPUs are split evenly, the remainder of the division stays unpinned.
    pub fn slots_per_node(&self, vcpus: u32, node_count: u32) -> u32 {
        if node_count == 0 {
            return 0;
        }
        vcpus / node_count
    }

    /// Computes vCPU pinning of VM spread over the specified host nodes.
    ///
    /// A node takes at most as many vCPUs as its pinnable cores can serve, so the result may pin fewer vCPUs
    /// than VM has. Returns `None` if the topologies are invalid or no vCPU can be pinned.
    pub fn compute(&self, vm: &VirtualMachine, host: &HostTopology, host_nodes: &[HostNumaNode]) -> Option<CpuPinning> {
        self.compute_excluding(vm, host, host_nodes, &HashSet::new())
    }

    /// Same as [`compute`](Self::compute), but the cores in `used_cores` (already pinned to other VMs)
    /// are not pinnable.
    pub fn compute_excluding(
        &self,
        vm: &VirtualMachine,
        host: &HostTopology,
        host_nodes: &[HostNumaNode],
        used_cores: &HashSet<u32>,
    ) -> Option<CpuPinning> {
        let vcpus = match vm.cpu_topology.vcpu_count() {
            Some(0) => {
                debug!("VM {} has no vCPUs to pin", vm.id);
                return None;
            }
            Some(vcpus) => vcpus,
            None => {
                debug!("vCPU count of VM {} overflows: {:?}", vm.id, vm.cpu_topology);
                return None;
            }
        };
        let threads_per_core = match host.threads_per_core() {
            Some(threads_per_core) => threads_per_core,
            None => {
                debug!("Invalid host topology {:?}", host);
                return None;
            }
        };

        let mut nodes: Vec<&HostNumaNode> = host_nodes.iter().collect();
        nodes.sort_by_key(|node| node.index);
        if nodes.windows(2).any(|pair| pair[0].index == pair[1].index) {
            debug!("Host nodes snapshot contains duplicate indices");
            return None;
        }

        let slots_per_node = self.slots_per_node(vcpus, nodes.len() as u32);
        if slots_per_node == 0 {
            debug!(
                "{} vCPUs of VM {} are too few to spread over {} host nodes",
                vcpus,
                vm.id,
                nodes.len()
            );
            return None;
        }

        let node_cores: Vec<u32> = nodes.iter().map(|node| node.cpu_count() / threads_per_core).collect();
        let total_cores: u32 = node_cores.iter().sum();

        let mut entries = Vec::new();
        let mut first_core = 0;
        for (node, &cores) in nodes.iter().zip(node_cores.iter()) {
            let pinnable_cores: Vec<u32> = (first_core..first_core + cores)
                .skip(self.reserved_cores_per_node as usize)
                .filter(|core| !used_cores.contains(core))
                .collect();
            let capacity = (pinnable_cores.len() as u64) * threads_per_core as u64;
            let slots = (slots_per_node as u64).min(capacity) as u32;
            if slots < slots_per_node {
                debug!(
                    "Host node {} can take {} of {} vCPUs of VM {}",
                    node.index, slots, slots_per_node, vm.id
                );
            }
            for slot in 0..slots {
                let core = pinnable_cores[(slot / threads_per_core) as usize];
                let vcpu = entries.len() as u32;
                entries.push(PinningEntry {
                    vcpu,
                    cpus: (0..threads_per_core).map(|thread| core + thread * total_cores).collect(),
                });
            }
            first_core += cores;
        }

        if entries.is_empty() {
            debug!("No pinnable cores left for VM {}", vm.id);
            return None;
        }
        if (entries.len() as u32) < vcpus {
            debug!("Pinned {} of {} vCPUs of VM {}", entries.len(), vcpus, vm.id);
        }
        Some(CpuPinning { entries })
    }
}

/// Computes vCPU pinning of VM with the default policy (the first core of each host node is withheld).
pub fn compute_pinning(vm: &VirtualMachine, host: &HostTopology, host_nodes: &[HostNumaNode]) -> Option<CpuPinning> {
    PinningPolicy::default().compute(vm, host, host_nodes)
}
