//! Inventory snapshots of host NUMA topology and VM placement requests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::config::PlacementConfig;
use crate::core::error::LoadError;
use crate::core::host::{HostNumaNode, HostTopology};
use crate::core::plan::{plan_placement, PlacementPlan};
use crate::core::vm::VirtualMachine;

/// Point-in-time view of a host and the VM batch to be placed on it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InventorySnapshot {
    pub host: HostTopology,
    #[serde(default)]
    pub host_nodes: Vec<HostNumaNode>,
    #[serde(default)]
    pub vms: Vec<VirtualMachine>,
}

impl InventorySnapshot {
    /// Reads snapshot from file, JSON if the file has `.json` extension and YAML otherwise.
    pub fn from_file(file_name: &str) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(file_name)?;
        match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Returns VM with the specified ID.
    pub fn vm(&self, id: u32) -> Option<&VirtualMachine> {
        self.vms.iter().find(|vm| vm.id == id)
    }

    /// Plans placement of the snapshot VMs on the snapshot host.
    pub fn plan(&self, config: &PlacementConfig) -> Option<PlacementPlan> {
        plan_placement(&self.vms, &self.host, &self.host_nodes, config)
    }
}
