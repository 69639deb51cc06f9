//! Placement configuration.

use serde::{Deserialize, Serialize};

use crate::core::common::AssignmentMode;
use crate::core::error::LoadError;
use crate::core::pinning::PinningPolicy;

/// Holds raw placement config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
struct RawPlacementConfig {
    pub assignment_mode: Option<AssignmentMode>,
    pub reserved_cores_per_node: Option<u32>,
    pub threads: Option<usize>,
}

/// Represents placement configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PlacementConfig {
    /// Resources accounted when assigning virtual NUMA nodes.
    pub assignment_mode: AssignmentMode,
    /// Number of leading cores of each host NUMA node excluded from vCPU pinning.
    pub reserved_cores_per_node: u32,
    /// Number of worker threads used to evaluate hosts.
    pub threads: usize,
}

impl PlacementConfig {
    /// Creates placement config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, LoadError> {
        Self::from_yaml_str(&std::fs::read_to_string(file_name)?)
    }

    /// Creates placement config from YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, LoadError> {
        let raw: RawPlacementConfig = serde_yaml::from_str(s)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawPlacementConfig) -> Self {
        Self {
            assignment_mode: raw.assignment_mode.unwrap_or_default(),
            reserved_cores_per_node: raw.reserved_cores_per_node.unwrap_or(1),
            threads: raw.threads.unwrap_or(1).max(1),
        }
    }

    /// Returns vCPU pinning policy defined by this config.
    pub fn pinning_policy(&self) -> PinningPolicy {
        PinningPolicy::new(self.reserved_cores_per_node)
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self::from_raw(RawPlacementConfig::default())
    }
}
