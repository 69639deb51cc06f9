//! NUMA placement of virtual machines.

pub mod assignment;
pub mod common;
pub mod config;
pub mod error;
pub mod host;
pub mod host_filter;
pub mod inventory;
pub mod node_pool;
pub mod pinning;
pub mod plan;
pub mod vm;
