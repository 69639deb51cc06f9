//! Filtering of hosts able to take VM batch under NUMA constraints.

use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use threadpool::ThreadPool;

use crate::core::config::PlacementConfig;
use crate::core::host::{HostNumaNode, HostTopology};
use crate::core::plan::{plan_placement, PlacementPlan};
use crate::core::vm::VirtualMachine;

/// Topology snapshot of a candidate host.
#[derive(Clone, Debug, PartialEq)]
pub struct HostSnapshot {
    pub id: u32,
    pub topology: HostTopology,
    pub nodes: Vec<HostNumaNode>,
}

impl HostSnapshot {
    pub fn new(id: u32, topology: HostTopology, nodes: Vec<HostNumaNode>) -> Self {
        Self { id, topology, nodes }
    }
}

/// Evaluates candidate hosts in parallel and keeps those where VM batch can be placed.
pub struct NumaHostFilter {
    config: PlacementConfig,
}

impl NumaHostFilter {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    /// Returns IDs and placement plans of suitable hosts, in the order the hosts were passed.
    pub fn filter(&self, vms: &[VirtualMachine], hosts: Vec<HostSnapshot>) -> Vec<(u32, PlacementPlan)> {
        let host_count = hosts.len();
        let vms = Arc::new(vms.to_vec());
        let results = Arc::new(Mutex::new(Vec::new()));
        let pool = ThreadPool::new(self.config.threads.max(1));

        for (position, host) in hosts.into_iter().enumerate() {
            let vms = vms.clone();
            let results = results.clone();
            let config = self.config.clone();
            pool.execute(move || {
                if let Some(plan) = plan_placement(&vms, &host.topology, &host.nodes, &config) {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((position, host.id, plan));
                }
            });
        }

        pool.join();
        if pool.panic_count() > 0 {
            warn!("{} host evaluations panicked, their hosts are left out", pool.panic_count());
        }
        let mut results = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        results.sort_by_key(|(position, _, _)| *position);
        info!(
            "{} of {} hosts can take {} VMs",
            results.len(),
            host_count,
            vms.len()
        );
        results.into_iter().map(|(_, id, plan)| (id, plan)).collect()
    }
}
