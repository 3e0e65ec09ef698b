/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Throughput comparison between the master instance and the backups.
//!
//! Every instance orders the same requests. If the master's primary is slow or censoring, the master
//! orders fewer requests than the backups over the same period. The master is *degraded* when
//!
//! ```text
//! master_ordered / mean(backup_ordered) < delta
//! ```
//!
//! and the backups have ordered at least `min_ordered` requests on average since the last reset.

use std::time::Instant;

use crate::types::data_types::InstanceId;

pub struct Monitor {
    delta: f64,
    min_ordered: u64,
    ordered: Vec<u64>,
    started: Instant,
}

impl Monitor {
    pub fn new(delta: f64, min_ordered: u64, instance_count: usize) -> Monitor {
        Monitor {
            delta,
            min_ordered,
            ordered: vec![0; instance_count],
            started: Instant::now(),
        }
    }

    /// Record that `inst_id` ordered a batch of `request_count` requests.
    pub fn request_ordered(&mut self, inst_id: InstanceId, request_count: usize) {
        match self.ordered.get_mut(inst_id.int() as usize) {
            Some(count) => *count += request_count as u64,
            None => log::debug!("Ignoring ordered requests of unknown instance {}", inst_id),
        }
    }

    /// Forget every count. Called when a view change starts, so that a new primary is not judged by its
    /// predecessor's throughput.
    pub fn reset(&mut self) {
        self.ordered.iter_mut().for_each(|count| *count = 0);
        self.started = Instant::now();
    }

    /// Track `instance_count` instances, keeping the counts of the ones that remain.
    pub fn set_instance_count(&mut self, instance_count: usize) {
        self.ordered.resize(instance_count, 0);
    }

    pub fn instance_count(&self) -> usize {
        self.ordered.len()
    }

    pub fn ordered(&self, inst_id: InstanceId) -> u64 {
        self.ordered.get(inst_id.int() as usize).copied().unwrap_or(0)
    }

    pub fn is_master_degraded(&self) -> bool {
        let backups = self.ordered.get(1..).unwrap_or(&[]);
        if backups.is_empty() {
            return false;
        }
        let backup_avg = backups.iter().sum::<u64>() as f64 / backups.len() as f64;
        if backup_avg < self.min_ordered as f64 {
            return false;
        }
        let master = self.ordered.first().copied().unwrap_or(0) as f64;
        let degraded = master / backup_avg < self.delta;
        if degraded {
            log::warn!(
                "Master ordered {} requests against a backup average of {:.1} in {:?}",
                master,
                backup_avg,
                self.started.elapsed()
            );
        }
        degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_only_after_enough_backup_throughput_test() {
        let mut monitor = Monitor::new(0.4, 10, 3);
        monitor.request_ordered(InstanceId::new(1), 8);
        monitor.request_ordered(InstanceId::new(2), 8);
        assert!(!monitor.is_master_degraded());

        monitor.request_ordered(InstanceId::new(1), 4);
        monitor.request_ordered(InstanceId::new(2), 4);
        monitor.request_ordered(InstanceId::MASTER, 4);
        assert!(monitor.is_master_degraded());

        monitor.request_ordered(InstanceId::MASTER, 2);
        assert!(!monitor.is_master_degraded());

        monitor.reset();
        assert_eq!(monitor.ordered(InstanceId::new(1)), 0);
    }

    #[test]
    fn single_instance_is_never_degraded_test() {
        let mut monitor = Monitor::new(0.4, 0, 1);
        monitor.request_ordered(InstanceId::new(5), 100);
        assert!(!monitor.is_master_degraded());
        monitor.set_instance_count(2);
        monitor.request_ordered(InstanceId::new(1), 100);
        assert!(monitor.is_master_degraded());
    }
}
