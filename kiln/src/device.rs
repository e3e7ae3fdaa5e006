use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

use crate::error::SchedulerError;
use crate::job::JobId;

/// Identifier of a schedulable GPU, drawn from a fixed pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u16);

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gpu{}", self.0)
    }
}

/// Fixed pool of GPU devices and their bindings.
///
/// The pool membership is set at construction and never changes; only the
/// free/bound state of each device does. A device is bound to at most one
/// job, and all binding state is process-local — it is rebuilt empty after
/// a restart (see `Scheduler::recover`).
#[derive(Clone, Debug)]
pub struct DeviceSet {
    /// Pool members in configured order; `find_free_device` scans this.
    order: Vec<DeviceId>,
    bound: HashMap<DeviceId, JobId>,
}

impl DeviceSet {
    /// Build a pool from the configured device ids, deduplicated but in
    /// their given order.
    pub fn new(devices: impl IntoIterator<Item = DeviceId>) -> Self {
        let mut order = Vec::new();
        for device in devices {
            if !order.contains(&device) {
                order.push(device);
            }
        }
        Self {
            order,
            bound: HashMap::new(),
        }
    }

    /// First free device in pool order, if any. No side effects.
    pub fn find_free_device(&self) -> Option<DeviceId> {
        self.order
            .iter()
            .copied()
            .find(|device| !self.bound.contains_key(device))
    }

    /// Bind a free device to a job.
    ///
    /// Fails with [`SchedulerError::DeviceUnavailable`] if the device is
    /// already bound or not a pool member. Under the scheduler's exclusion
    /// domain this can only happen on a logic defect.
    pub fn bind(&mut self, device: DeviceId, job_id: JobId) -> Result<(), SchedulerError> {
        if !self.order.contains(&device) || self.bound.contains_key(&device) {
            return Err(SchedulerError::DeviceUnavailable(device));
        }
        self.bound.insert(device, job_id);
        Ok(())
    }

    /// Clear a binding, returning the job that held the device.
    /// Returns `None` if the device was already free.
    pub fn unbind(&mut self, device: DeviceId) -> Option<JobId> {
        self.bound.remove(&device)
    }

    /// Job currently bound to a device, if any.
    pub fn bound_job(&self, device: DeviceId) -> Option<JobId> {
        self.bound.get(&device).copied()
    }

    /// Current bindings in pool order.
    pub fn bindings(&self) -> impl Iterator<Item = (DeviceId, JobId)> + '_ {
        self.order
            .iter()
            .filter_map(|device| self.bound.get(device).map(|job| (*device, *job)))
    }

    pub fn pool_size(&self) -> usize {
        self.order.len()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn free_count(&self) -> usize {
        self.order.len() - self.bound.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> DeviceSet {
        DeviceSet::new([DeviceId(0), DeviceId(4), DeviceId(7)])
    }

    #[test]
    fn finds_free_devices_in_pool_order() {
        let mut devices = pool();
        assert_eq!(devices.find_free_device(), Some(DeviceId(0)));

        devices.bind(DeviceId(0), JobId::new()).unwrap();
        assert_eq!(devices.find_free_device(), Some(DeviceId(4)));

        devices.bind(DeviceId(4), JobId::new()).unwrap();
        devices.bind(DeviceId(7), JobId::new()).unwrap();
        assert_eq!(devices.find_free_device(), None);
        assert_eq!(devices.free_count(), 0);
    }

    #[test]
    fn double_bind_is_rejected() {
        let mut devices = pool();
        devices.bind(DeviceId(4), JobId::new()).unwrap();

        let err = devices.bind(DeviceId(4), JobId::new()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::DeviceUnavailable(DeviceId(4))
        ));
    }

    #[test]
    fn bind_outside_pool_is_rejected() {
        let mut devices = pool();
        let err = devices.bind(DeviceId(1), JobId::new()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::DeviceUnavailable(DeviceId(1))
        ));
    }

    #[test]
    fn unbind_returns_holder_once() {
        let mut devices = pool();
        let job = JobId::new();
        devices.bind(DeviceId(7), job).unwrap();

        assert_eq!(devices.unbind(DeviceId(7)), Some(job));
        assert_eq!(devices.unbind(DeviceId(7)), None);
    }

    #[test]
    fn duplicate_config_entries_are_deduplicated() {
        let devices = DeviceSet::new([DeviceId(0), DeviceId(0), DeviceId(4)]);
        assert_eq!(devices.pool_size(), 2);
    }

    #[test]
    fn bindings_follow_pool_order() {
        let mut devices = pool();
        let a = JobId::new();
        let b = JobId::new();
        devices.bind(DeviceId(7), b).unwrap();
        devices.bind(DeviceId(0), a).unwrap();

        let listed: Vec<_> = devices.bindings().collect();
        assert_eq!(listed, vec![(DeviceId(0), a), (DeviceId(7), b)]);
    }
}
