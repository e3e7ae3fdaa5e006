use std::collections::{HashMap, VecDeque};

use crate::job::JobId;

/// FIFO queue of job ids awaiting a free device.
///
/// The in-memory order here is the authoritative queue order; the
/// `queue_position` column persisted through `JobStore` is a derived,
/// advisory mirror recomputed after every mutation. No job id appears in
/// the queue twice.
#[derive(Clone, Debug, Default)]
pub struct AdmissionQueue {
    jobs: VecDeque<JobId>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail unless it is already queued.
    ///
    /// Idempotent: re-enqueueing a queued job is a no-op, which keeps
    /// recovery and normal submission from racing into duplicate entries.
    /// Returns whether the job was inserted.
    pub fn enqueue(&mut self, job_id: JobId) -> bool {
        if self.contains(job_id) {
            return false;
        }
        self.jobs.push_back(job_id);
        true
    }

    /// Remove and return the head of the queue.
    pub fn dequeue(&mut self) -> Option<JobId> {
        self.jobs.pop_front()
    }

    /// Put a job back at the head, undoing a dequeue whose transition
    /// could not be persisted.
    pub fn restore_front(&mut self, job_id: JobId) {
        debug_assert!(!self.contains(job_id), "job {job_id} restored while queued");
        self.jobs.push_front(job_id);
    }

    /// Drop a job from anywhere in the queue. Returns whether it was present.
    pub fn remove(&mut self, job_id: JobId) -> bool {
        match self.jobs.iter().position(|id| *id == job_id) {
            Some(index) => {
                self.jobs.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, job_id: JobId) -> bool {
        self.jobs.iter().any(|id| *id == job_id)
    }

    /// 1-based rank of every queued job; the head has rank 1.
    pub fn positions(&self) -> HashMap<JobId, u32> {
        self.iter_ranked().collect()
    }

    /// Queued jobs with their 1-based rank, in FIFO order.
    pub fn iter_ranked(&self) -> impl Iterator<Item = (JobId, u32)> + '_ {
        self.jobs
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as u32 + 1))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = AdmissionQueue::new();
        let a = JobId::new();
        let b = JobId::new();
        let c = JobId::new();

        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        assert_eq!(queue.dequeue(), Some(a));
        assert_eq!(queue.dequeue(), Some(b));
        assert_eq!(queue.dequeue(), Some(c));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn enqueue_is_idempotent() {
        let mut queue = AdmissionQueue::new();
        let a = JobId::new();
        let b = JobId::new();

        assert!(queue.enqueue(a));
        assert!(queue.enqueue(b));
        assert!(!queue.enqueue(a));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(), Some(a));
        assert_eq!(queue.dequeue(), Some(b));
    }

    #[test]
    fn positions_are_a_gapless_permutation() {
        let mut queue = AdmissionQueue::new();
        let ids: Vec<JobId> = (0..5).map(|_| JobId::new()).collect();
        for id in &ids {
            queue.enqueue(*id);
        }

        let positions = queue.positions();
        assert_eq!(positions.len(), 5);
        let mut ranks: Vec<u32> = positions.values().copied().collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
        for (index, id) in ids.iter().enumerate() {
            assert_eq!(positions[id], index as u32 + 1);
        }
    }

    #[test]
    fn positions_shift_after_dequeue() {
        let mut queue = AdmissionQueue::new();
        let a = JobId::new();
        let b = JobId::new();
        queue.enqueue(a);
        queue.enqueue(b);

        queue.dequeue();
        assert_eq!(queue.positions()[&b], 1);
    }

    #[test]
    fn restore_front_undoes_a_dequeue() {
        let mut queue = AdmissionQueue::new();
        let a = JobId::new();
        let b = JobId::new();
        queue.enqueue(a);
        queue.enqueue(b);

        let head = queue.dequeue().unwrap();
        queue.restore_front(head);

        assert_eq!(queue.positions()[&a], 1);
        assert_eq!(queue.positions()[&b], 2);
    }

    #[test]
    fn remove_from_middle_preserves_relative_order() {
        let mut queue = AdmissionQueue::new();
        let a = JobId::new();
        let b = JobId::new();
        let c = JobId::new();
        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        assert!(queue.remove(b));
        assert!(!queue.remove(b));
        assert_eq!(queue.dequeue(), Some(a));
        assert_eq!(queue.dequeue(), Some(c));
    }
}
