//! Pending-job queue.
//!
//! Strict FIFO: jobs run in the order they were enqueued, and a job retried
//! after a transient failure goes to the back. A job interrupted by shutdown
//! goes to the front.

use forge_training::JobId;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<JobId>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job. Returns `false` if it was already queued.
    pub fn enqueue(&self, job_id: JobId) -> bool {
        {
            let mut pending = self.lock();
            if pending.contains(&job_id) {
                return false;
            }
            debug!(job_id = %job_id, position = pending.len(), "enqueueing job");
            pending.push_back(job_id);
        }
        self.notify.notify_one();
        true
    }

    /// Puts a job ahead of everything queued, moving it if already present.
    pub fn enqueue_front(&self, job_id: JobId) {
        {
            let mut pending = self.lock();
            pending.retain(|queued| *queued != job_id);
            debug!(job_id = %job_id, "enqueueing job at the front");
            pending.push_front(job_id);
        }
        self.notify.notify_one();
    }

    /// Pops the oldest queued job.
    pub fn dequeue(&self) -> Option<JobId> {
        self.lock().pop_front()
    }

    /// Removes a job wherever it sits in the queue.
    pub fn remove(&self, job_id: &JobId) -> bool {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|queued| queued != job_id);
        before != pending.len()
    }

    #[must_use]
    pub fn contains(&self, job_id: &JobId) -> bool {
        self.lock().contains(job_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<JobId> {
        self.lock().iter().cloned().collect()
    }

    /// Resolves after the next `enqueue` (or immediately if one happened
    /// since the last wake-up).
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        queue.enqueue(JobId::from("a"));
        queue.enqueue(JobId::from("b"));
        queue.enqueue(JobId::from("c"));

        assert_eq!(queue.dequeue(), Some(JobId::from("a")));
        assert_eq!(queue.dequeue(), Some(JobId::from("b")));
        assert_eq!(queue.dequeue(), Some(JobId::from("c")));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_duplicate_enqueue_ignored() {
        let queue = JobQueue::new();
        assert!(queue.enqueue(JobId::from("a")));
        assert!(!queue.enqueue(JobId::from("a")));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove() {
        let queue = JobQueue::new();
        queue.enqueue(JobId::from("a"));
        queue.enqueue(JobId::from("b"));

        assert!(queue.remove(&JobId::from("a")));
        assert!(!queue.remove(&JobId::from("a")));
        assert_eq!(queue.snapshot(), vec![JobId::from("b")]);
    }

    #[test]
    fn test_enqueue_front_jumps_the_line() {
        let queue = JobQueue::new();
        queue.enqueue(JobId::from("a"));
        queue.enqueue(JobId::from("b"));
        queue.enqueue_front(JobId::from("c"));
        queue.enqueue_front(JobId::from("b"));

        assert_eq!(queue.snapshot(), vec![JobId::from("b"), JobId::from("c"), JobId::from("a")]);
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = std::sync::Arc::new(JobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue.notified().await;
                queue.dequeue()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(JobId::from("a"));

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(popped, Some(JobId::from("a")));
    }
}
