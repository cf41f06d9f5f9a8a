use std::collections::VecDeque;

use crate::error::PoolError;


pub type TaskId = u64;

/// Dispatch state of a pool. Idle workers form a stack (most recently
/// freed first), queued tasks a fifo. Nothing is handed out until every
/// worker has reported ready or retired.
#[derive(Debug)]
pub struct Schedule<T> {
    queue: VecDeque<(TaskId, T)>,
    queue_limit: usize,
    idle: Vec<usize>,
    workers: usize,
    ready: usize,
    live: usize,
}

impl<T> Schedule<T> {
    /// `needs_init[i]` tells whether worker `i` must report ready before it
    /// can take tasks.
    pub fn new(queue_limit: usize, needs_init: &[bool]) -> Self {
        let idle = needs_init
            .iter()
            .enumerate()
            .filter(|(_, needs_init)| !**needs_init)
            .map(|(worker, _)| worker)
            .collect::<Vec<_>>();

        Self {
            queue: VecDeque::new(),
            queue_limit,
            ready: idle.len(),
            idle,
            workers: needs_init.len(),
            live: needs_init.len(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ready >= self.workers
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn live_workers(&self) -> usize {
        self.live
    }

    pub fn enqueue(&mut self, id: TaskId, task: T) -> Result<(), (PoolError, T)> {
        if self.queue.len() >= self.queue_limit {
            return Err((
                PoolError::QueueOverflow {
                    limit: self.queue_limit,
                },
                task,
            ));
        }

        self.queue.push_back((id, task));
        Ok(())
    }

    pub fn worker_ready(&mut self, worker: usize) {
        self.ready += 1;
        self.idle.push(worker);
    }

    /// A worker that failed to initialize still counts towards opening the
    /// gate, but never takes work.
    pub fn worker_retired(&mut self) {
        self.ready += 1;
        self.live = self.live.saturating_sub(1);
    }

    pub fn release(&mut self, worker: usize) {
        self.idle.push(worker);
    }

    pub fn next_dispatch(&mut self) -> Option<(usize, TaskId, T)> {
        if !self.is_open() || self.idle.is_empty() || self.queue.is_empty() {
            return None;
        }

        let worker = self.idle.pop()?;
        let (id, task) = self.queue.pop_front()?;
        Some((worker, id, task))
    }

    pub fn drain(&mut self) -> Vec<(TaskId, T)> {
        self.queue.drain(..).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_all(schedule: &mut Schedule<&'static str>) -> Vec<(usize, TaskId, &'static str)> {
        std::iter::from_fn(|| schedule.next_dispatch()).collect()
    }

    #[test]
    fn most_recently_freed_worker_goes_first() {
        let mut schedule = Schedule::new(8, &[false, false, false]);
        for (id, task) in ["a", "b", "c"].into_iter().enumerate() {
            schedule.enqueue(id as TaskId, task).unwrap();
        }

        let first = dispatch_all(&mut schedule);
        assert_eq!(first, vec![(2, 0, "a"), (1, 1, "b"), (0, 2, "c")]);

        schedule.release(0);
        schedule.release(2);
        schedule.enqueue(3, "d").unwrap();
        schedule.enqueue(4, "e").unwrap();

        assert_eq!(dispatch_all(&mut schedule), vec![(2, 3, "d"), (0, 4, "e")]);
    }

    #[test]
    fn gate_holds_tasks_until_every_worker_is_ready() {
        let mut schedule = Schedule::new(8, &[true, true]);
        schedule.enqueue(1, "a").unwrap();
        schedule.enqueue(2, "b").unwrap();

        schedule.worker_ready(1);
        assert!(!schedule.is_open());
        assert!(schedule.next_dispatch().is_none());

        schedule.worker_ready(0);
        assert!(schedule.is_open());
        assert_eq!(dispatch_all(&mut schedule), vec![(0, 1, "a"), (1, 2, "b")]);
    }

    #[test]
    fn retired_workers_open_the_gate_without_taking_work() {
        let mut schedule = Schedule::new(8, &[true, true]);
        schedule.enqueue(1, "a").unwrap();

        schedule.worker_retired();
        schedule.worker_ready(1);

        assert_eq!(schedule.live_workers(), 1);
        assert_eq!(dispatch_all(&mut schedule), vec![(1, 1, "a")]);
    }

    #[test]
    fn overflow_leaves_queue_untouched() {
        let mut schedule = Schedule::new(2, &[true]);
        schedule.enqueue(1, "a").unwrap();
        schedule.enqueue(2, "b").unwrap();

        let (err, task) = schedule.enqueue(3, "c").unwrap_err();
        assert_eq!(err, PoolError::QueueOverflow { limit: 2 });
        assert_eq!(task, "c");
        assert_eq!(schedule.queued_len(), 2);
    }
}
