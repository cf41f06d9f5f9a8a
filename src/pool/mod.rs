use std::{
    collections::HashMap,
    panic::{
        AssertUnwindSafe,
        catch_unwind,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        mpsc,
    },
    thread::JoinHandle,
};

use futures::channel::oneshot;
use tracing::{
    debug,
    error,
    warn,
};

use crate::error::{
    PoolError,
    TaskError,
};

pub mod config;
pub mod handle;
pub mod schedule;
pub mod worker;

pub use config::PoolConfig;
pub use handle::TaskHandle;
pub use schedule::{
    Schedule,
    TaskId,
};
pub use worker::Worker;

use handle::Settlement;


type Outcome<W> = Settlement<<W as Worker>::Output, <W as Worker>::Error>;

struct PoolState<W: Worker> {
    schedule: Schedule<W::Task>,
    pending: HashMap<TaskId, oneshot::Sender<Outcome<W>>>,
    inboxes: Vec<Option<mpsc::Sender<(TaskId, W::Task)>>>,
    next_id: TaskId,
    shut_down: bool,
}

impl<W: Worker> PoolState<W> {
    fn settle(&mut self, id: TaskId, outcome: Outcome<W>) {
        if let Some(sender) = self.pending.remove(&id) {
            // the caller may have dropped its handle
            let _ = sender.send(outcome);
        }
    }

    fn dispatch(&mut self) {
        if self.shut_down {
            return;
        }

        while let Some((worker, id, task)) = self.schedule.next_dispatch() {
            debug!("dispatching task {id} to worker {worker}");

            let sent = self.inboxes[worker]
                .as_ref()
                .map(|inbox| inbox.send((id, task)).is_ok())
                .unwrap_or(false);

            if !sent {
                error!("worker {worker} is gone, dropping task {id}");
                self.inboxes[worker] = None;
                self.schedule.worker_retired();
                self.settle(id, Err(TaskError::WorkerFault { worker }));
            }
        }

        if self.schedule.is_open() && self.schedule.live_workers() == 0 {
            for (id, _) in self.schedule.drain() {
                self.settle(id, Err(TaskError::NoWorkers));
            }
        }
    }
}


struct Shared<W: Worker> {
    state: Mutex<PoolState<W>>,
}

impl<W: Worker> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, PoolState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready(&self, worker: usize) {
        let mut state = self.lock();
        debug!("worker {worker} ready");
        state.schedule.worker_ready(worker);
        state.dispatch();
    }

    fn retire(&self, worker: usize) {
        let mut state = self.lock();
        state.inboxes[worker] = None;
        state.schedule.worker_retired();
        state.dispatch();
    }

    fn complete(&self, worker: usize, id: TaskId, outcome: Outcome<W>) {
        let mut state = self.lock();
        state.settle(id, outcome);
        if state.shut_down {
            return;
        }
        state.schedule.release(worker);
        state.dispatch();
    }
}


fn run_worker<W: Worker>(
    index: usize,
    mut worker: W,
    inbox: mpsc::Receiver<(TaskId, W::Task)>,
    shared: Arc<Shared<W>>,
) {
    if worker.requires_init() {
        match catch_unwind(AssertUnwindSafe(|| worker.init())) {
            Ok(Ok(())) => shared.ready(index),
            Ok(Err(err)) => {
                error!("worker {index} failed to initialize: {err}");
                shared.retire(index);
                return;
            }
            Err(_) => {
                error!("worker {index} panicked during initialization");
                shared.retire(index);
                return;
            }
        }
    }

    while let Ok((id, task)) = inbox.recv() {
        let outcome = match catch_unwind(AssertUnwindSafe(|| worker.run(task))) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(TaskError::Failed(err)),
            Err(_) => {
                error!("worker {index} panicked while running task {id}");
                Err(TaskError::WorkerFault { worker: index })
            }
        };

        shared.complete(index, id, outcome);
    }

    debug!("worker {index} stopped");
}


/// Fixed set of worker threads fed from a bounded fifo.
///
/// Lifecycle: constructed with the gate closed while workers initialize,
/// gate open once all of them reported ready (or retired), shut down on
/// `shutdown` or drop.
pub struct WorkerPool<W: Worker> {
    config: PoolConfig,
    shared: Arc<Shared<W>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<W: Worker> WorkerPool<W> {
    pub fn new(
        config: PoolConfig,
        mut factory: impl FnMut(usize) -> W,
    ) -> Result<Self, std::io::Error> {
        let worker_limit = if config.worker_limit == 0 {
            warn!("worker_limit of 0 requested, using a single worker");
            1
        } else {
            config.worker_limit
        };

        let workers = (0..worker_limit).map(&mut factory).collect::<Vec<_>>();
        let needs_init = workers.iter().map(W::requires_init).collect::<Vec<_>>();

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..worker_limit).map(|_| mpsc::channel()).unzip();

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                schedule: Schedule::new(config.queue_limit, &needs_init),
                pending: HashMap::new(),
                inboxes: senders.into_iter().map(Some).collect(),
                next_id: 1,
                shut_down: false,
            }),
        });

        let pool = Self {
            config,
            shared: shared.clone(),
            threads: Mutex::new(Vec::with_capacity(worker_limit)),
        };

        for (index, (worker, inbox)) in workers.into_iter().zip(receivers).enumerate() {
            let shared = shared.clone();
            let thread = std::thread::Builder::new()
                .name(format!("splat-worker-{index}"))
                .spawn(move || run_worker(index, worker, inbox, shared))?;

            pool.threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(thread);
        }

        debug!(
            "worker pool started: {worker_limit} workers, queue limit {}",
            config.queue_limit,
        );

        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Queues a task, failing fast when the queue is full. The pool stays
    /// usable after an overflow.
    pub fn submit(&self, task: W::Task) -> Result<TaskHandle<W::Output, W::Error>, PoolError> {
        let mut state = self.shared.lock();
        if state.shut_down {
            return Err(PoolError::ShutDown);
        }
        if state.schedule.is_open() && state.schedule.live_workers() == 0 {
            return Err(PoolError::NoWorkers);
        }

        let id = state.next_id;
        if let Err((err, _)) = state.schedule.enqueue(id, task) {
            warn!("rejecting task: {err}");
            return Err(err);
        }
        state.next_id += 1;

        let (sender, receiver) = oneshot::channel();
        state.pending.insert(id, sender);
        state.dispatch();

        Ok(TaskHandle::new(id, receiver))
    }

    pub fn queued_len(&self) -> usize {
        self.shared.lock().schedule.queued_len()
    }

    /// Tasks submitted but not yet settled, queued or running.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.lock().schedule.idle_len()
    }

    pub fn live_workers(&self) -> usize {
        self.shared.lock().schedule.live_workers()
    }

    /// Whether every worker has finished its one-time setup.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().schedule.is_open()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shut_down
    }

    /// Stops every worker and discards queued and pending tasks; their
    /// handles resolve to `TaskError::Cancelled`. Running tasks finish but
    /// their results are dropped. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let discarded = state.schedule.drain().len();
            let pending = state.pending.len();
            state.pending.clear();
            state.inboxes.iter_mut().for_each(|inbox| *inbox = None);

            debug!("worker pool shut down: {discarded} queued, {pending} pending tasks discarded");
        }

        let current = std::thread::current().id();
        let threads = std::mem::take(&mut *self.threads.lock().unwrap_or_else(PoisonError::into_inner));
        for thread in threads {
            if thread.thread().id() == current {
                continue;
            }
            if thread.join().is_err() {
                error!("worker thread panicked outside of a task");
            }
        }
    }
}

impl<W: Worker> Drop for WorkerPool<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
