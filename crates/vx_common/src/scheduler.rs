//! The tick engine: read-parallel, write-serial, render-drain task dispatch.
//!
//! One tick is a strictly sequenced pair of phases. During the *read phase* a pool of
//! worker threads cooperatively drains the read queue; read tasks get shared access to
//! the [`ChunkService`] and may enqueue further work. When the last read task finishes,
//! the last worker to leave the phase drains the *write queue* serially with exclusive
//! access to all worlds, then rolls the tick over: regular task templates are cloned
//! into the next tick's queues and staged tasks are appended. Render tasks accumulate
//! in their own queue and are drained whenever the main thread calls
//! [`TaskDispatcher::handle_render_tasks`]; they never gate the read/write cycle.
//!
//! A timer thread starts ticks at a fixed nominal period. If a tick is still running
//! when its successor fires, the successor is dropped and counted; regular tasks
//! reconstitute themselves, so skipped ticks lose no work.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::prelude::*;
use crate::service::ChunkService;
use crate::world::WorldManager;

/// Nominal tick period of the scheduler.
pub const TICK_PERIOD: Duration = Duration::from_millis(33);

/// A one-shot task run during the read phase with shared world access.
pub type ReadTask = Box<dyn FnOnce(&ChunkService) + Send + 'static>;
/// A one-shot task run during the write phase with exclusive world access.
pub type WriteTask = Box<dyn FnOnce(&mut WorldManager) + Send + 'static>;
/// A one-shot task run serially on the main thread with shared world access.
pub type RenderTask = Box<dyn FnOnce(&ChunkService) + Send + 'static>;

/// A task template enqueued into every tick's read queue.
///
/// The template itself is shared by all per-tick clones, so its observable state (an
/// observer handle, counters) carries across ticks. Templates cannot be removed; they
/// live as long as the dispatcher.
pub trait RegularReadTask: Send + Sync + 'static {
    /// Runs one tick's instance of the task.
    fn run(&self, service: &ChunkService);
}

/// A task template enqueued into every tick's write queue.
pub trait RegularWriteTask: Send + Sync + 'static {
    /// Runs one tick's instance of the task.
    fn run(&self, worlds: &mut WorldManager);
}

/// Tasks staged for the next tick and the regular templates cloned forward every tick.
#[derive(Default)]
struct StagedQueues {
    next_read: Vec<ReadTask>,
    regular_read: Vec<Arc<dyn RegularReadTask>>,
    regular_write: Vec<Arc<dyn RegularWriteTask>>,
}

#[derive(Default)]
struct Metrics {
    read_worker_micros: Vec<AtomicU64>,
    write_micros: AtomicU64,
    completed_ticks: AtomicU64,
    skipped_ticks: AtomicU64,
}

/// A point-in-time snapshot of the dispatcher's diagnostics.
#[derive(Clone, Debug, Default)]
pub struct DispatcherStats {
    /// Wall time each worker spent in its last read phase.
    pub read_worker_times: Vec<Duration>,
    /// Wall time of the last write phase.
    pub write_time: Duration,
    /// Number of fully completed ticks.
    pub completed_ticks: u64,
    /// Number of ticks dropped because their predecessor was still running.
    pub skipped_ticks: u64,
    /// Read tasks staged for the next tick.
    pub staged_read_tasks: usize,
    /// Write tasks waiting for the next write phase.
    pub pending_write_tasks: usize,
    /// Render tasks waiting for the next main-thread drain.
    pub pending_render_tasks: usize,
    /// Registered regular read templates.
    pub regular_read_tasks: usize,
    /// Registered regular write templates.
    pub regular_write_tasks: usize,
}

/// The tick engine. Owned by a [`ChunkService`]; see the module docs for the phase model.
pub struct TaskDispatcher {
    staged: Mutex<StagedQueues>,
    /// The current tick's read queue; `read_outstanding` counts queued + running tasks
    /// so the phase cannot end while an in-phase spawn is still possible.
    read_queue: Mutex<VecDeque<ReadTask>>,
    read_outstanding: AtomicUsize,
    /// Drained in enqueue order by the last worker out of the read phase.
    write_queue: Mutex<VecDeque<WriteTask>>,
    render_queue: Mutex<Vec<RenderTask>>,

    round: Mutex<u64>,
    tick_signal: Condvar,
    /// Set when a tick starts, cleared at rollover; a timer firing against a set flag
    /// skips the tick.
    entered: AtomicBool,
    unfinished_workers: AtomicUsize,
    worker_count: usize,
    tick_period: Duration,

    should_exit: AtomicBool,
    started: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
    metrics: Metrics,
}

impl TaskDispatcher {
    /// Constructs a stopped dispatcher with the given read pool size and tick period.
    pub fn new(worker_count: usize, tick_period: Duration) -> Self {
        let worker_count = worker_count.max(1);
        let mut metrics = Metrics::default();
        metrics
            .read_worker_micros
            .resize_with(worker_count, AtomicU64::default);
        Self {
            staged: Mutex::new(StagedQueues::default()),
            read_queue: Mutex::new(VecDeque::new()),
            read_outstanding: AtomicUsize::new(0),
            write_queue: Mutex::new(VecDeque::new()),
            render_queue: Mutex::new(Vec::new()),
            round: Mutex::new(0),
            tick_signal: Condvar::new(),
            entered: AtomicBool::new(false),
            unfinished_workers: AtomicUsize::new(worker_count),
            worker_count,
            tick_period,
            should_exit: AtomicBool::new(false),
            started: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
            metrics,
        }
    }

    /// Number of read-phase worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stages a read task for the next tick.
    pub fn add_read_task(&self, task: ReadTask) {
        self.staged.lock().unwrap().next_read.push(task);
    }

    /// Enqueues a read task into the *current* tick. Only meaningful from within a
    /// running read task; the phase will not end before the spawned task has run.
    pub fn add_read_task_now(&self, task: ReadTask) {
        let mut queue = self.read_queue.lock().unwrap();
        self.read_outstanding.fetch_add(1, AtomicOrdering::AcqRel);
        queue.push_back(task);
    }

    /// Enqueues a write task for the upcoming write phase. Tasks run in enqueue order.
    pub fn add_write_task(&self, task: WriteTask) {
        self.write_queue.lock().unwrap().push_back(task);
    }

    /// Enqueues a render task for the next main-thread drain.
    pub fn add_render_task(&self, task: RenderTask) {
        self.render_queue.lock().unwrap().push(task);
    }

    /// Registers a read template cloned into every tick.
    pub fn add_regular_read_task(&self, task: Arc<dyn RegularReadTask>) {
        self.staged.lock().unwrap().regular_read.push(task);
    }

    /// Registers a write template cloned into every tick.
    pub fn add_regular_write_task(&self, task: Arc<dyn RegularWriteTask>) {
        self.staged.lock().unwrap().regular_write.push(task);
    }

    /// Drains the accumulated render tasks serially on the calling thread, which is
    /// expected to be the main thread. Returns the number of tasks run. Unsynchronized
    /// with the tick phases.
    pub fn handle_render_tasks(&self, service: &ChunkService) -> usize {
        let batch = std::mem::take(&mut *self.render_queue.lock().unwrap());
        let count = batch.len();
        for task in batch {
            if std::panic::catch_unwind(AssertUnwindSafe(|| task(service))).is_err() {
                warn!("Render task panicked, continuing with the remaining tasks");
            }
        }
        count
    }

    /// Snapshots the dispatcher diagnostics.
    pub fn stats(&self) -> DispatcherStats {
        let staged = self.staged.lock().unwrap();
        DispatcherStats {
            read_worker_times: self
                .metrics
                .read_worker_micros
                .iter()
                .map(|m| Duration::from_micros(m.load(AtomicOrdering::Relaxed)))
                .collect(),
            write_time: Duration::from_micros(self.metrics.write_micros.load(AtomicOrdering::Relaxed)),
            completed_ticks: self.metrics.completed_ticks.load(AtomicOrdering::Acquire),
            skipped_ticks: self.metrics.skipped_ticks.load(AtomicOrdering::Relaxed),
            staged_read_tasks: staged.next_read.len(),
            pending_write_tasks: self.write_queue.lock().unwrap().len(),
            pending_render_tasks: self.render_queue.lock().unwrap().len(),
            regular_read_tasks: staged.regular_read.len(),
            regular_write_tasks: staged.regular_write.len(),
        }
    }

    /// Number of fully completed ticks so far.
    pub fn completed_ticks(&self) -> u64 {
        self.metrics.completed_ticks.load(AtomicOrdering::Acquire)
    }

    /// Starts the worker pool and the tick timer. Idempotent.
    pub(crate) fn start(&self, service: &Arc<ChunkService>) {
        if self.started.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        // Populate the first tick's queues before any worker can observe them.
        self.rollover();

        let mut threads = self.threads.lock().unwrap();
        for worker_id in 0..self.worker_count {
            let service = Arc::clone(service);
            threads.push(
                std::thread::Builder::new()
                    .name(format!("VX Update Worker {worker_id}"))
                    .stack_size(8 * 1024 * 1024)
                    .spawn(move || Self::worker_main(service, worker_id))
                    .expect("Could not create an update worker thread"),
            );
        }
        let service = Arc::clone(service);
        threads.push(
            std::thread::Builder::new()
                .name("VX Tick Timer".to_owned())
                .spawn(move || Self::timer_main(service))
                .expect("Could not create the tick timer thread"),
        );
        info!(workers = self.worker_count, "Update threads started");
    }

    /// Stops the worker pool and the timer, waiting for the current tick to finish.
    pub fn shutdown(&self) {
        self.should_exit.store(true, AtomicOrdering::Release);
        self.tick_signal.notify_all();
        let mut threads = self.threads.lock().unwrap();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        info!("Update threads exited");
    }

    /// Clones regular templates forward, appends staged tasks and opens the next tick.
    /// Runs with no tick active: either from the last worker of a tick, or at startup.
    fn rollover(&self) {
        let mut staged = self.staged.lock().unwrap();
        {
            let mut reads = self.read_queue.lock().unwrap();
            reads.extend(staged.next_read.drain(..));
            for template in &staged.regular_read {
                let template = Arc::clone(template);
                reads.push_back(Box::new(move |service: &ChunkService| template.run(service)));
            }
            self.read_outstanding.store(reads.len(), AtomicOrdering::Release);
        }
        {
            let mut writes = self.write_queue.lock().unwrap();
            for template in &staged.regular_write {
                let template = Arc::clone(template);
                writes.push_back(Box::new(move |worlds: &mut WorldManager| template.run(worlds)));
            }
        }
        self.unfinished_workers
            .store(self.worker_count, AtomicOrdering::Release);
        self.entered.store(false, AtomicOrdering::Release);
    }

    fn worker_main(service: Arc<ChunkService>, worker_id: usize) {
        debug!(worker_id, "Update worker initialized");
        let dispatcher = service.dispatcher();
        let mut seen_round = 0u64;
        loop {
            // Wait for the timer to open the next tick.
            {
                let mut round = dispatcher.round.lock().unwrap();
                while *round == seen_round && !dispatcher.should_exit.load(AtomicOrdering::Acquire) {
                    let (guard, _) = dispatcher
                        .tick_signal
                        .wait_timeout(round, Duration::from_millis(100))
                        .unwrap();
                    round = guard;
                }
                if dispatcher.should_exit.load(AtomicOrdering::Acquire) {
                    break;
                }
                seen_round = *round;
            }

            let phase_start = Instant::now();
            dispatcher.drain_read_phase(&service);
            dispatcher.metrics.read_worker_micros[worker_id]
                .store(phase_start.elapsed().as_micros() as u64, AtomicOrdering::Relaxed);

            // The last worker out of the read phase runs the write phase and rolls over.
            if dispatcher.unfinished_workers.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
                dispatcher.run_write_phase(&service);
                dispatcher.rollover();
                dispatcher.metrics.completed_ticks.fetch_add(1, AtomicOrdering::AcqRel);
            }
        }
        debug!(worker_id, "Update worker exited");
    }

    /// Claims and runs read tasks until the queue is empty *and* no task is in flight
    /// anywhere in the pool (an in-flight task may still spawn current-tick work).
    fn drain_read_phase(&self, service: &ChunkService) {
        loop {
            let task = self.read_queue.lock().unwrap().pop_front();
            match task {
                Some(task) => {
                    if std::panic::catch_unwind(AssertUnwindSafe(|| task(service))).is_err() {
                        warn!("Read task panicked, treating it as completed");
                    }
                    self.read_outstanding.fetch_sub(1, AtomicOrdering::AcqRel);
                }
                None => {
                    if self.read_outstanding.load(AtomicOrdering::Acquire) == 0 {
                        return;
                    }
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Runs the write queue serially under the world write lock, in enqueue order.
    /// Write tasks enqueued while draining run in the same phase.
    fn run_write_phase(&self, service: &ChunkService) {
        let phase_start = Instant::now();
        {
            let mut worlds = service.worlds_mut();
            loop {
                let task = self.write_queue.lock().unwrap().pop_front();
                let Some(task) = task else { break };
                if std::panic::catch_unwind(AssertUnwindSafe(|| task(&mut *worlds))).is_err() {
                    warn!("Write task panicked, treating it as completed");
                }
            }
        }
        self.metrics
            .write_micros
            .store(phase_start.elapsed().as_micros() as u64, AtomicOrdering::Relaxed);
    }

    fn timer_main(service: Arc<ChunkService>) {
        let dispatcher = service.dispatcher();
        debug!(period = ?dispatcher.tick_period, "Tick timer started");
        while !dispatcher.should_exit.load(AtomicOrdering::Acquire) {
            std::thread::sleep(dispatcher.tick_period);
            if dispatcher.should_exit.load(AtomicOrdering::Acquire) {
                break;
            }
            if dispatcher.entered.swap(true, AtomicOrdering::AcqRel) {
                dispatcher.metrics.skipped_ticks.fetch_add(1, AtomicOrdering::Relaxed);
                warn!("Tick skipped, the previous tick is still running");
            } else {
                let mut round = dispatcher.round.lock().unwrap();
                *round += 1;
                drop(round);
                dispatcher.tick_signal.notify_all();
            }
        }
        debug!("Tick timer exited");
    }
}

impl Drop for TaskDispatcher {
    fn drop(&mut self) {
        // Workers hold an Arc to the owning service, so by the time this runs they have
        // already exited; join any handles left by a missed shutdown() call.
        self.should_exit.store(true, AtomicOrdering::Release);
        if let Ok(mut threads) = self.threads.lock() {
            for handle in threads.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
