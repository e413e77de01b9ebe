//! Supervised worker pool.
//!
//! Each worker is an OS thread pulling tasks from a shared channel and
//! sending completions back on another. Jobs run under `catch_unwind`, so a
//! panic while reading one file becomes a failed outcome instead of taking
//! the thread down. The coordinator supervises the pool from its receive
//! loop: a worker whose thread has exited is respawned, and a worker whose
//! current task has not signalled progress within the stall timeout is
//! abandoned and replaced. Abandoned threads are detached; whatever they
//! eventually produce is discarded.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use hashsweep_core::{SweepError, Task, TaskId, TaskOutcome};

use crate::diag::DiagnosticLog;

/// How often the coordinator checks worker health while waiting.
const SUPERVISE_TICK: Duration = Duration::from_millis(100);
/// Poll interval while waiting for running jobs during an abort.
const ABORT_POLL: Duration = Duration::from_millis(10);

/// Work executed for each task inside a worker thread.
pub type Job = Arc<dyn Fn(&Task, &WorkerContext) -> TaskOutcome + Send + Sync>;

/// A finished task as delivered to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: TaskId,
    pub outcome: TaskOutcome,
}

/// Per-worker bookkeeping shared between a worker and the supervisor.
#[derive(Debug, Default)]
struct SlotState {
    current: Mutex<Option<TaskId>>,
    last_beat_ms: AtomicU64,
    abandoned: AtomicBool,
}

/// Progress signal a job uses to prove it is not stuck.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    state: Arc<SlotState>,
    epoch: Instant,
}

impl Heartbeat {
    pub fn beat(&self) {
        self.state
            .last_beat_ms
            .store(millis_since(self.epoch), Ordering::Release);
    }
}

/// What a job sees of the worker running it.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    name: String,
    heartbeat: Heartbeat,
    diag: DiagnosticLog,
}

impl WorkerContext {
    /// Thread name, used in diagnostic lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn beat(&self) {
        self.heartbeat.beat();
    }

    pub fn diag(&self) -> &DiagnosticLog {
        &self.diag
    }
}

struct Slot {
    state: Arc<SlotState>,
    handle: JoinHandle<()>,
}

/// Fixed-size pool of supervised worker threads.
pub struct WorkerPool {
    job: Job,
    diag: DiagnosticLog,
    task_tx: Option<Sender<Task>>,
    task_rx: Receiver<Task>,
    result_tx: Sender<Completion>,
    result_rx: Receiver<Completion>,
    slots: Vec<Slot>,
    pending: VecDeque<Completion>,
    stall_timeout: Option<Duration>,
    epoch: Instant,
    last_supervised: Instant,
    spawned: u64,
    restarts: u64,
}

impl WorkerPool {
    /// Start `size` workers running `job`.
    pub fn new(
        size: usize,
        job: Job,
        diag: DiagnosticLog,
        stall_timeout: Option<Duration>,
    ) -> Result<Self, SweepError> {
        if size == 0 {
            return Err(SweepError::InvalidConfig {
                message: "worker pool needs at least one worker".to_string(),
            });
        }

        let (task_tx, task_rx) = channel::unbounded::<Task>();
        let (result_tx, result_rx) = channel::unbounded::<Completion>();
        let now = Instant::now();

        let mut pool = Self {
            job,
            diag,
            task_tx: Some(task_tx),
            task_rx,
            result_tx,
            result_rx,
            slots: Vec::with_capacity(size),
            pending: VecDeque::new(),
            stall_timeout,
            epoch: now,
            last_supervised: now,
            spawned: 0,
            restarts: 0,
        };
        for _ in 0..size {
            let slot = pool.spawn_worker()?;
            pool.slots.push(slot);
        }
        Ok(pool)
    }

    /// Workers replaced after dying or stalling.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Queue a task for the next free worker.
    pub fn submit(&self, task: Task) -> Result<(), SweepError> {
        let Some(tx) = &self.task_tx else {
            return Err(SweepError::worker_pool("pool is shut down"));
        };
        tx.send(task)
            .map_err(|_| SweepError::worker_pool("task channel closed"))
    }

    /// Wait for the next completion, in whatever order tasks finish.
    pub fn recv(&mut self) -> Result<Completion, SweepError> {
        loop {
            if let Some(completion) = self.recv_timeout(Duration::from_secs(60))? {
                return Ok(completion);
            }
        }
    }

    /// Wait up to `timeout` for a completion, supervising workers meanwhile.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Completion>, SweepError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.last_supervised.elapsed() >= SUPERVISE_TICK {
                self.supervise()?;
            }
            if let Some(completion) = self.pending.pop_front() {
                return Ok(Some(completion));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            match self.result_rx.recv_timeout((deadline - now).min(SUPERVISE_TICK)) {
                Ok(completion) => return Ok(Some(completion)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SweepError::worker_pool("result channel closed"));
                }
            }
        }
    }

    /// Close the task channel and join the live workers.
    ///
    /// Call only after every submitted task has been received.
    pub fn shutdown(mut self) {
        self.task_tx = None;
        for slot in self.slots.drain(..) {
            if slot.handle.join().is_err() {
                tracing::warn!("worker thread panicked during shutdown");
            }
        }
    }

    /// Stop after a coordinator failure.
    ///
    /// Queued tasks are discarded; jobs already running get up to `grace` to
    /// finish, after which their threads are detached. Returns the number of
    /// discarded tasks.
    pub fn abort(mut self, grace: Duration) -> usize {
        self.task_tx = None;
        let discarded = self.task_rx.try_iter().count();

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && self.slots.iter().any(|s| !s.handle.is_finished()) {
            thread::sleep(ABORT_POLL);
        }
        for slot in self.slots.drain(..) {
            if slot.handle.is_finished() && slot.handle.join().is_err() {
                tracing::warn!("worker thread panicked during abort");
            }
        }
        discarded
    }

    /// Replace dead and stalled workers, failing the tasks they held.
    fn supervise(&mut self) -> Result<(), SweepError> {
        self.last_supervised = Instant::now();
        let now_ms = millis_since(self.epoch);
        let mut replace = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.handle.is_finished() {
                if let Some(id) = slot.state.current.lock().take() {
                    self.pending.push_back(Completion {
                        id,
                        outcome: TaskOutcome::Failed("worker thread exited".to_string()),
                    });
                }
                tracing::warn!(worker = index, "worker thread exited, respawning");
                replace.push(index);
                continue;
            }

            let Some(limit) = self.stall_timeout else {
                continue;
            };
            let mut current = slot.state.current.lock();
            let Some(id) = *current else {
                continue;
            };
            let idle = now_ms.saturating_sub(slot.state.last_beat_ms.load(Ordering::Acquire));
            if u128::from(idle) >= limit.as_millis() {
                *current = None;
                slot.state.abandoned.store(true, Ordering::Release);
                drop(current);

                tracing::warn!(worker = index, task = %id, idle_ms = idle, "worker stalled, abandoning");
                self.diag.line(format_args!(
                    "[POOL] abandoning stalled worker {index} (task {id}, idle {idle} ms)"
                ));
                self.pending.push_back(Completion {
                    id,
                    outcome: TaskOutcome::Failed(format!(
                        "stalled for {idle} ms without read progress"
                    )),
                });
                replace.push(index);
            }
        }

        for index in replace {
            let slot = self.spawn_worker()?;
            // Dropping the old handle detaches the thread.
            self.slots[index] = slot;
            self.restarts += 1;
        }
        Ok(())
    }

    fn spawn_worker(&mut self) -> Result<Slot, SweepError> {
        let state = Arc::new(SlotState::default());
        let name = format!("hashsweep-worker-{}", self.spawned);
        self.spawned += 1;

        let ctx = WorkerContext {
            name: name.clone(),
            heartbeat: Heartbeat {
                state: Arc::clone(&state),
                epoch: self.epoch,
            },
            diag: self.diag.clone(),
        };
        let task_rx = self.task_rx.clone();
        let result_tx = self.result_tx.clone();
        let job = Arc::clone(&self.job);
        let worker_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(&task_rx, &result_tx, &job, &ctx, &worker_state))
            .map_err(|e| SweepError::worker_pool(format!("failed to spawn worker: {e}")))?;

        Ok(Slot { state, handle })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers exit once the queue drains; nothing waits for them here.
        self.task_tx = None;
    }
}

fn worker_loop(
    task_rx: &Receiver<Task>,
    result_tx: &Sender<Completion>,
    job: &Job,
    ctx: &WorkerContext,
    state: &SlotState,
) {
    while let Ok(task) = task_rx.recv() {
        ctx.beat();
        *state.current.lock() = Some(task.id);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&task, ctx))).unwrap_or_else(
            |payload| {
                let message = panic_message(payload.as_ref());
                ctx.diag().line(format_args!(
                    "[WORKER {}] PANIC {}: {message}",
                    ctx.name(),
                    task.path.display()
                ));
                TaskOutcome::Failed(format!("worker panicked: {message}"))
            },
        );

        {
            let mut current = state.current.lock();
            if state.abandoned.load(Ordering::Acquire) {
                // The supervisor already failed this task.
                return;
            }
            *current = None;
        }

        if result_tx
            .send(Completion {
                id: task.id,
                outcome,
            })
            .is_err()
        {
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn millis_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
}
