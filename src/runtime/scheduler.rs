//! Cooperative fork/wait scheduler
//!
//! Forked tasks are `!Send` futures driven by a single-threaded tokio runtime
//! inside a [`LocalSet`], so they can share `Rc`-based values (`Val`,
//! `Reference`) without locking. Only one task runs at a time and control
//! changes hands only at explicit suspension points:
//!
//! - `sched_yield().await`
//! - `wait(id, timeout).await` / `wait_result(id).await`
//! - `usleep(us).await`
//! - `wait_queue_next(q, timeout).await`
//!
//! `fork` registers the task and returns its id immediately; the body starts
//! the next time the forking task suspends. A task that finishes with an
//! exception terminates only itself; the exception is stored and re-raised
//! by `wait_result`. A task that panics is recorded the same way, as an
//! `Error`.
//!
//! # Example
//! ```ignore
//! let value = Scheduler::run(|sched| async move {
//!     let id = sched.fork(async { Ok(Val::Int(42)) });
//!     sched.wait_result(id).await
//!         .map(|v| v.unwrap_or(Val::Null))
//! })?;
//! ```

use crate::builtins::exception::PhpException;
use crate::core::value::Val;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::LocalSet;

pub type TaskId = i64;
pub type QueueId = i64;

type Outcome = Result<Val, PhpException>;

#[derive(Debug)]
pub enum SchedulerError {
    /// The tokio runtime could not be built
    Runtime(std::io::Error),
    /// The main task finished with an exception nobody caught
    Uncaught(PhpException),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Runtime(e) => write!(f, "Failed to start scheduler: {}", e),
            SchedulerError::Uncaught(e) => write!(f, "Uncaught {}", e),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Runtime(e) => Some(e),
            SchedulerError::Uncaught(e) => Some(e),
        }
    }
}

#[derive(Default)]
struct WaitQueue {
    pending: Vec<TaskId>,
    ready: VecDeque<TaskId>,
}

#[derive(Default)]
struct SchedulerInner {
    next_task: TaskId,
    next_queue: QueueId,
    /// `None` while the task is still running
    tasks: HashMap<TaskId, Option<Outcome>>,
    queues: HashMap<QueueId, WaitQueue>,
}

/// Handle shared by every task of one scheduler run
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    /// Signalled whenever any task completes
    completed: Rc<Notify>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner::default())),
            completed: Rc::new(Notify::new()),
        }
    }

    /// Drive `main` to completion on a fresh single-threaded runtime.
    ///
    /// Tasks still running when `main` returns are dropped.
    pub fn run<F, Fut>(main: F) -> Result<Val, SchedulerError>
    where
        F: FnOnce(Scheduler) -> Fut,
        Fut: Future<Output = Outcome> + 'static,
    {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(SchedulerError::Runtime)?;
        let local = LocalSet::new();
        let sched = Scheduler::new();
        local
            .block_on(&rt, main(sched))
            .map_err(SchedulerError::Uncaught)
    }

    /// `fork(f())`: spawn a task and return its id without running it.
    ///
    /// Must be called from inside [`Scheduler::run`].
    pub fn fork<Fut>(&self, task: Fut) -> TaskId
    where
        Fut: Future<Output = Outcome> + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_task += 1;
            let id = inner.next_task;
            inner.tasks.insert(id, None);
            id
        };
        let body = tokio::task::spawn_local(task);
        let sched = self.clone();
        tokio::task::spawn_local(async move {
            let outcome = body.await.unwrap_or_else(|e| {
                Err(PhpException::with_class(
                    "Error",
                    format!("Task {} did not complete: {}", id, e),
                ))
            });
            sched.complete(id, outcome);
        });
        id
    }

    fn complete(&self, id: TaskId, outcome: Outcome) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.tasks.insert(id, Some(outcome));
            for queue in inner.queues.values_mut() {
                if let Some(pos) = queue.pending.iter().position(|&t| t == id) {
                    queue.pending.remove(pos);
                    queue.ready.push_back(id);
                }
            }
        }
        self.completed.notify_waiters();
    }

    pub fn is_finished(&self, id: TaskId) -> bool {
        matches!(self.inner.borrow().tasks.get(&id), Some(Some(_)))
    }

    fn is_known(&self, id: TaskId) -> bool {
        self.inner.borrow().tasks.contains_key(&id)
    }

    /// Number of forked tasks that have not finished yet
    pub fn running_tasks(&self) -> usize {
        self.inner
            .borrow()
            .tasks
            .values()
            .filter(|outcome| outcome.is_none())
            .count()
    }

    async fn until_finished(&self, id: TaskId) {
        while !self.is_finished(id) {
            self.completed.notified().await;
        }
    }

    /// `sched_yield()`: let every other runnable task make progress
    pub async fn sched_yield(&self) {
        tokio::task::yield_now().await;
    }

    /// `usleep($us)`
    pub async fn usleep(&self, micros: u64) {
        tokio::time::sleep(Duration::from_micros(micros)).await;
    }

    /// `wait($id, $timeout)`: `true` once the task has finished, normally or
    /// with an exception; `false` on timeout or for an unknown id
    pub async fn wait(&self, id: TaskId, timeout: Option<Duration>) -> bool {
        if !self.is_known(id) {
            return false;
        }
        match timeout {
            None => {
                self.until_finished(id).await;
                true
            }
            Some(limit) => tokio::time::timeout(limit, self.until_finished(id))
                .await
                .is_ok(),
        }
    }

    /// `wait_result($id)`: the task's return value, or its exception re-raised
    pub async fn wait_result(&self, id: TaskId) -> Result<Option<Val>, PhpException> {
        if !self.is_known(id) {
            return Ok(None);
        }
        self.until_finished(id).await;
        match self.inner.borrow().tasks.get(&id) {
            Some(Some(Ok(val))) => Ok(Some(val.clone())),
            Some(Some(Err(e))) => Err(e.clone()),
            _ => Ok(None),
        }
    }

    /// `wait_multi($ids)`: results in argument order, `None` for unknown
    /// tasks and tasks that threw
    pub async fn wait_multi(&self, ids: &[TaskId]) -> Vec<Option<Val>> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push(self.wait_result(id).await.ok().flatten());
        }
        results
    }

    /// `wait_queue_create($ids)`
    pub fn wait_queue_create(&self, ids: &[TaskId]) -> QueueId {
        let id = {
            let mut inner = self.inner.borrow_mut();
            inner.next_queue += 1;
            let id = inner.next_queue;
            inner.queues.insert(id, WaitQueue::default());
            id
        };
        for &task in ids {
            self.wait_queue_push(id, task);
        }
        id
    }

    /// `wait_queue_push($queue, $id)`: `false` for an unknown queue or task
    pub fn wait_queue_push(&self, queue: QueueId, task: TaskId) -> bool {
        let finished = self.is_finished(task);
        if !self.is_known(task) {
            return false;
        }
        let mut inner = self.inner.borrow_mut();
        let Some(q) = inner.queues.get_mut(&queue) else {
            return false;
        };
        if q.pending.contains(&task) || q.ready.contains(&task) {
            return true;
        }
        if finished {
            q.ready.push_back(task);
        } else {
            q.pending.push(task);
        }
        true
    }

    /// `wait_queue_empty($queue)`: nothing pending and nothing ready
    pub fn wait_queue_empty(&self, queue: QueueId) -> bool {
        match self.inner.borrow().queues.get(&queue) {
            Some(q) => q.pending.is_empty() && q.ready.is_empty(),
            None => true,
        }
    }

    fn pop_ready(&self, queue: QueueId) -> Result<Option<TaskId>, ()> {
        let mut inner = self.inner.borrow_mut();
        let q = inner.queues.get_mut(&queue).ok_or(())?;
        match q.ready.pop_front() {
            Some(task) => Ok(Some(task)),
            None if q.pending.is_empty() => Err(()),
            None => Ok(None),
        }
    }

    async fn next_completed(&self, queue: QueueId) -> Option<TaskId> {
        loop {
            match self.pop_ready(queue) {
                Ok(Some(task)) => return Some(task),
                Ok(None) => self.completed.notified().await,
                Err(()) => return None,
            }
        }
    }

    /// `wait_queue_next($queue, $timeout)`: the next finished task in
    /// completion order, or `None` when the queue is drained or the timeout
    /// expires
    pub async fn wait_queue_next(&self, queue: QueueId, timeout: Option<Duration>) -> Option<TaskId> {
        match timeout {
            None => self.next_completed(queue).await,
            Some(limit) => tokio::time::timeout(limit, self.next_completed(queue))
                .await
                .ok()
                .flatten(),
        }
    }
}
