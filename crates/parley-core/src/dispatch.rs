//! Executors for work that must run on the context owning the views.
//!
//! View attach/detach is marshaled onto the host's UI context as a task.
//! Callers never assume the task has run by the time `dispatch` returns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

pub type UiTask = Box<dyn FnOnce() + Send + 'static>;

/// A UI-affine execution context. Tasks run one at a time, in the order
/// they were dispatched.
pub trait UiExecutor: Send + Sync {
    fn dispatch(&self, task: UiTask);
}

/// Runs each task on the caller's thread, immediately.
///
/// Suitable when the caller already is the UI context, and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl UiExecutor for InlineExecutor {
    fn dispatch(&self, task: UiTask) {
        task();
    }
}

/// Queues tasks until the host drains them from its own UI loop.
///
/// The optional waker fires once per dispatched task so the host can post
/// a `run_pending` call onto its main thread.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<UiTask>>,
    waker: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_waker(waker: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            waker: Some(Box::new(waker)),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run queued tasks, including any dispatched while draining.
    /// Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: tasks may dispatch more tasks.
            let next = self.queue.lock().unwrap().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl UiExecutor for ManualExecutor {
    fn dispatch(&self, task: UiTask) {
        self.queue.lock().unwrap().push_back(task);
        if let Some(waker) = &self.waker {
            waker();
        }
    }
}

/// A dedicated thread acting as the UI context.
///
/// Used on desktop hosts that have no platform main loop to borrow. The
/// thread exits once every handle to the executor is dropped.
pub struct UiThread {
    tx: mpsc::UnboundedSender<UiTask>,
    _handle: JoinHandle<()>,
}

impl UiThread {
    pub fn spawn() -> std::io::Result<Arc<Self>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UiTask>();
        let handle = std::thread::Builder::new()
            .name("parley-ui".into())
            .spawn(move || {
                tracing::info!("ui thread started");
                while let Some(task) = rx.blocking_recv() {
                    task();
                }
                tracing::info!("ui thread exited");
            })?;
        Ok(Arc::new(Self {
            tx,
            _handle: handle,
        }))
    }
}

impl UiExecutor for UiThread {
    fn dispatch(&self, task: UiTask) {
        if self.tx.send(task).is_err() {
            tracing::warn!("ui thread gone, dropping task");
        }
    }
}
