//! Per-stream single-threaded execution contexts.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error};

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to spawn execution context thread: {0}")]
    SpawnError(#[from] std::io::Error),
    #[error("Execution context has been shut down")]
    Closed,
    #[error("Execution context thread panicked")]
    Panicked,
}

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Task<S> {
    Run(Job<S>),
    Quit,
}

/// A single-threaded FIFO work queue that owns one piece of state.
///
/// Every job runs on the same dedicated thread with exclusive access to the state, in the
/// order it was posted. Shutting down appends a quit marker, so work queued before it still
/// runs.
pub struct SerialExecutor<S: Send + 'static> {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Task<S>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl<S: Send + 'static> SerialExecutor<S> {
    /// Spawns the context thread, moving `state` onto it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::SpawnError`] if the thread cannot be created.
    pub fn spawn(name: &str, state: S) -> Result<Self, ExecutorError> {
        let (sender, receiver) = mpsc::channel::<Task<S>>();

        let thread_name = name.to_string();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut state = state;
            while let Ok(task) = receiver.recv() {
                match task {
                    Task::Run(job) => {
                        // A failing job must not take the rest of the queue down with it.
                        if panic::catch_unwind(AssertUnwindSafe(|| job(&mut state))).is_err() {
                            error!(context = %thread_name, "Job panicked, continuing with the next one");
                        }
                    }
                    Task::Quit => break,
                }
            }
            debug!(context = %thread_name, "Execution context stopped");
        })?;

        Ok(Self {
            name: name.to_string(),
            thread_id: thread.thread().id(),
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Appends `job` to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Closed`] after shutdown.
    pub fn post<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(ExecutorError::Closed)?;
        sender.send(Task::Run(Box::new(job))).map_err(|_| ExecutorError::Closed)
    }

    /// Appends `job` as the final task and closes the queue behind it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Closed`] if the queue was already closed; `job` is dropped
    /// without running.
    pub fn shutdown_after<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let mut sender = self.sender.lock();
        let tx = sender.take().ok_or(ExecutorError::Closed)?;
        tx.send(Task::Run(Box::new(job))).map_err(|_| ExecutorError::Closed)?;
        tx.send(Task::Quit).map_err(|_| ExecutorError::Closed)
    }

    /// Closes the queue; already queued jobs still run.
    pub fn shutdown(&self) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(Task::Quit);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Whether the caller is running on this context's thread.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Waits for the context thread to exit.
    ///
    /// Returns immediately when called from the context's own thread or when the thread was
    /// already joined.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Panicked`] if the thread itself panicked.
    pub fn join(&self) -> Result<(), ExecutorError> {
        if self.is_current_thread() {
            return Ok(());
        }
        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };
        thread.join().map_err(|_| ExecutorError::Panicked)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S: Send + 'static> Drop for SerialExecutor<S> {
    fn drop(&mut self) {
        self.shutdown();
        if let Err(err) = self.join() {
            error!(context = %self.name, %err, "Failed to join execution context");
        }
    }
}
