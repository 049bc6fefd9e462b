//! Execution contexts
//!
//! A context is a thread servicing a `RunLoop`: a FIFO queue of jobs fed over
//! a crossbeam channel. `ContextHandle` is the routing identity other threads
//! use to submit work; it never owns the loop. `ContextThread` spawns a
//! dedicated thread that runs a loop until stopped.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tether_sdk::{BridgeError, BridgeResult};

/// Unit of work queued on a run loop
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum Message {
    Run(Job),
    /// Nudges a blocked loop so it re-checks its stop flag
    Wake,
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextShared {
    id: u64,
    name: String,
    sender: Sender<Message>,
    stopping: AtomicBool,
    closed: AtomicBool,
}

// ============================================================================
// ContextHandle
// ============================================================================

/// Cloneable reference to a run loop's identity and queue
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<ContextShared>,
}

impl ContextHandle {
    /// Unique context id
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the calling thread is currently servicing this context
    pub fn is_current(&self) -> bool {
        CURRENT.with(|current| {
            current
                .borrow()
                .as_ref()
                .is_some_and(|binding| binding.handle.id() == self.id())
        })
    }

    /// Context serviced by the calling thread, if any
    pub fn current() -> Option<ContextHandle> {
        CURRENT.with(|current| current.borrow().as_ref().map(|b| b.handle.clone()))
    }

    /// Ask the loop to return from `run` after the job it is running
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        let _ = self.shared.sender.send(Message::Wake);
    }

    /// Whether the loop behind this handle has been dropped
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Queue `f` to run on this context without waiting.
    ///
    /// Fails with `ContextClosed` once the loop is gone.
    pub fn perform<F>(&self, f: F) -> BridgeResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f))
    }

    pub(crate) fn submit(&self, job: Job) -> BridgeResult<()> {
        self.shared
            .sender
            .send(Message::Run(job))
            .map_err(|_| BridgeError::ContextClosed(self.shared.name.clone()))
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ContextHandle {}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

// ============================================================================
// Current-context binding
// ============================================================================

struct Binding {
    handle: ContextHandle,
    receiver: Receiver<Message>,
}

thread_local! {
    static CURRENT: RefCell<Option<Binding>> = const { RefCell::new(None) };
}

/// Restores the previous binding when a loop stops servicing this thread
struct BindingGuard {
    previous: Option<Binding>,
}

impl BindingGuard {
    fn bind(handle: ContextHandle, receiver: Receiver<Message>) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(Binding { handle, receiver })));
        BindingGuard { previous }
    }
}

impl Drop for BindingGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| {
            current.replace(previous);
        });
    }
}

/// Queue of the loop the calling thread is servicing, if any
pub(crate) fn current_queue() -> Option<(ContextHandle, Receiver<Message>)> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|b| (b.handle.clone(), b.receiver.clone()))
    })
}

/// Run a queued job, keeping the loop alive if it panics
pub(crate) fn run_job(context: &str, job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::warn!(context, "job panicked on run loop");
    }
}

// ============================================================================
// RunLoop
// ============================================================================

/// FIFO job queue serviced by the thread that runs it
pub struct RunLoop {
    handle: ContextHandle,
    receiver: Receiver<Message>,
}

impl RunLoop {
    /// Create a loop named `name`
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = channel::unbounded();
        let shared = ContextShared {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            sender,
            stopping: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        RunLoop {
            handle: ContextHandle {
                shared: Arc::new(shared),
            },
            receiver,
        }
    }

    /// Routing handle for this loop
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Context name
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Service jobs until `stop` is requested
    pub fn run(&self) {
        let _guard = BindingGuard::bind(self.handle.clone(), self.receiver.clone());
        tracing::debug!(context = self.name(), "run loop started");

        while !self.take_stop() {
            match self.receiver.recv() {
                Ok(Message::Run(job)) => run_job(self.name(), job),
                Ok(Message::Wake) => {}
                Err(_) => break,
            }
        }

        tracing::debug!(context = self.name(), "run loop stopped");
    }

    /// Service jobs until `timeout` elapses or `stop` is requested.
    ///
    /// Returns the number of jobs run.
    pub fn run_for(&self, timeout: Duration) -> usize {
        let _guard = BindingGuard::bind(self.handle.clone(), self.receiver.clone());
        let deadline = Instant::now() + timeout;
        let mut ran = 0;

        while !self.take_stop() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(Message::Run(job)) => {
                    run_job(self.name(), job);
                    ran += 1;
                }
                Ok(Message::Wake) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }

    /// Run every job already queued, then return the number run
    pub fn run_until_idle(&self) -> usize {
        let _guard = BindingGuard::bind(self.handle.clone(), self.receiver.clone());
        let mut ran = 0;

        loop {
            match self.receiver.try_recv() {
                Ok(Message::Run(job)) => {
                    run_job(self.name(), job);
                    ran += 1;
                }
                Ok(Message::Wake) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    fn take_stop(&self) -> bool {
        self.handle.shared.stopping.swap(false, Ordering::AcqRel)
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.handle.shared.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoop").field("handle", &self.handle).finish()
    }
}

// ============================================================================
// ContextThread
// ============================================================================

/// Dedicated thread running a `RunLoop` until stopped
pub struct ContextThread {
    handle: ContextHandle,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ContextThread {
    /// Spawn a thread named `tether-<name>` servicing a new loop
    pub fn spawn(name: impl Into<String>) -> BridgeResult<Self> {
        let name = name.into();
        let run_loop = RunLoop::new(name.clone());
        let handle = run_loop.handle();

        let thread = thread::Builder::new()
            .name(format!("tether-{}", name))
            .spawn(move || run_loop.run())
            .map_err(|e| BridgeError::ContextSpawn {
                context: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!(context = %name, "context thread spawned");
        Ok(ContextThread {
            handle,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Routing handle for the thread's loop
    pub fn handle(&self) -> ContextHandle {
        self.handle.clone()
    }

    /// Stop the loop and join the thread
    pub fn stop(&self) {
        self.handle.stop();
        if let Some(thread) = self.thread.lock().take() {
            // Joining from inside the loop itself would never return
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::warn!(context = self.handle.name(), "context thread panicked");
            }
        }
    }

    /// Whether the thread is still running its loop
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }
}

impl Drop for ContextThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ContextThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextThread")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
