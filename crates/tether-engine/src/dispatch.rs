//! Dispatcher
//!
//! Executes call descriptors on the caller's context or hands them to another
//! context, blocking (sync) or fire-and-forget (async).
//!
//! A synchronous hand-off queues the call together with a bounded(1) reply
//! channel and waits for the reply up to the configured timeout. While it
//! waits, a caller that is itself servicing a run loop keeps running jobs
//! from its own queue, so two contexts calling each other synchronously both
//! make progress.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::RwLock;
use tether_sdk::{BridgeError, BridgeResult, CallResult};

use crate::builder::{CallDescriptor, ExecutionConstraint};
use crate::config::BridgeConfig;
use crate::context::{self, ContextHandle, Message};

/// Blocking behaviour of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Caller waits for the result
    Sync,
    /// Caller returns immediately
    Async,
}

/// Where a dispatched call runs relative to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locality {
    /// On the calling thread, right away
    Inline,
    /// Queued on a context
    Queued(String),
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locality::Inline => write!(f, "inline"),
            Locality::Queued(name) => write!(f, "queued on '{}'", name),
        }
    }
}

/// Lifecycle of a descriptor, as reported in trace logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// Built and validated
    Built,
    /// Handed to the dispatcher
    Dispatched {
        /// Blocking behaviour
        mode: Mode,
        /// Where it runs
        locality: Locality,
    },
    /// The operation returned a result
    Completed,
    /// The operation or its routing failed
    Failed,
}

/// Routes and executes call descriptors
pub struct Dispatcher {
    timeout: Duration,
    default_context: RwLock<Option<ContextHandle>>,
}

impl Dispatcher {
    /// Create a dispatcher with the timeout from `config`.
    ///
    /// Contexts are never created here; `Bridge::from_config` starts the
    /// configured default context and installs it.
    pub fn new(config: &BridgeConfig) -> Self {
        Self::with_timeout(config.sync_timeout())
    }

    /// Create a dispatcher with an explicit synchronous hand-off timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Dispatcher {
            timeout,
            default_context: RwLock::new(None),
        }
    }

    /// Use `context` for async calls made from threads without a run loop
    pub fn with_default_context(self, context: ContextHandle) -> Self {
        self.set_default_context(Some(context));
        self
    }

    /// Replace the default async context
    pub fn set_default_context(&self, context: Option<ContextHandle>) {
        *self.default_context.write() = context;
    }

    /// Default async context, if configured
    pub fn default_context(&self) -> Option<ContextHandle> {
        self.default_context.read().clone()
    }

    /// Synchronous hand-off timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `call` on the calling thread and return its result
    pub fn execute_sync(&self, call: CallDescriptor) -> BridgeResult<CallResult> {
        trace_state(&call, &dispatched(Mode::Sync, Locality::Inline));
        let result = call.operation().invoke(call.target(), call.args());
        trace_outcome(&call, &result);
        result
    }

    /// Run `call` on `context`, blocking until it completes.
    ///
    /// Equivalent to `execute_sync` when `context` is the caller's own.
    pub fn execute_sync_on(
        &self,
        context: &ContextHandle,
        call: CallDescriptor,
    ) -> BridgeResult<CallResult> {
        if context.is_current() {
            return self.execute_sync(call);
        }

        let locality = Locality::Queued(context.name().to_string());
        trace_state(&call, &dispatched(Mode::Sync, locality));

        let operation = call.describe();
        let (reply_tx, reply_rx) = channel::bounded::<BridgeResult<CallResult>>(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let skip = abandoned.clone();

        context.submit(Box::new(move || {
            if skip.load(Ordering::Acquire) {
                tracing::trace!(operation = %call.describe(), "skipping abandoned call");
                return;
            }
            let result = invoke_caught(&call);
            trace_outcome(&call, &result);
            // The caller may have timed out and dropped the receiver
            let _ = reply_tx.send(result);
        }))?;

        let deadline = Instant::now() + self.timeout;
        let own_queue = context::current_queue();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.abandon(context, &operation, &abandoned));
            }

            let Some((own, queue)) = &own_queue else {
                return match reply_rx.recv_timeout(remaining) {
                    Ok(result) => result,
                    Err(RecvTimeoutError::Timeout) => {
                        Err(self.abandon(context, &operation, &abandoned))
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        Err(BridgeError::ContextClosed(context.name().to_string()))
                    }
                };
            };

            crossbeam::channel::select! {
                recv(reply_rx) -> reply => {
                    return reply.unwrap_or_else(|_| {
                        Err(BridgeError::ContextClosed(context.name().to_string()))
                    });
                },
                recv(queue) -> message => {
                    if let Ok(Message::Run(job)) = message {
                        tracing::trace!(context = own.name(), "servicing own queue while blocked");
                        context::run_job(own.name(), job);
                    }
                },
                default(remaining) => {},
            }
        }
    }

    /// Fire-and-forget on the caller's run loop, the default context, or
    /// inline, in that order of preference.
    ///
    /// Failures inside the operation are logged and never surfaced.
    pub fn execute_async(&self, call: CallDescriptor) -> BridgeResult<()> {
        if let Some(current) = ContextHandle::current() {
            return self.execute_async_on(&current, call);
        }
        if let Some(default) = self.default_context() {
            return self.execute_async_on(&default, call);
        }

        trace_state(&call, &dispatched(Mode::Async, Locality::Inline));
        let result = invoke_caught(&call);
        log_async_outcome(&call, &result);
        Ok(())
    }

    /// Queue `call` on `context` without waiting.
    ///
    /// Only routing failures are reported.
    pub fn execute_async_on(&self, context: &ContextHandle, call: CallDescriptor) -> BridgeResult<()> {
        let locality = Locality::Queued(context.name().to_string());
        trace_state(&call, &dispatched(Mode::Async, locality));
        context.submit(Box::new(move || {
            let result = invoke_caught(&call);
            log_async_outcome(&call, &result);
        }))
    }

    /// Run `call` synchronously, honouring its own execution constraint
    pub fn execute(&self, call: CallDescriptor) -> BridgeResult<CallResult> {
        match call.constraint().clone() {
            ExecutionConstraint::Unconstrained => self.execute_sync(call),
            ExecutionConstraint::On(context) => self.execute_sync_on(&context, call),
        }
    }

    fn abandon(&self, context: &ContextHandle, operation: &str, abandoned: &AtomicBool) -> BridgeError {
        abandoned.store(true, Ordering::Release);
        tracing::warn!(
            context = context.name(),
            operation,
            timeout_ms = self.timeout.as_millis() as u64,
            "synchronous call timed out"
        );
        BridgeError::DeadlockRisk {
            context: context.name().to_string(),
            timeout: self.timeout,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .field("default_context", &*self.default_context.read())
            .finish()
    }
}

fn dispatched(mode: Mode, locality: Locality) -> CallState {
    CallState::Dispatched { mode, locality }
}

fn trace_state(call: &CallDescriptor, state: &CallState) {
    tracing::trace!(operation = %call.describe(), state = ?state, "call state");
}

fn trace_outcome(call: &CallDescriptor, result: &BridgeResult<CallResult>) {
    let state = if result.is_ok() {
        CallState::Completed
    } else {
        CallState::Failed
    };
    trace_state(call, &state);
}

fn log_async_outcome(call: &CallDescriptor, result: &BridgeResult<CallResult>) {
    trace_outcome(call, result);
    if let Err(err) = result {
        tracing::warn!(operation = %call.describe(), error = %err, "async call failed");
    }
}

/// Invoke the operation, turning a panic into `Panicked`
fn invoke_caught(call: &CallDescriptor) -> BridgeResult<CallResult> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        call.operation().invoke(call.target(), call.args())
    }))
    .unwrap_or_else(|payload| {
        Err(BridgeError::Panicked {
            operation: call.describe(),
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
