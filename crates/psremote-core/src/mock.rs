//! Scripted in-memory runspace for tests.
//!
//! `MockHost` records every invocation and answers with a replaceable
//! responder. By default `New-PSSessionOption` and `New-PSSession` each yield
//! one live object and everything else yields nothing.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde_json::json;

use crate::{
    ProgressHandler,
    error::RemoteExecutionError,
    request::{Invocation, ObjectHandle},
    result::{ExecutionResult, OutputRecord},
    traits::{Runspace, RunspaceFactory},
};

type Responder =
    dyn Fn(&MockHost, &Invocation) -> Result<ExecutionResult, RemoteExecutionError> + Send + Sync;

#[derive(Default)]
struct Counters {
    opened: usize,
    closed: usize,
    open_failure: Option<String>,
}

/// Shared state behind every mock runspace of one factory.
pub struct MockHost {
    invocations: Mutex<Vec<Invocation>>,
    counters: Mutex<Counters>,
    responder: Mutex<Arc<Responder>>,
    progress: Mutex<Vec<u8>>,
    next_handle: AtomicU64,
}

impl MockHost {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let responder: Arc<Responder> = Arc::new(Self::default_response);
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
            counters: Mutex::new(Counters::default()),
            responder: Mutex::new(responder),
            progress: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Factory handing out runspaces backed by this host.
    #[must_use]
    pub fn factory(self: &Arc<Self>) -> MockRunspaceFactory {
        MockRunspaceFactory {
            host: Arc::clone(self),
        }
    }

    /// Replace the responder.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Self, &Invocation) -> Result<ExecutionResult, RemoteExecutionError>
            + Send
            + Sync
            + 'static,
    {
        *self.responder.lock().unwrap() = Arc::new(responder);
    }

    /// Progress percentages reported on every invocation.
    pub fn report_progress(&self, steps: Vec<u8>) {
        *self.progress.lock().unwrap() = steps;
    }

    /// Make the next `open` calls fail with a host error.
    pub fn fail_open(&self, message: impl Into<String>) {
        self.counters.lock().unwrap().open_failure = Some(message.into());
    }

    /// Every invocation dispatched so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.counters.lock().unwrap().opened
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.counters.lock().unwrap().closed
    }

    /// Allocate a fresh live-object handle.
    pub fn next_handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// The responder installed by `new`.
    ///
    /// # Errors
    /// Never fails.
    pub fn default_response(
        &self,
        invocation: &Invocation,
    ) -> Result<ExecutionResult, RemoteExecutionError> {
        match invocation {
            Invocation::Command(cmd)
                if cmd.name() == "New-PSSessionOption" || cmd.name() == "New-PSSession" =>
            {
                let record = OutputRecord::object(self.next_handle(), json!(cmd.name()));
                Ok(ExecutionResult::new(vec![record], vec![]))
            }
            _ => Ok(ExecutionResult::default()),
        }
    }
}

/// Runspace factory backed by a `MockHost`.
#[derive(Clone)]
pub struct MockRunspaceFactory {
    host: Arc<MockHost>,
}

#[async_trait]
impl RunspaceFactory for MockRunspaceFactory {
    async fn open(&self) -> Result<Box<dyn Runspace>, RemoteExecutionError> {
        let mut counters = self.host.counters.lock().unwrap();
        if let Some(message) = &counters.open_failure {
            return Err(RemoteExecutionError::Host(message.clone()));
        }
        counters.opened += 1;
        Ok(Box::new(MockRunspace {
            host: Arc::clone(&self.host),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One runspace of a `MockHost`.
pub struct MockRunspace {
    host: Arc<MockHost>,
    closed: AtomicBool,
}

#[async_trait]
impl Runspace for MockRunspace {
    async fn invoke(
        &self,
        invocation: Invocation,
        progress: &dyn ProgressHandler,
    ) -> Result<ExecutionResult, RemoteExecutionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RemoteExecutionError::ContextClosed);
        }
        self.host.invocations.lock().unwrap().push(invocation.clone());

        let steps = self.host.progress.lock().unwrap().clone();
        for percent in steps {
            progress.on_progress(percent);
        }

        let responder = Arc::clone(&*self.host.responder.lock().unwrap());
        responder(&self.host, &invocation)
    }

    async fn close(&self) -> Result<(), RemoteExecutionError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.host.counters.lock().unwrap().closed += 1;
        }
        Ok(())
    }
}
