//! Awaitable, cancellable compilation handles
//!
//! A handle's state lives in a `tokio::sync::watch` channel so any number of
//! evaluations can wait on it. Once a terminal state is reached it only ever
//! changes from `Succeeded` to `Superseded`, which drops the artifact.

use crate::domain::{WardenError, WardenResult};
use crate::pipeline::{CancelSignal, RuleSetSource, StageError, StageWarning};
use crate::validator::CompiledValidator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle of one compilation
#[derive(Debug, Clone)]
pub enum HandleState {
    Pending,
    Running,
    Succeeded { validator: CompiledValidator, warnings: Arc<[StageWarning]> },
    Failed(StageError),
    Cancelled,
    Superseded { generation: u64 },
}

impl HandleState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
            Self::Superseded { .. } => "superseded",
        }
    }
}

/// Shared handle to one in-flight or completed compilation
#[derive(Debug, Clone)]
pub struct CompilationHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    id: u64,
    source: RuleSetSource,
    generation: u64,
    state: watch::Sender<HandleState>,
    cancel: CancelSignal,
}

impl CompilationHandle {
    pub(crate) fn new(id: u64, source: RuleSetSource, generation: u64) -> Self {
        let (state, _) = watch::channel(HandleState::Pending);
        Self {
            inner: Arc::new(HandleInner { id, source, generation, state, cancel: CancelSignal::new() }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn source(&self) -> &RuleSetSource {
        &self.inner.source
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn state(&self) -> HandleState {
        self.inner.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.borrow().is_terminal()
    }

    /// Warnings raised by a successful compilation
    pub fn warnings(&self) -> Vec<StageWarning> {
        match &*self.inner.state.borrow() {
            HandleState::Succeeded { warnings, .. } => warnings.to_vec(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn cancel_signal(&self) -> &CancelSignal {
        &self.inner.cancel
    }

    /// Move from `Pending` to `Running`; false when the job should be skipped
    pub(crate) fn mark_running(&self) -> bool {
        self.inner.state.send_if_modified(|state| {
            if matches!(state, HandleState::Pending) {
                *state = HandleState::Running;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn succeed(&self, validator: CompiledValidator, warnings: Vec<StageWarning>) {
        self.finish(HandleState::Succeeded { validator, warnings: warnings.into() });
    }

    pub(crate) fn fail(&self, error: StageError) {
        self.finish(HandleState::Failed(error));
    }

    /// Cancel the compilation; waiters observe `Cancelled`
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        self.finish(HandleState::Cancelled);
    }

    /// Invalidate the handle because its generation was replaced
    pub(crate) fn supersede(&self) {
        self.inner.cancel.cancel();
        let generation = self.inner.generation;
        self.inner.state.send_if_modified(|state| match state {
            HandleState::Pending | HandleState::Running | HandleState::Succeeded { .. } => {
                *state = HandleState::Superseded { generation };
                true
            }
            _ => false,
        });
    }

    fn finish(&self, next: HandleState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Wait up to `timeout` for the compiled validator
    pub async fn wait(&self, timeout: Duration) -> WardenResult<CompiledValidator> {
        let mut receiver = self.inner.state.subscribe();
        let state = match tokio::time::timeout(timeout, receiver.wait_for(HandleState::is_terminal)).await
        {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => HandleState::Cancelled,
            Err(_) => {
                return Err(WardenError::Timeout { source_path: self.source().display_name(), timeout })
            }
        };

        match state {
            HandleState::Succeeded { validator, .. } => Ok(validator),
            HandleState::Failed(error) => Err(WardenError::compilation(self.source().display_name(), error)),
            HandleState::Superseded { generation } => {
                Err(WardenError::Superseded { source_path: self.source().display_name(), generation })
            }
            HandleState::Cancelled | HandleState::Pending | HandleState::Running => {
                Err(WardenError::Cancelled { source_path: self.source().display_name() })
            }
        }
    }
}
