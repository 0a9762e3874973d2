//! A session pins one remote sandbox for its lifetime.
//!
//! Every operation takes the session's state lock for its whole duration,
//! including the gateway round-trip, so operations on one session never
//! interleave while different sessions proceed independently.

use bytes::Bytes;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::gateway::{RunOptions, SandboxGateway, SandboxHandle};
use crate::language::Language;
use crate::result::ExecutionResult;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Ready,
    Destroyed,
}

enum SessionState {
    Uninitialized,
    Ready(SandboxHandle),
    Destroyed,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        match self {
            SessionState::Uninitialized => SessionStatus::Uninitialized,
            SessionState::Ready(_) => SessionStatus::Ready,
            SessionState::Destroyed => SessionStatus::Destroyed,
        }
    }
}

/// Binding between a session id and a single sandbox.
pub struct Session {
    id: String,
    language: OnceLock<Language>,
    created_at: Instant,
    gateway: Arc<dyn SandboxGateway>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(id: impl Into<String>, gateway: Arc<dyn SandboxGateway>) -> Self {
        Self {
            id: id.into(),
            language: OnceLock::new(),
            created_at: Instant::now(),
            gateway,
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The language fixed at initialization, if the session got that far.
    pub fn language(&self) -> Option<Language> {
        self.language.get().copied()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status()
    }

    /// Provision the sandbox for `language`.
    ///
    /// The language is validated before any gateway call. A provisioning
    /// failure leaves the session uninitialized so it can be retried.
    pub async fn initialize(&self, language: &str) -> Result<()> {
        let language: Language = language.parse()?;

        let mut state = self.state.lock().await;
        match *state {
            SessionState::Ready(_) => return Err(SessionError::AlreadyInitialized),
            SessionState::Destroyed => return Err(SessionError::Destroyed),
            SessionState::Uninitialized => {}
        }

        info!(session_id = %self.id, %language, "Creating workspace");
        let handle = self
            .gateway
            .create(language)
            .await
            .map_err(SessionError::Provisioning)?;
        info!(session_id = %self.id, sandbox_id = %handle.id(), "Workspace created");

        let _ = self.language.set(language);
        *state = SessionState::Ready(handle);
        Ok(())
    }

    /// Run `code` in the sandbox.
    ///
    /// Gateway failures come back as a failed [`ExecutionResult`]; only
    /// state violations are returned as errors.
    pub async fn execute(&self, code: &str, options: &RunOptions) -> Result<ExecutionResult> {
        let state = self.state.lock().await;
        let handle = ready_handle(&state)?;

        debug!(session_id = %self.id, sandbox_id = %handle.id(), "Executing code");
        match self.gateway.run(handle, code, options).await {
            Ok(output) => Ok(ExecutionResult::from(output)),
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Error executing code");
                Ok(ExecutionResult::failure(e.to_string()))
            }
        }
    }

    /// Write a file into the sandbox filesystem.
    pub async fn upload_file(&self, remote_path: &str, bytes: Bytes) -> Result<()> {
        let state = self.state.lock().await;
        let handle = ready_handle(&state)?;

        debug!(session_id = %self.id, path = %remote_path, size = bytes.len(), "Uploading file");
        self.gateway
            .upload_file(handle, remote_path, bytes)
            .await
            .map_err(|source| SessionError::Upload {
                path: remote_path.to_string(),
                source,
            })
    }

    /// Tear the sandbox down. A no-op unless the session is ready.
    ///
    /// The session ends up destroyed even when the gateway call fails; the
    /// failure is returned as [`SessionError::Teardown`].
    pub async fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let handle = match std::mem::replace(&mut *state, SessionState::Destroyed) {
            SessionState::Ready(handle) => handle,
            SessionState::Uninitialized => {
                *state = SessionState::Uninitialized;
                return Ok(());
            }
            SessionState::Destroyed => return Ok(()),
        };

        info!(session_id = %self.id, sandbox_id = %handle.id(), "Removing workspace");
        self.gateway
            .remove(&handle)
            .await
            .map_err(SessionError::Teardown)?;
        info!(session_id = %self.id, "Workspace removed");
        Ok(())
    }
}

fn ready_handle(state: &SessionState) -> Result<&SandboxHandle> {
    match state {
        SessionState::Ready(handle) => Ok(handle),
        SessionState::Uninitialized => Err(SessionError::NotInitialized),
        SessionState::Destroyed => Err(SessionError::Destroyed),
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("language", &self.language())
            .finish_non_exhaustive()
    }
}
