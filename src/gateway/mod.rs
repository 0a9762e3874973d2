//! Sandbox gateway: the only boundary that talks to the remote sandbox service.
//!
//! [`SandboxGateway`] is the capability the session layer consumes. The
//! [`DaytonaGateway`] implementation speaks the Daytona REST API; tests swap
//! in their own implementation.

mod daytona;

pub use daytona::DaytonaGateway;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::language::Language;
use crate::result::RunOutput;

/// Errors reported by a sandbox gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The gateway is missing configuration (credentials, URL).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request never got a response.
    #[error("request failed: {0}")]
    Request(String),

    /// The remote service answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The request or sandbox startup exceeded its time bound.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The sandbox ended up in an unusable state.
    #[error("sandbox {id} is in state {state}")]
    SandboxState { id: String, state: String },

    /// The caller asked for something the gateway cannot express.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Opaque reference to a provisioned sandbox.
///
/// Not `Clone`: each handle is owned by exactly one session.
#[derive(Debug, PartialEq, Eq)]
pub struct SandboxHandle {
    id: String,
    language: Language,
}

impl SandboxHandle {
    pub fn new(id: impl Into<String>, language: Language) -> Self {
        Self {
            id: id.into(),
            language,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Language the sandbox was provisioned for.
    pub fn language(&self) -> Language {
        self.language
    }
}

/// Per-run options forwarded to the gateway.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Arguments passed to the program.
    pub argv: Vec<String>,
    /// Extra environment variables for the run.
    pub env: HashMap<String, String>,
    /// Upper bound on the remote run. `None` leaves it to the gateway.
    pub timeout: Option<Duration>,
}

/// Remote sandbox capability: provision, run, write files, destroy.
#[async_trait]
pub trait SandboxGateway: Send + Sync {
    /// Provision a sandbox for `language`.
    async fn create(&self, language: Language) -> Result<SandboxHandle, GatewayError>;

    /// Run `code` in the sandbox.
    async fn run(
        &self,
        handle: &SandboxHandle,
        code: &str,
        options: &RunOptions,
    ) -> Result<RunOutput, GatewayError>;

    /// Write `bytes` to `remote_path` inside the sandbox.
    async fn upload_file(
        &self,
        handle: &SandboxHandle,
        remote_path: &str,
        bytes: Bytes,
    ) -> Result<(), GatewayError>;

    /// Destroy the sandbox. Removing an already-removed sandbox succeeds.
    async fn remove(&self, handle: &SandboxHandle) -> Result<(), GatewayError>;
}
