//! coderun - run code in remote sandboxes with session-pinned workspaces.
//!
//! A [`Session`] owns one remote sandbox for its whole lifetime; the
//! [`SessionRegistry`] maps caller-visible session ids to sessions; the
//! [`ExecutionService`] exposes the run and cleanup operations used by the
//! HTTP server and the CLI. All remote calls go through a [`SandboxGateway`].

pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http_server;
pub mod language;
pub mod registry;
pub mod result;
pub mod service;
pub mod session;
pub mod state;

pub use assistant::{AnalysisOutcome, AnalyzeAction, AssistantError, CodeAssistant};
pub use error::{Result, SessionError};
pub use gateway::{DaytonaGateway, GatewayError, RunOptions, SandboxGateway, SandboxHandle};
pub use language::Language;
pub use registry::{SessionRegistry, SessionSummary};
pub use result::{ExecutionResult, RunOutput};
pub use service::{CleanupOutcome, ExecuteOutcome, ExecuteRequest, ExecutionService, UploadedFile};
pub use session::{Session, SessionStatus};
pub use state::AppState;
