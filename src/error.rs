//! Error types for session and workspace operations.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors surfaced by [`Session`](crate::session::Session) and
/// [`SessionRegistry`](crate::registry::SessionRegistry).
///
/// Failed code runs are not errors: they come back as a failed
/// [`ExecutionResult`](crate::result::ExecutionResult).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The requested language is not one of the supported set.
    #[error("Language {0} is not supported. Supported languages: typescript, javascript, python")]
    UnsupportedLanguage(String),

    /// The gateway could not create a sandbox.
    #[error("failed to create workspace: {0}")]
    Provisioning(#[source] GatewayError),

    /// Writing a file into the sandbox failed.
    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: GatewayError,
    },

    /// An uploaded file name has no usable base name.
    #[error("invalid upload file name: {0:?}")]
    InvalidFileName(String),

    /// The session never reached the ready state.
    #[error("Workspace not initialized. Call initialize() first.")]
    NotInitialized,

    /// `initialize` was called on a session that already owns a sandbox.
    #[error("workspace already initialized")]
    AlreadyInitialized,

    /// The session has been torn down.
    #[error("workspace has been destroyed")]
    Destroyed,

    /// No session is registered under this id.
    #[error("No workspace found with session ID {0}")]
    NotFound(String),

    /// The gateway failed to remove the sandbox. The session is still
    /// considered destroyed.
    #[error("failed to remove workspace: {0}")]
    Teardown(#[source] GatewayError),
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
