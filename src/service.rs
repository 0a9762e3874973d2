//! Transport-agnostic caller operations: run code in a new or existing
//! session, and clean a session up.

use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::gateway::RunOptions;
use crate::registry::SessionRegistry;
use crate::result::ExecutionResult;

/// Directory uploaded files land in inside the sandbox.
pub const WORKSPACE_DIR: &str = "/workspace";

/// A file supplied with an execute request. Not retained after the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    original_name: String,
    remote_path: String,
    bytes: Bytes,
}

impl UploadedFile {
    /// Only the base name of `original_name` is kept; the file is placed
    /// under [`WORKSPACE_DIR`].
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self> {
        let original_name = original_name.into();
        let base = Path::new(&original_name)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SessionError::InvalidFileName(original_name.clone()))?;
        let remote_path = format!("{}/{}", WORKSPACE_DIR, base);

        Ok(Self {
            original_name,
            remote_path,
            bytes: bytes.into(),
        })
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

/// Input to [`ExecutionService::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    /// Session to reuse. Empty or unknown ids start a new session.
    pub session_id: Option<String>,
    pub language: String,
    pub code: String,
    pub files: Vec<UploadedFile>,
    pub options: RunOptions,
}

/// Outcome of [`ExecutionService::execute`]. Always well formed, even when
/// the session could not be created.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOutcome {
    pub session_id: Option<String>,
    pub result: ExecutionResult,
    pub uploaded_files: Vec<String>,
}

/// Outcome of [`ExecutionService::cleanup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
    pub found: bool,
    pub message: String,
}

/// Caller-facing session operations on top of a [`SessionRegistry`].
#[derive(Clone)]
pub struct ExecutionService {
    registry: Arc<SessionRegistry>,
}

impl ExecutionService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Reuse or create a session, upload files in order, then run the code.
    ///
    /// Any failure before the run becomes a failed result with exit code 1
    /// and no uploaded files reported.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecuteOutcome {
        let ExecuteRequest {
            session_id: requested_id,
            language,
            code,
            files,
            options,
        } = request;
        let requested_id = requested_id.filter(|id| !id.is_empty());
        let mut session_id = requested_id.clone();

        let attempt = async {
            let (session, id) = self
                .registry
                .get_or_create(requested_id.as_deref(), &language)
                .await?;
            session_id = Some(id);

            let mut uploaded = Vec::with_capacity(files.len());
            for file in &files {
                session
                    .upload_file(file.remote_path(), file.bytes().clone())
                    .await?;
                uploaded.push(file.remote_path().to_string());
            }

            let result = session.execute(&code, &options).await?;
            Ok::<_, SessionError>((result, uploaded))
        };

        match attempt.await {
            Ok((result, uploaded_files)) => ExecuteOutcome {
                session_id,
                result,
                uploaded_files,
            },
            Err(e) => {
                warn!(session_id = ?session_id, error = %e, "Execute request failed");
                ExecuteOutcome {
                    session_id,
                    result: ExecutionResult::failure(format!("Error: {}", e)),
                    uploaded_files: Vec::new(),
                }
            }
        }
    }

    /// Remove a session and destroy its sandbox.
    pub async fn cleanup(&self, session_id: &str) -> CleanupOutcome {
        match self.registry.remove(session_id).await {
            Ok(()) => {
                info!(session_id = %session_id, "Workspace cleaned up");
                CleanupOutcome {
                    found: true,
                    message: "Workspace cleaned up successfully".to_string(),
                }
            }
            Err(SessionError::NotFound(_)) => CleanupOutcome {
                found: false,
                message: "No workspace found with that session ID".to_string(),
            },
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Session removed but sandbox teardown failed");
                CleanupOutcome {
                    found: true,
                    message: format!("Session removed, but {}", e),
                }
            }
        }
    }
}
