//! Execution results.

use serde::{Deserialize, Serialize};

/// Raw outcome of a run as reported by the sandbox gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub exit_code: i32,
    /// Merged stdout/stderr.
    pub result: String,
}

/// Outcome of one execute call. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    success: bool,
    exit_code: i32,
    output: String,
}

impl ExecutionResult {
    /// A result for a run that could not be attempted or whose gateway
    /// call errored.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: 1,
            output: message.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn output(&self) -> &str {
        &self.output
    }
}

impl From<RunOutput> for ExecutionResult {
    fn from(run: RunOutput) -> Self {
        Self {
            success: run.exit_code == 0,
            exit_code: run.exit_code,
            output: run.result,
        }
    }
}
