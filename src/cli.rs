//! Command-line front ends: an interactive prompt loop and a one-shot runner.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::SessionError;
use crate::gateway::RunOptions;
use crate::result::ExecutionResult;
use crate::service::{ExecuteRequest, ExecutionService, UploadedFile};
use crate::session::Session;

const LANGUAGE_PROMPT: &str = "Which language would you like to use? (typescript, javascript, python): ";

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interactive loop: pick a language, type code until a line reading
/// `exit`, run it once. The session is destroyed whatever happens.
pub async fn repl<R, W>(
    session: &Session,
    language: Option<String>,
    input: R,
    output: &mut W,
) -> Result<ExecutionResult, CliError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = read_and_execute(session, language, input, output).await;
    if let Err(e) = session.destroy().await {
        warn!(session_id = %session.id(), error = %e, "Failed to remove workspace");
    }
    result
}

async fn read_and_execute<R, W>(
    session: &Session,
    language: Option<String>,
    input: R,
    output: &mut W,
) -> Result<ExecutionResult, CliError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(b"Welcome to coderun!\n").await?;

    let language = match language {
        Some(language) => language,
        None => {
            output.write_all(LANGUAGE_PROMPT.as_bytes()).await?;
            output.flush().await?;
            lines.next_line().await?.unwrap_or_default()
        }
    };
    session.initialize(&language.trim().to_lowercase()).await?;

    output
        .write_all(b"\nEnter your code below. Type \"exit\" on a new line to execute:\n")
        .await?;
    let mut code = Vec::new();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;
        match lines.next_line().await? {
            Some(line) if line.eq_ignore_ascii_case("exit") => break,
            Some(line) => code.push(line),
            None => break,
        }
    }

    let result = session.execute(&code.join("\n"), &RunOptions::default()).await?;
    write_result(output, &result).await?;
    Ok(result)
}

/// Print a result in the prompt loop's format.
pub async fn write_result<W>(output: &mut W, result: &ExecutionResult) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let text = format!(
        "\n--- Execution Result ---\nSuccess: {}\nExit Code: {}\nOutput:\n{}\n",
        result.success(),
        result.exit_code(),
        result.output()
    );
    output.write_all(text.as_bytes()).await?;
    output.flush().await
}

/// Run a source file once in a fresh session, uploading `files` first.
pub async fn run_file(
    service: &ExecutionService,
    language: &str,
    source: &Path,
    files: &[PathBuf],
    options: RunOptions,
) -> Result<ExecutionResult, CliError> {
    let code = tokio::fs::read_to_string(source)
        .await
        .map_err(|source_err| CliError::File {
            path: source.to_path_buf(),
            source: source_err,
        })?;

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path).await.map_err(|e| CliError::File {
            path: path.clone(),
            source: e,
        })?;
        uploads.push(UploadedFile::new(path.to_string_lossy(), bytes)?);
    }

    let outcome = service
        .execute(ExecuteRequest {
            session_id: None,
            language: language.to_string(),
            code,
            files: uploads,
            options,
        })
        .await;

    if let Some(id) = &outcome.session_id {
        let cleanup = service.cleanup(id).await;
        if !cleanup.found {
            warn!(session_id = %id, "{}", cleanup.message);
        }
    }
    Ok(outcome.result)
}
