//! Daytona REST API adapter.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{GatewayError, RunOptions, SandboxGateway, SandboxHandle};
use crate::config::DaytonaConfig;
use crate::language::Language;
use crate::result::RunOutput;

const START_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Extra time allowed on the HTTP request beyond the remote run timeout.
const RUN_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct CreateSandboxRequest<'a> {
    labels: HashMap<&'static str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
}

#[derive(Deserialize)]
struct SandboxResponse {
    id: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

/// Gateway backed by the Daytona sandbox API.
#[derive(Clone)]
pub struct DaytonaGateway {
    client: Client,
    api_url: String,
    api_key: String,
    target: Option<String>,
    start_timeout: Duration,
}

impl DaytonaGateway {
    pub fn new(config: &DaytonaConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| GatewayError::Config("DAYTONA_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            target: config.target.clone(),
            start_timeout: config.start_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn toolbox_url(&self, sandbox_id: &str, path: &str) -> String {
        self.url(&format!("/toolbox/{}/toolbox{}", sandbox_id, path))
    }

    async fn get_sandbox(&self, id: &str) -> Result<SandboxResponse, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/sandbox/{}", id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn wait_until_started(&self, id: &str, mut state: Option<String>) -> Result<(), GatewayError> {
        // No deadline when the configured wait does not fit in an `Instant`.
        let deadline = Instant::now().checked_add(self.start_timeout);
        loop {
            match state.as_deref() {
                None | Some("started") => return Ok(()),
                Some(s @ ("error" | "build_failed" | "destroyed")) => {
                    return Err(GatewayError::SandboxState {
                        id: id.to_string(),
                        state: s.to_string(),
                    });
                }
                Some(s) => debug!(sandbox_id = %id, state = %s, "Waiting for sandbox to start"),
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(GatewayError::Timeout(format!(
                    "sandbox {} did not start within {}s",
                    id,
                    self.start_timeout.as_secs()
                )));
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
            state = self.get_sandbox(id).await?.state;
        }
    }

    async fn delete_sandbox(&self, id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .delete(self.url(&format!("/sandbox/{}", id)))
            .query(&[("force", "true")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(sandbox_id = %id, "Sandbox already removed");
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SandboxGateway for DaytonaGateway {
    #[instrument(skip(self), fields(language = %language))]
    async fn create(&self, language: Language) -> Result<SandboxHandle, GatewayError> {
        let body = CreateSandboxRequest {
            labels: HashMap::from([("code-toolbox-language", language.as_str())]),
            target: self.target.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/sandbox"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let sandbox: SandboxResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        if let Err(e) = self.wait_until_started(&sandbox.id, sandbox.state).await {
            warn!(sandbox_id = %sandbox.id, error = %e, "Sandbox failed to start, removing");
            if let Err(delete_err) = self.delete_sandbox(&sandbox.id).await {
                warn!(sandbox_id = %sandbox.id, error = %delete_err, "Failed to remove sandbox that did not start");
            }
            return Err(e);
        }

        info!(sandbox_id = %sandbox.id, "Sandbox started");
        Ok(SandboxHandle::new(sandbox.id, language))
    }

    #[instrument(skip(self, handle, code, options), fields(sandbox_id = %handle.id()))]
    async fn run(
        &self,
        handle: &SandboxHandle,
        code: &str,
        options: &RunOptions,
    ) -> Result<RunOutput, GatewayError> {
        let command = code_run_command(handle.language(), code, options)?;
        let body = ExecuteRequest {
            command: &command,
            timeout: options.timeout.map(|t| t.as_secs().max(1)),
        };

        let mut request = self
            .client
            .post(self.toolbox_url(handle.id(), "/process/execute"))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout.saturating_add(RUN_TIMEOUT_SLACK));
        }

        let response = request.send().await.map_err(transport_error)?;
        let output: RunOutput = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        debug!(exit_code = output.exit_code, output_len = output.result.len(), "Run finished");
        Ok(output)
    }

    #[instrument(skip(self, handle, bytes), fields(sandbox_id = %handle.id(), size = bytes.len()))]
    async fn upload_file(
        &self,
        handle: &SandboxHandle,
        remote_path: &str,
        bytes: Bytes,
    ) -> Result<(), GatewayError> {
        let file_name = remote_path.rsplit('/').next().unwrap_or(remote_path).to_string();
        let form = Form::new().part("file", Part::stream(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.toolbox_url(handle.id(), "/files/upload"))
            .query(&[("path", remote_path)])
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, handle), fields(sandbox_id = %handle.id()))]
    async fn remove(&self, handle: &SandboxHandle) -> Result<(), GatewayError> {
        self.delete_sandbox(handle.id()).await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(e.to_string())
    } else {
        GatewayError::Request(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Build the shell command that runs `code` for `language`.
///
/// The source travels base64-encoded so no quoting of user code is needed.
fn code_run_command(
    language: Language,
    code: &str,
    options: &RunOptions,
) -> Result<String, GatewayError> {
    let source = format!("\"$(echo {} | base64 --decode)\"", STANDARD.encode(code));
    let program = match language {
        Language::Python => format!("python3 -c {}", source),
        Language::Javascript => format!("node -e {}", source),
        Language::Typescript => {
            format!("npx ts-node -O '{{\"module\":\"CommonJS\"}}' -e {}", source)
        }
    };

    let mut env: Vec<_> = options.env.iter().collect();
    env.sort();
    let mut script = String::new();
    for (key, value) in env {
        if !is_env_name(key) {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid environment variable name: {:?}",
                key
            )));
        }
        script.push_str(&format!("{}={} ", key, shell_quote(value)));
    }
    script.push_str(&program);
    for arg in &options.argv {
        script.push(' ');
        script.push_str(&shell_quote(arg));
    }

    Ok(format!("sh -c {}", shell_quote(&script)))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
