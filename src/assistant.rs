//! Code analysis through the Anthropic Messages API.
//!
//! Stateless and independent of sessions: each call sends one prompt and
//! returns the text of the reply.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::AssistantConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Errors from the analysis assistant.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Anthropic API key not configured. Set ANTHROPIC_API_KEY in your environment.")]
    NotConfigured,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown action {0:?}; expected optimize, explain or review")]
    UnknownAction(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("response contained no text")]
    EmptyResponse,
}

/// What to ask the assistant to do with the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzeAction {
    Optimize,
    Explain,
    Review,
}

impl FromStr for AnalyzeAction {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimize" => Ok(AnalyzeAction::Optimize),
            "explain" => Ok(AnalyzeAction::Explain),
            "review" => Ok(AnalyzeAction::Review),
            other => Err(AssistantError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for AnalyzeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnalyzeAction::Optimize => "optimize",
            AnalyzeAction::Explain => "explain",
            AnalyzeAction::Review => "review",
        })
    }
}

/// Build the prompt for `action` over `code` written in `language`.
pub fn build_prompt(action: AnalyzeAction, language: &str, code: &str) -> String {
    let task = match action {
        AnalyzeAction::Optimize => format!(
            "You are an expert {language} developer. Optimize the following code while \
             maintaining its functionality. Focus on performance, readability, and best \
             practices. Return only the optimized code without explanations."
        ),
        AnalyzeAction::Explain => format!(
            "You are an expert {language} developer. Explain the following code in detail, \
             focusing on what it does, how it works, and any potential issues or improvements. \
             Be thorough but concise."
        ),
        AnalyzeAction::Review => format!(
            "You are an expert {language} developer conducting a code review. Identify \
             potential bugs, security issues, performance problems, and areas for improvement \
             in the following code. Provide specific recommendations."
        ),
    };
    format!("{task}\n\nCode:\n```{language}\n{code}\n```")
}

/// Analysis reply as sent to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

struct AnthropicClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

/// Code assistant; disabled when no API key is configured.
pub struct CodeAssistant {
    client: Option<AnthropicClient>,
}

impl CodeAssistant {
    /// Build the assistant. Without an API key it is disabled rather than
    /// an error.
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let Some(api_key) = config.api_key.as_ref().filter(|key| !key.is_empty()) else {
            return Ok(Self::disabled());
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AssistantError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client: Some(AnthropicClient {
                client,
                api_url: config.api_url.clone(),
                api_key: api_key.clone(),
                model: config.model.clone(),
                max_tokens: config.max_tokens,
            }),
        })
    }

    /// An assistant that always reports it is not configured.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Analyze `code` and return the reply text.
    #[instrument(skip(self, code))]
    pub async fn analyze(&self, code: &str, language: &str, action: &str) -> Result<String, AssistantError> {
        let client = self.client.as_ref().ok_or(AssistantError::NotConfigured)?;
        let action: AnalyzeAction = action.parse()?;
        let prompt = build_prompt(action, language, code);

        debug!(%action, model = %client.model, "Requesting analysis");
        let request = MessagesRequest {
            model: &client.model,
            max_tokens: client.max_tokens,
            messages: [Message {
                role: "user",
                content: &prompt,
            }],
        };

        let response = client
            .client
            .post(&client.api_url)
            .header("x-api-key", &client.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AssistantError::Timeout(e.to_string())
            } else {
                AssistantError::Decode(e.to_string())
            }
        })?;

        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or(AssistantError::EmptyResponse)
    }

    /// Like [`analyze`](Self::analyze), folded into the reply shape callers get.
    pub async fn analyze_outcome(&self, code: &str, language: &str, action: &str) -> AnalysisOutcome {
        match self.analyze(code, language, action).await {
            Ok(text) => AnalysisOutcome {
                success: true,
                result: Some(text),
                message: None,
            },
            Err(AssistantError::NotConfigured) => AnalysisOutcome {
                success: false,
                result: None,
                message: Some(AssistantError::NotConfigured.to_string()),
            },
            Err(e) => {
                warn!(error = %e, "Anthropic API error");
                AnalysisOutcome {
                    success: false,
                    result: None,
                    message: Some(format!("Error analyzing code: {}", e)),
                }
            }
        }
    }
}

fn request_error(e: reqwest::Error) -> AssistantError {
    if e.is_timeout() {
        AssistantError::Timeout(e.to_string())
    } else {
        AssistantError::Request(e.to_string())
    }
}
