//! Runtime configuration. Every setting is a CLI flag that can also be
//! supplied through an environment variable.

use clap::Args;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_DAYTONA_API_URL: &str = "https://app.daytona.io/api";
pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-sonnet-20240229";

/// HTTP server settings.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Maximum request body size in bytes (covers uploaded files)
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 25 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Daytona sandbox gateway settings.
#[derive(Debug, Clone, Args)]
pub struct DaytonaConfig {
    /// Base URL of the Daytona API
    #[arg(long = "daytona-api-url", env = "DAYTONA_API_URL", default_value = DEFAULT_DAYTONA_API_URL)]
    pub api_url: String,

    /// Daytona API key
    #[arg(long = "daytona-api-key", env = "DAYTONA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Target region for new sandboxes
    #[arg(long = "daytona-target", env = "DAYTONA_TARGET")]
    pub target: Option<String>,

    /// Timeout for a single API request, in seconds
    #[arg(long = "daytona-timeout-secs", env = "DAYTONA_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// How long to wait for a new sandbox to start, in seconds
    #[arg(
        long = "daytona-start-timeout-secs",
        env = "DAYTONA_START_TIMEOUT_SECS",
        default_value_t = 120
    )]
    pub start_timeout_secs: u64,
}

impl DaytonaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl Default for DaytonaConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_DAYTONA_API_URL.to_string(),
            api_key: None,
            target: None,
            timeout_secs: 60,
            start_timeout_secs: 120,
        }
    }
}

/// Settings for the Anthropic-backed code assistant.
#[derive(Debug, Clone, Args)]
pub struct AssistantConfig {
    /// Anthropic API key; analysis is disabled without it
    #[arg(long = "anthropic-api-key", env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model used for analysis
    #[arg(long = "anthropic-model", env = "ANTHROPIC_MODEL", default_value = DEFAULT_ANTHROPIC_MODEL)]
    pub model: String,

    /// Maximum tokens per analysis response
    #[arg(long = "anthropic-max-tokens", env = "ANTHROPIC_MAX_TOKENS", default_value_t = 2000)]
    pub max_tokens: u32,

    /// Messages endpoint
    #[arg(long = "anthropic-api-url", env = "ANTHROPIC_API_URL", default_value = DEFAULT_ANTHROPIC_API_URL)]
    pub api_url: String,

    /// Timeout for one analysis request, in seconds
    #[arg(long = "anthropic-timeout-secs", env = "ANTHROPIC_TIMEOUT_SECS", default_value_t = 120)]
    pub timeout_secs: u64,
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            max_tokens: 2000,
            api_url: DEFAULT_ANTHROPIC_API_URL.to_string(),
            timeout_secs: 120,
        }
    }
}
