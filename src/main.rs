//! coderun - execute code in remote sandboxes.
//!
//! Usage:
//!   coderun serve [--port 3000]                       # Start HTTP server
//!   coderun repl [--language python]                  # Interactive prompt
//!   coderun run --language python main.py [-- args]   # Run a file once

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use coderun::cli;
use coderun::config::{AssistantConfig, DaytonaConfig, ServerConfig};
use coderun::http_server;
use coderun::{
    AppState, CodeAssistant, DaytonaGateway, ExecutionService, RunOptions, SandboxGateway, Session,
    SessionRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "coderun")]
#[command(about = "Run code in remote sandboxes")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[command(flatten)]
        server: ServerConfig,
        #[command(flatten)]
        daytona: DaytonaConfig,
        #[command(flatten)]
        assistant: AssistantConfig,
    },
    /// Type code at a prompt and run it once
    Repl {
        /// Language to use; prompted for when omitted
        #[arg(long)]
        language: Option<String>,
        #[command(flatten)]
        daytona: DaytonaConfig,
    },
    /// Run a source file once and exit with its exit code
    Run {
        /// Language of the source file
        #[arg(long, short)]
        language: String,
        /// Source file to run
        source: PathBuf,
        /// File to upload to /workspace before running (repeatable)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
        /// Remote run time limit in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Arguments passed to the program
        #[arg(last = true)]
        args: Vec<String>,
        #[command(flatten)]
        daytona: DaytonaConfig,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Serve {
            server,
            daytona,
            assistant,
        } => {
            let gateway = gateway_or_exit(&daytona);
            let assistant = match CodeAssistant::new(&assistant) {
                Ok(assistant) => assistant,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            };
            let state = AppState::new(gateway, assistant);
            if let Err(e) = http_server::run_server(&server, state).await {
                eprintln!("Error: {}", e);
                exit(1);
            }
        }
        Commands::Repl { language, daytona } => {
            let gateway = gateway_or_exit(&daytona);
            let session = Session::new("cli", gateway);
            let input = BufReader::new(tokio::io::stdin());
            let mut output = tokio::io::stdout();
            if let Err(e) = cli::repl(&session, language, input, &mut output).await {
                eprintln!("Error: {}", e);
                exit(1);
            }
        }
        Commands::Run {
            language,
            source,
            files,
            timeout_secs,
            args,
            daytona,
        } => {
            let gateway = gateway_or_exit(&daytona);
            let service = ExecutionService::new(Arc::new(SessionRegistry::new(gateway)));
            let options = RunOptions {
                argv: args,
                timeout: timeout_secs.map(Duration::from_secs),
                ..RunOptions::default()
            };
            match cli::run_file(&service, &language, &source, &files, options).await {
                Ok(result) => {
                    println!("{}", result.output());
                    exit(result.exit_code());
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit(1);
                }
            }
        }
    }
}

fn gateway_or_exit(config: &DaytonaConfig) -> Arc<dyn SandboxGateway> {
    match DaytonaGateway::new(config) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}
