//! Codebridge CLI - run snippets and render component previews
//!
//! Scripts that call `input()` run interactively, reading answers from stdin;
//! everything else runs to completion in batch mode.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebridge::component::{InputParameter, JsxTransform, Preview};
use codebridge::runtime::{
    ExecutionMode, ExecutionReport, ExecutionRequest, Executor, RuntimeConfig, RuntimeManager,
    SessionHandlers, SessionOutcome, Snippet, SnippetTarget, looks_interactive,
};

#[derive(Parser)]
#[command(name = "codebridge")]
#[command(about = "Run code snippets and preview components in an embedded sandbox", long_about = None)]
struct Cli {
    /// Runtime configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a guest script
    Run {
        /// Script file
        file: PathBuf,

        /// Force batch mode even when the script reads input
        #[arg(long)]
        batch: bool,
    },

    /// Report whether a script would run interactively
    Detect {
        /// Script file
        file: PathBuf,
    },

    /// Render a component module to HTML
    Render {
        /// Component module file
        file: PathBuf,

        /// Export to render (default export when omitted)
        #[arg(long)]
        export: Option<String>,

        /// Declared parameters as a JSON array
        #[arg(long)]
        params: Option<String>,
    },

    /// Run or render a snippet record exported from the snippet store
    Snippet {
        /// Snippet JSON file
        file: PathBuf,
    },

    /// Print the effective runtime configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };

    let success = match cli.command {
        Commands::Run { file, batch } => {
            let source = read_source(&file)?;
            let mode = if batch {
                ExecutionMode::Batch
            } else if looks_interactive(&source) {
                ExecutionMode::Interactive
            } else {
                ExecutionMode::Batch
            };
            run_script(&config, ExecutionRequest::with_mode(source, mode)).await?
        }

        Commands::Detect { file } => {
            let source = read_source(&file)?;
            if looks_interactive(&source) {
                println!("interactive");
            } else {
                println!("batch");
            }
            true
        }

        Commands::Render {
            file,
            export,
            params,
        } => {
            let source = read_source(&file)?;
            let parameters = match params {
                Some(json) => InputParameter::parse_list(&json).context("Invalid --params JSON")?,
                None => Vec::new(),
            };
            render_preview(&source, export.as_deref(), &parameters)?
        }

        Commands::Snippet { file } => {
            let json = read_source(&file)?;
            let snippet = Snippet::from_json(&json).context("Invalid snippet record")?;
            match snippet.target() {
                SnippetTarget::Script { source } => {
                    run_script(&config, ExecutionRequest::new(source)).await?
                }
                SnippetTarget::Preview {
                    source,
                    export_name,
                    parameters,
                } => render_preview(source, export_name, parameters)?,
                SnippetTarget::DisplayOnly => {
                    println!("{}", snippet.code);
                    true
                }
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Run a script; returns whether it completed without a guest error.
async fn run_script(config: &RuntimeConfig, request: ExecutionRequest) -> Result<bool> {
    let executor = Executor::new(RuntimeManager::new(config.clone()));
    executor
        .manager()
        .ensure_ready_within(Duration::from_millis(config.ready_timeout_ms))
        .await?;

    let handlers = SessionHandlers::new(|prompt| {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || read_answer(&prompt))
                .await
                .ok()
                .flatten()
        })
    })
    .on_output(|line| println!("{line}"))
    .on_error(|line| eprintln!("{line}"));

    match executor.execute(request, handlers).await? {
        ExecutionReport::Batch(out) => {
            print!("{}", out.output);
            eprint!("{}", out.error);
            Ok(!out.has_error())
        }
        ExecutionReport::Interactive { outcome, .. } => {
            Ok(matches!(outcome, SessionOutcome::Finished))
        }
    }
}

/// Show `prompt` and read one line from stdin; `None` at end of input.
fn read_answer(prompt: &str) -> Option<String> {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{prompt}");
    let _ = stdout.flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
    }
}

/// Render a component; returns whether every parameter coerced cleanly.
fn render_preview(
    source: &str,
    export_name: Option<&str>,
    parameters: &[InputParameter],
) -> Result<bool> {
    let preview = Preview::build(&JsxTransform, source, export_name, parameters)?;
    for (name, err) in preview.errors() {
        eprintln!("warning: parameter '{name}' skipped: {err}");
    }
    let element = preview.render()?;
    println!("{}", element.to_html());
    Ok(preview.errors().is_empty())
}
