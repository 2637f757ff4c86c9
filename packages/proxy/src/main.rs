use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trustbridge_channel::StreamChannel;
use trustbridge_engine::{exit_code, EngineConfig, ExecutionEngine, ProgramArtifact, ProxyService};
use trustbridge_script::RunLimits;

/// Stack for runtime threads; compilation and scripts run on the blocking pool.
const SCRIPT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// TrustBridge proxy - runs code on behalf of a restricted process
#[derive(Parser, Debug)]
#[command(name = "trustbridge-proxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve execution requests over stdin/stdout
    Serve(ServeArgs),

    /// Run a compiled program artifact
    Run {
        /// Path to a MainProgram-*.tbp artifact
        artifact: PathBuf,

        /// Abort after this many statements
        #[arg(long)]
        step_budget: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Directory scripts run in (defaults to the current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Directory compiled programs are written to
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Extra namespace imported by every script
    #[arg(long = "using", value_name = "NAMESPACE")]
    usings: Vec<String>,

    /// Library loaded for every script
    #[arg(long = "reference", value_name = "PATH")]
    references: Vec<PathBuf>,

    /// Milliseconds to wait before relabeling a launched program
    #[arg(long, default_value_t = 100)]
    settle_delay_ms: u64,

    /// Label given to launched programs
    #[arg(long)]
    display_name: Option<String>,

    /// Abort scripts after this many statements
    #[arg(long)]
    step_budget: Option<u64>,

    /// Executable used to launch programs (defaults to this one)
    #[arg(long)]
    runner: Option<PathBuf>,
}

impl ServeArgs {
    fn into_config(self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if self.working_dir.is_some() {
            config.working_dir = self.working_dir;
        }
        if let Some(dir) = self.artifact_dir {
            config.artifact_dir = dir;
        }
        for using in self.usings {
            if !config.default_usings.contains(&using) {
                config.default_usings.push(using);
            }
        }
        config.default_references = self.references;
        config.settle_delay = Duration::from_millis(self.settle_delay_ms);
        if let Some(name) = self.display_name {
            config.display_name = name;
        }
        config.step_budget = self.step_budget;
        if self.runner.is_some() {
            config.runner = self.runner;
        }
        config
    }
}

fn main() -> ExitCode {
    // stdout carries the channel; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args.into_config()),
        Command::Run {
            artifact,
            step_budget,
        } => run(artifact, step_budget),
    }
}

fn serve(config: EngineConfig) -> ExitCode {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(SCRIPT_STACK_SIZE)
        .build();
    let runtime = match runtime {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let channel = Arc::new(StreamChannel::stdio());
        let engine = Arc::new(ExecutionEngine::new(config));
        let service = ProxyService::new(channel.clone(), engine);
        let listener = service.start();

        channel.closed().await;
        service.stop(listener);
        tracing::info!("peer disconnected, shutting down");
    });
    // Scripts still running on the blocking pool are abandoned.
    runtime.shutdown_timeout(Duration::from_secs(1));
    ExitCode::SUCCESS
}

fn run(path: PathBuf, step_budget: Option<u64>) -> ExitCode {
    let outcome = ProgramArtifact::take(&path).and_then(|artifact| {
        tracing::info!(program = %artifact.display_name, path = %path.display(), "running program");
        artifact.run(&RunLimits { step_budget })
    });

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    for line in &outcome.console {
        println!("{}", line);
    }

    match outcome.result {
        Ok(value) => ExitCode::from(exit_code(&value) as u8),
        Err(e) => {
            eprintln!("Unhandled error: {}", e);
            ExitCode::FAILURE
        }
    }
}
