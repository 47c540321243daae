use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use script_queue::{
    CommandRegistry, ConfigError, ContextResolver, Duration, Engine, EngineConfig, EngineEvent,
    QueueDirectory, RunOutcome, ScriptError, ScriptFile, parse_duration,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Run YAML queue scripts on a fixed tick.
///
/// Each top-level key of the script names a queue. Timed queues run one line
/// per tick; instant queues run all of their lines at once. Lines can pause,
/// resume, delay or clear other queues with the QUEUE command.
///
/// Examples:
///   scriptq demo.yaml                          # Run until every queue is done
///   scriptq demo.yaml --tick 100ms --speed 1s  # Slower ticks, 1s between steps
///   scriptq demo.yaml --define target=world    # Make <def[target]> resolve
#[derive(Debug, Parser)]
#[command(name = "scriptq")]
#[command(version)]
#[command(about = "Run YAML queue scripts on a fixed tick")]
struct Cli {
    /// The YAML script to run.
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Engine config file (TOML). Defaults to <config dir>/scriptq/config.toml if present.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Time between ticks (e.g., 50ms, 1t, 0.5s).
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    tick: Option<Duration>,

    /// Wait after each step for timed queues that don't set their own speed.
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    speed: Option<Duration>,

    /// Stop after this many ticks.
    #[arg(long, value_name = "N")]
    max_ticks: Option<u64>,

    /// Definition readable from scripts as <def[KEY]>.
    #[arg(long = "define", short = 'D', value_parser = parse_define, value_name = "KEY=VALUE")]
    defines: Vec<(String, String)>,

    /// Print every engine event as a JSON line.
    #[arg(long)]
    json: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("log file error: {0}")]
    LogFile(std::io::Error),

    #[error("runtime error: {0}")]
    Runtime(std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scriptq: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    init_logging(cli.debug, cli.log_file.as_deref())?;

    let config = load_config(&cli)?;
    let script = ScriptFile::from_file(&cli.script)?;

    let resolver = ContextResolver::new();
    for (key, value) in &cli.defines {
        resolver.define(key.clone(), value.clone());
    }

    let directory = Arc::new(QueueDirectory::new());
    script.spawn(&directory, config.default_speed)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let outcome = runtime.block_on(async {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = Engine::new(
            directory,
            CommandRegistry::with_builtins(),
            Arc::new(resolver),
            config,
        )
        .with_events(tx);

        let json = cli.json;
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event, json);
            }
        });

        let outcome = engine
            .run(wait_for_shutdown(tokio::signal::ctrl_c()))
            .await;

        // Dropping the engine closes the channel so the printer can finish.
        drop(engine);
        let _ = printer.await;
        outcome
    });

    if outcome == RunOutcome::TickLimit {
        tracing::warn!("tick limit reached before every queue finished");
    }
    Ok(())
}

/// Resolves once `signal` fires.
///
/// If the signal handler could not be installed this never resolves, so the
/// engine keeps running until its queues are done.
async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; running until idle");
        std::future::pending::<()>().await;
    }
}

/// Builds the engine config: the config file first, then flags on top.
fn load_config(cli: &Cli) -> Result<EngineConfig, CliError> {
    let path = cli.config.clone().or_else(|| {
        dirs::config_dir()
            .map(|dir| dir.join("scriptq").join("config.toml"))
            .filter(|path| path.is_file())
    });

    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            EngineConfig::from_file(&path)?
        }
        None => EngineConfig::default(),
    };

    if let Some(tick) = cli.tick {
        config = config.tick(tick);
    }
    if let Some(speed) = cli.speed {
        config = config.default_speed(speed);
    }
    if let Some(limit) = cli.max_ticks {
        config = config.max_ticks(limit);
    }
    Ok(config)
}

fn print_event(event: &EngineEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "failed to encode event"),
        }
        return;
    }

    match event {
        EngineEvent::Echo { message, .. } => println!("{message}"),
        EngineEvent::StepFailed {
            queue,
            command,
            error,
        } => eprintln!("[{queue}] {command}: {error}"),
        EngineEvent::StepExecuted { .. } | EngineEvent::QueueFinished { .. } => {}
    }
}

/// Parses a `KEY=VALUE` definition.
fn parse_define(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Initializes logging to stderr, or to `log_file` when given.
///
/// `RUST_LOG` sets the filter unless `--debug` is passed.
fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<(), CliError> {
    use std::fs::OpenOptions;
    use tracing_subscriber::EnvFilter;

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(CliError::LogFile)?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}
