//! `taskcore` command line.
//!
//! Runs single tasks through a [`TaskHandler`] so their cancellation,
//! timeout and confirmation behavior can be driven from a shell.

mod console;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use taskcore::combinators::retry;
use taskcore::config::{DEFAULT_CONFIG_FILE, TaskcoreConfig, load_config, write_config};
use taskcore::exit_codes;
use taskcore::handler::{TaskHandler, Verbosity};
use taskcore::logging;
use taskcore::task::{Signal, TaskReport, WaitTask};
use tracing::{debug, warn};

use crate::console::ConsoleUi;

#[derive(Parser)]
#[command(
    name = "taskcore",
    version,
    about = "Cooperative task runner with cancellation"
)]
struct Cli {
    /// Config file; a missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `verbosity` from the config file.
    #[arg(long, global = true, value_enum)]
    verbosity: Option<Verbosity>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Wait until a line arrives on stdin. EOF counts as abandoned.
    Wait {
        /// Give up after this many seconds (overrides `wait_timeout_secs`).
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Request cancellation after this many milliseconds.
        #[arg(long)]
        cancel_after_ms: Option<u64>,
        /// Print the task report as JSON instead of the bare state.
        #[arg(long)]
        json: bool,
    },
    /// Ask a yes/no question on the terminal.
    Confirm { question: String },
    /// Print the effective configuration.
    Config {
        /// Write the effective configuration to the config file.
        #[arg(long)]
        init: bool,
        /// With `--init`, replace an existing file.
        #[arg(long, requires = "init")]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = effective_config(&cli.config, cli.verbosity)?;
    logging::init(config.verbosity);
    debug!(config = %cli.config.display(), "loaded config");

    let handler = Arc::new(TaskHandler::new(
        Arc::new(ConsoleUi::new()),
        config.verbosity,
    ));
    match cli.command {
        Command::Wait {
            timeout_secs,
            cancel_after_ms,
            json,
        } => cmd_wait(&handler, &config, timeout_secs, cancel_after_ms, json),
        Command::Confirm { question } => Ok(cmd_confirm(&handler, &question)),
        Command::Config { init, force } => {
            if init {
                init_config(&cli.config, &config, force)?;
                handler.output("config", &format!("wrote {}", cli.config.display()));
            }
            handler.output_table("config", &config.to_table());
            Ok(exit_codes::OK)
        }
    }
}

fn effective_config(path: &Path, verbosity: Option<Verbosity>) -> Result<TaskcoreConfig> {
    let mut config = load_config(path)?;
    if let Some(verbosity) = verbosity {
        config.verbosity = verbosity;
    }
    Ok(config)
}

fn init_config(path: &Path, config: &TaskcoreConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to replace it)", path.display());
    }
    write_config(path, config)
}

fn cmd_wait(
    handler: &Arc<TaskHandler>,
    config: &TaskcoreConfig,
    timeout_secs: Option<u64>,
    cancel_after_ms: Option<u64>,
    json: bool,
) -> Result<i32> {
    if timeout_secs == Some(0) {
        bail!("--timeout-secs must be > 0");
    }
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .or_else(|| config.wait_timeout());

    let signal = Arc::new(Signal::new());
    watch_stdin(Arc::clone(&signal))?;
    if let Some(ms) = cancel_after_ms {
        cancel_after(Arc::clone(handler), Duration::from_millis(ms))?;
    }

    let mut report = None;
    let outcome = retry(&config.retry.plan(), |_last| {
        let mut task = WaitTask::waiting_on("wait", signal.clone(), timeout);
        let outcome = handler.run_task(&mut task);
        report = Some(TaskReport::new(&task, outcome.as_ref().err()));
        outcome
    });

    if let Some(report) = &report {
        if json {
            println!(
                "{}",
                serde_json::to_string(report).context("serialize task report")?
            );
        } else {
            println!("{}", report.state);
        }
    }
    if let Err(err) = &outcome {
        handler.report_error(err);
    }
    Ok(exit_codes::for_outcome(&outcome))
}

fn cmd_confirm(handler: &TaskHandler, question: &str) -> i32 {
    match handler.ask(question) {
        Ok(true) => {
            handler.output("confirm", "yes");
            exit_codes::OK
        }
        Ok(false) => {
            handler.output("confirm", "no");
            exit_codes::DECLINED
        }
        Err(err) => {
            handler.report_error(&err);
            exit_codes::for_outcome(&Err(err))
        }
    }
}

/// Set `signal` on the first stdin line; abandon it on EOF or read error.
fn watch_stdin(signal: Arc<Signal>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-signal".to_string())
        .spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) => signal.abandon(),
                Ok(_) => signal.set(),
                Err(err) => {
                    warn!(%err, "reading stdin failed");
                    signal.abandon();
                }
            }
        })
        .context("spawn stdin watcher")?;
    Ok(())
}

fn cancel_after(handler: Arc<TaskHandler>, delay: Duration) -> Result<()> {
    thread::Builder::new()
        .name("cancel-timer".to_string())
        .spawn(move || {
            thread::sleep(delay);
            debug!(?delay, "requesting cancellation");
            handler.cancel();
        })
        .context("spawn cancel timer")?;
    Ok(())
}
