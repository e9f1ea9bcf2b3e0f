//! Configuration stored in `taskcore.toml`.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::combinators::RetryPlan;
use crate::error::ErrorKind;
use crate::handler::{Table, Verbosity};

pub const DEFAULT_CONFIG_FILE: &str = "taskcore.toml";

/// Upper bound on `retry.max_retries`; anything larger is almost certainly a typo.
pub const MAX_RETRIES_LIMIT: u32 = 100;

/// Handler configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskcoreConfig {
    pub verbosity: Verbosity,

    /// Timeout for `wait` runs, in seconds. Unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,

    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// The one error kind that is retried.
    pub kind: ErrorKind,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            kind: ErrorKind::Timeout,
            delay_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn plan(&self) -> RetryPlan {
        RetryPlan::new(self.max_retries, self.kind).with_delay(Duration::from_millis(self.delay_ms))
    }
}

impl Default for TaskcoreConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            wait_timeout_secs: None,
            retry: RetryConfig::default(),
        }
    }
}

impl TaskcoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_secs == Some(0) {
            return Err(anyhow!("wait_timeout_secs must be > 0 when set"));
        }
        if !self.retry.kind.is_retryable() {
            return Err(anyhow!(
                "retry.kind {} can never be retried",
                self.retry.kind
            ));
        }
        if self.retry.max_retries > MAX_RETRIES_LIMIT {
            return Err(anyhow!(
                "retry.max_retries must be <= {MAX_RETRIES_LIMIT}"
            ));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    /// Flattened `key | value` view for display.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(["key", "value"]);
        table.push_row(["verbosity".to_string(), format!("{:?}", self.verbosity).to_lowercase()]);
        table.push_row([
            "wait_timeout_secs".to_string(),
            self.wait_timeout_secs
                .map_or_else(|| "none".to_string(), |secs| secs.to_string()),
        ]);
        table.push_row(["retry.max_retries".to_string(), self.retry.max_retries.to_string()]);
        table.push_row(["retry.kind".to_string(), self.retry.kind.to_string()]);
        table.push_row(["retry.delay_ms".to_string(), self.retry.delay_ms.to_string()]);
        table
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TaskcoreConfig::default()`.
pub fn load_config(path: &Path) -> Result<TaskcoreConfig> {
    if !path.exists() {
        let cfg = TaskcoreConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TaskcoreConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Write `cfg` to `path`, replacing any existing file in one step.
///
/// The TOML is staged in a temp file beside `path` and persisted over it, so
/// readers see either the old file or the new one.
pub fn write_config(path: &Path, cfg: &TaskcoreConfig) -> Result<()> {
    cfg.validate()?;
    let toml = toml::to_string_pretty(cfg).context("serialize config toml")?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("stage config in {}", dir.display()))?;
    writeln!(staged, "{}", toml.trim_end()).context("write staged config")?;
    staged
        .persist(path)
        .with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
