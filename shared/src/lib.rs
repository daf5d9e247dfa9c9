//! cmdfleet Shared Types
//!
//! This crate provides the data model, error taxonomy, platform CLI profiles
//! and the prompt-delimited codec shared by the execution engine and the
//! device simulator.

pub mod codec;
pub mod error;
pub mod platform;
pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub use error::{ErrorKind, InputError, SessionError};
pub use platform::{Platform, PlatformProfile};

/// Engine defaults
pub mod defaults {
    /// Maximum number of device sessions open at the same time
    pub const CONCURRENCY_LIMIT: usize = 10;

    /// Default management port
    pub const MANAGEMENT_PORT: u16 = 22;

    /// Session connect timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Session read timeout in milliseconds (per device response)
    pub const READ_TIMEOUT_MS: u64 = 20_000;

    /// Recorded in history when a config batch succeeds without output
    pub const CONFIG_APPLIED_MESSAGE: &str = "Configuration applied successfully";

    /// Command used by the configuration backup operation
    pub const BACKUP_COMMAND: &str = "show running-config";
}

/// Inventory identity of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login material for a device
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Privileged-mode (enable) secret
    pub secret: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection parameters of one managed device, snapshotted at dispatch time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub address: IpAddr,
    pub platform: Platform,
    pub credentials: Credentials,
    pub port: u16,
    pub active: bool,
    pub description: String,
}

impl DeviceDescriptor {
    /// Address and port of the management endpoint
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Lightweight identity used in outcomes and history
    pub fn reference(&self) -> DeviceRef {
        DeviceRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Named set of devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGroup {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub members: Vec<DeviceId>,
}

/// Device identity carried by outcomes and history entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: DeviceId,
    pub name: String,
}

/// How command output should be returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Raw device text
    #[default]
    Raw,
    /// Ask the device for structured output and pretty-print it
    Json,
}

/// What a task does on each device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaskMode {
    /// Send one command and capture its output
    Command { command: String },
    /// Enter config mode, apply the lines in order, optionally save
    ConfigBatch { lines: Vec<String>, save: bool },
}

/// A unit of work applied to every target device. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTask {
    mode: TaskMode,
    format: OutputFormat,
    privileged: bool,
}

impl CommandTask {
    /// Single-command task
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            mode: TaskMode::Command {
                command: command.into(),
            },
            format: OutputFormat::Raw,
            privileged: false,
        }
    }

    /// Config-batch task; saves the configuration by default.
    ///
    /// Lines are trimmed, blank lines dropped and multi-line entries split,
    /// so the task holds exactly the lines sent to the device.
    pub fn config<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines
            .into_iter()
            .flat_map(|line| {
                let line: String = line.into();
                parse_command_lines(&line)
            })
            .collect();
        Self {
            mode: TaskMode::ConfigBatch { lines, save: true },
            format: OutputFormat::Raw,
            privileged: true,
        }
    }

    /// Set the output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enter privileged mode before a single command
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Toggle apply-and-save for config batches (no effect on commands)
    pub fn with_save(mut self, enabled: bool) -> Self {
        if let TaskMode::ConfigBatch { save, .. } = &mut self.mode {
            *save = enabled;
        }
        self
    }

    pub fn mode(&self) -> &TaskMode {
        &self.mode
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_config(&self) -> bool {
        matches!(self.mode, TaskMode::ConfigBatch { .. })
    }

    /// Command text as recorded in history
    pub fn history_command(&self) -> String {
        match &self.mode {
            TaskMode::Command { command } => command.clone(),
            TaskMode::ConfigBatch { lines, .. } => lines.join("\n"),
        }
    }

    /// Reject tasks with no content
    pub fn validate(&self) -> Result<(), InputError> {
        match &self.mode {
            TaskMode::Command { command } if command.trim().is_empty() => {
                Err(InputError::MissingCommand)
            }
            TaskMode::ConfigBatch { lines, .. }
                if lines.iter().all(|line| line.trim().is_empty()) =>
            {
                Err(InputError::MissingConfigLines)
            }
            _ => Ok(()),
        }
    }
}

/// Split multi-line command input into trimmed, non-empty lines
pub fn parse_command_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Append one block of device output, newline separated
pub fn append_output(acc: &mut String, part: &str) {
    if part.is_empty() {
        return;
    }
    if !acc.is_empty() {
        acc.push('\n');
    }
    acc.push_str(part);
}

/// Per-device result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one execution attempt on one device. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    device: DeviceRef,
    status: Status,
    output: String,
    error_kind: Option<ErrorKind>,
    elapsed_ms: u64,
}

impl ExecutionOutcome {
    /// Successful outcome carrying the device output
    pub fn succeeded(device: DeviceRef, output: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            device,
            status: Status::Success,
            output: output.into(),
            error_kind: None,
            elapsed_ms,
        }
    }

    /// Failed outcome carrying the diagnostic
    pub fn failed(device: DeviceRef, error: &SessionError, elapsed_ms: u64) -> Self {
        Self {
            device,
            status: Status::Failed,
            output: error.to_string(),
            error_kind: Some(error.kind()),
            elapsed_ms,
        }
    }

    /// Convert a worker result into an outcome
    pub fn from_result(
        device: DeviceRef,
        result: Result<String, SessionError>,
        elapsed_ms: u64,
    ) -> Self {
        match result {
            Ok(output) => Self::succeeded(device, output, elapsed_ms),
            Err(e) => Self::failed(device, &e, elapsed_ms),
        }
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

/// History row to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub device: DeviceRef,
    pub command: String,
    pub output: String,
    pub status: Status,
    pub actor: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Persisted, append-only audit record of one outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub device: DeviceRef,
    pub command: String,
    pub output: String,
    pub status: Status,
    pub actor: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Attach a storage id to a new entry
    pub fn from_new(id: u64, entry: NewHistoryEntry) -> Self {
        Self {
            id,
            device: entry.device,
            command: entry.command,
            output: entry.output,
            status: entry.status,
            actor: entry.actor,
            executed_at: entry.executed_at,
        }
    }
}
