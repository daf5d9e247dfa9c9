//! Typed response model built from device outcomes
//!
//! Every map is keyed by device name and ordered, so the same set of
//! outcomes produces the same report whatever order they completed in.

use cmdfleet_shared::{ErrorKind, ExecutionOutcome, Status};
use serde::Serialize;
use std::collections::BTreeMap;

/// One device's part of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResult {
    pub status: Status,
    /// Device output, or the error text when failed
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub elapsed_ms: u64,
}

/// Report of one task across all targeted devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub command: String,
    /// `success` only when every device succeeded
    pub status: Status,
    pub succeeded: usize,
    pub failed: usize,
    pub results: BTreeMap<String, DeviceResult>,
}

/// Roll-up of one command within a multi-command batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub status: Status,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}

/// Reports of a multi-command batch, in submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub commands: Vec<CommandReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Single(DeviceReport),
    Batch(BatchReport),
}

/// What a caller gets back from one dispatch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResponse {
    #[serde(flatten)]
    pub body: ResponseBody,
    /// Devices whose outcome could not be written to history
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unrecorded: Vec<String>,
}

impl DispatchResponse {
    pub fn all_succeeded(&self) -> bool {
        match &self.body {
            ResponseBody::Single(report) => report.status == Status::Success,
            ResponseBody::Batch(batch) => batch
                .commands
                .iter()
                .all(|report| report.status == Status::Success),
        }
    }
}

fn rollup(outcomes: &[ExecutionOutcome]) -> Status {
    if !outcomes.is_empty() && outcomes.iter().all(|o| o.is_success()) {
        Status::Success
    } else {
        Status::Failed
    }
}

/// Per-device report of one task
pub fn aggregate(command: impl Into<String>, outcomes: &[ExecutionOutcome]) -> DeviceReport {
    let results = outcomes
        .iter()
        .map(|o| {
            (
                o.device().name.clone(),
                DeviceResult {
                    status: o.status(),
                    output: o.output().to_string(),
                    error_kind: o.error_kind(),
                    elapsed_ms: o.elapsed_ms(),
                },
            )
        })
        .collect();
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();

    DeviceReport {
        command: command.into(),
        status: rollup(outcomes),
        succeeded,
        failed: outcomes.len() - succeeded,
        results,
    }
}

/// Roll-up report of one command of a batch
pub fn aggregate_command(command: impl Into<String>, outcomes: &[ExecutionOutcome]) -> CommandReport {
    let mut outputs = BTreeMap::new();
    let mut failures = BTreeMap::new();
    for outcome in outcomes {
        let target = if outcome.is_success() {
            &mut outputs
        } else {
            &mut failures
        };
        target.insert(outcome.device().name.clone(), outcome.output().to_string());
    }

    CommandReport {
        command: command.into(),
        status: rollup(outcomes),
        outputs,
        failures,
    }
}
