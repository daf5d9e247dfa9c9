//! Request-level entry point
//!
//! Ties resolution, dispatch, recording and aggregation together for one
//! caller request.

use cmdfleet_shared::{
    defaults, parse_command_lines, CommandTask, DeviceDescriptor, ExecutionOutcome, InputError,
    OutputFormat,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

use crate::command::{
    aggregate, aggregate_command, resolve, BatchReport, Dispatcher, DispatchResponse,
    ResponseBody,
};
use crate::inventory::Inventory;
use crate::recorder::OutcomeRecorder;
use crate::session::SessionFactory;

/// What a request asks the devices to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMode {
    /// One show command
    Show { command: String, format: OutputFormat },
    /// Several show commands, run one after another across all devices
    ShowBatch {
        commands: Vec<String>,
        format: OutputFormat,
    },
    /// Configuration lines applied in order, optionally saved
    Config { lines: Vec<String>, save: bool },
    /// Capture of the running configuration
    Backup,
}

/// One caller request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// Device names or ids
    pub devices: Vec<String>,
    /// Group names
    pub groups: Vec<String>,
    pub mode: RequestMode,
    /// `false` runs one device at a time
    pub parallel: bool,
    /// Recorded on every history entry
    pub actor: Option<String>,
}

impl DispatchRequest {
    /// Tasks to run, in order. Multi-line entries are split into lines.
    fn tasks(&self) -> Result<Vec<CommandTask>, InputError> {
        let tasks = match &self.mode {
            RequestMode::Show { command, format } => {
                vec![CommandTask::command(command.trim()).with_format(*format)]
            }
            RequestMode::ShowBatch { commands, format } => {
                let commands = parse_command_lines(&commands.join("\n"));
                if commands.is_empty() {
                    return Err(InputError::MissingCommand);
                }
                commands
                    .into_iter()
                    .map(|command| CommandTask::command(command).with_format(*format))
                    .collect()
            }
            RequestMode::Config { lines, save } => {
                vec![CommandTask::config(lines.iter().map(String::as_str)).with_save(*save)]
            }
            RequestMode::Backup => {
                vec![CommandTask::command(defaults::BACKUP_COMMAND).with_privileged(true)]
            }
        };

        for task in &tasks {
            task.validate()?;
        }
        Ok(tasks)
    }
}

/// Bulk command execution engine
pub struct BulkEngine {
    inventory: Arc<dyn Inventory>,
    dispatcher: Dispatcher,
    recorder: OutcomeRecorder,
    workers: usize,
}

impl BulkEngine {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        factory: Arc<dyn SessionFactory>,
        recorder: OutcomeRecorder,
        workers: usize,
    ) -> Self {
        Self {
            inventory,
            dispatcher: Dispatcher::new(factory),
            recorder,
            workers,
        }
    }

    /// Run a request to completion.
    ///
    /// Input errors stop the request before any device is contacted. Device
    /// failures are reported inside the response.
    pub async fn execute(&self, request: DispatchRequest) -> Result<DispatchResponse, InputError> {
        let tasks = self.tasks_checked(&request)?;
        let devices = resolve(self.inventory.as_ref(), &request.devices, &request.groups)?;
        let limit = if request.parallel { self.workers } else { 1 };
        let actor = request.actor.as_deref();

        info!(
            "[DISPATCH] Request for {} device(s), {} task(s), actor {}",
            devices.len(),
            tasks.len(),
            actor.unwrap_or("-")
        );

        let mut unrecorded = Vec::new();
        let body = match request.mode {
            RequestMode::ShowBatch { .. } => {
                let mut commands = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let outcomes = self
                        .run_task(devices.clone(), &task, limit, actor, &mut unrecorded)
                        .await?;
                    commands.push(aggregate_command(task.history_command(), &outcomes));
                }
                ResponseBody::Batch(BatchReport { commands })
            }
            _ => {
                let mut reports = Vec::with_capacity(1);
                for task in tasks {
                    let outcomes = self
                        .run_task(devices.clone(), &task, limit, actor, &mut unrecorded)
                        .await?;
                    reports.push(aggregate(task.history_command(), &outcomes));
                }
                match reports.pop() {
                    Some(report) => ResponseBody::Single(report),
                    None => return Err(InputError::MissingCommand),
                }
            }
        };

        Ok(DispatchResponse { body, unrecorded })
    }

    fn tasks_checked(&self, request: &DispatchRequest) -> Result<Vec<CommandTask>, InputError> {
        if self.workers == 0 {
            return Err(InputError::InvalidConcurrency);
        }
        request.tasks()
    }

    /// Dispatch one task and record each outcome as it arrives
    async fn run_task(
        &self,
        devices: Vec<DeviceDescriptor>,
        task: &CommandTask,
        limit: usize,
        actor: Option<&str>,
        unrecorded: &mut Vec<String>,
    ) -> Result<Vec<ExecutionOutcome>, InputError> {
        let mut stream = self.dispatcher.dispatch(devices, task.clone(), limit)?;
        let mut outcomes = Vec::with_capacity(stream.expected());

        while let Some(outcome) = stream.next().await {
            if self.recorder.record(&outcome, task, actor).await.is_err() {
                let name = &outcome.device().name;
                if !unrecorded.contains(name) {
                    unrecorded.push(name.clone());
                }
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}
