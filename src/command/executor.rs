//! Runs one task against one device

use cmdfleet_shared::{
    append_output, CommandTask, DeviceDescriptor, ExecutionOutcome, OutputFormat, SessionError,
    TaskMode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionFactory};

/// Executes tasks on devices through sessions from a factory
pub struct TaskExecutor {
    factory: Arc<dyn SessionFactory>,
}

impl TaskExecutor {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Run `task` on `device`. Never fails: every error becomes a failed outcome.
    pub async fn execute(&self, device: &DeviceDescriptor, task: &CommandTask) -> ExecutionOutcome {
        let started = Instant::now();
        let result = self.run(device, task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!("[DISPATCH] {} succeeded in {}ms", device.name, elapsed_ms),
            Err(e) => warn!("[DISPATCH] {} failed in {}ms: {}", device.name, elapsed_ms, e),
        }

        ExecutionOutcome::from_result(device.reference(), result, elapsed_ms)
    }

    async fn run(
        &self,
        device: &DeviceDescriptor,
        task: &CommandTask,
    ) -> Result<String, SessionError> {
        let mut session = self.factory.open_session(device).await?;
        debug!(
            "[DISPATCH] {} session open via {}",
            device.name,
            self.factory.name()
        );

        let result = perform(session.as_mut(), task).await;

        if let Err(e) = session.close().await {
            debug!("[DISPATCH] {} close failed: {}", device.name, e);
        }
        result
    }
}

/// Drive an open session through the task
async fn perform(session: &mut dyn Session, task: &CommandTask) -> Result<String, SessionError> {
    match task.mode() {
        TaskMode::Command { command } => {
            if task.privileged() {
                session.enter_privileged_mode().await?;
            }
            let output = session.send_command(command, task.format()).await?;
            Ok(format_output(&output, task.format()))
        }
        TaskMode::ConfigBatch { lines, save } => {
            session.enter_privileged_mode().await?;
            let mut output = session.send_config_lines(lines).await?;
            if *save {
                let saved = session.save_config().await?;
                append_output(&mut output, &saved);
            }
            Ok(output)
        }
    }
}

/// Pretty-print structured output when JSON was requested and the device
/// returned valid JSON; anything else is returned as received.
pub fn format_output(output: &str, format: OutputFormat) -> String {
    if format == OutputFormat::Raw {
        return output.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| output.to_string()),
        Err(_) => output.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{descriptor, MockFactory, Script};
    use cmdfleet_shared::{ErrorKind, Status};

    #[test]
    fn test_format_output() {
        assert_eq!(
            format_output(r#"{"version":"15.2","uptime":3}"#, OutputFormat::Json),
            "{\n  \"uptime\": 3,\n  \"version\": \"15.2\"\n}"
        );
        assert_eq!(format_output("plain text", OutputFormat::Json), "plain text");
        assert_eq!(format_output(r#"{"a":1}"#, OutputFormat::Raw), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_session_closed_after_failure() {
        let factory = Arc::new(MockFactory::new().with(
            "sw1",
            Script {
                command_error: Some(SessionError::Protocol("% Invalid input".into())),
                ..Default::default()
            },
        ));
        let executor = TaskExecutor::new(factory.clone());

        let outcome = executor
            .execute(&descriptor(1, "sw1"), &CommandTask::command("show bogus"))
            .await;
        assert_eq!(outcome.status(), Status::Failed);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Protocol));
        assert_eq!(factory.calls_for("sw1"), vec!["command:show bogus", "close"]);
        assert_eq!(factory.still_open(), 0);
    }

    #[tokio::test]
    async fn test_privileged_command_enables_first() {
        let factory = Arc::new(MockFactory::new());
        let executor = TaskExecutor::new(factory.clone());

        let task = CommandTask::command("show running-config").with_privileged(true);
        let outcome = executor.execute(&descriptor(1, "sw1"), &task).await;
        assert!(outcome.is_success());
        assert_eq!(
            factory.calls_for("sw1"),
            vec!["enable", "command:show running-config", "close"]
        );
    }

    #[tokio::test]
    async fn test_open_failure_opens_nothing() {
        let factory = Arc::new(MockFactory::new().with(
            "sw2",
            Script {
                open_error: Some(SessionError::Auth("invalid credentials".into())),
                ..Default::default()
            },
        ));
        let executor = TaskExecutor::new(factory.clone());

        let outcome = executor
            .execute(&descriptor(2, "sw2"), &CommandTask::command("show version"))
            .await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Auth));
        assert!(outcome.output().contains("credentials"));
        assert_eq!(factory.opened(), 0);
    }
}
