//! Concurrent fan-out of one task across many devices
//!
//! Every device gets its own tokio task. A semaphore bounds how many of them
//! hold an open session at once, and each task reports exactly one outcome
//! over a completion channel. Outcomes therefore arrive in completion order,
//! not submission order.

use cmdfleet_shared::{CommandTask, DeviceDescriptor, ExecutionOutcome, InputError, SessionError};
use futures::{FutureExt, Stream, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use super::executor::TaskExecutor;
use crate::session::SessionFactory;

/// Bounded worker pool dispatching tasks to devices
pub struct Dispatcher {
    executor: Arc<TaskExecutor>,
}

impl Dispatcher {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            executor: Arc::new(TaskExecutor::new(factory)),
        }
    }

    /// Start running `task` on every device, at most `limit` at a time.
    ///
    /// Returns a stream yielding one outcome per device as each completes.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(
        &self,
        devices: Vec<DeviceDescriptor>,
        task: CommandTask,
        limit: usize,
    ) -> Result<OutcomeStream, InputError> {
        if limit == 0 {
            return Err(InputError::InvalidConcurrency);
        }
        if devices.is_empty() {
            return Err(InputError::NoTargets);
        }
        task.validate()?;

        let expected = devices.len();
        let (tx, rx) = mpsc::channel(expected);
        let permits = Arc::new(Semaphore::new(limit));
        let task = Arc::new(task);

        info!(
            "[DISPATCH] {} device(s), limit {}: {}",
            expected,
            limit,
            summary(&task)
        );

        for device in devices {
            let executor = self.executor.clone();
            let permits = permits.clone();
            let task = task.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(permit) => {
                        let outcome = run_isolated(&executor, &device, &task).await;
                        drop(permit);
                        outcome
                    }
                    Err(_) => ExecutionOutcome::failed(
                        device.reference(),
                        &SessionError::Unexpected("worker pool closed".into()),
                        0,
                    ),
                };

                if tx.send(outcome).await.is_err() {
                    debug!("[DISPATCH] Outcome for {} discarded, receiver gone", device.name);
                }
            });
        }

        Ok(OutcomeStream { rx, expected })
    }

    /// Dispatch and wait for every outcome
    pub async fn dispatch_collect(
        &self,
        devices: Vec<DeviceDescriptor>,
        task: CommandTask,
        limit: usize,
    ) -> Result<Vec<ExecutionOutcome>, InputError> {
        let stream = self.dispatch(devices, task, limit)?;
        Ok(stream.collect::<Vec<_>>().await)
    }
}

/// Run one device's task, turning a panic into a failed outcome
async fn run_isolated(
    executor: &TaskExecutor,
    device: &DeviceDescriptor,
    task: &CommandTask,
) -> ExecutionOutcome {
    let started = Instant::now();
    match AssertUnwindSafe(executor.execute(device, task))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(&*panic);
            error!("[DISPATCH] Worker for {} panicked: {}", device.name, message);
            ExecutionOutcome::failed(
                device.reference(),
                &SessionError::Unexpected(format!("worker panicked: {}", message)),
                started.elapsed().as_millis() as u64,
            )
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn summary(task: &CommandTask) -> String {
    let command = task.history_command();
    match command.lines().count() {
        0 | 1 => command,
        n => format!("{} config lines", n),
    }
}

/// Outcomes of one dispatch, in completion order
pub struct OutcomeStream {
    rx: mpsc::Receiver<ExecutionOutcome>,
    expected: usize,
}

impl OutcomeStream {
    /// Number of outcomes the stream will yield
    pub fn expected(&self) -> usize {
        self.expected
    }
}

impl Stream for OutcomeStream {
    type Item = ExecutionOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{descriptor, MockFactory, Script};
    use cmdfleet_shared::{ErrorKind, OutputFormat, Status};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn fleet(count: u64) -> Vec<DeviceDescriptor> {
        (1..=count)
            .map(|i| descriptor(i, &format!("sw{}", i)))
            .collect()
    }

    fn by_device(outcomes: &[ExecutionOutcome]) -> BTreeMap<String, (Status, String)> {
        outcomes
            .iter()
            .map(|o| {
                (
                    o.device().name.clone(),
                    (o.status(), o.output().to_string()),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let factory = Arc::new(MockFactory::new().with(
            "sw2",
            Script {
                open_error: Some(SessionError::Unreachable {
                    address: "127.0.0.1:20002".into(),
                    reason: "connection refused".into(),
                }),
                ..Default::default()
            },
        ));
        let dispatcher = Dispatcher::new(factory);

        let outcomes = dispatcher
            .dispatch_collect(fleet(4), CommandTask::command("show version"), 10)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        for outcome in &outcomes {
            if outcome.device().name == "sw2" {
                assert_eq!(outcome.status(), Status::Failed);
                assert_eq!(outcome.error_kind(), Some(ErrorKind::Unreachable));
            } else {
                assert_eq!(outcome.status(), Status::Success);
            }
        }
    }

    #[tokio::test]
    async fn test_limit_bounds_open_sessions() {
        let slow = Script {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let mut factory = MockFactory::new();
        for i in 1..=8 {
            factory = factory.with(&format!("sw{}", i), slow.clone());
        }
        let factory = Arc::new(factory);
        let dispatcher = Dispatcher::new(factory.clone());

        let outcomes = dispatcher
            .dispatch_collect(fleet(8), CommandTask::command("show clock"), 3)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 8);
        assert!(factory.peak() <= 3, "peak was {}", factory.peak());
        assert_eq!(factory.closed(), 8);
        assert_eq!(factory.still_open(), 0);
    }

    #[tokio::test]
    async fn test_sequential_and_parallel_agree() {
        let factory = || {
            Arc::new(MockFactory::new().with(
                "sw3",
                Script {
                    command_error: Some(SessionError::Timeout {
                        stage: "waiting for output of 'show version'".into(),
                        after_ms: 20,
                    }),
                    ..Default::default()
                },
            ))
        };

        let sequential = Dispatcher::new(factory())
            .dispatch_collect(fleet(5), CommandTask::command("show version"), 1)
            .await
            .unwrap();
        let parallel = Dispatcher::new(factory())
            .dispatch_collect(fleet(5), CommandTask::command("show version"), 10)
            .await
            .unwrap();

        assert_eq!(by_device(&sequential), by_device(&parallel));
    }

    #[tokio::test]
    async fn test_config_batch_concatenates_in_order() {
        let factory = Arc::new(MockFactory::new());
        let dispatcher = Dispatcher::new(factory.clone());

        let task = CommandTask::config(["interface Loopback0", "description uplink"]);
        let outcomes = dispatcher
            .dispatch_collect(fleet(1), task, 10)
            .await
            .unwrap();

        assert_eq!(
            outcomes[0].output(),
            "applied interface Loopback0\napplied description uplink\n[OK]"
        );
        assert_eq!(
            factory.calls_for("sw1"),
            vec![
                "enable",
                "config:interface Loopback0;description uplink",
                "save",
                "close"
            ]
        );
    }

    #[tokio::test]
    async fn test_save_disabled_skips_save() {
        let factory = Arc::new(MockFactory::new());
        let dispatcher = Dispatcher::new(factory.clone());

        let task = CommandTask::config(["hostname r1"]).with_save(false);
        dispatcher
            .dispatch_collect(fleet(1), task, 10)
            .await
            .unwrap();

        assert!(!factory.calls_for("sw1").contains(&"save".to_string()));
    }

    #[tokio::test]
    async fn test_panicking_worker_fails_only_its_device() {
        let factory = Arc::new(MockFactory::new().with(
            "sw2",
            Script {
                panic: true,
                ..Default::default()
            },
        ));
        let dispatcher = Dispatcher::new(factory.clone());

        let outcomes = dispatcher
            .dispatch_collect(fleet(3), CommandTask::command("show version"), 2)
            .await
            .unwrap();

        let results = by_device(&outcomes);
        assert_eq!(results.len(), 3);
        assert_eq!(results["sw1"].0, Status::Success);
        assert_eq!(results["sw3"].0, Status::Success);

        let failed = outcomes.iter().find(|o| o.device().name == "sw2").unwrap();
        assert_eq!(failed.error_kind(), Some(ErrorKind::Unexpected));
        assert!(failed.output().contains("scripted panic on sw2"));
        assert_eq!(factory.still_open(), 0);
    }

    #[tokio::test]
    async fn test_json_output_is_pretty_printed() {
        let factory = Arc::new(MockFactory::new().with(
            "sw1",
            Script {
                output: Some(r#"{"hostname":"sw1"}"#.into()),
                ..Default::default()
            },
        ));
        let dispatcher = Dispatcher::new(factory);

        let task = CommandTask::command("show version").with_format(OutputFormat::Json);
        let outcomes = dispatcher
            .dispatch_collect(fleet(2), task, 10)
            .await
            .unwrap();

        let results = by_device(&outcomes);
        assert_eq!(results["sw1"].1, "{\n  \"hostname\": \"sw1\"\n}");
        // Not JSON, returned as is
        assert_eq!(results["sw2"].1, "sw2 ran 'show version'");
    }

    #[tokio::test]
    async fn test_stream_yields_expected_count() {
        let dispatcher = Dispatcher::new(Arc::new(MockFactory::new()));
        let mut stream = dispatcher
            .dispatch(fleet(3), CommandTask::command("show clock"), 10)
            .unwrap();
        assert_eq!(stream.expected(), 3);

        let mut seen = 0;
        while let Some(outcome) = stream.next().await {
            assert!(outcome.is_success());
            seen += 1;
        }
        assert_eq!(seen, 3);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_before_work() {
        let factory = Arc::new(MockFactory::new());
        let dispatcher = Dispatcher::new(factory.clone());

        let err = dispatcher
            .dispatch(fleet(2), CommandTask::command("show clock"), 0)
            .err();
        assert_eq!(err, Some(InputError::InvalidConcurrency));

        let err = dispatcher
            .dispatch(Vec::new(), CommandTask::command("show clock"), 10)
            .err();
        assert_eq!(err, Some(InputError::NoTargets));

        let err = dispatcher
            .dispatch(fleet(2), CommandTask::command("  "), 10)
            .err();
        assert_eq!(err, Some(InputError::MissingCommand));

        assert_eq!(factory.opened(), 0);
    }
}
