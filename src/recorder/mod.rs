//! Outcome recording
//!
//! Every outcome is persisted as a history entry and relayed to the
//! notification sinks. A failing notifier never prevents persistence, and
//! a failing history sink never stops the dispatch.

pub mod history;
pub mod notify;

pub use history::{HistoryError, HistorySink, JsonlHistory, MemoryHistory};
pub use notify::{CollectingNotifier, Notifier, NotifyError, NotifyLevel, TracingNotifier};

use chrono::Utc;
use cmdfleet_shared::{
    defaults, CommandTask, ExecutionOutcome, HistoryEntry, NewHistoryEntry,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Persists outcomes and relays notifications
pub struct OutcomeRecorder {
    history: Arc<dyn HistorySink>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl OutcomeRecorder {
    pub fn new(history: Arc<dyn HistorySink>) -> Self {
        Self {
            history,
            notifiers: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Persist `outcome` of `task` and notify
    pub async fn record(
        &self,
        outcome: &ExecutionOutcome,
        task: &CommandTask,
        actor: Option<&str>,
    ) -> Result<HistoryEntry, HistoryError> {
        let output = if outcome.is_success() && task.is_config() && outcome.output().trim().is_empty()
        {
            defaults::CONFIG_APPLIED_MESSAGE
        } else {
            outcome.output()
        };

        let entry = NewHistoryEntry {
            device: outcome.device().clone(),
            command: task.history_command(),
            output: output.to_string(),
            status: outcome.status(),
            actor: actor.map(String::from),
            executed_at: Utc::now(),
        };

        let persisted = self.history.create_history_entry(entry).await;
        match &persisted {
            Ok(entry) => debug!(
                "[RECORDER] History #{} for {} ({})",
                entry.id, entry.device.name, entry.status
            ),
            Err(e) => error!(
                "[RECORDER] Failed to record outcome for {}: {}",
                outcome.device().name,
                e
            ),
        }

        self.notify(outcome);
        persisted
    }

    fn notify(&self, outcome: &ExecutionOutcome) {
        let name = &outcome.device().name;
        let (level, message) = if outcome.is_success() {
            (NotifyLevel::Success, format!("Operation successful on {}", name))
        } else {
            (
                NotifyLevel::Error,
                format!("Operation failed on {}: {}", name, outcome.output()),
            )
        };

        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(level, &message) {
                warn!("[RECORDER] Notification for {} dropped: {}", name, e);
            }
        }
    }
}
