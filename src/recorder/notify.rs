//! User-facing notifications

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Success,
    Error,
    Warning,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyLevel::Success => write!(f, "success"),
            NotifyLevel::Error => write!(f, "error"),
            NotifyLevel::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
}

/// Receives success/failure messages meant for the operator
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, message: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) -> Result<(), NotifyError> {
        match level {
            NotifyLevel::Success => debug!("[RECORDER] {}", message),
            NotifyLevel::Error | NotifyLevel::Warning => warn!("[RECORDER] {}", message),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotifyLevel,
    pub message: String,
}

/// Keeps notifications until the caller takes them
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything collected so far
    pub fn take(&self) -> Vec<Notification> {
        let mut messages = self
            .messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *messages)
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) -> Result<(), NotifyError> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| NotifyError::Unavailable("notification buffer poisoned".into()))?;
        messages.push(Notification {
            level,
            message: message.to_string(),
        });
        Ok(())
    }
}
