//! CLI Mode State Machine
//!
//! Tracks the user / privileged / configuration mode of a device CLI.
//! The simulator drives it from the commands it receives; the engine's
//! session uses it to know which mode a command should leave it in.

use serde::{Deserialize, Serialize};

/// Mode of a CLI session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliMode {
    /// Unprivileged exec (`host>`)
    User,
    /// Privileged exec (`host#`)
    Privileged,
    /// Configuration mode (`host(config)#`)
    Config,
}

/// Events that move a session between modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliEvent {
    /// `enable` accepted
    Enable,
    /// `disable`
    Disable,
    /// Configuration mode entered
    ConfigureTerminal,
    /// `end` / leave configuration mode
    End,
    /// `exit`: leaves config mode, or the session from exec modes
    Exit,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid; the new mode
    Success(CliMode),
    /// Event is not valid in the current mode
    Invalid { from: CliMode, event: CliEvent },
    /// The session ends
    Closed,
}

/// Mode tracker for one CLI session
#[derive(Debug)]
pub struct CliStateMachine {
    current: CliMode,
}

impl Default for CliStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CliStateMachine {
    /// Sessions start in user mode
    pub fn new() -> Self {
        Self {
            current: CliMode::User,
        }
    }

    /// Start in an explicit mode (devices that log users straight into `#`)
    pub fn starting_in(mode: CliMode) -> Self {
        Self { current: mode }
    }

    pub fn mode(&self) -> CliMode {
        self.current
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self.current, CliMode::Privileged | CliMode::Config)
    }

    /// Force the tracked mode to what the device reports
    pub fn observe(&mut self, mode: CliMode) {
        self.current = mode;
    }

    /// Mode the event would lead to, without applying it
    pub fn peek(&self, event: CliEvent) -> TransitionResult {
        use CliEvent::*;
        use CliMode::*;

        match (self.current, event) {
            (User, Enable) => TransitionResult::Success(Privileged),
            (Privileged, Enable) => TransitionResult::Success(Privileged),
            (Privileged, Disable) => TransitionResult::Success(User),
            (Privileged, ConfigureTerminal) => TransitionResult::Success(Config),
            (Config, End) | (Config, Exit) => TransitionResult::Success(Privileged),
            (User, Exit) | (Privileged, Exit) => TransitionResult::Closed,
            (from, event) => TransitionResult::Invalid { from, event },
        }
    }

    /// Apply an event
    pub fn process_event(&mut self, event: CliEvent) -> TransitionResult {
        let result = self.peek(event);
        if let TransitionResult::Success(mode) = result {
            self.current = mode;
        }
        result
    }
}
