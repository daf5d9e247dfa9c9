//! Device management sessions
//!
//! A [`Session`] is one authenticated CLI connection to one device. It is
//! opened by a [`SessionFactory`], used by exactly one worker, and closed
//! when that worker is done with it.

pub mod cli;
pub mod factory;

pub use cli::CliSession;
pub use factory::CliSessionFactory;

use async_trait::async_trait;
use cmdfleet_shared::{DeviceDescriptor, OutputFormat, SessionError};

/// Operations a worker can perform on an open device session
#[async_trait]
pub trait Session: Send {
    /// Send one exec command and return its output
    async fn send_command(
        &mut self,
        command: &str,
        format: OutputFormat,
    ) -> Result<String, SessionError>;

    /// Raise the session to privileged mode (no-op when already there)
    async fn enter_privileged_mode(&mut self) -> Result<(), SessionError>;

    /// Enter configuration mode, apply `lines` in order and leave it again.
    /// Returns the concatenated device output.
    async fn send_config_lines(&mut self, lines: &[String]) -> Result<String, SessionError>;

    /// Persist the running configuration
    async fn save_config(&mut self) -> Result<String, SessionError>;

    /// Release the connection
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens sessions to devices
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connect and authenticate
    async fn open_session(&self, device: &DeviceDescriptor)
        -> Result<Box<dyn Session>, SessionError>;

    /// Get factory name for logging
    fn name(&self) -> &'static str;
}
