//! Test doubles shared by the unit tests

use async_trait::async_trait;
use cmdfleet_shared::{
    Credentials, DeviceDescriptor, DeviceId, HistoryEntry, NewHistoryEntry, OutputFormat,
    Platform, SessionError,
};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::recorder::{HistoryError, HistorySink};
use crate::session::{Session, SessionFactory};

/// Active loopback device with admin/admin credentials and a port derived from `id`
pub fn descriptor(id: u64, name: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        id: DeviceId(id),
        name: name.into(),
        address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        platform: Platform::CiscoIos,
        credentials: Credentials {
            username: "admin".into(),
            password: "admin".into(),
            secret: None,
        },
        port: 20_000 + id as u16,
        active: true,
        description: String::new(),
    }
}

/// Scripted behaviour of one mock device
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Returned by `open_session`
    pub open_error: Option<SessionError>,
    /// Returned by every command and config call
    pub command_error: Option<SessionError>,
    /// Panic inside the first command
    pub panic: bool,
    /// Time every command takes
    pub delay: Duration,
    /// Replaces the default command and config output
    pub output: Option<String>,
}

#[derive(Default)]
struct Counters {
    open: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Session factory whose sessions follow per-device scripts
#[derive(Default)]
pub struct MockFactory {
    scripts: HashMap<String, Script>,
    counters: Arc<Counters>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, device: &str, script: Script) -> Self {
        self.scripts.insert(device.to_string(), script);
        self
    }

    /// Most sessions open at the same time
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sessions neither closed nor dropped
    pub fn still_open(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Session calls made for one device, in order
    pub fn calls_for(&self, device: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == device)
            .map(|(_, call)| call.clone())
            .collect()
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open_session(
        &self,
        device: &DeviceDescriptor,
    ) -> Result<Box<dyn Session>, SessionError> {
        let script = self.scripts.get(&device.name).cloned().unwrap_or_default();
        if let Some(err) = script.open_error.clone() {
            return Err(err);
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            device: device.name.clone(),
            script,
            counters: self.counters.clone(),
            calls: self.calls.clone(),
            open: true,
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    device: String,
    script: Script,
    counters: Arc<Counters>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    open: bool,
}

impl MockSession {
    fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap()
            .push((self.device.clone(), call.into()));
    }

    async fn step(&self) -> Result<(), SessionError> {
        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }
        if self.script.panic {
            panic!("scripted panic on {}", self.device);
        }
        match &self.script.command_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Session for MockSession {
    async fn send_command(
        &mut self,
        command: &str,
        _format: OutputFormat,
    ) -> Result<String, SessionError> {
        self.record(format!("command:{}", command));
        self.step().await?;
        Ok(self
            .script
            .output
            .clone()
            .unwrap_or_else(|| format!("{} ran '{}'", self.device, command)))
    }

    async fn enter_privileged_mode(&mut self) -> Result<(), SessionError> {
        self.record("enable");
        Ok(())
    }

    async fn send_config_lines(&mut self, lines: &[String]) -> Result<String, SessionError> {
        self.record(format!("config:{}", lines.join(";")));
        self.step().await?;
        Ok(self.script.output.clone().unwrap_or_else(|| {
            lines
                .iter()
                .map(|line| format!("applied {}", line))
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }

    async fn save_config(&mut self) -> Result<String, SessionError> {
        self.record("save");
        Ok("[OK]".to_string())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.record("close");
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        self.release();
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// History sink whose writes always fail
pub struct FailingHistory;

#[async_trait]
impl HistorySink for FailingHistory {
    async fn create_history_entry(
        &self,
        _entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, HistoryError> {
        Err(HistoryError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "history store is read-only",
        )))
    }

    async fn for_device(
        &self,
        _device: DeviceId,
        _limit: usize,
    ) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(Vec::new())
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(Vec::new())
    }
}
