//! Simulated network devices
//!
//! Every simulated device listens on its own TCP port and speaks the
//! prompt-delimited CLI dialogue the engine's sessions expect: a
//! username/password login, `enable`, configuration mode, save commands and
//! a handful of show commands. Used by the engine's end-to-end tests and by
//! the `cmdfleet-sim` binary for manual runs.

mod responder;

use cmdfleet_shared::Platform;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a simulated device reacts to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Normal,
    /// Accepts the connection and never says anything
    Unresponsive,
}

/// Identity and credentials of a simulated device
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub hostname: String,
    pub username: String,
    pub password: String,
    /// Enable secret; `None` lets `enable` through without a challenge
    pub secret: Option<String>,
    pub platform: Platform,
    pub behavior: Behavior,
}

impl SimDevice {
    pub fn new(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            password: password.into(),
            secret: None,
            platform: Platform::CiscoIos,
            behavior: Behavior::Normal,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// Configuration held by a simulated device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    /// Lines applied in configuration mode, in order
    pub running: Vec<String>,
    /// Snapshot of `running` taken by the last save
    pub startup: Vec<String>,
    /// Number of save commands executed
    pub saves: usize,
}

/// Handle to a listening simulated device. The listener stops when dropped.
pub struct RunningDevice {
    hostname: String,
    local_addr: SocketAddr,
    state: Arc<Mutex<DeviceState>>,
    sessions: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl RunningDevice {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current configuration state
    pub async fn state(&self) -> DeviceState {
        self.state.lock().await.clone()
    }

    /// Connections accepted so far
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Drop for RunningDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind a simulated device on `addr` (use port 0 for an ephemeral port)
pub async fn spawn(device: SimDevice, addr: &str) -> io::Result<RunningDevice> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        "[SIM] {} ({}) listening on {}",
        device.hostname, device.platform, local_addr
    );

    let hostname = device.hostname.clone();
    let device = Arc::new(device);
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let sessions = Arc::new(AtomicUsize::new(0));

    let task = tokio::spawn(accept_loop(
        listener,
        device,
        state.clone(),
        sessions.clone(),
    ));

    Ok(RunningDevice {
        hostname,
        local_addr,
        state,
        sessions,
        task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    device: Arc<SimDevice>,
    state: Arc<Mutex<DeviceState>>,
    sessions: Arc<AtomicUsize>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("[SIM] {} accept failed: {}", device.hostname, e);
                continue;
            }
        };

        sessions.fetch_add(1, Ordering::SeqCst);
        debug!("[SIM] {} connection from {}", device.hostname, peer);

        let device = device.clone();
        let state = state.clone();
        tokio::spawn(async move {
            match responder::serve(socket, &device, &state).await {
                Ok(()) => debug!("[SIM] {} session with {} closed", device.hostname, peer),
                Err(e) => debug!("[SIM] {} session with {} failed: {}", device.hostname, peer, e),
            }
        });
    }
}
