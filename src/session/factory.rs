//! Opens CLI sessions over TCP

use async_trait::async_trait;
use cmdfleet_shared::{DeviceDescriptor, SessionError};
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CliSession, Session, SessionFactory};
use crate::transport::{TcpConnector, TransportConnector};

/// Factory for [`CliSession`]s over plain TCP
#[derive(Debug, Clone)]
pub struct CliSessionFactory {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl CliSessionFactory {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for CliSessionFactory {
    async fn open_session(
        &self,
        device: &DeviceDescriptor,
    ) -> Result<Box<dyn Session>, SessionError> {
        let connector = TcpConnector::new(device.socket_addr(), self.connect_timeout);
        debug!(
            "[SESSION] Connecting to {} at {}",
            device.name,
            connector.endpoint()
        );

        let stream = connector
            .connect()
            .await
            .map_err(|e| connect_error(&connector, self.connect_timeout, e))?;

        match CliSession::login(stream, device, self.read_timeout).await {
            Ok(session) => Ok(Box::new(session)),
            Err(e) => {
                warn!("[SESSION] Login to {} failed: {}", device.name, e);
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "cli-tcp"
    }
}

fn connect_error(connector: &TcpConnector, after: Duration, e: io::Error) -> SessionError {
    warn!(
        "[SESSION] {} connect to {} failed: {}",
        connector.name(),
        connector.endpoint(),
        e
    );
    match e.kind() {
        io::ErrorKind::TimedOut => SessionError::Timeout {
            stage: format!("connecting to {}", connector.address()),
            after_ms: after.as_millis() as u64,
        },
        _ => SessionError::Unreachable {
            address: connector.address().to_string(),
            reason: e.to_string(),
        },
    }
}
