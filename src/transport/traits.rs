//! Byte transports underneath device CLI sessions

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Bidirectional byte stream carrying one CLI dialogue
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Half-close the write side so the device sees end of input
    async fn shutdown(&mut self) -> io::Result<()>;
}

/// Opens transport streams to one device endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Stream: TransportStream;

    /// Connect, bounded by the connector's own timeout
    async fn connect(&self) -> io::Result<Self::Stream>;

    /// Endpoint as shown in logs and diagnostics, e.g. `tcp://10.0.0.1:22`
    fn endpoint(&self) -> String;

    /// Transport family, for logging
    fn name(&self) -> &'static str;
}
