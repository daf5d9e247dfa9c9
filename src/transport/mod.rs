//! Connections to device management endpoints
//!
//! Sessions are generic over [`TransportStream`], so the CLI dialogue runs
//! the same over TCP or an in-memory pipe.

pub mod tcp;
pub mod traits;

pub use tcp::{TcpConnector, TcpTransportStream};
pub use traits::{TransportConnector, TransportStream};
