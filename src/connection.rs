//! Plain TCP transport to a single broker.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::info;

/// Failure to establish a transport to a broker.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Timed out connecting to \"{address}\" after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("Connection refused by \"{address}\"")]
    Refused { address: String },

    #[error("Cannot resolve \"{address}\": {source}")]
    Resolve {
        address: String,
        source: std::io::Error,
    },

    #[error("Cannot connect to \"{address}\": {source}")]
    IO {
        address: String,
        source: std::io::Error,
    },
}

/// The transport back-end.
///
/// TLS and proxy transports are deliberately absent; transport security is an
/// external concern.
#[derive(Debug, Clone, Copy)]
pub struct Transport;

impl Transport {
    /// Open a TCP connection to `address` (`host:port`), bounded by
    /// `timeout`.
    pub async fn connect(address: &str, timeout: Duration) -> Result<TcpStream, ConnectError> {
        info!(address, "establishing new connection");

        let connect = TcpStream::connect(address);
        let stream = match tokio::time::timeout(timeout, connect).await {
            Err(_) => {
                return Err(ConnectError::Timeout {
                    address: address.to_owned(),
                    timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(match e.kind() {
                    std::io::ErrorKind::ConnectionRefused => ConnectError::Refused {
                        address: address.to_owned(),
                    },
                    // `TcpStream::connect` reports resolver failures as
                    // InvalidInput or NotFound depending on the platform
                    std::io::ErrorKind::InvalidInput | std::io::ErrorKind::NotFound => {
                        ConnectError::Resolve {
                            address: address.to_owned(),
                            source: e,
                        }
                    }
                    _ => ConnectError::IO {
                        address: address.to_owned(),
                        source: e,
                    },
                });
            }
            Ok(Ok(stream)) => stream,
        };

        // favour latency; the producer batches anyway
        stream.set_nodelay(true).map_err(|e| ConnectError::IO {
            address: address.to_owned(),
            source: e,
        })?;

        Ok(stream)
    }
}
