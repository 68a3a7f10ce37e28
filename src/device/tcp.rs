use async_trait::async_trait;
use std::future::poll_fn;
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{Credentials, DeviceConnector, DeviceError, DeviceSession, EndpointKey};

/// Transport-level connector: opens a TCP connection to the management port.
///
/// It does not speak any device protocol and ignores credentials; it is what
/// the monitoring binary uses to track reachability of configured devices.
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

pub struct TcpSession {
    stream: TcpStream,
}

impl TcpSession {
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

#[async_trait]
impl DeviceSession for TcpSession {
    async fn probe(&mut self) -> Result<(), DeviceError> {
        // Peek without waiting: no pending data means the peer is still there
        let mut buf = [0u8; 1];
        let peeked = poll_fn(|cx| {
            let mut read_buf = ReadBuf::new(&mut buf);
            match self.stream.poll_peek(cx, &mut read_buf) {
                Poll::Pending => Poll::Ready(None),
                Poll::Ready(result) => Poll::Ready(Some(result)),
            }
        })
        .await;

        match peeked {
            None => Ok(()),
            Some(Ok(0)) => Err(DeviceError::ProbeFailed("peer closed the connection".to_string())),
            Some(Ok(_)) => Ok(()),
            Some(Err(e)) => Err(DeviceError::ProbeFailed(e.to_string())),
        }
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.stream.shutdown().await.map_err(DeviceError::from_io)
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    type Session = TcpSession;

    async fn connect(
        &self,
        endpoint: &EndpointKey,
        _credentials: &Credentials,
    ) -> Result<Self::Session, DeviceError> {
        let addr = (endpoint.host.as_str(), endpoint.port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                DeviceError::Timeout(format!(
                    "connect to {} exceeded {:?}",
                    endpoint, self.connect_timeout
                ))
            })?
            .map_err(DeviceError::from_io)?;
        stream.set_nodelay(true).map_err(DeviceError::from_io)?;
        debug!("TCP session established to {}", endpoint);
        Ok(TcpSession { stream })
    }
}
