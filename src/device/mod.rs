pub mod blocking;
pub mod error;
pub mod tcp;

pub use blocking::*;
pub use error::*;
pub use tcp::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one remote device: all pool, breaker and health state is keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    pub host: String,
    pub port: u16,
}

impl EndpointKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for EndpointKey {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DeviceError::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(DeviceError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| DeviceError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Login material handed over by collaborators together with the endpoint.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An open, authenticated session to a device.
///
/// The pool only needs two things from a session: a cheap liveness check
/// before reuse, and a way to tear it down. Everything else is up to the
/// operations callers run against it.
#[async_trait]
pub trait DeviceSession: Send + 'static {
    /// Cheap read-only command proving the session is still usable.
    async fn probe(&mut self) -> Result<(), DeviceError>;

    /// Close the session. Errors are logged by the pool and otherwise ignored.
    async fn disconnect(&mut self) -> Result<(), DeviceError>;
}

/// Opens sessions to devices. This is the seam to the vendor driver.
#[async_trait]
pub trait DeviceConnector: Send + Sync + 'static {
    type Session: DeviceSession;

    async fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<Self::Session, DeviceError>;
}
