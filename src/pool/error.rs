use thiserror::Error;

use crate::device::{DeviceError, EndpointKey};

#[derive(Error, Debug)]
pub enum PoolError {
    /// The endpoint's breaker is open and its recovery window has not elapsed.
    /// Callers should report the device as unavailable rather than retry.
    #[error("Service unavailable for {endpoint} - circuit breaker open")]
    CircuitOpen { endpoint: EndpointKey },

    #[error("Device {endpoint} failed: {source}")]
    Device {
        endpoint: EndpointKey,
        #[source]
        source: DeviceError,
    },

    #[error("All {attempts} attempts failed for {endpoint}: {source}")]
    RetriesExhausted {
        endpoint: EndpointKey,
        attempts: u32,
        #[source]
        source: DeviceError,
    },
}

impl PoolError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, PoolError::CircuitOpen { .. })
    }

    pub fn endpoint(&self) -> &EndpointKey {
        match self {
            PoolError::CircuitOpen { endpoint }
            | PoolError::Device { endpoint, .. }
            | PoolError::RetriesExhausted { endpoint, .. } => endpoint,
        }
    }

    /// The device failure behind this error, if any
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            PoolError::CircuitOpen { .. } => None,
            PoolError::Device { source, .. } | PoolError::RetriesExhausted { source, .. } => {
                Some(source)
            }
        }
    }
}
