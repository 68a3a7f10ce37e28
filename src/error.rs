use poem::http::StatusCode;
use poem::Error as PoemError;
use thiserror::Error;

use crate::pool::PoolError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        if err.is_circuit_open() {
            AppError::ServiceUnavailable(err.to_string())
        } else {
            AppError::Internal(anyhow::Error::from(err))
        }
    }
}

impl From<AppError> for PoemError {
    fn from(err: AppError) -> Self {
        PoemError::from_string(err.to_string(), err.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::EndpointKey;

    #[test]
    fn test_circuit_open_maps_to_503() {
        let err: AppError = PoolError::CircuitOpen {
            endpoint: EndpointKey::new("10.0.0.1", 8728),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::NotFound("10.0.0.9:8728".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let poem_err: PoemError = err.into();
        assert_eq!(poem_err.status(), StatusCode::NOT_FOUND);
    }
}
