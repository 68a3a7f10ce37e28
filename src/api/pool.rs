use poem_openapi::{param::Path, payload::Json, ApiResponse, OpenApi};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::to_json;
use crate::device::{Credentials, EndpointKey};
use crate::error::AppError;
use crate::pool::PoolAdmin;

pub struct PoolApi {
    pool: Arc<dyn PoolAdmin>,
    credentials: Credentials,
}

impl PoolApi {
    /// `credentials` are used for on-demand device checks
    pub fn new(pool: Arc<dyn PoolAdmin>, credentials: Credentials) -> Self {
        Self { pool, credentials }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct CleanupResponse {
    pub status: String,
    pub expired_connections: u64,
    pub unhealthy_connections: u64,
    pub orphaned_connections: u64,
    pub total_cleaned: u64,
    pub timestamp: String,
}

#[derive(ApiResponse)]
pub enum CleanupConnectionsResponse {
    #[oai(status = 200)]
    Ok(Json<CleanupResponse>),
}

#[derive(Debug, ApiResponse)]
pub enum CheckDeviceResponse {
    /// The device answered
    #[oai(status = 204)]
    Ok,
}

#[OpenApi]
impl PoolApi {
    /// Check one device now
    ///
    /// Runs a liveness probe through the retry executor. Answers 503 while the
    /// device's circuit breaker is open.
    #[oai(path = "/connection-health/:host/:port/check", method = "post")]
    async fn check_device(
        &self,
        host: Path<String>,
        port: Path<u16>,
    ) -> Result<CheckDeviceResponse, poem::Error> {
        let key = EndpointKey::new(host.0, port.0);
        self.pool
            .check(&key, &self.credentials)
            .await
            .map_err(AppError::from)?;
        Ok(CheckDeviceResponse::Ok)
    }

    /// Run a cleanup sweep now
    ///
    /// Disconnects idle-expired, unresponsive and abandoned sessions.
    #[oai(path = "/cleanup-connections", method = "post")]
    async fn cleanup_connections(&self) -> CleanupConnectionsResponse {
        info!("Manual connection cleanup requested");
        let stats = self.pool.cleanup_stale().await;
        CleanupConnectionsResponse::Ok(Json(CleanupResponse {
            status: "success".to_string(),
            expired_connections: stats.expired_connections as u64,
            unhealthy_connections: stats.unhealthy_connections as u64,
            orphaned_connections: stats.orphaned_connections as u64,
            total_cleaned: stats.total_cleaned as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }))
    }

    /// Effective pool configuration and the endpoints in use
    #[oai(path = "/pool-config", method = "get")]
    async fn pool_config(&self) -> Result<Json<Value>, poem::Error> {
        to_json(&self.pool.config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::device::TcpConnector;
    use crate::pool::ConnectionPool;
    use poem::http::StatusCode;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn api(pool: Arc<ConnectionPool<TcpConnector>>) -> PoolApi {
        PoolApi::new(pool, Credentials::new("admin", "secret"))
    }

    fn pool() -> Arc<ConnectionPool<TcpConnector>> {
        let config = PoolConfig {
            max_connections: 4,
            ..PoolConfig::default()
        };
        Arc::new(ConnectionPool::new(
            TcpConnector::new(Duration::from_secs(1)),
            config,
        ))
    }

    #[tokio::test]
    async fn test_cleanup_on_empty_pool() {
        let api = api(pool());
        let CleanupConnectionsResponse::Ok(Json(resp)) = api.cleanup_connections().await;
        assert_eq!(resp.status, "success");
        assert_eq!(resp.total_cleaned, 0);
    }

    #[tokio::test]
    async fn test_pool_config_lists_endpoints() {
        let pool = pool();
        pool.endpoint(&EndpointKey::new("10.0.0.2", 8728));
        pool.endpoint(&EndpointKey::new("10.0.0.1", 8728));

        let api = api(pool);
        let Json(config) = api.pool_config().await.unwrap();
        assert_eq!(config["max_connections"], 4);
        assert_eq!(config["timeout_secs"], 30);
        assert_eq!(config["circuit_breaker"]["failure_threshold"], 5);
        assert_eq!(
            config["active_servers"],
            serde_json::json!(["10.0.0.1:8728", "10.0.0.2:8728"])
        );
    }

    #[tokio::test]
    async fn test_check_live_device() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _keep = socket;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });

        let pool = pool();
        let api = api(Arc::clone(&pool));
        let resp = api
            .check_device(Path("127.0.0.1".to_string()), Path(port))
            .await
            .unwrap();
        assert!(matches!(resp, CheckDeviceResponse::Ok));

        let report = pool.report(&EndpointKey::new("127.0.0.1", port)).unwrap();
        assert_eq!(report.pool_statistics.idle_connections, 1);
    }

    #[tokio::test]
    async fn test_check_with_open_breaker_is_unavailable() {
        let pool = pool();
        let key = EndpointKey::new("10.0.0.1", 8728);
        pool.endpoint(&key).breaker.force_open();

        let err = api(pool)
            .check_device(Path("10.0.0.1".to_string()), Path(8728))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
