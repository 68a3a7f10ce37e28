use poem_openapi::{param::Path, payload::Json, ApiResponse, OpenApi};
use serde_json::Value;
use std::sync::Arc;

use super::to_json;
use crate::device::EndpointKey;
use crate::error::AppError;
use crate::pool::PoolAdmin;
use crate::resilience::HealthStatus;

pub struct HealthApi {
    pool: Arc<dyn PoolAdmin>,
}

impl HealthApi {
    pub fn new(pool: Arc<dyn PoolAdmin>) -> Self {
        Self { pool }
    }
}

/// Service liveness with a summary of the pool
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct ServiceHealth {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub total_servers: u64,
    pub healthy_servers: u64,
    pub degraded_servers: u64,
    pub critical_servers: u64,
    pub active_connections: u64,
}

#[derive(ApiResponse)]
pub enum HealthResponse {
    #[oai(status = 200)]
    Ok(Json<ServiceHealth>),

    #[oai(status = 503)]
    ServiceUnavailable(Json<ServiceHealth>),
}

#[OpenApi]
impl HealthApi {
    /// Service health
    ///
    /// Answers 503 while any device endpoint has its circuit breaker open.
    #[oai(path = "/health", method = "get")]
    async fn health(&self) -> HealthResponse {
        let report = self.pool.report_all();
        let critical = report
            .servers
            .values()
            .any(|r| r.status == HealthStatus::Critical);

        let summary = &report.summary;
        let health = ServiceHealth {
            status: if critical { "degraded" } else { "healthy" }.to_string(),
            service: "netpool".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            total_servers: summary.total_servers as u64,
            healthy_servers: summary.healthy_servers as u64,
            degraded_servers: summary.degraded_servers as u64,
            critical_servers: summary.critical_servers as u64,
            active_connections: summary.total_active_connections,
        };

        if critical {
            HealthResponse::ServiceUnavailable(Json(health))
        } else {
            HealthResponse::Ok(Json(health))
        }
    }

    /// Health report for every device endpoint the pool has seen
    #[oai(path = "/connection-health", method = "get")]
    async fn connection_health(&self) -> Result<Json<Value>, poem::Error> {
        to_json(&self.pool.report_all())
    }

    /// Health report for one device endpoint
    #[oai(path = "/connection-health/:host/:port", method = "get")]
    async fn endpoint_health(
        &self,
        host: Path<String>,
        port: Path<u16>,
    ) -> Result<Json<Value>, poem::Error> {
        let key = EndpointKey::new(host.0, port.0);
        match self.pool.report(&key) {
            Some(report) => to_json(&report),
            None => Err(AppError::NotFound(format!("no connection data for {}", key)).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::device::{Credentials, TcpConnector};
    use crate::pool::ConnectionPool;
    use poem::http::StatusCode;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn pool() -> Arc<ConnectionPool<TcpConnector>> {
        Arc::new(ConnectionPool::new(
            TcpConnector::new(Duration::from_secs(1)),
            PoolConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_health_with_no_endpoints() {
        let api = HealthApi::new(pool());
        match api.health().await {
            HealthResponse::Ok(Json(health)) => {
                assert_eq!(health.status, "healthy");
                assert_eq!(health.service, "netpool");
                assert_eq!(health.total_servers, 0);
            }
            _ => panic!("Expected Ok response"),
        }
    }

    #[tokio::test]
    async fn test_health_reports_open_breaker() {
        let pool = pool();
        let ep = pool.endpoint(&EndpointKey::new("10.0.0.1", 8728));
        ep.breaker.force_open();

        let api = HealthApi::new(pool);
        match api.health().await {
            HealthResponse::ServiceUnavailable(Json(health)) => {
                assert_eq!(health.status, "degraded");
                assert_eq!(health.critical_servers, 1);
            }
            _ => panic!("Expected ServiceUnavailable response"),
        }
    }

    #[tokio::test]
    async fn test_endpoint_health_for_live_endpoint() {
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
        let key = EndpointKey::new("127.0.0.1", port);
        let session = pool
            .acquire(&key, &Credentials::new("admin", "secret"))
            .await
            .unwrap();
        pool.release(session).await;

        let api = HealthApi::new(pool);
        let Json(report) = api
            .endpoint_health(Path("127.0.0.1".to_string()), Path(port))
            .await
            .unwrap();
        assert_eq!(report["status"], "HEALTHY");
        assert_eq!(report["pool_statistics"]["idle_connections"], 1);
        assert_eq!(report["health_metrics"]["total_requests"], 1);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_not_found() {
        let api = HealthApi::new(pool());
        let err = api
            .endpoint_health(Path("10.9.9.9".to_string()), Path(8728))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
