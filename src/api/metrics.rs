use poem_openapi::{payload::Json, ApiResponse, OpenApi};
use std::sync::Arc;

use crate::pool::PoolAdmin;

pub struct MetricsApi {
    pool: Arc<dyn PoolAdmin>,
}

impl MetricsApi {
    pub fn new(pool: Arc<dyn PoolAdmin>) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, poem_openapi::Object)]
pub struct MetricsResponse {
    pub total_connections_created: u64,
    pub active_connections: u64,
    pub failed_connections: u64,
    pub retry_attempts: u64,
    pub circuit_breaker_trips: u64,
    pub circuit_breaker_rejections: u64,
    pub timestamp: String,
}

#[derive(ApiResponse)]
pub enum GetMetricsResponse {
    #[oai(status = 200)]
    Ok(Json<MetricsResponse>),
}

#[OpenApi]
impl MetricsApi {
    /// Process-wide pool counters
    #[oai(path = "/metrics", method = "get")]
    async fn get_metrics(&self) -> GetMetricsResponse {
        let snapshot = self.pool.metrics_snapshot();
        GetMetricsResponse::Ok(Json(MetricsResponse {
            total_connections_created: snapshot.total_connections_created,
            active_connections: snapshot.active_connections,
            failed_connections: snapshot.failed_connections,
            retry_attempts: snapshot.retry_attempts,
            circuit_breaker_trips: snapshot.circuit_breaker_trips,
            circuit_breaker_rejections: snapshot.circuit_breaker_rejections,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }))
    }
}
