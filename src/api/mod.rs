pub mod health;
pub mod metrics;
pub mod pool;

pub use health::*;
pub use metrics::*;
pub use pool::*;

use poem::{Endpoint, EndpointExt, Route};
use poem_openapi::{payload::Json, OpenApiService};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::device::Credentials;
use crate::error::AppError;
use crate::observability::RequestTracingMiddleware;
use crate::pool::PoolAdmin;

/// The monitoring routes, with Swagger UI at `/docs` and the OpenAPI document at `/spec`.
///
/// `credentials` are used by the on-demand device check.
pub fn app(pool: Arc<dyn PoolAdmin>, credentials: Credentials, server_url: &str) -> impl Endpoint {
    let api_service = OpenApiService::new(
        (
            HealthApi::new(Arc::clone(&pool)),
            MetricsApi::new(Arc::clone(&pool)),
            PoolApi::new(pool, credentials),
        ),
        "netpool API",
        env!("CARGO_PKG_VERSION"),
    )
    .server(server_url);

    let ui = api_service.swagger_ui();
    let spec = api_service.spec_endpoint();

    Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/spec", spec)
        .with(RequestTracingMiddleware)
}

/// Render a report type as an untyped JSON document
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Json<Value>, poem::Error> {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| AppError::Internal(anyhow::Error::from(e)).into())
}
