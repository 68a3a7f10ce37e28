use std::sync::Arc;
use std::time::Duration;

use poem::listener::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use netpool::api;
use netpool::config::Config;
use netpool::device::{Credentials, EndpointKey, TcpConnector};
use netpool::logging;
use netpool::pool::{ConnectionPool, PoolAdmin};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    logging::init(config.json_logs);

    info!(
        "Pool settings: max_connections={}, idle_timeout={:?}, cleanup_interval={:?}",
        config.pool.max_connections, config.pool.idle_timeout, config.cleanup_interval
    );

    let connector = TcpConnector::new(config.pool.operation_timeout);
    let pool = Arc::new(ConnectionPool::new(connector, config.pool.clone()));

    if config.devices.is_empty() {
        info!("No DEVICES configured, health data comes from on-demand checks only");
    } else {
        info!("Checking {} devices every {:?}", config.devices.len(), config.cleanup_interval);
    }

    let sweeper = {
        let pool = Arc::clone(&pool);
        let devices = config.devices.clone();
        let credentials = config.credentials.clone();
        let period = config.cleanup_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let stats = pool.cleanup_stale().await;
                if stats.total_cleaned > 0 {
                    info!("Periodic cleanup removed {} connections", stats.total_cleaned);
                }
                check_devices(&pool, &devices, &credentials).await;
            }
        })
    };

    let admin: Arc<dyn PoolAdmin> = pool.clone();
    let app = api::app(
        admin,
        config.credentials.clone(),
        &format!("http://localhost:{}", config.port),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting netpool monitor on {}", addr);

    let served = poem::Server::new(TcpListener::bind(&addr))
        .run_with_graceful_shutdown(
            app,
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
            },
            None,
        )
        .await;

    sweeper.abort();
    let closed = pool.close_all().await;
    info!("Shutdown complete, closed {} device connections", closed);

    served?;
    Ok(())
}

/// Check every device concurrently; failures are already logged by the executor
async fn check_devices(
    pool: &Arc<ConnectionPool<TcpConnector>>,
    devices: &[EndpointKey],
    credentials: &Credentials,
) {
    let mut checks = JoinSet::new();
    for device in devices {
        let pool = Arc::clone(pool);
        let device = device.clone();
        let credentials = credentials.clone();
        checks.spawn(async move {
            let outcome = pool.check(&device, &credentials).await;
            (device, outcome)
        });
    }

    while let Some(joined) = checks.join_next().await {
        match joined {
            Ok((device, Ok(()))) => debug!("Device {} is reachable", device),
            Ok((device, Err(e))) => warn!("Device {} check failed: {}", device, e),
            Err(e) => error!("Device check task failed: {}", e),
        }
    }
}
