//! Pooled, circuit-broken sessions to network devices, plus the HTTP
//! monitoring surface that reports on them.

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pool;
pub mod resilience;
