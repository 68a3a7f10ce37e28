pub mod circuit_breaker;
pub mod health;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::*;
pub use health::*;
pub use metrics::*;
pub use retry::*;
