//! Actor system and its metrics.

pub mod actor_system;
pub mod metrics;

pub use actor_system::ActorSystem;
pub use metrics::{MetricsSnapshot, SystemMetrics};
