//! Shared infrastructure for the reactive runtime workspace.
//!
//! - [`event_bus`]: topic-keyed broadcast fan-out used for observability
//!   emissions. Publishing is bounded by a timeout so producers never block
//!   on slow subscribers.
//! - [`logging`]: `tracing` subscriber initialization.

pub mod event_bus;
pub mod logging;

pub use event_bus::{EventBus, EventEnvelope, Topic};
pub use logging::init_logging;
