//! Runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum live actor instances before `create_actor` refuses.
    pub max_actors: usize,
    /// Per-topic ring buffer size on the event bus.
    pub event_bus_buffer: usize,
    /// Upper bound on a single event publish.
    #[serde(with = "publish_timeout_millis")]
    pub event_publish_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_actors: 1024,
            event_bus_buffer: 1024,
            event_publish_timeout: Duration::from_millis(250),
        }
    }
}

mod publish_timeout_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
