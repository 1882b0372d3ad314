//! Server configuration.

use std::time::Duration;

use plaza_protocol::{DecodeLimits, TAG_LEN_CEILING};
use plaza_registry::RegistryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Full configuration for a Plaza server.
///
/// Durations are written in milliseconds when serialized, so a config
/// file reads `"tick_interval_ms": 200` rather than a seconds/nanos pair.
/// Missing fields fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// How often the reactor wakes up even when no socket is ready.
    /// Stop requests and handshake timeouts are noticed on these ticks
    /// at the latest. Default: 200 ms.
    #[serde(rename = "tick_interval_ms", with = "duration_ms")]
    pub tick_interval: Duration,

    /// Open connections beyond this are closed right after accept.
    /// Default: 64.
    pub max_connections: usize,

    /// How long a client may stay connected without completing a
    /// registration. `None` keeps idle connections open indefinitely.
    /// Default: `None`.
    #[serde(rename = "handshake_timeout_ms", with = "optional_duration_ms")]
    pub handshake_timeout: Option<Duration>,

    /// How long to wait for the rest of a registration once its first
    /// byte has arrived. `None` waits forever, which lets one stalled
    /// client hold up every other connection. Default: 5 s.
    #[serde(rename = "read_timeout_ms", with = "optional_duration_ms")]
    pub read_timeout: Option<Duration>,

    /// Header bounds enforced while decoding.
    pub limits: DecodeLimits,

    /// Registry capacity, tag and avatar bounds, spawn area.
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(200),
            max_connections: 64,
            handshake_timeout: None,
            read_timeout: Some(Duration::from_secs(5)),
            limits: DecodeLimits::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Shortest accepted tick interval.
    pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

    /// Longest accepted tick interval.
    pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(10);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by the server builder. Rules:
    /// - `tick_interval` kept within
    ///   [`MIN_TICK_INTERVAL`](Self::MIN_TICK_INTERVAL)`..=`
    ///   [`MAX_TICK_INTERVAL`](Self::MAX_TICK_INTERVAL).
    /// - `max_connections`, `registry.capacity` and both avatar
    ///   dimension limits raised to at least 1.
    /// - `limits.max_tag_len` capped to [`TAG_LEN_CEILING`].
    pub fn validated(mut self) -> Self {
        let tick = self
            .tick_interval
            .clamp(Self::MIN_TICK_INTERVAL, Self::MAX_TICK_INTERVAL);
        if tick != self.tick_interval {
            warn!(
                requested = ?self.tick_interval,
                used = ?tick,
                "tick_interval out of range, clamping"
            );
            self.tick_interval = tick;
        }
        if self.max_connections == 0 {
            warn!("max_connections is 0, raising to 1");
            self.max_connections = 1;
        }
        if self.registry.capacity == 0 {
            warn!("registry capacity is 0, raising to 1");
            self.registry.capacity = 1;
        }
        if self.limits.max_tag_len > TAG_LEN_CEILING {
            warn!(
                requested = self.limits.max_tag_len,
                max = TAG_LEN_CEILING,
                "max_tag_len exceeds ceiling, clamping"
            );
            self.limits.max_tag_len = TAG_LEN_CEILING;
        }
        if self.limits.max_avatar_dim == 0 {
            warn!("decode max_avatar_dim is 0, raising to 1");
            self.limits.max_avatar_dim = 1;
        }
        if self.registry.max_avatar_dim == 0 {
            warn!("registry max_avatar_dim is 0, raising to 1");
            self.registry.max_avatar_dim = 1;
        }
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer)
            .map(|ms| ms.map(Duration::from_millis))
    }
}
