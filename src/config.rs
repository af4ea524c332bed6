//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for [`crate::cluster_client::ClusterLights`].
///
/// Every timing value is independent.  In JSON the durations are written in
/// milliseconds; missing fields take their defaults:
///
/// ```json
/// { "address": "AA:BB:CC:DD:EE:FF", "reconnect_delay_ms": 2000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterLightsConfig {
    /// Bluetooth address of the fixture (`AA:BB:CC:DD:EE:FF`), or the
    /// platform peripheral id on macOS.
    pub address: String,
    /// Commands that may wait in the queue before `enqueue` starts blocking.
    /// Default: `20`.
    pub queue_capacity: usize,
    /// How long a command waits for room in a full queue before it is
    /// rejected with [`Error::QueueFull`].  Default: 1 s.
    #[serde(rename = "enqueue_timeout_ms", with = "millis")]
    pub enqueue_timeout: Duration,
    /// How long `get_state()` / `get_information()` wait for the reply.
    /// Default: 1 s.
    #[serde(rename = "reply_timeout_ms", with = "millis")]
    pub reply_timeout: Duration,
    /// How long each connection attempt may spend finding the peripheral.
    /// Default: 20 s.
    #[serde(rename = "resolve_timeout_ms", with = "millis")]
    pub resolve_timeout: Duration,
    /// Pause between a comms loss and the next connection attempt.
    /// Default: 5 s.
    #[serde(rename = "reconnect_delay_ms", with = "millis")]
    pub reconnect_delay: Duration,
}

impl Default for ClusterLightsConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            queue_capacity: 20,
            enqueue_timeout: Duration::from_secs(1),
            reply_timeout: Duration::from_secs(1),
            resolve_timeout: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ClusterLightsConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document.  Does not validate; see [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_enqueue_timeout(mut self, timeout: Duration) -> Self {
        self.enqueue_timeout = timeout;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address is empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
