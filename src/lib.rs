//! # clusterlights
//!
//! Async Rust library and command-line tool for BLE "cluster light" LED
//! fixtures: power, brightness (0–255), and the seven combinable animation
//! patterns.
//!
//! The client keeps one persistent session to the fixture.  Commands are
//! queued and written in order by a background task that reconnects on its
//! own after every comms loss, so callers never deal with the link directly.
//!
//! ## Quick start
//!
//! ```no_run
//! use clusterlights::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> clusterlights::Result<()> {
//!     let lights = ClusterLights::new(ClusterLightsConfig::new("AA:BB:CC:DD:EE:FF"));
//!     lights.connect()?;
//!
//!     lights.on().await?;
//!     lights.apply_effect(Effect::FadeAway).await?;
//!
//!     lights.get_information().await?;
//!     println!("brightness {} effect {}", lights.get_brightness(), lights.current_effect());
//!
//!     lights.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Using as a library dependency
//!
//! ```toml
//! [dependencies]
//! # Library only, without clap / env_logger:
//! clusterlights = { version = "0.1", default-features = false }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the commonly needed types |
//! | [`cluster_client`] | [`ClusterLights`], the command and query API |
//! | [`session`] | Background worker: connect, resync, drain, reconnect |
//! | [`queue`] | Bounded FIFO of outbound packets |
//! | [`signal`] | Reply signals behind the waiting `get_*` queries |
//! | [`state`] | Atomic mirror of the fixture's power, brightness and pattern |
//! | [`protocol`] | Characteristic ids, command encoders, brightness scaling |
//! | [`parse`] | Length-based decoder for notification frames |
//! | [`effect`] | Named single-pattern effects |
//! | [`transport`] | BLE capability traits |
//! | [`ble`] | `btleplug` implementation of [`transport`] |
//! | [`config`] | [`ClusterLightsConfig`] |
//! | [`types`] | Pattern mask, decoded notifications, session state |

pub mod ble;
pub mod cluster_client;
pub mod config;
pub mod effect;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod signal;
pub mod state;
pub mod transport;
pub mod types;

pub use cluster_client::ClusterLights;
pub use config::ClusterLightsConfig;
pub use error::{Error, Result};

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    pub use crate::ble::BtleplugTransport;
    pub use crate::cluster_client::ClusterLights;
    pub use crate::config::ClusterLightsConfig;
    pub use crate::effect::Effect;
    pub use crate::error::{Error, Result};
    pub use crate::state::DeviceSnapshot;
    pub use crate::transport::{Link, NotificationStream, Transport};
    pub use crate::types::{Notification, PatternMask, SessionState};
}
