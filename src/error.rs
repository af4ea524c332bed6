//! Error type for the cluster-light client.
//!
//! Most failures never reach a caller: address lookup and transport errors are
//! absorbed by the session worker, which marks comms loss and reconnects.  The
//! variants below are what the worker logs, plus the few conditions that *are*
//! returned from the public API (`QueueFull`, `NotConnected`, `Config`).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The peripheral did not show up within the resolve timeout.
    #[error("peripheral {address} not found within {timeout:?}")]
    AddressNotFound { address: String, timeout: Duration },

    /// No Bluetooth adapter is available on this host.
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    /// Connected, but a required characteristic is missing.
    #[error("characteristic {0:04x} not found")]
    CharacteristicNotFound(u16),

    /// The command queue stayed full for the whole enqueue timeout.
    #[error("command queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// No session is running, so the command has nowhere to go.
    #[error("not connected; call connect() first")]
    NotConnected,

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport failure reported by a non-btleplug backend.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
