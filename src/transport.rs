//! The narrow slice of a BLE central stack the session needs.
//!
//! [`crate::ble::BtleplugTransport`] is the production implementation.  Tests
//! plug in an in-memory fixture through the same traits.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

/// Notification payloads tagged with the characteristic that produced them.
///
/// The stream ends when the link goes down.
pub type NotificationStream = Pin<Box<dyn Stream<Item = (Uuid, Vec<u8>)> + Send>>;

/// Something that can open a link to a peripheral by address.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Link: Link;

    /// Find the peripheral, connect, and discover its characteristics.
    ///
    /// Finding the peripheral must give up with
    /// [`crate::Error::AddressNotFound`] once `resolve_timeout` elapses.
    async fn connect(&self, address: &str, resolve_timeout: Duration) -> Result<Self::Link>;
}

/// A live connection to one peripheral.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// UUIDs of every characteristic discovered on connect.
    fn characteristics(&self) -> Vec<Uuid>;

    /// Enable notifications on `characteristic`.
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Stream of notifications for every subscribed characteristic.
    async fn notifications(&self) -> Result<NotificationStream>;

    /// Write without a link-layer acknowledgement.
    async fn write_without_response(&self, characteristic: Uuid, payload: &[u8]) -> Result<()>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<()>;
}
