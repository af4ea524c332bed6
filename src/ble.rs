//! [`Transport`] implementation on top of `btleplug`.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::short_id;
use crate::transport::{Link, NotificationStream, Transport};

/// Upper bound on `peripheral.connect()`.  BlueZ can otherwise block forever
/// on a peripheral that has just gone out of range.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval between peripheral-list polls while resolving an address.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Production BLE backend.
///
/// Uses the first adapter reported by the platform.  The peripheral is
/// matched against `address` by Bluetooth address (Linux, Windows) or by
/// platform id (macOS exposes a UUID instead of the MAC), case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct BtleplugTransport;

impl BtleplugTransport {
    pub fn new() -> Self {
        Self
    }

    async fn adapter() -> Result<Adapter> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;

        // CoreBluetooth starts in an "unknown" state; scanning before it
        // reports PoweredOn is a silent no-op.
        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        warn!("adapter still {state:?} after 3 s, scanning anyway");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("adapter_state() failed: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }

        Ok(adapter)
    }

    async fn find(adapter: &Adapter, address: &str) -> Result<Peripheral> {
        loop {
            for p in adapter.peripherals().await? {
                let by_addr = p.address().to_string().eq_ignore_ascii_case(address);
                let by_id = p.id().to_string().eq_ignore_ascii_case(address);
                if by_addr || by_id {
                    return Ok(p);
                }
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Link = BtleplugLink;

    async fn connect(&self, address: &str, resolve_timeout: Duration) -> Result<BtleplugLink> {
        let adapter = Self::adapter().await?;

        debug!("{address}: scanning (timeout {resolve_timeout:?})");
        adapter.start_scan(ScanFilter::default()).await?;
        let found = tokio::time::timeout(resolve_timeout, Self::find(&adapter, address)).await;
        if let Err(e) = adapter.stop_scan().await {
            debug!("{address}: stop_scan failed: {e}");
        }
        let peripheral = match found {
            Ok(found) => found?,
            Err(_) => {
                return Err(Error::AddressNotFound {
                    address: address.to_owned(),
                    timeout: resolve_timeout,
                })
            }
        };

        if !peripheral.is_connected().await? {
            tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect())
                .await
                .map_err(|_| {
                    Error::Transport(format!("connect() timed out after {CONNECT_TIMEOUT:?}"))
                })??;
        }

        // BlueZ reports the connection before its GATT cache is filled;
        // discovering straight away can come back empty.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(DISCOVER_TIMEOUT, peripheral.discover_services())
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "discover_services() timed out after {DISCOVER_TIMEOUT:?}"
                ))
            })??;
        info!("{address}: connected, services discovered");

        Ok(BtleplugLink {
            peripheral,
            adapter,
        })
    }
}

/// A connected `btleplug` peripheral.
#[derive(Debug, Clone)]
pub struct BtleplugLink {
    peripheral: Peripheral,
    /// Kept to watch for `DeviceDisconnected`, which on most platforms fires
    /// well before the notification stream notices the link is gone.
    adapter: Adapter,
}

impl BtleplugLink {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound(short_id(&uuid)))
    }
}

#[async_trait]
impl Link for BtleplugLink {
    fn characteristics(&self) -> Vec<Uuid> {
        self.peripheral
            .characteristics()
            .iter()
            .map(|c| c.uuid)
            .collect()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let c = self.characteristic(characteristic)?;
        self.peripheral.subscribe(&c).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let notifications = self.peripheral.notifications().await?;

        let peripheral_id = self.peripheral.id();
        let adapter = self.adapter.clone();
        let disconnected = async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("device {id:?} disconnected");
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("could not subscribe to adapter events: {e}");
                    // Fall back to the notification stream ending on its own.
                    futures::future::pending::<()>().await;
                }
            }
        };

        Ok(notifications
            .map(|n| (n.uuid, n.value))
            .take_until(disconnected)
            .boxed())
    }

    async fn write_without_response(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let c = self.characteristic(characteristic)?;
        self.peripheral
            .write(&c, payload, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}
