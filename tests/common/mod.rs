//! In-memory cluster-light fixture for driving the session without a radio.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use uuid::Uuid;

use clusterlights::protocol::{CONTROL_CHARACTERISTIC, GET_INFO, GET_STATE, NOTIFY_CHARACTERISTIC};
use clusterlights::transport::{Link, NotificationStream, Transport};
use clusterlights::types::SessionState;
use clusterlights::{ClusterLights, ClusterLightsConfig, Error, Result};

pub const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

/// Everything the fixture saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Subscribe(Uuid),
    Write(Vec<u8>),
    WriteFailed(Vec<u8>),
    Disconnect,
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    unreachable: bool,
    missing_notify: bool,
    fail_next_write: bool,
    subscribe_delay: Option<Duration>,
    state_reply: Option<Vec<u8>>,
    info_reply: Option<Vec<u8>>,
    notify_tx: Option<UnboundedSender<(Uuid, Vec<u8>)>>,
}

/// Fake transport.  Clones share the same fixture.
#[derive(Clone, Default)]
pub struct FakeFixture {
    inner: Arc<Mutex<Inner>>,
}

impl FakeFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection attempts time out as if the address never showed up.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Advertise the control characteristic only.
    pub fn set_missing_notify(&self, missing: bool) {
        self.lock().missing_notify = missing;
    }

    /// Make `subscribe` take `delay` before it completes.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        self.lock().subscribe_delay = Some(delay);
    }

    /// Fail the next write and drop the link with it.
    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    /// Answer every power query with `frame`.
    pub fn reply_to_state(&self, frame: Vec<u8>) {
        self.lock().state_reply = Some(frame);
    }

    /// Answer every information query with `frame`.
    pub fn reply_to_info(&self, frame: Vec<u8>) {
        self.lock().info_reply = Some(frame);
    }

    /// Close the notification stream, as when the peripheral goes away.
    pub fn drop_link(&self) {
        self.lock().notify_tx = None;
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Payloads that were written successfully.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Write(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.lock().events.iter().filter(|e| *e == wanted).count()
    }

    /// Poll until `wanted` has been recorded.
    pub async fn wait_for_event(&self, wanted: &Event) {
        for _ in 0..1000 {
            if self.count(wanted) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {wanted:?}, saw {:?}", self.events());
    }

    /// Poll until at least `n` successful writes were seen.
    pub async fn wait_for_writes(&self, n: usize) -> Vec<Vec<u8>> {
        for _ in 0..1000 {
            let writes = self.writes();
            if writes.len() >= n {
                return writes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} writes, saw {:02x?}", self.writes());
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[async_trait]
impl Transport for FakeFixture {
    type Link = FakeLink;

    async fn connect(&self, address: &str, resolve_timeout: Duration) -> Result<FakeLink> {
        let (unreachable, missing_notify) = {
            let inner = self.lock();
            (inner.unreachable, inner.missing_notify)
        };
        if unreachable {
            tokio::time::sleep(resolve_timeout).await;
            return Err(Error::AddressNotFound {
                address: address.to_owned(),
                timeout: resolve_timeout,
            });
        }

        self.lock().events.push(Event::Connect);
        let mut characteristics = vec![CONTROL_CHARACTERISTIC];
        if !missing_notify {
            characteristics.push(NOTIFY_CHARACTERISTIC);
        }
        Ok(FakeLink {
            fixture: self.clone(),
            characteristics,
        })
    }
}

pub struct FakeLink {
    fixture: FakeFixture,
    characteristics: Vec<Uuid>,
}

#[async_trait]
impl Link for FakeLink {
    fn characteristics(&self) -> Vec<Uuid> {
        self.characteristics.clone()
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let delay = {
            let mut inner = self.fixture.lock();
            inner.events.push(Event::Subscribe(characteristic));
            inner.subscribe_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream> {
        let (tx, rx) = unbounded();
        self.fixture.lock().notify_tx = Some(tx);
        Ok(Box::pin(rx))
    }

    async fn write_without_response(&self, _characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let mut inner = self.fixture.lock();
        if std::mem::take(&mut inner.fail_next_write) {
            inner.events.push(Event::WriteFailed(payload.to_vec()));
            inner.notify_tx = None;
            return Err(Error::Transport("link dropped".into()));
        }
        inner.events.push(Event::Write(payload.to_vec()));

        let reply = if payload == GET_STATE {
            inner.state_reply.clone()
        } else if payload == GET_INFO {
            inner.info_reply.clone()
        } else {
            None
        };
        if let (Some(reply), Some(tx)) = (reply, &inner.notify_tx) {
            let _ = tx.unbounded_send((NOTIFY_CHARACTERISTIC, reply));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut inner = self.fixture.lock();
        inner.events.push(Event::Disconnect);
        inner.notify_tx = None;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

pub fn config() -> ClusterLightsConfig {
    ClusterLightsConfig::new(ADDRESS)
}

pub fn client(fixture: &FakeFixture) -> ClusterLights<FakeFixture> {
    ClusterLights::with_transport(config(), fixture.clone())
}

/// Wait (in virtual time) until the session reaches `wanted`.
pub async fn wait_for_session<T: Transport>(lights: &ClusterLights<T>, wanted: SessionState) {
    let mut session = lights.watch_session();
    let reached = tokio::time::timeout(
        Duration::from_secs(300),
        session.wait_for(|state| *state == wanted),
    )
    .await
    .map(|r| r.is_ok());
    assert!(
        matches!(reached, Ok(true)),
        "session never reached {wanted}, stuck in {}",
        lights.session_state()
    );
}

/// An 18-byte information frame.
pub fn info_frame(device_brightness: u8, pattern: u8) -> Vec<u8> {
    let mut frame = vec![0u8; 18];
    frame[3] = device_brightness;
    frame[17] = pattern;
    frame
}
