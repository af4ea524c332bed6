//! Background worker that owns the BLE link.
//!
//! One worker runs per [`crate::cluster_client::ClusterLights::connect`].  It
//! is the only task that writes to (or disconnects) the link, so there is no
//! concurrent-write hazard.  A second, per-link task consumes notifications;
//! it only touches [`DeviceState`] and the [`ReplySignals`].
//!
//! # State machine
//!
//! | State | Leaves on | Next |
//! |---|---|---|
//! | `Connecting` | link up, subscribed, resync sent | `Connected` |
//! | `Connecting` | any error (address not found, missing characteristic, …) | `CommsLoss` |
//! | `Connecting` | stop requested | `Disconnected` |
//! | `Connected` | write error, notification stream closed | `CommsLoss` |
//! | `Connected` | stop requested | `Draining` |
//! | `Connected` / `Draining` | sentinel dequeued, queue empty while draining | `Disconnected` |
//! | `CommsLoss` | backoff elapsed | `Connecting` |
//! | `CommsLoss` | stop requested | `Disconnected` |
//!
//! The command queue belongs to the worker, not to a link, so anything queued
//! while the link is down is written after the next successful connect, in
//! the order it was queued in.  A command whose write fails is dropped, not retried.
//!
//! A link that opened but failed setup, or was still being set up when the
//! stop arrived, is disconnected before the worker moves on.  A link lost
//! while connected is only dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::parse::parse_notification;
use crate::protocol::{short_id, CONTROL_SHORT_ID, GET_INFO, GET_STATE, NOTIFY_SHORT_ID};
use crate::queue::{CommandReceiver, OutboundCommand};
use crate::signal::ReplySignals;
use crate::state::DeviceState;
use crate::transport::{Link, NotificationStream, Transport};
use crate::types::{Notification, SessionState};

/// Everything the worker needs, moved into the spawned task.
pub(crate) struct Session<T: Transport> {
    pub(crate) address: String,
    pub(crate) resolve_timeout: Duration,
    pub(crate) reconnect_delay: Duration,
    pub(crate) transport: Arc<T>,
    pub(crate) state: Arc<DeviceState>,
    pub(crate) signals: Arc<ReplySignals>,
    pub(crate) commands: CommandReceiver,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) status: Arc<watch::Sender<SessionState>>,
}

/// How a connected stretch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    CommsLoss,
}

/// A link that passed discovery and subscription.
struct LiveLink<L: Link> {
    link: L,
    control: Uuid,
    listener: JoinHandle<()>,
    /// Resolves when the notification stream ends.
    lost: oneshot::Receiver<()>,
}

impl<L: Link> Drop for LiveLink<L> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Result of setting up a link, before its listener is running.
struct Prepared {
    control: Uuid,
    notify: Uuid,
    notifications: NotificationStream,
}

impl<T: Transport> Session<T> {
    /// Run until stopped.  Never returns an error: every failure turns into
    /// a comms loss and another attempt.
    pub(crate) async fn run(mut self) {
        let address = self.address.clone();
        loop {
            if self.stop_requested() {
                break;
            }

            self.publish(SessionState::Connecting);
            let mut stop = self.stop.clone();
            let connected = tokio::select! {
                link = self.transport.connect(&self.address, self.resolve_timeout) => Some(link),
                _ = stop_signalled(&mut stop) => None,
            };
            let end = match connected {
                Some(Ok(link)) => self.attach(link, &mut stop).await,
                Some(Err(e)) => {
                    warn!("{address}: connection attempt failed: {e}");
                    SessionEnd::CommsLoss
                }
                None => {
                    debug!("{address}: stop requested while connecting");
                    break;
                }
            };

            if end == SessionEnd::Stopped {
                break;
            }

            self.publish(SessionState::CommsLoss);
            let delay = self.reconnect_delay;
            info!("{address}: comms loss, reconnecting in {delay:?}");
            let stopped = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = stop_signalled(&mut self.stop) => true,
            };
            if stopped {
                break;
            }
        }
        self.publish(SessionState::Disconnected);
        info!("{address}: session ended");
    }

    /// Finish setting up a freshly opened link and serve it.
    ///
    /// The link is closed again if setup fails or a stop arrives before it is
    /// handed to [`Self::serve`].
    async fn attach(&mut self, link: T::Link, stop: &mut watch::Receiver<bool>) -> SessionEnd {
        let address = self.address.clone();
        let prepared = tokio::select! {
            prepared = self.prepare(&link) => Some(prepared),
            _ = stop_signalled(stop) => None,
        };
        match prepared {
            Some(Ok(prepared)) => {
                let live = self.go_live(link, prepared);
                self.serve(live).await
            }
            Some(Err(e)) => {
                warn!("{address}: link setup failed: {e}");
                close(&address, &link).await;
                SessionEnd::CommsLoss
            }
            None => {
                debug!("{address}: stop requested during link setup");
                close(&address, &link).await;
                SessionEnd::Stopped
            }
        }
    }

    /// Locate both characteristics, subscribe, and send the resync queries.
    ///
    /// Spawns nothing, so dropping it half-way leaves only the link to clean
    /// up.  Replies to the resync queue up in the stream until the listener
    /// starts.
    async fn prepare(&self, link: &T::Link) -> Result<Prepared> {
        let characteristics = link.characteristics();
        let control = find_characteristic(&characteristics, CONTROL_SHORT_ID)?;
        let notify = find_characteristic(&characteristics, NOTIFY_SHORT_ID)?;

        link.subscribe(notify).await?;
        let notifications = link.notifications().await?;

        // Resync ahead of anything still queued.  Nobody waits for these
        // replies; the notification task folds them in when they arrive.
        link.write_without_response(control, &GET_STATE).await?;
        link.write_without_response(control, &GET_INFO).await?;

        Ok(Prepared {
            control,
            notify,
            notifications,
        })
    }

    fn go_live(&self, link: T::Link, prepared: Prepared) -> LiveLink<T::Link> {
        let (lost_tx, lost) = oneshot::channel();
        let listener = tokio::spawn(listen(
            prepared.notifications,
            prepared.notify,
            Arc::clone(&self.state),
            Arc::clone(&self.signals),
            lost_tx,
        ));
        LiveLink {
            link,
            control: prepared.control,
            listener,
            lost,
        }
    }

    /// Drain the queue onto a live link.
    async fn serve(&mut self, mut live: LiveLink<T::Link>) -> SessionEnd {
        let address = self.address.clone();
        self.publish(SessionState::Connected);
        info!("{address}: connected");

        let mut draining = false;
        loop {
            let command = if self.stop_requested() {
                if !draining {
                    draining = true;
                    self.publish(SessionState::Draining);
                    debug!("{address}: stop requested, draining queue");
                }
                match self.commands.try_dequeue() {
                    Some(command) => command,
                    None => break,
                }
            } else {
                tokio::select! {
                    command = self.commands.dequeue() => match command {
                        Some(command) => command,
                        // Every sender is gone: the client was dropped.
                        None => break,
                    },
                    _ = stop_signalled(&mut self.stop) => continue,
                    _ = &mut live.lost => {
                        warn!("{address}: notification stream closed");
                        return SessionEnd::CommsLoss;
                    }
                }
            };

            let (payload, expects_reply) = match command {
                OutboundCommand::Disconnect => break,
                OutboundCommand::Packet {
                    payload,
                    expects_reply,
                } => (payload, expects_reply),
            };

            if let Err(e) = live
                .link
                .write_without_response(live.control, &payload)
                .await
            {
                warn!("{address}: write of {payload:02x?} failed: {e}");
                return SessionEnd::CommsLoss;
            }
            if expects_reply {
                debug!("{address}: wrote query {payload:02x?}, reply pending");
            } else {
                debug!("{address}: wrote {payload:02x?}");
            }
        }

        live.listener.abort();
        close(&address, &live.link).await;
        SessionEnd::Stopped
    }

    fn stop_requested(&self) -> bool {
        // A dropped sender means the client is gone, which is a stop as well.
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    fn publish(&self, state: SessionState) {
        let previous = self.status.send_replace(state);
        if previous != state {
            debug!("{}: {previous} -> {state}", self.address);
        }
    }
}

async fn close<L: Link>(address: &str, link: &L) {
    if let Err(e) = link.disconnect().await {
        warn!("{address}: disconnect failed: {e}");
    }
}

/// Resolve once a stop has been requested (or the requester is gone).
async fn stop_signalled(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

fn find_characteristic(characteristics: &[Uuid], id: u16) -> Result<Uuid> {
    characteristics
        .iter()
        .copied()
        .find(|uuid| short_id(uuid) == id)
        .ok_or(Error::CharacteristicNotFound(id))
}

/// Notification task: decode, update state, release waiters.
async fn listen(
    mut notifications: NotificationStream,
    notify: Uuid,
    state: Arc<DeviceState>,
    signals: Arc<ReplySignals>,
    lost: oneshot::Sender<()>,
) {
    while let Some((uuid, value)) = notifications.next().await {
        if uuid != notify {
            debug!("ignoring notification from {uuid}");
            continue;
        }
        handle_notification(&state, &signals, &value);
    }
    let _ = lost.send(());
}

/// Fold one notify-characteristic payload into `state` and wake whoever is
/// waiting for that reply kind.
pub(crate) fn handle_notification(state: &DeviceState, signals: &ReplySignals, data: &[u8]) {
    let notification = parse_notification(data);
    state.apply(&notification);
    match notification {
        Notification::Power(on) => {
            debug!("power reply: {}", if on { "on" } else { "off" });
            signals.state.fulfil();
        }
        Notification::Info {
            brightness,
            pattern,
        } => {
            debug!("info reply: brightness={brightness} pattern=0x{pattern:02x}");
            signals.info.fulfil();
        }
        Notification::Unrecognised(len) => {
            warn!("ignoring {len}-byte notification {data:02x?}");
        }
    }
}
