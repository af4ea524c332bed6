use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ble::BtleplugTransport;
use crate::config::ClusterLightsConfig;
use crate::effect::Effect;
use crate::error::{Error, Result};
use crate::protocol::{encode_brightness, encode_pattern, encode_power, GET_INFO, GET_STATE};
use crate::queue::{command_queue, CommandSender, OutboundCommand};
use crate::session::Session;
use crate::signal::{ReplyKind, ReplySignals};
use crate::state::{DeviceSnapshot, DeviceState};
use crate::transport::Transport;
use crate::types::{PatternMask, SessionState};

// ── Worker ────────────────────────────────────────────────────────────────────

/// Handles to a running session worker.
struct Worker {
    commands: CommandSender,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

// ── ClusterLights ─────────────────────────────────────────────────────────────

/// Client for one cluster-light fixture.
///
/// [`connect`](Self::connect) starts a background session that keeps the BLE
/// link up for as long as the client wants it, reconnecting after every
/// comms loss.  Commands are queued and written in order by that session;
/// calling them never waits for the link, only (briefly) for queue space.
///
/// Accessors (`get_on`, `get_brightness`, `get_wave`, …) read the local
/// mirror of the fixture.  It is refreshed from notifications; call
/// [`get_state`](Self::get_state) / [`get_information`](Self::get_information)
/// to ask for fresh values and wait up to the reply timeout for them.
///
/// ```no_run
/// use clusterlights::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> clusterlights::Result<()> {
/// let lights = ClusterLights::new(ClusterLightsConfig::new("AA:BB:CC:DD:EE:FF"));
/// lights.connect()?;
/// lights.on().await?;
/// lights.set_brightness(128).await?;
/// lights.reset_pattern();
/// lights.set_wave(true).await?;
/// lights.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct ClusterLights<T: Transport = BtleplugTransport> {
    config: ClusterLightsConfig,
    transport: Arc<T>,
    state: Arc<DeviceState>,
    signals: Arc<ReplySignals>,
    status: Arc<watch::Sender<SessionState>>,
    worker: Mutex<Option<Worker>>,
}

impl ClusterLights<BtleplugTransport> {
    /// Client backed by the platform Bluetooth stack.
    pub fn new(config: ClusterLightsConfig) -> Self {
        Self::with_transport(config, BtleplugTransport::new())
    }
}

impl<T: Transport> ClusterLights<T> {
    pub fn with_transport(config: ClusterLightsConfig, transport: T) -> Self {
        let (status, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            transport: Arc::new(transport),
            state: Arc::new(DeviceState::new()),
            signals: Arc::new(ReplySignals::default()),
            status: Arc::new(status),
            worker: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn config(&self) -> &ClusterLightsConfig {
        &self.config
    }

    // ── Session lifecycle ─────────────────────────────────────────────────────

    /// Start the background session and return immediately.
    ///
    /// Connection failures are not reported here; the session retries until
    /// [`disconnect`](Self::disconnect).  Calling `connect` on a running
    /// client does nothing.  Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<()> {
        self.config.validate()?;

        let mut worker = self.worker();
        if worker.is_some() {
            debug!("{}: connect() while already running", self.config.address);
            return Ok(());
        }

        let (commands, receiver) =
            command_queue(self.config.queue_capacity, self.config.enqueue_timeout);
        let (stop, stop_rx) = watch::channel(false);
        let session = Session {
            address: self.config.address.clone(),
            resolve_timeout: self.config.resolve_timeout,
            reconnect_delay: self.config.reconnect_delay,
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            signals: Arc::clone(&self.signals),
            commands: receiver,
            stop: stop_rx,
            status: Arc::clone(&self.status),
        };

        info!("{}: starting session", self.config.address);
        *worker = Some(Worker {
            commands,
            stop,
            task: tokio::spawn(session.run()),
        });
        Ok(())
    }

    /// Stop the session and wait for it to finish.
    ///
    /// Packets already queued are still written if the link is up.  The link
    /// is disconnected cleanly unless the session was in comms loss, in which
    /// case there is nothing left to close.  Does nothing if not connected.
    pub async fn disconnect(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };
        info!("{}: disconnecting", self.config.address);

        worker.stop.send_replace(true);
        // The stop flag already wakes the worker; the sentinel additionally
        // marks the end of the queue so the drain stops exactly there.
        if let Err(e) = worker.commands.enqueue_disconnect() {
            debug!("{}: sentinel not queued: {e}", self.config.address);
        }

        if let Err(e) = worker.task.await {
            warn!("{}: session task failed: {e}", self.config.address);
        }
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        *self.status.borrow()
    }

    /// Receiver that observes every session state change.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.status.subscribe()
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Turn the fixture on.
    pub async fn on(&self) -> Result<()> {
        let commands = self.sender()?;
        self.state.set_power(true);
        commands.enqueue(OutboundCommand::packet(encode_power(true))).await
    }

    /// Turn the fixture off.
    pub async fn off(&self) -> Result<()> {
        let commands = self.sender()?;
        self.state.set_power(false);
        commands.enqueue(OutboundCommand::packet(encode_power(false))).await
    }

    /// Set brightness on the 0–255 scale.  The fixture stores 0–99, so the
    /// value read back after a refresh may differ by one step.
    pub async fn set_brightness(&self, brightness: u8) -> Result<()> {
        let commands = self.sender()?;
        self.state.set_brightness(brightness);
        commands
            .enqueue(OutboundCommand::packet(encode_brightness(brightness)))
            .await
    }

    /// Set or clear `pattern` and send the whole resulting mask.
    pub async fn set_pattern(&self, pattern: PatternMask, active: bool) -> Result<()> {
        let commands = self.sender()?;
        self.enqueue_pattern(&commands, pattern, active).await
    }

    pub async fn set_wave(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::WAVE, active).await
    }

    pub async fn set_phase(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::PHASE, active).await
    }

    pub async fn set_phased_fade_away(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::PHASED_FADE_AWAY, active).await
    }

    pub async fn set_phased_twinkle(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::PHASED_TWINKLE, active).await
    }

    pub async fn set_fade_away(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::FADE_AWAY, active).await
    }

    pub async fn set_fast_twinkle(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::FAST_TWINKLE, active).await
    }

    pub async fn set_stay_on(&self, active: bool) -> Result<()> {
        self.set_pattern(PatternMask::STAY_ON, active).await
    }

    /// Clear every pattern bit locally, without sending anything.
    ///
    /// Follow with one or more `set_*` calls; the first of them sends a mask
    /// containing only the bits set since the reset.
    pub fn reset_pattern(&self) {
        self.state.reset_pattern();
    }

    /// Make `effect` the only active pattern.
    pub async fn apply_effect(&self, effect: Effect) -> Result<()> {
        let commands = self.sender()?;
        self.reset_pattern();
        self.enqueue_pattern(&commands, effect.pattern(), true).await
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Ask for the power state and wait up to the reply timeout for it.
    ///
    /// A missing reply is logged and otherwise ignored; accessors then return
    /// the previously cached value.
    pub async fn get_state(&self) -> Result<()> {
        self.query(ReplyKind::State, &GET_STATE).await
    }

    /// Ask for brightness and pattern and wait up to the reply timeout.
    pub async fn get_information(&self) -> Result<()> {
        self.query(ReplyKind::Info, &GET_INFO).await
    }

    pub fn get_on(&self) -> bool {
        self.state.power()
    }

    /// Brightness on the 0–255 scale.
    pub fn get_brightness(&self) -> u8 {
        self.state.brightness()
    }

    pub fn get_wave(&self) -> bool {
        self.state.is_active(PatternMask::WAVE)
    }

    pub fn get_phase(&self) -> bool {
        self.state.is_active(PatternMask::PHASE)
    }

    pub fn get_phased_fade_away(&self) -> bool {
        self.state.is_active(PatternMask::PHASED_FADE_AWAY)
    }

    pub fn get_phased_twinkle(&self) -> bool {
        self.state.is_active(PatternMask::PHASED_TWINKLE)
    }

    pub fn get_fade_away(&self) -> bool {
        self.state.is_active(PatternMask::FADE_AWAY)
    }

    pub fn get_fast_twinkle(&self) -> bool {
        self.state.is_active(PatternMask::FAST_TWINKLE)
    }

    pub fn get_stay_on(&self) -> bool {
        self.state.is_active(PatternMask::STAY_ON)
    }

    /// The pattern byte with every active bit.
    pub fn get_raw_pattern(&self) -> u8 {
        self.state.pattern().bits()
    }

    pub fn current_effect(&self) -> Effect {
        Effect::current(self.state.pattern())
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.snapshot()
    }

    // ── Private ───────────────────────────────────────────────────────────────

    async fn enqueue_pattern(
        &self,
        commands: &CommandSender,
        pattern: PatternMask,
        active: bool,
    ) -> Result<()> {
        let mask = self.state.set_pattern_bits(pattern, active);
        debug!("{}: pattern mask now 0x{mask:02x}", self.config.address);
        commands
            .enqueue(OutboundCommand::packet(encode_pattern(mask)))
            .await
    }

    async fn query(&self, kind: ReplyKind, payload: &[u8]) -> Result<()> {
        let commands = self.sender()?;
        // Armed before queueing so an immediate reply is not missed.
        let reply = self.signals.get(kind).arm();
        commands.enqueue(OutboundCommand::query(payload)).await?;
        if !reply.wait(self.config.reply_timeout).await {
            warn!(
                "{}: no {kind:?} reply within {:?}, keeping cached values",
                self.config.address, self.config.reply_timeout
            );
        }
        Ok(())
    }

    /// Producer handle of the running worker.
    ///
    /// Fetched before any optimistic update so a call rejected with
    /// `NotConnected` leaves the mirror as it was.
    fn sender(&self) -> Result<CommandSender> {
        self.worker()
            .as_ref()
            .map(|w| w.commands.clone())
            .ok_or(Error::NotConnected)
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}
