use std::fmt;
use std::ops::BitOr;

// ── PatternMask ──────────────────────────────────────────────────────────────

/// Set of animation patterns the fixture cycles through.
///
/// One bit per pattern; any combination may be active at once and the
/// fixture loops through every active pattern in turn:
///
/// | Constant | Bit |
/// |---|---|
/// | [`WAVE`](Self::WAVE) | `0x01` |
/// | [`PHASE`](Self::PHASE) | `0x02` |
/// | [`PHASED_FADE_AWAY`](Self::PHASED_FADE_AWAY) | `0x04` |
/// | [`PHASED_TWINKLE`](Self::PHASED_TWINKLE) | `0x08` |
/// | [`FADE_AWAY`](Self::FADE_AWAY) | `0x10` |
/// | [`FAST_TWINKLE`](Self::FAST_TWINKLE) | `0x20` |
/// | [`STAY_ON`](Self::STAY_ON) | `0x40` |
///
/// [`STAY_OFF`](Self::STAY_OFF) is the empty mask.  Bit `0x80` is unused by
/// the fixture and is never stored: every constructor masks it away, so the
/// value is always within `0x00..=0x7F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PatternMask(u8);

impl PatternMask {
    pub const STAY_OFF: Self = Self(0x00);
    pub const WAVE: Self = Self(0x01);
    pub const PHASE: Self = Self(0x02);
    pub const PHASED_FADE_AWAY: Self = Self(0x04);
    pub const PHASED_TWINKLE: Self = Self(0x08);
    pub const FADE_AWAY: Self = Self(0x10);
    pub const FAST_TWINKLE: Self = Self(0x20);
    pub const STAY_ON: Self = Self(0x40);

    /// All bits the fixture understands.
    pub const VALID_BITS: u8 = 0x7F;

    /// Build a mask from a raw byte, dropping the unused `0x80` bit.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::VALID_BITS)
    }

    /// Raw byte as sent on the wire.
    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// `true` when any bit of `other` is also set in `self`.
    ///
    /// `STAY_OFF` has no bits and therefore never intersects anything.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Return a copy with the bits of `pattern` set (`active`) or cleared.
    ///
    /// Setting a bit that is already set, or clearing one that is already
    /// clear, returns the mask unchanged.
    pub const fn with(self, pattern: Self, active: bool) -> Self {
        if active {
            Self(self.0 | pattern.0)
        } else {
            Self(self.0 & !pattern.0)
        }
    }
}

impl BitOr for PatternMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::LowerHex for PatternMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

// ── Notification ──────────────────────────────────────────────────────────────

/// A decoded notification from the fixture's notify characteristic.
///
/// Produced by [`crate::parse::parse_notification`].  The fixture does not
/// tag its replies; they are told apart by frame length alone (see the parse
/// module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Reply to a power query or a power on/off command.
    Power(bool),
    /// Reply to an information query.
    Info {
        /// Brightness already converted to API units (0–255).
        brightness: u8,
        /// Active pattern bits.
        pattern: PatternMask,
    },
    /// A frame whose length matches no known reply.  Carries the length.
    Unrecognised(usize),
}

// ── SessionState ──────────────────────────────────────────────────────────────

/// Lifecycle of the background BLE session.
///
/// ```text
/// Idle ──connect()──▶ Connecting ──▶ Connected ──disconnect()──▶ Draining ──▶ Disconnected
///                        ▲   │           │
///                        │   └──error──▶ CommsLoss ◀──error──┘
///                        └───backoff─────┘
/// ```
///
/// `CommsLoss` always retries; only an explicit
/// [`crate::cluster_client::ClusterLights::disconnect`] reaches
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started yet.
    Idle,
    /// Resolving the address, connecting, discovering and subscribing.
    Connecting,
    /// Link is up and the worker is draining the command queue.
    Connected,
    /// A stop was requested; the worker is flushing what is left in the queue.
    Draining,
    /// The transport failed.  A reconnect is scheduled after the backoff delay.
    CommsLoss,
    /// The session was stopped by the caller.
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Draining => "draining",
            SessionState::CommsLoss => "comms loss",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}
