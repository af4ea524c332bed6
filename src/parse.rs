//! Decoder for cluster-light notification frames.
//!
//! Pure functions only; safe to call from the notification task or from tests.
//!
//! # Length-based framing
//!
//! The fixture never tags its replies with a type byte.  Both reply kinds
//! arrive on the same notify characteristic and are told apart by length:
//!
//! | Length | Reply | Fields |
//! |---|---|---|
//! | ≤ 5 | power | byte 3: non-zero = on |
//! | ≥ 18 | information | byte 3: brightness (0–99), byte 17: pattern mask |
//! | 6–17 | *(none)* | reported as [`Notification::Unrecognised`] |
//!
//! Frames in the 6–17 band have never been observed; rather than guess a new
//! shape they are surfaced as unrecognised so the caller can log and drop them.

use crate::protocol::api_from_device;
use crate::types::{Notification, PatternMask};

/// Longest frame that is treated as a power reply.
pub const POWER_FRAME_MAX_LEN: usize = 5;

/// Shortest frame that is treated as an information reply.
pub const INFO_FRAME_MIN_LEN: usize = 18;

const POWER_BYTE: usize = 3;
const BRIGHTNESS_BYTE: usize = 3;
const PATTERN_BYTE: usize = 17;

/// Classify and decode one notification payload.
///
/// A power-band frame shorter than four bytes has no power byte and is
/// reported as unrecognised as well.
pub fn parse_notification(data: &[u8]) -> Notification {
    let len = data.len();
    if len <= POWER_FRAME_MAX_LEN {
        return match data.get(POWER_BYTE) {
            Some(&b) => Notification::Power(b != 0),
            None => Notification::Unrecognised(len),
        };
    }
    if len >= INFO_FRAME_MIN_LEN {
        return Notification::Info {
            brightness: api_from_device(data[BRIGHTNESS_BYTE]),
            pattern: PatternMask::from_bits_truncate(data[PATTERN_BYTE]),
        };
    }
    Notification::Unrecognised(len)
}
