//! GATT identifiers, wire-format constants, and command encoders for cluster
//! lights.
//!
//! The fixture exposes two characteristics in the Bluetooth SIG base UUID
//! namespace `0000XXXX-0000-1000-8000-00805f9b34fb`:
//!
//! | Short id | Role |
//! |---|---|
//! | `fff1` | control: the host writes command packets (write without response) |
//! | `fff4` | notify: the fixture publishes power and information replies |
//!
//! Every command is a short fixed-prefix byte sequence:
//!
//! | Command | Bytes |
//! |---|---|
//! | Get power state | `00` |
//! | Power off | `01 01 01 00` |
//! | Power on | `01 01 01 01` |
//! | Get information | `02 00 01` |
//! | Set brightness | `03 01 01 vv` (vv = device brightness 0–99) |
//! | Set pattern | `05 01 02 03 mm` (mm = [`PatternMask`] bits) |

use uuid::Uuid;

use crate::types::PatternMask;

// ── Characteristics ───────────────────────────────────────────────────────────

/// 16-bit id of the characteristic that accepts command packets.
pub const CONTROL_SHORT_ID: u16 = 0xfff1;

/// 16-bit id of the characteristic that publishes reply notifications.
pub const NOTIFY_SHORT_ID: u16 = 0xfff4;

/// Full 128-bit form of [`CONTROL_SHORT_ID`].
pub const CONTROL_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);

/// Full 128-bit form of [`NOTIFY_SHORT_ID`].
pub const NOTIFY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000fff4_0000_1000_8000_00805f9b34fb);

/// Extract the 16-bit short id from a characteristic UUID.
///
/// Short ids live in bits 96–111 of the 128-bit form
/// (`0000`**`fff1`**`-0000-1000-…`).  Some platforms report vendor-base UUIDs
/// for the same attributes, so only this field is compared during discovery.
pub fn short_id(uuid: &Uuid) -> u16 {
    (uuid.as_u128() >> 96) as u16
}

// ── Brightness ────────────────────────────────────────────────────────────────

/// Highest brightness the fixture accepts on the wire.
pub const DEVICE_BRIGHTNESS_MAX: u8 = 99;

/// Highest brightness exposed by the public API.
pub const API_BRIGHTNESS_MAX: u8 = 255;

/// Map an API brightness (0–255) to the fixture range (0–99).
///
/// `device = round(api / 255 × 99)`
pub fn device_from_api(api: u8) -> u8 {
    let scaled = f64::from(api) / f64::from(API_BRIGHTNESS_MAX) * f64::from(DEVICE_BRIGHTNESS_MAX);
    scaled.round() as u8
}

/// Map a fixture brightness (0–99) to the API range (0–255).
///
/// `api = round(device / 99 × 255)`.  Out-of-range inputs are clamped to 99
/// first so a misbehaving fixture can never push the API value past 255.
pub fn api_from_device(device: u8) -> u8 {
    let device = device.min(DEVICE_BRIGHTNESS_MAX);
    let scaled =
        f64::from(device) / f64::from(DEVICE_BRIGHTNESS_MAX) * f64::from(API_BRIGHTNESS_MAX);
    scaled.round() as u8
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Ask the fixture for its power state.  Answered by a short (≤ 5 byte) frame.
pub const GET_STATE: [u8; 1] = [0x00];

/// Ask the fixture for brightness and pattern.  Answered by a long (≥ 18 byte) frame.
pub const GET_INFO: [u8; 3] = [0x02, 0x00, 0x01];

const POWER_PREFIX: [u8; 3] = [0x01, 0x01, 0x01];
const BRIGHTNESS_PREFIX: [u8; 3] = [0x03, 0x01, 0x01];
const PATTERN_PREFIX: [u8; 4] = [0x05, 0x01, 0x02, 0x03];

/// Encode a power on/off command.
///
/// ```
/// # use clusterlights::protocol::encode_power;
/// assert_eq!(encode_power(true), [0x01, 0x01, 0x01, 0x01]);
/// ```
pub fn encode_power(on: bool) -> [u8; 4] {
    let [a, b, c] = POWER_PREFIX;
    [a, b, c, u8::from(on)]
}

/// Encode a brightness command from an API brightness (0–255).
pub fn encode_brightness(api: u8) -> [u8; 4] {
    let [a, b, c] = BRIGHTNESS_PREFIX;
    [a, b, c, device_from_api(api)]
}

/// Encode a pattern command carrying the complete mask.
///
/// The fixture replaces its active set with `mask`; there is no per-bit
/// toggle on the wire.
pub fn encode_pattern(mask: PatternMask) -> [u8; 5] {
    let [a, b, c, d] = PATTERN_PREFIX;
    [a, b, c, d, mask.bits()]
}
