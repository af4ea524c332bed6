//! In-memory mirror of the fixture's last-known state.
//!
//! Written from two places: the command methods (optimistic updates made
//! before a packet is queued) and the notification task (authoritative
//! updates decoded from replies).  Each field is a separate atomic so readers
//! never block the notification task; accessors copy values out.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::types::{Notification, PatternMask};

/// A point-in-time copy of [`DeviceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSnapshot {
    pub power: bool,
    /// Brightness in API units (0–255).
    pub brightness: u8,
    pub pattern: PatternMask,
}

#[derive(Debug, Default)]
pub struct DeviceState {
    power: AtomicBool,
    brightness: AtomicU8,
    pattern: AtomicU8,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn power(&self) -> bool {
        self.power.load(Ordering::Acquire)
    }

    /// Brightness in API units (0–255).
    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::Acquire)
    }

    pub fn pattern(&self) -> PatternMask {
        PatternMask::from_bits_truncate(self.pattern.load(Ordering::Acquire))
    }

    pub fn is_active(&self, pattern: PatternMask) -> bool {
        self.pattern().intersects(pattern)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            power: self.power(),
            brightness: self.brightness(),
            pattern: self.pattern(),
        }
    }

    pub fn set_power(&self, on: bool) {
        self.power.store(on, Ordering::Release);
    }

    pub fn set_brightness(&self, api: u8) {
        self.brightness.store(api, Ordering::Release);
    }

    /// Set or clear `bits` and return the resulting mask.
    ///
    /// Read-modify-write is a single atomic operation, so two callers toggling
    /// different bits concurrently cannot lose each other's update.
    pub fn set_pattern_bits(&self, bits: PatternMask, active: bool) -> PatternMask {
        let previous = if active {
            self.pattern.fetch_or(bits.bits(), Ordering::AcqRel)
        } else {
            self.pattern.fetch_and(!bits.bits(), Ordering::AcqRel)
        };
        PatternMask::from_bits_truncate(previous).with(bits, active)
    }

    pub fn replace_pattern(&self, mask: PatternMask) {
        self.pattern.store(mask.bits(), Ordering::Release);
    }

    /// Clear every pattern bit locally.  Nothing is sent to the fixture.
    pub fn reset_pattern(&self) {
        self.replace_pattern(PatternMask::STAY_OFF);
    }

    /// Fold a decoded reply into the mirror.
    ///
    /// Returns `false` for [`Notification::Unrecognised`], which leaves every
    /// field untouched.
    pub fn apply(&self, notification: &Notification) -> bool {
        match *notification {
            Notification::Power(on) => {
                self.set_power(on);
                true
            }
            Notification::Info {
                brightness,
                pattern,
            } => {
                self.set_brightness(brightness);
                self.replace_pattern(pattern);
                true
            }
            Notification::Unrecognised(_) => false,
        }
    }
}
