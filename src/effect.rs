//! Named single-pattern effects.
//!
//! Home-automation front ends usually model a light's animation as one
//! selected "effect" out of a list, while the fixture itself accepts any
//! combination of pattern bits.  [`Effect`] bridges the two: selecting an
//! effect activates exactly one bit, and reading the current effect picks the
//! first active bit in list order.

use std::fmt;
use std::str::FromStr;

use crate::types::PatternMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Wave,
    Phase,
    PhasedFadeAway,
    PhasedTwinkle,
    FadeAway,
    FastTwinkle,
    StayOn,
}

impl Effect {
    /// Every effect, in the order used by [`Effect::current`].
    pub const ALL: [Effect; 7] = [
        Effect::Wave,
        Effect::Phase,
        Effect::PhasedFadeAway,
        Effect::PhasedTwinkle,
        Effect::FadeAway,
        Effect::FastTwinkle,
        Effect::StayOn,
    ];

    pub const fn pattern(self) -> PatternMask {
        match self {
            Effect::Wave => PatternMask::WAVE,
            Effect::Phase => PatternMask::PHASE,
            Effect::PhasedFadeAway => PatternMask::PHASED_FADE_AWAY,
            Effect::PhasedTwinkle => PatternMask::PHASED_TWINKLE,
            Effect::FadeAway => PatternMask::FADE_AWAY,
            Effect::FastTwinkle => PatternMask::FAST_TWINKLE,
            Effect::StayOn => PatternMask::STAY_ON,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Effect::Wave => "wave",
            Effect::Phase => "phase",
            Effect::PhasedFadeAway => "phased fade away",
            Effect::PhasedTwinkle => "phased twinkle",
            Effect::FadeAway => "fade away",
            Effect::FastTwinkle => "fast twinkle",
            Effect::StayOn => "stay on",
        }
    }

    /// First active effect in [`Effect::ALL`] order.
    ///
    /// An empty mask has no effect to report; `StayOn` is returned so callers
    /// always get a member of the effect list.
    pub fn current(mask: PatternMask) -> Effect {
        Effect::ALL
            .into_iter()
            .find(|effect| mask.intersects(effect.pattern()))
            .unwrap_or(Effect::StayOn)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown effect name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEffect(pub String);

impl fmt::Display for UnknownEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown effect '{}'", self.0)
    }
}

impl std::error::Error for UnknownEffect {}

impl FromStr for Effect {
    type Err = UnknownEffect;

    /// Accepts the display names, case-insensitively, with spaces, `_` or `-`
    /// between words (`"fade away"`, `"FADE_AWAY"`, `"fade-away"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        Effect::ALL
            .into_iter()
            .find(|effect| effect.name() == wanted)
            .ok_or_else(|| UnknownEffect(s.to_owned()))
    }
}
