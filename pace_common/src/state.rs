//! State enums for the line tracker, the marker trackers and the run
//! state machine.
//!
//! All enums are `#[repr(u8)]` so they pack into the 96-byte log record
//! unchanged; `from_u8` is the decode path when reading records back.

use serde::{Deserialize, Serialize};

// ─── Line ───────────────────────────────────────────────────────────

/// Line detector state.
///
/// `CrossPassed` is a one-tick pulse: it falls back to `Normal` on the next
/// update unless the crossing condition persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LineState {
    /// No channel responding; waiting out the brown-out window.
    NoneDetecting = 0,
    /// Line lost — brown-out window exceeded.
    None = 1,
    /// Tracking the line normally.
    Normal = 2,
    /// Near-full-width reflectance: a perpendicular crossing under the bar.
    CrossPassing = 3,
    /// Crossing left behind this tick (pulse).
    CrossPassed = 4,
}

impl LineState {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NoneDetecting),
            1 => Some(Self::None),
            2 => Some(Self::Normal),
            3 => Some(Self::CrossPassing),
            4 => Some(Self::CrossPassed),
            _ => None,
        }
    }
}

impl Default for LineState {
    fn default() -> Self {
        Self::Normal
    }
}

// ─── Marker ─────────────────────────────────────────────────────────

/// Per-side marker detector state. `Passed` is a one-tick pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MarkerState {
    /// Suppressed while a crossing line transits the side sensors.
    Ignoring = 0,
    /// Waiting for reflectance above threshold.
    Waiting = 1,
    /// Over a marker strip.
    Passing = 2,
    /// Strip left behind this tick (pulse).
    Passed = 3,
}

impl MarkerState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ignoring),
            1 => Some(Self::Waiting),
            2 => Some(Self::Passing),
            3 => Some(Self::Passed),
            _ => None,
        }
    }
}

impl Default for MarkerState {
    fn default() -> Self {
        Self::Waiting
    }
}

// ─── Run ────────────────────────────────────────────────────────────

/// Run kind selected by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RunMode {
    /// Slow lap recording course geometry and landmarks.
    Explore = 0,
    /// Timed lap tracking the generated velocity profile.
    Fast = 1,
}

/// Top-level run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunState {
    /// Sensors settling; motors idle.
    Resetting = 0,
    /// Armed, waiting for the start marker.
    StartWaiting = 1,
    /// Start marker seen — one tick of bookkeeping.
    Started = 2,
    /// Lap in progress, waiting for the goal marker.
    GoalWaiting = 3,
    /// Goal marker seen — one tick of bookkeeping.
    Goaled = 4,
    /// Braking down to standstill.
    StopWaiting = 5,
    /// Standstill reached; run loop exits here.
    Stopped = 6,
    /// Fault latched; braking like `Goaled` but flagged.
    Emergency = 7,
}

impl RunState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Resetting),
            1 => Some(Self::StartWaiting),
            2 => Some(Self::Started),
            3 => Some(Self::GoalWaiting),
            4 => Some(Self::Goaled),
            5 => Some(Self::StopWaiting),
            6 => Some(Self::Stopped),
            7 => Some(Self::Emergency),
            _ => None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::Resetting
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_state_round_trips_through_u8() {
        for s in [
            LineState::NoneDetecting,
            LineState::None,
            LineState::Normal,
            LineState::CrossPassing,
            LineState::CrossPassed,
        ] {
            assert_eq!(LineState::from_u8(s as u8), Some(s));
        }
        assert_eq!(LineState::from_u8(5), None);
    }

    #[test]
    fn marker_state_round_trips_through_u8() {
        for s in [
            MarkerState::Ignoring,
            MarkerState::Waiting,
            MarkerState::Passing,
            MarkerState::Passed,
        ] {
            assert_eq!(MarkerState::from_u8(s as u8), Some(s));
        }
        assert_eq!(MarkerState::from_u8(4), None);
    }

    #[test]
    fn run_state_round_trips_through_u8() {
        for v in 0..=7u8 {
            let s = RunState::from_u8(v).unwrap();
            assert_eq!(s as u8, v);
        }
        assert_eq!(RunState::from_u8(8), None);
    }

    #[test]
    fn defaults_match_reset_values() {
        assert_eq!(LineState::default(), LineState::Normal);
        assert_eq!(MarkerState::default(), MarkerState::Waiting);
        assert_eq!(RunState::default(), RunState::Resetting);
    }
}
