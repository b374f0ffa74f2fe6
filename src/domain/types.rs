//! Shared types for the doorway monitor

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Direction of a confirmed doorway crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

/// Instantaneous logic level of both sensor lines
///
/// `true` means the line is active, after any active-low inversion has
/// been applied by the sensor source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorLevels {
    pub entry_active: bool,
    pub exit_active: bool,
}

impl SensorLevels {
    /// Both lines quiet. Also what a failed read degrades to.
    pub const fn inactive() -> Self {
        Self { entry_active: false, exit_active: false }
    }
}

/// One sample of both lines, stamped at poll time
///
/// Ephemeral: produced once per tick, consumed by the detector, never stored.
#[derive(Debug, Clone, Copy)]
pub struct SensorReading {
    pub entry_active: bool,
    pub exit_active: bool,
    /// Monotonic timestamp used for window/cooldown arithmetic
    pub at: Instant,
    /// Wall-clock timestamp reported in notifications
    pub wall: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(levels: SensorLevels, at: Instant, wall: DateTime<Utc>) -> Self {
        Self { entry_active: levels.entry_active, exit_active: levels.exit_active, at, wall }
    }

    /// Stamp a sample with the current monotonic and wall clocks
    pub fn now(levels: SensorLevels) -> Self {
        Self::new(levels, Instant::now(), Utc::now())
    }
}

/// A confirmed crossing produced by the detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub direction: Direction,
    /// Wall time of the initiating signal
    pub started_at: DateTime<Utc>,
    /// Wall time of the confirming signal
    pub ended_at: DateTime<Utc>,
}

/// Payload delivered to the registered callback URL on each crossing
#[derive(Debug, Clone, Serialize)]
pub struct EventNotification {
    pub direction: Direction,
    pub people_inside: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl EventNotification {
    pub fn from_crossing(crossing: &Crossing, people_inside: u64) -> Self {
        Self {
            direction: crossing.direction,
            people_inside,
            start_time: crossing.started_at,
            end_time: crossing.ended_at,
        }
    }
}
