//! Dual-sensor crossing detection
//!
//! Correlates the two doorway lines into discrete entry/exit events. The
//! entry line firing first with the exit line confirming inside the
//! correlation window counts one entry; the mirrored order counts one
//! exit. After a confirmed event the debounce gate pauses all evaluation
//! for the cooldown period.

use crate::domain::types::{Crossing, Direction, SensorReading};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::debug;

/// Suppresses re-triggering for a quiet period after a confirmed event.
///
/// While closed the detector performs no transition work at all, so a
/// crossing that begins inside the cooldown is dropped, not deferred.
#[derive(Debug)]
pub struct DebounceGate {
    cooldown: Duration,
    last_event: Option<Instant>,
}

impl DebounceGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_event: None }
    }

    /// True once the cooldown since the last confirmed event has elapsed
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_event {
            None => true,
            Some(last) => now.duration_since(last) >= self.cooldown,
        }
    }

    /// Record a confirmed event at `now`, closing the gate
    pub fn arm(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_event = None;
    }
}

/// First signal of an in-progress correlation
#[derive(Debug, Clone, Copy)]
struct PendingTrigger {
    direction: Direction,
    at: Instant,
    wall: DateTime<Utc>,
}

impl PendingTrigger {
    fn from_reading(direction: Direction, reading: &SensorReading) -> Self {
        Self { direction, at: reading.at, wall: reading.wall }
    }
}

#[derive(Debug, Clone, Copy)]
enum CrossingState {
    Idle,
    /// Entry line fired; awaiting the exit line inside the window
    WaitingExit(PendingTrigger),
    /// Exit line fired; awaiting the entry line inside the window
    WaitingEntry(PendingTrigger),
}

/// The doorway crossing state machine
///
/// Single-writer: advanced only from the polling loop, one reading per tick.
/// Emits at most one `Crossing` per physical pass through the doorway.
pub struct CrossingDetector {
    window: Duration,
    gate: DebounceGate,
    state: CrossingState,
}

impl CrossingDetector {
    pub fn new(window: Duration, cooldown: Duration) -> Self {
        Self { window, gate: DebounceGate::new(cooldown), state: CrossingState::Idle }
    }

    /// Drop any pending trigger and reopen the gate
    pub fn reset(&mut self) {
        self.state = CrossingState::Idle;
        self.gate.reset();
    }

    /// Feed one reading; returns a crossing when the confirming signal
    /// lands inside the window.
    pub fn advance(&mut self, reading: &SensorReading) -> Option<Crossing> {
        if !self.gate.is_open(reading.at) {
            return None;
        }

        match self.state {
            CrossingState::Idle => {
                // Entry line wins when both fire on the same tick
                if reading.entry_active {
                    self.begin(Direction::Entry, reading);
                } else if reading.exit_active {
                    self.begin(Direction::Exit, reading);
                }
                None
            }
            CrossingState::WaitingExit(pending) => {
                self.step_waiting(pending, reading.exit_active, reading)
            }
            CrossingState::WaitingEntry(pending) => {
                self.step_waiting(pending, reading.entry_active, reading)
            }
        }
    }

    fn begin(&mut self, direction: Direction, reading: &SensorReading) {
        let pending = PendingTrigger::from_reading(direction, reading);
        self.state = match direction {
            Direction::Entry => CrossingState::WaitingExit(pending),
            Direction::Exit => CrossingState::WaitingEntry(pending),
        };
        debug!(direction = %direction.as_str(), "crossing_pending");
    }

    fn step_waiting(
        &mut self,
        pending: PendingTrigger,
        confirming_active: bool,
        reading: &SensorReading,
    ) -> Option<Crossing> {
        let elapsed = reading.at.duration_since(pending.at);

        if confirming_active && elapsed <= self.window {
            self.state = CrossingState::Idle;
            self.gate.arm(reading.at);
            return Some(Crossing {
                direction: pending.direction,
                started_at: pending.wall,
                ended_at: reading.wall,
            });
        }

        if elapsed > self.window {
            debug!(
                direction = %pending.direction.as_str(),
                elapsed_ms = %elapsed.as_millis(),
                "crossing_window_expired"
            );
            self.state = CrossingState::Idle;
        }

        None
    }
}
