//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `crossing` - Dual-sensor debounced crossing state machine
//! - `monitor` - Sensor monitoring lifecycle and the polling loop
//! - `recorder` - Continuous camera frame recording

pub mod crossing;
pub mod monitor;
pub mod recorder;

// Re-export commonly used types
pub use crossing::{CrossingDetector, DebounceGate};
pub use monitor::{MonitorController, MonitorTiming, StartOutcome};
pub use recorder::RecorderController;
