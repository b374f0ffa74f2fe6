//! Domain models - core types for doorway crossing detection
//!
//! This module contains the canonical data types used throughout the system:
//! - `Direction` - which way a confirmed crossing went
//! - `SensorLevels` / `SensorReading` - raw and timestamped sensor samples
//! - `Crossing` - a confirmed entry or exit event
//! - `EventNotification` - the payload delivered to the callback URL

pub mod types;
