//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sensor` - GPIO input for the two doorway lines
//! - `callback` - Fire-and-forget event delivery to the workflow engine
//! - `camera` - Frame capture via an external still-capture command
//! - `photos` - Image directory storage and housekeeping
//! - `http` - HTTP control surface (hyper)

pub mod callback;
pub mod camera;
pub mod http;
pub mod photos;
pub mod sensor;

// Re-export commonly used types
pub use callback::CallbackDispatcher;
pub use camera::{CommandCapture, FrameCapture};
pub use photos::PhotoStore;
pub use sensor::{gpio_factory, GpioSensorSource, SensorFactory, SensorSource};
