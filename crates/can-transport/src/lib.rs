//! can-transport: blocking CAN frame sources for the telemetry pipeline
//!
//! A frame source is anything that yields raw CAN frames with a bounded
//! receive timeout: a SocketCAN interface on the vehicle, or the simulator
//! the `vesc-telemetry` crate provides for development without hardware.
//! The rest of the pipeline only ever sees the [`FrameSource`] trait.

mod types;
pub use types::{CanFrame, CanId};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::FrameSource;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socketcan::SocketCanSource;
