//! vesc-protocol: codec for the VESC periodic status broadcast
//!
//! A VESC motor controller spreads its telemetry over five independent CAN
//! frames, each on its own identifier and cadence. This crate turns one raw
//! frame into one typed [`StatusFragment`]; it never accumulates state.
//! Reassembling the fragments into a whole snapshot is the aggregator's job
//! in `vesc-telemetry`.
//!
//! Frame layouts are byte-exact to what the controller puts on the wire:
//! little-endian integers at fixed offsets, scaled by fixed decimal factors
//! into physical units. The decoder does not clamp; out-of-range values are
//! a presentation concern.

mod fragment;
pub use fragment::{StatusFragment, StatusKind};

mod error;
pub use error::DecodeError;

mod decode;
pub use decode::decode_frame;

pub mod encode;

/// Scale factors applied to the raw wire integers.
pub mod scale {
    /// MOSFET temperature, 0.1 °C per count.
    pub const TEMP: f64 = 0.1;
    /// Motor current, 0.1 A per count.
    pub const CURRENT: f64 = 0.1;
    /// Duty cycle, 0.001 per count (0..=1000 on the wire).
    pub const DUTY: f64 = 0.001;
    /// Battery voltage, 0.1 V per count.
    pub const VOLTAGE: f64 = 0.1;
    /// Amp-hours, 0.0001 Ah per count.
    pub const AMP_HOURS: f64 = 0.0001;
    /// Watt-hours, 0.0001 Wh per count.
    pub const WATT_HOURS: f64 = 0.0001;
}
