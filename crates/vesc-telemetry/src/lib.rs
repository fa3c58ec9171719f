//! vesc-telemetry: merges the VESC status broadcast into one live snapshot
//!
//! The pipeline is receive → decode → merge → publish. A single background
//! thread owns the receive loop and is the only writer of the snapshot;
//! everyone else reads a published copy or subscribes for change
//! notifications. The frame source behind the loop is either a SocketCAN
//! interface or the deterministic simulator in this crate, and nothing
//! downstream can tell which.

mod snapshot;
pub use snapshot::{ChangeSet, Field, TelemetrySnapshot, VehicleParams};

mod aggregator;
pub use aggregator::StatusAggregator;

mod publisher;
pub use publisher::{SubscriptionId, TelemetryObserver, TelemetryPublisher};

mod simulator;
pub use simulator::{SimulatorConfig, ThrottleProfile, VirtualSource};

mod manager;
pub use manager::{ManagerConfig, ManagerState, SourceConfig, TelemetryManager};

mod metrics;
pub use metrics::TelemetryMetrics;

mod error;
pub use error::ManagerError;

pub use can_transport::{CanFrame, CanId, FrameSource, TransportError};
pub use vesc_protocol::{decode_frame, DecodeError, StatusFragment, StatusKind};
