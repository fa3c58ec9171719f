use serde::{Deserialize, Serialize};
use std::time::Instant;
use vesc_protocol::StatusKind;

/// Identifier for one stored snapshot field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    Rpm,
    Voltage,
    MotorCurrent,
    BatteryCurrent,
    TempMosfet,
    Duty,
    AmpHoursConsumed,
    AmpHoursCharged,
    WattHoursConsumed,
    WattHoursCharged,
    Tachometer,
    TachometerAbs,
    FaultCode,
}

impl Field {
    pub const COUNT: usize = 13;

    pub const ALL: [Field; Self::COUNT] = [
        Field::Rpm,
        Field::Voltage,
        Field::MotorCurrent,
        Field::BatteryCurrent,
        Field::TempMosfet,
        Field::Duty,
        Field::AmpHoursConsumed,
        Field::AmpHoursCharged,
        Field::WattHoursConsumed,
        Field::WattHoursCharged,
        Field::Tachometer,
        Field::TachometerAbs,
        Field::FaultCode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Rpm => "rpm",
            Field::Voltage => "voltage",
            Field::MotorCurrent => "motor_current",
            Field::BatteryCurrent => "battery_current",
            Field::TempMosfet => "temp_mosfet",
            Field::Duty => "duty",
            Field::AmpHoursConsumed => "amp_hours_consumed",
            Field::AmpHoursCharged => "amp_hours_charged",
            Field::WattHoursConsumed => "watt_hours_consumed",
            Field::WattHoursCharged => "watt_hours_charged",
            Field::Tachometer => "tachometer",
            Field::TachometerAbs => "tachometer_abs",
            Field::FaultCode => "fault_code",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of fields that differ between two consecutive snapshots.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChangeSet {
    bits: u16,
}

impl ChangeSet {
    pub fn insert(&mut self, field: Field) {
        self.bits |= field.bit();
    }

    pub fn contains(self, field: Field) -> bool {
        self.bits & field.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn len(self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |field| self.contains(*field))
    }

    /// Snake-case names of the changed fields, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Field::name).collect()
    }
}

/// Kinematic constants needed to turn RPM into road speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    /// Driven wheel diameter in meters (13" kart wheel by default).
    pub wheel_diameter_m: f64,
    /// Motor-to-wheel reduction; 1.0 for direct drive.
    pub gear_ratio: f64,
    /// Motor velocity constant in RPM per volt.
    pub motor_kv: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            wheel_diameter_m: 0.330,
            gear_ratio: 1.0,
            motor_kv: 130.0,
        }
    }
}

/// The merged telemetry state at a point in time.
///
/// Stored fields hold the most recent decoded value for their owning frame
/// kind; kinds never seen leave their fields at zero and stale. Derived
/// quantities are methods so they can never go inconsistent with their
/// inputs.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub rpm: i32,
    pub voltage: f64,
    pub motor_current: f64,
    pub battery_current: f64,
    pub temp_mosfet: f64,
    pub duty: f64,
    pub amp_hours_consumed: f64,
    pub amp_hours_charged: f64,
    pub watt_hours_consumed: f64,
    pub watt_hours_charged: f64,
    pub tachometer: i32,
    pub tachometer_abs: i32,
    pub fault_code: u8,
    #[serde(skip)]
    freshness: [Option<Instant>; StatusKind::COUNT],
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            rpm: 0,
            voltage: 0.0,
            motor_current: 0.0,
            battery_current: 0.0,
            temp_mosfet: 0.0,
            duty: 0.0,
            amp_hours_consumed: 0.0,
            amp_hours_charged: 0.0,
            watt_hours_consumed: 0.0,
            watt_hours_charged: 0.0,
            tachometer: 0,
            tachometer_abs: 0,
            fault_code: 0,
            freshness: [None; StatusKind::COUNT],
        }
    }
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrival stamp of the last frame merged for `kind`, if any.
    pub fn last_update(&self, kind: StatusKind) -> Option<Instant> {
        self.freshness[kind.index()]
    }

    /// A kind is stale until its first frame has been merged.
    pub fn is_stale(&self, kind: StatusKind) -> bool {
        self.freshness[kind.index()].is_none()
    }

    pub(crate) fn mark_fresh(&mut self, kind: StatusKind, at: Instant) {
        self.freshness[kind.index()] = Some(at);
    }

    /// Instantaneous electrical power in W, battery side.
    pub fn power(&self) -> f64 {
        self.voltage * self.battery_current
    }

    /// Drive efficiency estimate in percent. Near zero power the quotient
    /// is meaningless, so it pins to 0.0 rather than divide by nothing.
    pub fn efficiency(&self) -> f64 {
        let power = self.power();
        if power.abs() < 1e-6 {
            0.0
        } else {
            self.motor_current * self.voltage / power * 100.0
        }
    }

    /// Road speed in km/h for the given drive-train geometry.
    pub fn speed_kph(&self, params: &VehicleParams) -> f64 {
        let wheel_circumference = std::f64::consts::PI * params.wheel_diameter_m;
        let speed_ms = f64::from(self.rpm) / params.gear_ratio * wheel_circumference / 60.0;
        speed_ms * 3.6
    }
}
