use core::fmt;
use std::time::Instant;

/// The five recognized status frame kinds, keyed by CAN identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StatusKind {
    /// 0x02: MOSFET temperature, motor current, duty cycle.
    ThermalCurrentDuty,
    /// 0x03: motor RPM and battery voltage.
    RpmVoltage,
    /// 0x04: amp-hours consumed and charged.
    AmpHours,
    /// 0x05: watt-hours consumed and charged.
    WattHours,
    /// 0x06: relative and absolute tachometer counts.
    Tachometer,
}

impl StatusKind {
    pub const COUNT: usize = 5;

    pub const ALL: [StatusKind; Self::COUNT] = [
        StatusKind::ThermalCurrentDuty,
        StatusKind::RpmVoltage,
        StatusKind::AmpHours,
        StatusKind::WattHours,
        StatusKind::Tachometer,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0x02 => Some(StatusKind::ThermalCurrentDuty),
            0x03 => Some(StatusKind::RpmVoltage),
            0x04 => Some(StatusKind::AmpHours),
            0x05 => Some(StatusKind::WattHours),
            0x06 => Some(StatusKind::Tachometer),
            _ => None,
        }
    }

    pub fn frame_id(self) -> u32 {
        match self {
            StatusKind::ThermalCurrentDuty => 0x02,
            StatusKind::RpmVoltage => 0x03,
            StatusKind::AmpHours => 0x04,
            StatusKind::WattHours => 0x05,
            StatusKind::Tachometer => 0x06,
        }
    }

    /// Bytes the decoder must be able to read for this kind. The thermal
    /// frame leaves its top three bytes unused; the rest fill all eight.
    pub fn min_payload_len(self) -> usize {
        match self {
            StatusKind::ThermalCurrentDuty => 5,
            _ => 8,
        }
    }

    /// Stable index, used for per-kind freshness tables.
    pub fn index(self) -> usize {
        match self {
            StatusKind::ThermalCurrentDuty => 0,
            StatusKind::RpmVoltage => 1,
            StatusKind::AmpHours => 2,
            StatusKind::WattHours => 3,
            StatusKind::Tachometer => 4,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusKind::ThermalCurrentDuty => "thermal_current_duty",
            StatusKind::RpmVoltage => "rpm_voltage",
            StatusKind::AmpHours => "amp_hours",
            StatusKind::WattHours => "watt_hours",
            StatusKind::Tachometer => "tachometer",
        };
        f.write_str(name)
    }
}

/// Decoded content of a single status frame, already in physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StatusFragment {
    ThermalCurrentDuty {
        /// MOSFET temperature in °C.
        temp_mosfet: f64,
        /// Motor phase current in A.
        motor_current: f64,
        /// Duty cycle, 0.0..=1.0 nominal.
        duty: f64,
        at: Instant,
    },
    RpmVoltage {
        rpm: i32,
        /// Battery voltage in V.
        voltage: f64,
        at: Instant,
    },
    AmpHours {
        consumed: f64,
        charged: f64,
        at: Instant,
    },
    WattHours {
        consumed: f64,
        charged: f64,
        at: Instant,
    },
    Tachometer {
        relative: i32,
        absolute: i32,
        at: Instant,
    },
}

impl StatusFragment {
    pub fn kind(&self) -> StatusKind {
        match self {
            StatusFragment::ThermalCurrentDuty { .. } => StatusKind::ThermalCurrentDuty,
            StatusFragment::RpmVoltage { .. } => StatusKind::RpmVoltage,
            StatusFragment::AmpHours { .. } => StatusKind::AmpHours,
            StatusFragment::WattHours { .. } => StatusKind::WattHours,
            StatusFragment::Tachometer { .. } => StatusKind::Tachometer,
        }
    }

    /// Arrival stamp of the frame this fragment was decoded from.
    pub fn at(&self) -> Instant {
        match *self {
            StatusFragment::ThermalCurrentDuty { at, .. }
            | StatusFragment::RpmVoltage { at, .. }
            | StatusFragment::AmpHours { at, .. }
            | StatusFragment::WattHours { at, .. }
            | StatusFragment::Tachometer { at, .. } => at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_mapping_round_trips() {
        for kind in StatusKind::ALL {
            assert_eq!(StatusKind::from_id(kind.frame_id()), Some(kind));
        }
        assert_eq!(StatusKind::from_id(0x01), None);
        assert_eq!(StatusKind::from_id(0x07), None);
    }

    #[test]
    fn indices_are_dense_and_unique() {
        let mut seen = [false; StatusKind::COUNT];
        for kind in StatusKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }
}
