use crate::snapshot::{ChangeSet, Field, TelemetrySnapshot};
use vesc_protocol::StatusFragment;

/// Folds status fragments into the single live snapshot.
///
/// Each frame kind owns a disjoint set of snapshot fields; merging a
/// fragment touches exactly that set, so the five kinds can arrive in any
/// order and at any rate without cross-talk. The returned [`ChangeSet`]
/// holds the fields whose value actually differs from the previous
/// snapshot, by exact equality — the values are rescaled wire integers, so
/// an epsilon would only mask repeats.
#[derive(Debug, Default)]
pub struct StatusAggregator {
    snapshot: TelemetrySnapshot,
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live snapshot, owned by the receive loop.
    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn merge(&mut self, fragment: &StatusFragment) -> ChangeSet {
        let mut changed = ChangeSet::default();
        let snapshot = &mut self.snapshot;
        match *fragment {
            StatusFragment::ThermalCurrentDuty {
                temp_mosfet,
                motor_current,
                duty,
                ..
            } => {
                set_f64(&mut snapshot.temp_mosfet, temp_mosfet, Field::TempMosfet, &mut changed);
                set_f64(
                    &mut snapshot.motor_current,
                    motor_current,
                    Field::MotorCurrent,
                    &mut changed,
                );
                set_f64(&mut snapshot.duty, duty, Field::Duty, &mut changed);
            }
            StatusFragment::RpmVoltage { rpm, voltage, .. } => {
                set_i32(&mut snapshot.rpm, rpm, Field::Rpm, &mut changed);
                set_f64(&mut snapshot.voltage, voltage, Field::Voltage, &mut changed);
            }
            StatusFragment::AmpHours { consumed, charged, .. } => {
                set_f64(
                    &mut snapshot.amp_hours_consumed,
                    consumed,
                    Field::AmpHoursConsumed,
                    &mut changed,
                );
                set_f64(
                    &mut snapshot.amp_hours_charged,
                    charged,
                    Field::AmpHoursCharged,
                    &mut changed,
                );
            }
            StatusFragment::WattHours { consumed, charged, .. } => {
                set_f64(
                    &mut snapshot.watt_hours_consumed,
                    consumed,
                    Field::WattHoursConsumed,
                    &mut changed,
                );
                set_f64(
                    &mut snapshot.watt_hours_charged,
                    charged,
                    Field::WattHoursCharged,
                    &mut changed,
                );
            }
            StatusFragment::Tachometer { relative, absolute, .. } => {
                set_i32(&mut snapshot.tachometer, relative, Field::Tachometer, &mut changed);
                set_i32(
                    &mut snapshot.tachometer_abs,
                    absolute,
                    Field::TachometerAbs,
                    &mut changed,
                );
            }
        }
        snapshot.mark_fresh(fragment.kind(), fragment.at());
        changed
    }
}

#[allow(clippy::float_cmp)] // exact equality is the change-detection contract
fn set_f64(slot: &mut f64, value: f64, field: Field, changed: &mut ChangeSet) {
    if *slot != value {
        *slot = value;
        changed.insert(field);
    }
}

fn set_i32(slot: &mut i32, value: i32, field: Field, changed: &mut ChangeSet) {
    if *slot != value {
        *slot = value;
        changed.insert(field);
    }
}
