use crate::{scale, DecodeError, StatusFragment, StatusKind};
use can_transport::CanFrame;

/// Decode one raw frame into a typed status fragment.
///
/// Pure and total: either the whole fragment is well-formed or an error
/// comes back, with no other effect. Unknown identifiers and short payloads
/// are the caller's to count and skip; neither may stop a receive loop.
pub fn decode_frame(frame: &CanFrame) -> Result<StatusFragment, DecodeError> {
    let kind = StatusKind::from_id(frame.id.raw())
        .ok_or(DecodeError::UnrecognizedId { id: frame.id.raw() })?;
    let data = frame.payload();
    if data.len() < kind.min_payload_len() {
        return Err(DecodeError::Truncated {
            kind,
            len: frame.len,
        });
    }
    let at = frame.received;
    let fragment = match kind {
        StatusKind::ThermalCurrentDuty => StatusFragment::ThermalCurrentDuty {
            temp_mosfet: f64::from(i16::from_le_bytes([data[0], data[1]])) * scale::TEMP,
            motor_current: f64::from(i16::from_le_bytes([data[2], data[3]])) * scale::CURRENT,
            duty: f64::from(data[4]) * scale::DUTY,
            at,
        },
        StatusKind::RpmVoltage => StatusFragment::RpmVoltage {
            rpm: i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            voltage: f64::from(u16::from_le_bytes([data[4], data[5]])) * scale::VOLTAGE,
            at,
        },
        StatusKind::AmpHours => StatusFragment::AmpHours {
            consumed: f64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]]))
                * scale::AMP_HOURS,
            charged: f64::from(i32::from_le_bytes([data[4], data[5], data[6], data[7]]))
                * scale::AMP_HOURS,
            at,
        },
        StatusKind::WattHours => StatusFragment::WattHours {
            consumed: f64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]]))
                * scale::WATT_HOURS,
            charged: f64::from(i32::from_le_bytes([data[4], data[5], data[6], data[7]]))
                * scale::WATT_HOURS,
            at,
        },
        StatusKind::Tachometer => StatusFragment::Tachometer {
            relative: i32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            absolute: i32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            at,
        },
    };
    Ok(fragment)
}
