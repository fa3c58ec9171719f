use crate::StatusKind;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized frame id 0x{id:X}")]
    UnrecognizedId { id: u32 },
    #[error("{kind} frame truncated: {len} of {} bytes", .kind.min_payload_len())]
    Truncated { kind: StatusKind, len: u8 },
}
