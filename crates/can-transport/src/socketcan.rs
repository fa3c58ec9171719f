use crate::{CanFrame, CanId, FrameSource, Result, TransportError};
use socketcan::{CanSocket, EmbeddedFrame, Id, Socket};
use std::io::ErrorKind;
use std::time::{Duration, Instant};
use tracing::debug;

/// SocketCAN backend: reads frames from a kernel CAN interface by name
/// (e.g. "can0"). Bitrate and interface bring-up are the OS's business.
pub struct SocketCanSource {
    interface: String,
    socket: Option<CanSocket>,
}

impl SocketCanSource {
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface).map_err(|err| match err.kind() {
            ErrorKind::NotFound => TransportError::InterfaceNotFound(interface.to_string()),
            _ => TransportError::Io(err.to_string()),
        })?;
        debug!(interface, "socketcan interface opened");
        Ok(Self {
            interface: interface.to_string(),
            socket: Some(socket),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn convert(frame: &socketcan::CanDataFrame) -> Result<CanFrame> {
        let id = match frame.id() {
            Id::Standard(id) => CanId::standard(id.as_raw()),
            Id::Extended(id) => CanId::extended(id.as_raw()),
        }
        .ok_or(TransportError::InvalidFrame("id out of range"))?;
        CanFrame::with_timestamp(id, frame.data(), Instant::now())
            .ok_or(TransportError::InvalidFrame("payload longer than 8 bytes"))
    }
}

impl FrameSource for SocketCanSource {
    fn recv(&mut self, timeout: Duration) -> Result<CanFrame> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        socket
            .set_read_timeout(timeout)
            .map_err(|err| TransportError::Io(err.to_string()))?;
        loop {
            match socket.read_frame() {
                // Remote and error frames carry no telemetry payload.
                Ok(socketcan::CanFrame::Data(frame)) => return Self::convert(&frame),
                Ok(_) => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Err(TransportError::Timeout)
                }
                Err(err) => return Err(TransportError::Io(err.to_string())),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.socket.take().is_some() {
            debug!(interface = %self.interface, "socketcan interface closed");
        }
        Ok(())
    }
}
