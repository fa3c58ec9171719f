use crate::{CanFrame, Result};
use std::time::Duration;

/// A blocking source of raw CAN frames.
///
/// `recv` must return within roughly `timeout`; `Err(Timeout)` means no
/// frame arrived and the handle is still good. Any other error is fatal for
/// this handle and the caller is expected to reopen or give up.
pub trait FrameSource: Send {
    /// Receive the next frame, blocking for at most `timeout`.
    fn recv(&mut self, timeout: Duration) -> Result<CanFrame>;

    /// Release the underlying handle. Receiving after close returns
    /// [`TransportError::Closed`](crate::TransportError::Closed).
    fn close(&mut self) -> Result<()>;
}
