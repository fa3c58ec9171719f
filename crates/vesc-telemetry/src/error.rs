use crate::manager::ManagerState;
use can_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("`{op}` is not valid in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: ManagerState,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to spawn receive thread: {0}")]
    Spawn(String),
    #[error("metrics init error: {0}")]
    Metrics(String),
    #[error("receive thread panicked")]
    WorkerPanicked,
}
