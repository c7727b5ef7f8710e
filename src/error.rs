/// Channel and LVC errors

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("channel not started")]
    NotStarted,

    #[error("channel already running")]
    AlreadyRunning,

    #[error("dispatch thread panicked")]
    DispatchPanicked,

    #[error("invalid tape time: {0:?}")]
    InvalidTime(String),

    #[error("dispatch thread could not be spawned: {0}")]
    Spawn(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LvcError {
    #[error("LVC not open")]
    NotOpen,

    #[error("LVC {path}: {reason}")]
    Store { path: String, reason: String },
}

pub type LvcResult<T> = Result<T, LvcError>;
