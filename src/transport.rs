/// Transport seams
///
/// The channels never touch sockets or files themselves. A `Transport`
/// connects, produces raw events on `poll`, and carries stream open/close
/// requests; an `AdminTransport` does the same for the control connection.
/// Implementations must be internally synchronized: the dispatch thread
/// polls while caller threads open and close streams.

use crate::protocol::RawEvent;
use crate::tape::{TapeEntry, TapeTick, TapeWindow};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connect to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    #[error("transport not connected")]
    NotConnected,

    #[error("{0} not supported by this transport")]
    Unsupported(&'static str),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;

pub trait Transport: Send + Sync {
    /// Open the connection. Called once per `start()`; a transport that is
    /// already connected returns `Ok`.
    fn connect(&self, endpoint: &str, identity: &str, binary: bool) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// Wait at most `timeout` for the next event.
    fn poll(&self, timeout: Duration) -> Option<RawEvent>;

    fn disconnect(&self);

    fn open_stream(&self, service: &str, ticker: &str, request_id: u32) -> TransportResult<()>;

    fn close_stream(&self, service: &str, ticker: &str) -> TransportResult<()>;

    fn open_broadcast(&self, service: &str, bds: &str, request_id: u32) -> TransportResult<()>;

    fn close_broadcast(&self, service: &str, bds: &str) -> TransportResult<()>;

    fn is_tape(&self) -> bool {
        false
    }

    /// Returns the direction now in effect (`true` = native reverse order).
    fn set_tape_direction(&self, _reverse: bool) -> TransportResult<bool> {
        Err(TransportError::Unsupported("tape direction"))
    }

    fn query_tape(&self) -> TransportResult<Vec<TapeEntry>> {
        Err(TransportError::Unsupported("tape query"))
    }

    /// Queue replay of every open stream within `window`; each stream ends
    /// with a STREAM_DONE event.
    fn pump_tape(&self, _window: &TapeWindow) -> TransportResult<()> {
        Err(TransportError::Unsupported("tape pump"))
    }

    /// Chronological ticks of one stream within `window`.
    fn snap_tape(
        &self,
        _service: &str,
        _ticker: &str,
        _window: &TapeWindow,
        _timeout: Duration,
    ) -> TransportResult<Vec<TapeTick>> {
        Err(TransportError::Unsupported("tape snap"))
    }
}

/// Control command sent on an admin connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    AddTickers {
        service: String,
        tickers: Vec<String>,
        schema: Option<String>,
    },
    DelTickers {
        service: String,
        tickers: Vec<String>,
        schema: Option<String>,
    },
    RefreshTickers {
        service: String,
        tickers: Vec<String>,
        schema: Option<String>,
    },
    AddBroadcastStream {
        service: String,
        bds: String,
    },
    RefreshAll,
}

pub trait AdminTransport: Send + Sync {
    fn open(&self, endpoint: &str) -> TransportResult<()>;

    fn poll(&self, timeout: Duration) -> Option<RawEvent>;

    fn send(&self, command: AdminCommand) -> TransportResult<()>;

    fn close(&self);
}
