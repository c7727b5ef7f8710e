/// MDDirect Channels - Market Data Subscription and Last Value Cache
///
/// Client-side plumbing for an rtEdgeCache3-style tick distribution service.
/// Features include:
/// - Subscription channel with a dedicated dispatch thread and readiness rendezvous
/// - Watchlist keyed by service|ticker and by request id under one lock
/// - Automatic re-open of streams when a service comes back up
/// - Recorded tape replay, bulk slices and tape queries
/// - Admin channel for ticker add/delete/refresh with ACK/NAK confirmation
/// - Last Value Cache snapshots through the same Message container
/// - Per-kind event counters and dispatch latency statistics

pub mod admin;
pub mod callbacks;
pub mod config;
pub mod decoder;
pub mod error;
pub mod field;
pub mod loopback;
pub mod lvc;
pub mod message;
pub mod protocol;
pub mod recovery;
pub mod schema;
pub mod signal;
pub mod stats;
pub mod subscriber;
pub mod tape;
pub mod transport;
pub mod watchlist;

pub use admin::AdminChannel;
pub use callbacks::{AdminCallbacks, SubscriberCallbacks};
pub use config::{AdminConfig, Endpoint, SubscriberConfig};
pub use decoder::{DecodeError, Decoder, Event, StreamHeader};
pub use error::{ChannelError, ChannelResult, LvcError, LvcResult};
pub use field::{Fid, Field, FieldError, FieldType, FieldValue, RawField};
pub use loopback::{LoopbackAdmin, LoopbackTransport, StreamRequest};
pub use lvc::{Lvc, MemoryFile, MemoryStore, Store, StoredRecord};
pub use message::{Message, UserArg};
pub use protocol::{AdminReply, EventKind, LinkState, RawEvent, Value};
pub use recovery::ServiceMonitor;
pub use schema::{Schema, SchemaEntry};
pub use stats::{ChannelStats, LatencyStats};
pub use subscriber::{ChannelState, SubscriptionChannel};
pub use tape::{MemoryTape, TapeEntry, TapeSlice, TapeSliceQuery, TapeTick, TapeTime, TapeTransport, TapeWindow};
pub use transport::{AdminCommand, AdminTransport, Transport, TransportError, TransportResult};
pub use watchlist::{OpenState, Record, RequestId, StreamKind, Watchlist};
