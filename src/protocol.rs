/// Event kinds and positional payloads exchanged with a transport
///
/// A transport hands the dispatch loop `(kind, payload)` pairs:
///
///   UPDATE      = (updateTime, requestId, service, ticker, aggregate, field*)
///                 field = (fid, rawValue, typeEnum)
///   BYTE_STREAM = (updateTime, requestId, service, ticker, bytes)
///   STATUS / RECOVERING / STREAM_DONE
///               = (updateTime, requestId, service, ticker, statusText)
///   SYMBOL      = (updateTime, requestId, service, bdsName, symbol)
///   CONNECT     = "UP|message" | "DOWN|message"
///   SERVICE     = "UP|svc" | "DOWN|svc"
///   SCHEMA      = [(fid, name[, type]), ...]
///   ADMIN       = "ACK|ADD|svc|tkr" | "NAK|DEL|svc|tkr" | ...

use crate::field::{FieldType, FieldValue, RawField};
use crate::schema::SchemaEntry;
use std::fmt;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect = 0x0001,
    Service = 0x0002,
    Update = 0x0004,
    Status = 0x0008,
    Schema = 0x0010,
    ByteStream = 0x0400,
    Recovering = 0x0800,
    StreamDone = 0x1000,
    Symbol = 0x2000,
    Admin = 0x4000,
}

/// Number of distinct event kinds
pub const EVENT_KINDS: usize = 10;

impl EventKind {
    pub const ALL: [EventKind; EVENT_KINDS] = [
        EventKind::Connect,
        EventKind::Service,
        EventKind::Update,
        EventKind::Status,
        EventKind::Schema,
        EventKind::ByteStream,
        EventKind::Recovering,
        EventKind::StreamDone,
        EventKind::Symbol,
        EventKind::Admin,
    ];

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0001 => Some(EventKind::Connect),
            0x0002 => Some(EventKind::Service),
            0x0004 => Some(EventKind::Update),
            0x0008 => Some(EventKind::Status),
            0x0010 => Some(EventKind::Schema),
            0x0400 => Some(EventKind::ByteStream),
            0x0800 => Some(EventKind::Recovering),
            0x1000 => Some(EventKind::StreamDone),
            0x2000 => Some(EventKind::Symbol),
            0x4000 => Some(EventKind::Admin),
            _ => None,
        }
    }

    /// Dense index for per-kind counters
    pub fn index(&self) -> usize {
        match self {
            EventKind::Connect => 0,
            EventKind::Service => 1,
            EventKind::Update => 2,
            EventKind::Status => 3,
            EventKind::Schema => 4,
            EventKind::ByteStream => 5,
            EventKind::Recovering => 6,
            EventKind::StreamDone => 7,
            EventKind::Symbol => 8,
            EventKind::Admin => 9,
        }
    }
}

/// One positional payload element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }
}

impl From<&FieldValue> for Value {
    fn from(v: &FieldValue) -> Self {
        match v {
            FieldValue::Empty => Value::Null,
            FieldValue::Int(i) => Value::Int(*i),
            FieldValue::Double(d) => Value::Double(*d),
            FieldValue::Str(s) => Value::Str(s.clone()),
            FieldValue::Bytes(b) => Value::Bytes(b.clone()),
            FieldValue::Vector(v) => Value::List(v.iter().map(|d| Value::Double(*d)).collect()),
        }
    }
}

/// Undecoded event as produced by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: u16,
    pub payload: Value,
}

fn header(update_time: f64, request_id: u32, service: &str, ticker: &str) -> Vec<Value> {
    vec![
        Value::Double(update_time),
        Value::Int(request_id as i64),
        Value::str(service),
        Value::str(ticker),
    ]
}

impl RawEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        RawEvent {
            kind: kind as u16,
            payload,
        }
    }

    pub fn update(
        update_time: f64,
        request_id: u32,
        service: &str,
        ticker: &str,
        fields: &[RawField],
    ) -> Self {
        let mut v = header(update_time, request_id, service, ticker);
        v.push(Value::Int(0));
        v.extend(fields.iter().map(|f| {
            Value::List(vec![
                Value::Int(f.fid as i64),
                Value::from(&f.value),
                Value::Int(f.ty as i64),
            ])
        }));
        RawEvent::new(EventKind::Update, Value::List(v))
    }

    pub fn byte_stream(update_time: f64, request_id: u32, service: &str, ticker: &str, data: &[u8]) -> Self {
        let mut v = header(update_time, request_id, service, ticker);
        v.push(Value::Bytes(data.to_vec()));
        RawEvent::new(EventKind::ByteStream, Value::List(v))
    }

    /// STATUS, RECOVERING or STREAM_DONE
    pub fn status(
        kind: EventKind,
        update_time: f64,
        request_id: u32,
        service: &str,
        ticker: &str,
        text: &str,
    ) -> Self {
        let mut v = header(update_time, request_id, service, ticker);
        v.push(Value::str(text));
        RawEvent::new(kind, Value::List(v))
    }

    pub fn symbol(update_time: f64, request_id: u32, service: &str, bds: &str, symbol: &str) -> Self {
        let mut v = header(update_time, request_id, service, bds);
        v.push(Value::str(symbol));
        RawEvent::new(EventKind::Symbol, Value::List(v))
    }

    pub fn connect(state: LinkState, text: &str) -> Self {
        RawEvent::new(EventKind::Connect, Value::Str(format!("{}|{}", state, text)))
    }

    pub fn service(state: LinkState, service: &str) -> Self {
        RawEvent::new(EventKind::Service, Value::Str(format!("{}|{}", state, service)))
    }

    pub fn schema(entries: &[SchemaEntry]) -> Self {
        let list = entries
            .iter()
            .map(|e| {
                let mut kv = vec![Value::Int(e.fid as i64), Value::str(e.name.as_str())];
                if let Some(ty) = e.ty {
                    kv.push(Value::Int(ty as i64));
                }
                Value::List(kv)
            })
            .collect();
        RawEvent::new(EventKind::Schema, Value::List(list))
    }

    pub fn admin(reply: &AdminReply) -> Self {
        RawEvent::new(EventKind::Admin, Value::Str(reply.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub fn is_up(&self) -> bool {
        *self == LinkState::Up
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "UP" => Some(LinkState::Up),
            "DOWN" => Some(LinkState::Down),
            _ => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_up() { "UP" } else { "DOWN" })
    }
}

/// Split `"STATE|text"`; both halves trimmed.
pub fn parse_link(text: &str) -> Option<(LinkState, &str)> {
    let (state, rest) = text.split_once('|')?;
    Some((LinkState::parse(state)?, rest.trim()))
}

/// ACK/NAK confirmation from an admin channel. Correlated only by
/// `(add, service, ticker)`; overlapping add and delete of one key cannot
/// be told apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    pub ack: bool,
    pub add: bool,
    pub service: String,
    pub ticker: String,
}

impl AdminReply {
    pub fn parse(text: &str) -> Option<Self> {
        let mut it = text.split('|').map(str::trim);
        let ack = match it.next()? {
            "ACK" => true,
            "NAK" => false,
            _ => return None,
        };
        let add = match it.next()? {
            "ADD" => true,
            "DEL" => false,
            _ => return None,
        };
        let service = it.next()?.to_string();
        let ticker = it.next()?.to_string();
        if it.next().is_some() {
            return None;
        }
        Some(AdminReply {
            ack,
            add,
            service,
            ticker,
        })
    }
}

impl fmt::Display for AdminReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            if self.ack { "ACK" } else { "NAK" },
            if self.add { "ADD" } else { "DEL" },
            self.service,
            self.ticker
        )
    }
}

/// Field type carried as `typeEnum`; unknown codes read as UNDEF.
pub fn field_type_of(code: i64) -> FieldType {
    FieldType::from_i64(code).unwrap_or(FieldType::Undef)
}
