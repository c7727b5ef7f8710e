/// Event decoder
///
/// Turns the positional `(kind, payload)` pairs a transport produces into
/// typed `Event`s. Payloads are consumed, so strings and field values move
/// into the event without copying.

use crate::field::{FieldValue, RawField};
use crate::protocol::*;
use crate::schema::SchemaEntry;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid event kind: {0:#06x}")]
    InvalidEventKind(u16),

    #[error("{kind:?} payload is not a tuple")]
    NotATuple { kind: EventKind },

    #[error("{kind:?} payload too short: need {need} elements, have {have}")]
    Arity { kind: EventKind, need: usize, have: usize },

    #[error("{kind:?} element {index}: expected {expected}")]
    BadElement {
        kind: EventKind,
        index: usize,
        expected: &'static str,
    },

    #[error("{kind:?} malformed text: {text:?}")]
    MalformedText { kind: EventKind, text: String },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Common `(updateTime, requestId, service, ticker)` prefix
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamHeader {
    pub update_time: f64,
    pub request_id: u32,
    pub service: String,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Update {
        header: StreamHeader,
        aggregate: i64,
        fields: Vec<RawField>,
    },
    ByteStream {
        header: StreamHeader,
        data: Vec<u8>,
    },
    Status {
        header: StreamHeader,
        text: String,
    },
    Recovering {
        header: StreamHeader,
        text: String,
    },
    StreamDone {
        header: StreamHeader,
        text: String,
    },
    /// `header.ticker` is the BDS name
    Symbol {
        header: StreamHeader,
        symbol: String,
    },
    Connect {
        state: LinkState,
        text: String,
    },
    Service {
        state: LinkState,
        service: String,
    },
    Schema(Vec<SchemaEntry>),
    Admin(AdminReply),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Update { .. } => EventKind::Update,
            Event::ByteStream { .. } => EventKind::ByteStream,
            Event::Status { .. } => EventKind::Status,
            Event::Recovering { .. } => EventKind::Recovering,
            Event::StreamDone { .. } => EventKind::StreamDone,
            Event::Symbol { .. } => EventKind::Symbol,
            Event::Connect { .. } => EventKind::Connect,
            Event::Service { .. } => EventKind::Service,
            Event::Schema(_) => EventKind::Schema,
            Event::Admin(_) => EventKind::Admin,
        }
    }

    pub fn header(&self) -> Option<&StreamHeader> {
        match self {
            Event::Update { header, .. }
            | Event::ByteStream { header, .. }
            | Event::Status { header, .. }
            | Event::Recovering { header, .. }
            | Event::StreamDone { header, .. }
            | Event::Symbol { header, .. } => Some(header),
            _ => None,
        }
    }
}

/// Positional reader over one tuple payload
struct Elements {
    kind: EventKind,
    items: std::vec::IntoIter<Value>,
    index: usize,
}

impl Elements {
    fn new(kind: EventKind, payload: Value, need: usize) -> DecodeResult<Self> {
        let items = match payload {
            Value::List(v) => v,
            _ => return Err(DecodeError::NotATuple { kind }),
        };
        if items.len() < need {
            return Err(DecodeError::Arity {
                kind,
                need,
                have: items.len(),
            });
        }
        Ok(Elements {
            kind,
            items: items.into_iter(),
            index: 0,
        })
    }

    fn bad(&self, expected: &'static str) -> DecodeError {
        DecodeError::BadElement {
            kind: self.kind,
            index: self.index,
            expected,
        }
    }

    fn next(&mut self) -> Option<Value> {
        let v = self.items.next();
        self.index += 1;
        v
    }

    fn f64(&mut self) -> DecodeResult<f64> {
        match self.next() {
            Some(Value::Double(d)) => Ok(d),
            Some(Value::Int(i)) => Ok(i as f64),
            _ => Err(self.bad("number")),
        }
    }

    fn int(&mut self) -> DecodeResult<i64> {
        match self.next() {
            Some(Value::Int(i)) => Ok(i),
            _ => Err(self.bad("integer")),
        }
    }

    fn string(&mut self) -> DecodeResult<String> {
        match self.next() {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(self.bad("string")),
        }
    }

    fn header(&mut self) -> DecodeResult<StreamHeader> {
        let update_time = self.f64()?;
        let request_id = self.int()?;
        let request_id = u32::try_from(request_id).map_err(|_| self.bad("request id"))?;
        Ok(StreamHeader {
            update_time,
            request_id,
            service: self.string()?,
            ticker: self.string()?,
        })
    }
}

fn field_value(v: Value) -> Option<FieldValue> {
    Some(match v {
        Value::Null => FieldValue::Empty,
        Value::Int(i) => FieldValue::Int(i),
        Value::Double(d) => FieldValue::Double(d),
        Value::Str(s) => FieldValue::Str(s),
        Value::Bytes(b) => FieldValue::Bytes(b),
        Value::List(items) => {
            let mut vec = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Double(d) => vec.push(d),
                    Value::Int(i) => vec.push(i as f64),
                    _ => return None,
                }
            }
            FieldValue::Vector(vec)
        }
    })
}

fn raw_field(v: Value) -> Option<RawField> {
    let Value::List(kv) = v else {
        return None;
    };
    let mut it = kv.into_iter();
    let fid = match it.next()? {
        Value::Int(i) => i32::try_from(i).ok()?,
        _ => return None,
    };
    let value = field_value(it.next()?)?;
    let ty = match it.next() {
        Some(Value::Int(code)) => field_type_of(code),
        Some(_) => return None,
        None => field_type_of(0),
    };
    Some(RawField { fid, value, ty })
}

fn schema_entry(v: Value) -> Option<SchemaEntry> {
    let Value::List(kv) = v else {
        return None;
    };
    let mut it = kv.into_iter();
    let fid = match it.next()? {
        Value::Int(i) => i32::try_from(i).ok()?,
        _ => return None,
    };
    let name = match it.next()? {
        Value::Str(s) => s,
        _ => return None,
    };
    let ty = match it.next() {
        Some(Value::Int(code)) => Some(field_type_of(code)),
        _ => None,
    };
    Some(SchemaEntry { fid, name, ty })
}

/// Stateless decoder
pub struct Decoder;

impl Decoder {
    pub fn decode(raw: RawEvent) -> DecodeResult<Event> {
        let kind = EventKind::from_u16(raw.kind).ok_or(DecodeError::InvalidEventKind(raw.kind))?;
        match kind {
            EventKind::Update => {
                let mut el = Elements::new(kind, raw.payload, 5)?;
                let header = el.header()?;
                let aggregate = el.int()?;
                let mut fields = Vec::with_capacity(el.items.len());
                while let Some(v) = el.next() {
                    match raw_field(v) {
                        Some(f) => fields.push(f),
                        None => return Err(el.bad("(fid, value, type)")),
                    }
                }
                Ok(Event::Update {
                    header,
                    aggregate,
                    fields,
                })
            }
            EventKind::ByteStream => {
                let mut el = Elements::new(kind, raw.payload, 5)?;
                let header = el.header()?;
                let data = match el.next() {
                    Some(Value::Bytes(b)) => b,
                    Some(Value::Str(s)) => s.into_bytes(),
                    _ => return Err(el.bad("bytes")),
                };
                Ok(Event::ByteStream { header, data })
            }
            EventKind::Status | EventKind::Recovering | EventKind::StreamDone | EventKind::Symbol => {
                let mut el = Elements::new(kind, raw.payload, 5)?;
                let header = el.header()?;
                let text = el.string()?;
                Ok(match kind {
                    EventKind::Status => Event::Status { header, text },
                    EventKind::Recovering => Event::Recovering { header, text },
                    EventKind::StreamDone => Event::StreamDone { header, text },
                    _ => Event::Symbol { header, symbol: text },
                })
            }
            EventKind::Connect | EventKind::Service => {
                let text = match raw.payload {
                    Value::Str(s) => s,
                    _ => {
                        return Err(DecodeError::BadElement {
                            kind,
                            index: 0,
                            expected: "STATE|text",
                        })
                    }
                };
                let (state, rest) = parse_link(&text).ok_or_else(|| DecodeError::MalformedText {
                    kind,
                    text: text.clone(),
                })?;
                let rest = rest.to_string();
                Ok(if kind == EventKind::Connect {
                    Event::Connect { state, text: rest }
                } else {
                    Event::Service { state, service: rest }
                })
            }
            EventKind::Schema => {
                let el = Elements::new(kind, raw.payload, 0)?;
                let mut entries = Vec::with_capacity(el.items.len());
                for (index, v) in el.items.enumerate() {
                    let e = schema_entry(v).ok_or(DecodeError::BadElement {
                        kind,
                        index,
                        expected: "(fid, name[, type])",
                    })?;
                    entries.push(e);
                }
                Ok(Event::Schema(entries))
            }
            EventKind::Admin => match raw.payload {
                Value::Str(text) => AdminReply::parse(&text)
                    .map(Event::Admin)
                    .ok_or(DecodeError::MalformedText { kind, text }),
                _ => Err(DecodeError::BadElement {
                    kind,
                    index: 0,
                    expected: "ACK|ADD|svc|tkr",
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    #[test]
    fn test_decode_update() {
        let raw = RawEvent::update(
            12.5,
            7,
            "bloomberg",
            "IBM US EQUITY",
            &[
                RawField::new(22, FieldValue::Double(101.5), FieldType::Double),
                RawField::new(3, FieldValue::Str("IBM".into()), FieldType::String),
            ],
        );
        let ev = Decoder::decode(raw).unwrap();
        assert_eq!(ev.kind(), EventKind::Update);
        match ev {
            Event::Update { header, fields, .. } => {
                assert_eq!(header.request_id, 7);
                assert_eq!(header.service, "bloomberg");
                assert_eq!(header.update_time, 12.5);
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].value, FieldValue::Str("IBM".into()));
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_invalid_event_kind() {
        let raw = RawEvent {
            kind: 0x0003,
            payload: Value::Null,
        };
        assert!(matches!(Decoder::decode(raw), Err(DecodeError::InvalidEventKind(3))));
    }

    #[test]
    fn test_short_status() {
        let raw = RawEvent::new(
            EventKind::Status,
            Value::List(vec![Value::Double(1.0), Value::Int(1)]),
        );
        assert!(matches!(
            Decoder::decode(raw),
            Err(DecodeError::Arity { need: 5, have: 2, .. })
        ));
    }

    #[test]
    fn test_bad_field_element() {
        let mut payload = vec![
            Value::Double(1.0),
            Value::Int(1),
            Value::str("svc"),
            Value::str("tkr"),
            Value::Int(0),
        ];
        payload.push(Value::str("not a field"));
        let raw = RawEvent::new(EventKind::Update, Value::List(payload));
        assert!(matches!(
            Decoder::decode(raw),
            Err(DecodeError::BadElement { index: 6, .. })
        ));
    }

    #[test]
    fn test_malformed_connect() {
        let raw = RawEvent::new(EventKind::Connect, Value::str("garbage"));
        assert!(matches!(Decoder::decode(raw), Err(DecodeError::MalformedText { .. })));
    }
}
