/// Callback tables
///
/// Every channel owns one table of optional closures. All of them run on
/// the channel's dispatch thread; an unset slot is a no-op. A callback that
/// blocks stalls delivery for the whole channel.

use crate::message::Message;
use crate::protocol::LinkState;
use crate::schema::Schema;

pub type LinkFn = Box<dyn FnMut(&str, LinkState) + Send>;
pub type MessageFn = Box<dyn FnMut(&Message) + Send>;
pub type MessageTextFn = Box<dyn FnMut(&Message, &str) + Send>;
pub type BytesFn = Box<dyn FnMut(&Message, &[u8]) + Send>;
pub type SchemaFn = Box<dyn FnMut(&Schema) + Send>;
pub type IdleFn = Box<dyn FnMut() + Send>;
/// `(add, service, ticker)`
pub type ConfirmFn = Box<dyn FnMut(bool, &str, &str) + Send>;

#[derive(Default)]
pub struct SubscriberCallbacks {
    pub(crate) connect: Option<LinkFn>,
    pub(crate) service: Option<LinkFn>,
    pub(crate) data: Option<MessageFn>,
    pub(crate) byte_stream: Option<BytesFn>,
    pub(crate) dead: Option<MessageTextFn>,
    pub(crate) recovering: Option<MessageTextFn>,
    pub(crate) stream_done: Option<MessageTextFn>,
    pub(crate) symbol: Option<MessageTextFn>,
    pub(crate) schema: Option<SchemaFn>,
    pub(crate) idle: Option<IdleFn>,
}

impl SubscriberCallbacks {
    pub fn new() -> Self {
        SubscriberCallbacks::default()
    }

    /// `(message, state)` on connection UP/DOWN
    pub fn on_connect(mut self, f: impl FnMut(&str, LinkState) + Send + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    /// `(service, state)` on publisher UP/DOWN
    pub fn on_service(mut self, f: impl FnMut(&str, LinkState) + Send + 'static) -> Self {
        self.service = Some(Box::new(f));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(&Message) + Send + 'static) -> Self {
        self.data = Some(Box::new(f));
        self
    }

    pub fn on_byte_stream(mut self, f: impl FnMut(&Message, &[u8]) + Send + 'static) -> Self {
        self.byte_stream = Some(Box::new(f));
        self
    }

    /// `(message, error)`; the message has been marked dead.
    pub fn on_dead(mut self, f: impl FnMut(&Message, &str) + Send + 'static) -> Self {
        self.dead = Some(Box::new(f));
        self
    }

    pub fn on_recovering(mut self, f: impl FnMut(&Message, &str) + Send + 'static) -> Self {
        self.recovering = Some(Box::new(f));
        self
    }

    pub fn on_stream_done(mut self, f: impl FnMut(&Message, &str) + Send + 'static) -> Self {
        self.stream_done = Some(Box::new(f));
        self
    }

    /// `(bds message, member ticker)`
    pub fn on_symbol(mut self, f: impl FnMut(&Message, &str) + Send + 'static) -> Self {
        self.symbol = Some(Box::new(f));
        self
    }

    pub fn on_schema(mut self, f: impl FnMut(&Schema) + Send + 'static) -> Self {
        self.schema = Some(Box::new(f));
        self
    }

    pub fn on_idle(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.idle = Some(Box::new(f));
        self
    }

    pub fn has_byte_stream(&self) -> bool {
        self.byte_stream.is_some()
    }
}

#[derive(Default)]
pub struct AdminCallbacks {
    pub(crate) connect: Option<LinkFn>,
    pub(crate) ack: Option<ConfirmFn>,
    pub(crate) nak: Option<ConfirmFn>,
}

impl AdminCallbacks {
    pub fn new() -> Self {
        AdminCallbacks::default()
    }

    pub fn on_connect(mut self, f: impl FnMut(&str, LinkState) + Send + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    pub fn on_ack(mut self, f: impl FnMut(bool, &str, &str) + Send + 'static) -> Self {
        self.ack = Some(Box::new(f));
        self
    }

    pub fn on_nak(mut self, f: impl FnMut(bool, &str, &str) + Send + 'static) -> Self {
        self.nak = Some(Box::new(f));
        self
    }
}
