/// Subscription channel
///
/// Owns one transport, a watchlist of open streams and a dedicated dispatch
/// thread. `start()` connects, spawns the thread and returns only once the
/// thread is polling; `stop()` clears the run flag and joins. Callbacks run
/// on the dispatch thread and are handed back to the channel on `stop()`.
///
/// Lock order is watchlist, then transport. The dispatch thread never calls
/// a callback while holding the watchlist.

use crate::callbacks::SubscriberCallbacks;
use crate::config::SubscriberConfig;
use crate::decoder::{Decoder, Event, StreamHeader};
use crate::error::{ChannelError, ChannelResult};
use crate::field::RawField;
use crate::message::{Message, UserArg};
use crate::protocol::{LinkState, RawEvent};
use crate::recovery::ServiceMonitor;
use crate::schema::Schema;
use crate::signal::ReadySignal;
use crate::stats::ChannelStats;
use crate::tape::{TapeEntry, TapeSlice, TapeSliceQuery, TapeWindow};
use crate::transport::Transport;
use crate::watchlist::{OpenState, Record, RequestId, RequestIds, StreamKind, Watchlist};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Starting,
    Connected,
    Disconnected,
    Stopped,
}

struct Shared {
    transport: Arc<dyn Transport>,
    watchlist: Mutex<Watchlist>,
    ids: RequestIds,
    schema: RwLock<Arc<Schema>>,
    stats: Mutex<ChannelStats>,
    state: Mutex<ChannelState>,
    running: AtomicBool,
    ready: ReadySignal,
}

impl Shared {
    fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }
}

pub struct SubscriptionChannel {
    shared: Arc<Shared>,
    config: SubscriberConfig,
    callbacks: Option<SubscriberCallbacks>,
    worker: Option<JoinHandle<SubscriberCallbacks>>,
}

impl SubscriptionChannel {
    pub fn new(transport: Arc<dyn Transport>, callbacks: SubscriberCallbacks) -> Self {
        Self::with_config(transport, callbacks, SubscriberConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        callbacks: SubscriberCallbacks,
        config: SubscriberConfig,
    ) -> Self {
        SubscriptionChannel {
            shared: Arc::new(Shared {
                transport,
                watchlist: Mutex::new(Watchlist::new()),
                ids: RequestIds::new(),
                schema: RwLock::new(Arc::new(Schema::new())),
                stats: Mutex::new(ChannelStats::new()),
                state: Mutex::new(ChannelState::Created),
                running: AtomicBool::new(false),
                ready: ReadySignal::new(),
            }),
            config,
            callbacks: Some(callbacks),
            worker: None,
        }
    }

    /// Connect and launch the dispatch thread. Blocks until the thread is
    /// polling, so nothing published after this returns can be missed.
    pub fn start(&mut self, endpoint: &str, identity: &str, binary: bool) -> ChannelResult<()> {
        if self.worker.is_some() {
            return Err(ChannelError::AlreadyRunning);
        }
        let shared = &self.shared;
        shared.set_state(ChannelState::Starting);

        if !shared.transport.is_connected() {
            if let Err(e) = shared.transport.connect(endpoint, identity, binary) {
                error!(endpoint, error = %e, "connect failed");
                shared.set_state(ChannelState::Created);
                return Err(e.into());
            }
        }

        let callbacks = self.callbacks.take().unwrap_or_default();
        shared.ready.reset();
        shared.running.store(true, Ordering::Release);

        let dispatcher = Dispatcher::new(Arc::clone(shared), callbacks, self.config.poll_interval);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || dispatcher.run());
        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                shared.running.store(false, Ordering::Release);
                shared.transport.disconnect();
                shared.set_state(ChannelState::Stopped);
                return Err(ChannelError::Spawn(e.to_string()));
            }
        };

        shared.ready.wait();
        shared.set_state(ChannelState::Connected);
        self.worker = Some(handle);
        info!(endpoint, identity, binary, tape = shared.transport.is_tape(), "channel started");
        Ok(())
    }

    /// Cooperative shutdown: the dispatch thread notices within one poll
    /// interval and is joined before the transport closes. A no-op when the
    /// channel was never started.
    pub fn stop(&mut self) -> ChannelResult<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);
        let joined = handle.join();

        self.shared.transport.disconnect();
        self.shared.watchlist.lock().clear();
        self.shared.set_state(ChannelState::Stopped);
        info!("channel stopped");

        match joined {
            Ok(callbacks) => {
                self.callbacks = Some(callbacks);
                Ok(())
            }
            Err(_) => {
                error!("dispatch thread panicked");
                Err(ChannelError::DispatchPanicked)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    /// Open a ticker stream. Re-subscribing an open key returns its id.
    pub fn subscribe(&self, service: &str, ticker: &str, user_arg: UserArg) -> ChannelResult<RequestId> {
        self.open(StreamKind::Ticker, service, ticker, user_arg)
    }

    /// Close a ticker stream; `false` if it was not open.
    pub fn unsubscribe(&self, service: &str, ticker: &str) -> ChannelResult<bool> {
        self.close(StreamKind::Ticker, service, ticker)
    }

    pub fn open_broadcast_stream(&self, service: &str, bds: &str, user_arg: UserArg) -> ChannelResult<RequestId> {
        self.open(StreamKind::Broadcast, service, bds, user_arg)
    }

    pub fn close_broadcast_stream(&self, service: &str, bds: &str) -> ChannelResult<bool> {
        self.close(StreamKind::Broadcast, service, bds)
    }

    fn open(&self, kind: StreamKind, service: &str, name: &str, user_arg: UserArg) -> ChannelResult<RequestId> {
        if !self.is_running() {
            return Err(ChannelError::NotStarted);
        }
        let mut wl = self.shared.watchlist.lock();
        if let Some(r) = wl.find(kind, service, name) {
            return Ok(r.request_id);
        }
        let id = self.shared.ids.next();
        wl.insert(Record::new(kind, service, name, id, user_arg));
        let rc = match kind {
            StreamKind::Ticker => self.shared.transport.open_stream(service, name, id),
            StreamKind::Broadcast => self.shared.transport.open_broadcast(service, name, id),
        };
        if let Err(e) = rc {
            wl.remove(kind, service, name);
            warn!(service, name, ?kind, error = %e, "open rejected by transport");
            return Err(e.into());
        }
        debug!(service, name, ?kind, request_id = id, "stream opened");
        Ok(id)
    }

    fn close(&self, kind: StreamKind, service: &str, name: &str) -> ChannelResult<bool> {
        let mut wl = self.shared.watchlist.lock();
        if wl.find(kind, service, name).is_none() {
            return Ok(false);
        }
        let rc = match kind {
            StreamKind::Ticker => self.shared.transport.close_stream(service, name),
            StreamKind::Broadcast => self.shared.transport.close_broadcast(service, name),
        };
        if let Err(e) = rc {
            warn!(service, name, ?kind, error = %e, "close rejected by transport; stream kept");
            return Err(e.into());
        }
        let request_id = wl.remove(kind, service, name).map(|r| r.request_id);
        debug!(service, name, ?kind, ?request_id, "stream closed");
        Ok(true)
    }

    /// Record of an open ticker stream
    pub fn find(&self, service: &str, ticker: &str) -> Option<Record> {
        self.shared
            .watchlist
            .lock()
            .find(StreamKind::Ticker, service, ticker)
            .cloned()
    }

    /// Record occupying the id slot, if any
    pub fn record(&self, request_id: RequestId) -> Option<Record> {
        self.shared.watchlist.lock().get(request_id).cloned()
    }

    /// Number of open ticker streams
    pub fn subscriptions(&self) -> usize {
        self.shared.watchlist.lock().len()
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.shared.schema.read())
    }

    pub fn stats(&self) -> ChannelStats {
        self.shared.stats.lock().clone()
    }

    pub fn is_tape(&self) -> bool {
        self.shared.transport.is_tape()
    }

    /// `false` requests chronological replay.
    pub fn set_tape_direction(&self, reverse: bool) -> ChannelResult<bool> {
        Ok(self.shared.transport.set_tape_direction(reverse)?)
    }

    pub fn query_tape(&self) -> ChannelResult<Vec<TapeEntry>> {
        Ok(self.shared.transport.query_tape()?)
    }

    /// Replay every open stream between the optional bounds. Completion is
    /// one STREAM_DONE per stream; see `replay_progress()`.
    pub fn pump_tape(&self, start: Option<&str>, end: Option<&str>) -> ChannelResult<()> {
        if !self.is_running() {
            return Err(ChannelError::NotStarted);
        }
        let window = TapeWindow::parse(start, end).map_err(ChannelError::InvalidTime)?;
        self.shared.watchlist.lock().reset_progress();
        self.shared.transport.pump_tape(&window)?;
        info!(?start, ?end, "tape replay queued");
        Ok(())
    }

    /// `(done, subscribed)` over ticker streams since the last `pump_tape`
    pub fn replay_progress(&self) -> (usize, usize) {
        self.shared.watchlist.lock().progress()
    }

    /// Synchronous bulk read of one stream, independent of the dispatch
    /// thread.
    pub fn snap_tape_slice(&self, query: &TapeSliceQuery) -> ChannelResult<TapeSlice> {
        let window = query.window().map_err(ChannelError::InvalidTime)?;
        let ticks = self
            .shared
            .transport
            .snap_tape(&query.service, &query.ticker, &window, query.timeout)?;
        let schema = self.schema();
        Ok(TapeSlice::build(query, &schema, &ticks))
    }
}

impl Drop for SubscriptionChannel {
    fn drop(&mut self) {
        if self.worker.is_some() {
            warn!("subscription channel dropped without stop(); dispatch thread detached");
            self.shared.running.store(false, Ordering::Release);
        }
    }
}

/// One reusable message per stream, plus a scratch message for events
/// that match no open stream
struct MessageCache {
    by_id: HashMap<RequestId, Message>,
    scratch: Message,
    schema: Arc<Schema>,
}

impl MessageCache {
    fn new(schema: Arc<Schema>) -> Self {
        MessageCache {
            by_id: HashMap::new(),
            scratch: Message::new(Arc::clone(&schema)),
            schema,
        }
    }

    fn get(&mut self, resolved: Option<(RequestId, UserArg)>) -> &mut Message {
        match resolved {
            Some((id, _)) => self
                .by_id
                .entry(id)
                .or_insert_with(|| Message::new(Arc::clone(&self.schema))),
            None => &mut self.scratch,
        }
    }

    /// Message for a stream, rebuilt with no fields.
    fn bare(&mut self, h: &StreamHeader, resolved: Option<(RequestId, UserArg)>) -> &mut Message {
        let user_arg = resolved.map_or(0, |r| r.1);
        let msg = self.get(resolved);
        msg.set_data(&h.service, &h.ticker, user_arg, h.update_time, std::iter::empty::<RawField>());
        msg
    }

    fn set_schema(&mut self, schema: Arc<Schema>) {
        for msg in self.by_id.values_mut() {
            msg.set_schema(Arc::clone(&schema));
        }
        self.scratch.set_schema(Arc::clone(&schema));
        self.schema = schema;
    }
}

struct Dispatcher {
    shared: Arc<Shared>,
    callbacks: SubscriberCallbacks,
    poll_interval: Duration,
    monitor: ServiceMonitor,
    messages: MessageCache,
}

impl Dispatcher {
    fn new(shared: Arc<Shared>, callbacks: SubscriberCallbacks, poll_interval: Duration) -> Self {
        let schema = Arc::clone(&shared.schema.read());
        Dispatcher {
            shared,
            callbacks,
            poll_interval,
            monitor: ServiceMonitor::new(),
            messages: MessageCache::new(schema),
        }
    }

    fn run(mut self) -> SubscriberCallbacks {
        debug!(poll_ms = self.poll_interval.as_millis() as u64, "dispatch loop running");
        self.shared.ready.set();
        while self.shared.running.load(Ordering::Acquire) {
            match self.shared.transport.poll(self.poll_interval) {
                Some(raw) => self.dispatch(raw),
                None => self.idle(),
            }
        }
        debug!("dispatch loop exited");
        self.callbacks
    }

    fn idle(&mut self) {
        self.shared.stats.lock().record_idle();
        if !self.messages.by_id.is_empty() {
            let wl = self.shared.watchlist.lock();
            self.messages.by_id.retain(|id, _| wl.get(*id).is_some());
        }
        if let Some(cb) = self.callbacks.idle.as_mut() {
            cb();
        }
    }

    /// Look up the stream under the watchlist lock and apply `touch` to it.
    /// Returns `(request id, user arg)`.
    fn resolve(
        &self,
        kind: StreamKind,
        h: &StreamHeader,
        touch: impl FnOnce(&mut Record),
    ) -> Option<(RequestId, UserArg)> {
        let found = self
            .shared
            .watchlist
            .lock()
            .resolve_mut(kind, h.request_id, &h.service, &h.ticker)
            .map(|rec| {
                touch(rec);
                (rec.request_id, rec.user_arg)
            });
        if found.is_none() {
            trace!(service = %h.service, ticker = %h.ticker, request_id = h.request_id, "unresolved stream");
            self.shared.stats.lock().record_unresolved();
        }
        found
    }

    fn dispatch(&mut self, raw: RawEvent) {
        let started = Instant::now();
        let code = raw.kind;
        let event = match Decoder::decode(raw) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(kind = code, error = %e, "dropping undecodable event");
                self.shared.stats.lock().record_decode_error();
                return;
            }
        };
        let kind = event.kind();
        trace!(?kind, "dispatch");

        match event {
            Event::Update { header, fields, .. } => {
                let mut image = false;
                let resolved = self.resolve(StreamKind::Ticker, &header, |r| {
                    r.update_count += 1;
                    r.state = OpenState::Open;
                    image = r.update_count == 1;
                });
                let user_arg = resolved.map_or(0, |r| r.1);
                let msg = self.messages.get(resolved);
                msg.set_data(&header.service, &header.ticker, user_arg, header.update_time, fields);
                msg.set_image(image);
                if let Some(cb) = self.callbacks.data.as_mut() {
                    cb(msg);
                }
            }
            Event::ByteStream { header, data } => {
                let resolved = self.resolve(StreamKind::Ticker, &header, |r| r.update_count += 1);
                if self.callbacks.has_byte_stream() {
                    let msg = self.messages.bare(&header, resolved);
                    if let Some(cb) = self.callbacks.byte_stream.as_mut() {
                        cb(msg, &data);
                    }
                } else {
                    debug!(service = %header.service, ticker = %header.ticker, bytes = data.len(), "unhandled byte stream");
                }
            }
            Event::Status { header, text } => {
                let resolved = self.resolve(StreamKind::Ticker, &header, |r| r.state = OpenState::Dead);
                let user_arg = resolved.map_or(0, |r| r.1);
                let msg = self.messages.get(resolved);
                msg.set_error(&header.service, &header.ticker, user_arg, header.update_time, &text);
                if let Some(cb) = self.callbacks.dead.as_mut() {
                    cb(msg, &text);
                }
            }
            Event::Recovering { header, text } => {
                let resolved = self.resolve(StreamKind::Ticker, &header, |r| r.state = OpenState::Recovering);
                let msg = self.messages.bare(&header, resolved);
                if let Some(cb) = self.callbacks.recovering.as_mut() {
                    cb(msg, &text);
                }
            }
            Event::StreamDone { header, text } => {
                let resolved = self.resolve(StreamKind::Ticker, &header, |r| r.done_count += 1);
                let msg = self.messages.bare(&header, resolved);
                if let Some(cb) = self.callbacks.stream_done.as_mut() {
                    cb(msg, &text);
                }
            }
            Event::Symbol { header, symbol } => {
                let resolved = self.resolve(StreamKind::Broadcast, &header, |r| r.update_count += 1);
                let msg = self.messages.bare(&header, resolved);
                if let Some(cb) = self.callbacks.symbol.as_mut() {
                    cb(msg, &symbol);
                }
            }
            Event::Connect { state, text } => {
                match state {
                    LinkState::Up => {
                        info!(text = %text, "connection up");
                        self.shared.set_state(ChannelState::Connected);
                    }
                    LinkState::Down => {
                        warn!(text = %text, "connection down");
                        self.monitor.on_disconnect();
                        self.shared.set_state(ChannelState::Disconnected);
                    }
                }
                if let Some(cb) = self.callbacks.connect.as_mut() {
                    cb(&text, state);
                }
            }
            Event::Service { state, service } => {
                info!(service = %service, %state, "service");
                if self.monitor.on_service(&service, state) {
                    self.resubscribe(&service);
                }
                if let Some(cb) = self.callbacks.service.as_mut() {
                    cb(&service, state);
                }
            }
            Event::Schema(entries) => {
                let schema = Arc::new(Schema::from_entries(entries));
                *self.shared.schema.write() = Arc::clone(&schema);
                self.messages.set_schema(Arc::clone(&schema));
                info!(fields = schema.size(), "schema loaded");
                if let Some(cb) = self.callbacks.schema.as_mut() {
                    cb(&schema);
                }
            }
            Event::Admin(reply) => {
                debug!(%reply, "admin reply on subscription channel ignored");
            }
        }

        let mut stats = self.shared.stats.lock();
        stats.record_event(kind);
        stats.record_dispatch_latency(started.elapsed().as_micros() as u64);
    }

    /// Re-open every stream of a service that came back up.
    fn resubscribe(&mut self, service: &str) {
        let mut wl = self.shared.watchlist.lock();
        let mut reopened = 0;
        for r in wl.service_records(service) {
            let rc = match r.kind {
                StreamKind::Ticker => self.shared.transport.open_stream(&r.service, &r.ticker, r.request_id),
                StreamKind::Broadcast => self.shared.transport.open_broadcast(&r.service, &r.ticker, r.request_id),
            };
            match rc {
                Ok(()) => {
                    if let Some(rec) = wl.resolve_mut(r.kind, r.request_id, &r.service, &r.ticker) {
                        rec.state = OpenState::Opening;
                    }
                    reopened += 1;
                }
                Err(e) => warn!(service, ticker = %r.ticker, error = %e, "re-open failed"),
            }
        }
        drop(wl);
        info!(service, streams = reopened, "service recovered, streams re-opened");
        self.shared.stats.lock().record_resubscribes(reopened);
    }
}
