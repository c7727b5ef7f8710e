/// Recorded tape
///
/// A tape keeps every tick of a stream as a reverse-chronological linked
/// list: each tick points at the previous tick of the same stream and the
/// stream head is its latest tick. `TapeTransport` replays it through the
/// ordinary `Transport` seam; chronological order is produced there by
/// translating the walk direction.

use crate::field::{format_epoch, Fid, RawField};
use crate::protocol::{EventKind, LinkState, RawEvent};
use crate::schema::{Schema, SchemaEntry};
use crate::transport::{Transport, TransportError, TransportResult};
use crate::watchlist::{key, RequestId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

pub const DEFAULT_SLICE_ROWS: usize = 10_000;
pub const DEFAULT_SLICE_TIMEOUT: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TapeTime {
    /// Seconds since the epoch, UTC
    Absolute(f64),
    /// Seconds since midnight on the tape's first day
    TimeOfDay(f64),
}

fn epoch(dt: NaiveDateTime) -> f64 {
    dt.and_utc().timestamp_micros() as f64 / 1e6
}

impl TapeTime {
    /// `YYYY-MM-DD HH:MM[:SS.mmm]` or `HH:MM[:SS.mmm]`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        for fmt in DATE_TIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
                return Some(TapeTime::Absolute(epoch(dt)));
            }
        }
        for fmt in TIME_FORMATS {
            if let Ok(t) = NaiveTime::parse_from_str(text, fmt) {
                let secs = t.num_seconds_from_midnight() as f64 + (t.nanosecond() / 1000) as f64 / 1e6;
                return Some(TapeTime::TimeOfDay(secs));
            }
        }
        None
    }

    pub fn resolve(&self, base: Option<NaiveDate>) -> f64 {
        match *self {
            TapeTime::Absolute(t) => t,
            TapeTime::TimeOfDay(secs) => {
                let midnight = base.and_then(|d| d.and_hms_opt(0, 0, 0)).map_or(0.0, epoch);
                midnight + secs
            }
        }
    }
}

/// Optional replay bounds, both inclusive
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TapeWindow {
    pub start: Option<TapeTime>,
    pub end: Option<TapeTime>,
}

impl TapeWindow {
    pub fn all() -> Self {
        TapeWindow::default()
    }

    pub fn new(start: Option<TapeTime>, end: Option<TapeTime>) -> Self {
        TapeWindow { start, end }
    }

    /// Returns the offending text if either bound does not parse.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, String> {
        let bound = |text: Option<&str>| -> Result<Option<TapeTime>, String> {
            match text {
                None => Ok(None),
                Some(t) => TapeTime::parse(t).map(Some).ok_or_else(|| t.to_string()),
            }
        };
        Ok(TapeWindow {
            start: bound(start)?,
            end: bound(end)?,
        })
    }

    pub fn bounds(&self, base: Option<NaiveDate>) -> (f64, f64) {
        (
            self.start.map_or(f64::NEG_INFINITY, |t| t.resolve(base)),
            self.end.map_or(f64::INFINITY, |t| t.resolve(base)),
        )
    }
}

/// One stream present on a tape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeEntry {
    pub service: String,
    pub ticker: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TapeTick {
    pub update_time: f64,
    pub service: String,
    pub ticker: String,
    pub fields: Vec<RawField>,
}

impl TapeTick {
    pub fn new(update_time: f64, service: &str, ticker: &str, fields: Vec<RawField>) -> Self {
        TapeTick {
            update_time,
            service: service.to_string(),
            ticker: ticker.to_string(),
            fields,
        }
    }

    /// Last occurrence of `fid` in this tick
    pub fn value(&self, fid: Fid) -> Option<&RawField> {
        self.fields.iter().rev().find(|f| f.fid == fid)
    }
}

#[derive(Debug, Clone)]
struct Link {
    tick: TapeTick,
    prev: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Head {
    latest: usize,
    count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTape {
    schema: Vec<SchemaEntry>,
    ticks: Vec<Link>,
    heads: HashMap<String, Head>,
    // first-seen order
    streams: Vec<(String, String)>,
}

impl MemoryTape {
    pub fn new() -> Self {
        MemoryTape::default()
    }

    pub fn with_schema(mut self, entries: Vec<SchemaEntry>) -> Self {
        self.schema = entries;
        self
    }

    pub fn schema(&self) -> &[SchemaEntry] {
        &self.schema
    }

    /// Append a tick; it becomes the head of its stream.
    pub fn record(&mut self, tick: TapeTick) {
        let k = key(&tick.service, &tick.ticker);
        let ix = self.ticks.len();
        let prev = match self.heads.get_mut(&k) {
            Some(head) => {
                let prev = head.latest;
                head.latest = ix;
                head.count += 1;
                Some(prev)
            }
            None => {
                self.streams.push((tick.service.clone(), tick.ticker.clone()));
                self.heads.insert(k, Head { latest: ix, count: 1 });
                None
            }
        };
        self.ticks.push(Link { tick, prev });
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn entries(&self) -> Vec<TapeEntry> {
        self.streams
            .iter()
            .map(|(svc, tkr)| TapeEntry {
                service: svc.clone(),
                ticker: tkr.clone(),
                message_count: self.heads.get(&key(svc, tkr)).map_or(0, |h| h.count),
            })
            .collect()
    }

    /// Distinct services, first-seen order
    pub fn services(&self) -> Vec<&str> {
        let mut rc: Vec<&str> = Vec::new();
        for (svc, _) in &self.streams {
            if !rc.contains(&svc.as_str()) {
                rc.push(svc);
            }
        }
        rc
    }

    /// Native walk: latest tick first.
    pub fn walk(&self, service: &str, ticker: &str) -> Walk<'_> {
        Walk {
            tape: self,
            next: self.heads.get(&key(service, ticker)).map(|h| h.latest),
        }
    }

    /// Ticks of one stream within `[lo, hi]`. `reverse = false` translates
    /// the native walk into chronological order.
    pub fn ticks(&self, service: &str, ticker: &str, reverse: bool, (lo, hi): (f64, f64)) -> Vec<&TapeTick> {
        let mut rc: Vec<&TapeTick> = self
            .walk(service, ticker)
            .filter(|t| t.update_time >= lo && t.update_time <= hi)
            .collect();
        if !reverse {
            rc.reverse();
        }
        rc
    }

    /// UTC date of the earliest tick
    pub fn base_date(&self) -> Option<NaiveDate> {
        let first = self
            .ticks
            .iter()
            .map(|l| l.tick.update_time)
            .min_by(|a, b| a.total_cmp(b))?;
        DateTime::from_timestamp(first.floor() as i64, 0).map(|dt| dt.date_naive())
    }
}

pub struct Walk<'a> {
    tape: &'a MemoryTape,
    next: Option<usize>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a TapeTick;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.tape.ticks.get(self.next?)?;
        self.next = link.prev;
        Some(&link.tick)
    }
}

/// Bounded synchronous read of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct TapeSliceQuery {
    pub service: String,
    pub ticker: String,
    /// CSV of FIDs or field names
    pub fields: String,
    pub max_rows: usize,
    pub timeout: Duration,
    pub start: Option<String>,
    pub end: Option<String>,
    pub sample: Option<Duration>,
}

impl TapeSliceQuery {
    pub fn new(service: &str, ticker: &str, fields: &str) -> Self {
        TapeSliceQuery {
            service: service.to_string(),
            ticker: ticker.to_string(),
            fields: fields.to_string(),
            max_rows: DEFAULT_SLICE_ROWS,
            timeout: DEFAULT_SLICE_TIMEOUT,
            start: None,
            end: None,
            sample: None,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_window(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start = start.map(str::to_string);
        self.end = end.map(str::to_string);
        self
    }

    pub fn with_sample(mut self, interval: Duration) -> Self {
        self.sample = Some(interval);
        self
    }

    pub fn window(&self) -> Result<TapeWindow, String> {
        TapeWindow::parse(self.start.as_deref(), self.end.as_deref())
    }
}

/// Header row plus data rows `[MsgTime, Service, Ticker, f1, ...]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TapeSlice {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

const MISSING: &str = "None";

impl TapeSlice {
    /// Build from chronological ticks. Unresolvable field names are dropped.
    pub fn build(query: &TapeSliceQuery, schema: &Schema, ticks: &[TapeTick]) -> Self {
        let fids: Vec<Fid> = query
            .fields
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| schema.field_id(s))
            .filter(|&fid| fid != 0)
            .collect();

        let mut header = vec!["MsgTime".to_string(), "Service".to_string(), "Ticker".to_string()];
        header.extend(fids.iter().map(|&fid| schema.field_name(fid).into_owned()));

        let mut slice = TapeSlice {
            header,
            rows: Vec::new(),
        };
        let step = query.sample.map_or(0.0, |d| d.as_secs_f64());
        if step > 0.0 {
            slice.sampled(query, &fids, ticks, step);
        } else {
            for tick in ticks.iter().take(query.max_rows) {
                let values = fids
                    .iter()
                    .map(|&fid| tick.value(fid).map_or_else(|| MISSING.to_string(), |f| f.value.to_string()));
                slice.push_row(query, tick.update_time, values);
            }
        }
        slice
    }

    /// One row per non-empty bucket of `step` seconds, latest values as of
    /// the end of the bucket. Bucket ends are derived from an index so
    /// steps below the time base resolution still advance.
    fn sampled(&mut self, query: &TapeSliceQuery, fids: &[Fid], ticks: &[TapeTick], step: f64) {
        let Some(first) = ticks.first() else {
            return;
        };
        let origin = first.update_time;
        let end = |k: u64| origin + (k + 1) as f64 * step;
        let mut latest: HashMap<Fid, String> = HashMap::new();
        let mut k = 0u64;
        for tick in ticks {
            if tick.update_time >= end(k) {
                if self.rows.len() >= query.max_rows {
                    return;
                }
                self.push_latest(query, end(k), fids, &latest);
                // skip empty buckets
                k = (k + 1).max(((tick.update_time - origin) / step) as u64);
                while end(k) <= tick.update_time {
                    k += 1;
                }
            }
            for &fid in fids {
                if let Some(f) = tick.value(fid) {
                    latest.insert(fid, f.value.to_string());
                }
            }
        }
        if self.rows.len() < query.max_rows {
            self.push_latest(query, end(k), fids, &latest);
        }
    }

    fn push_latest(&mut self, query: &TapeSliceQuery, time: f64, fids: &[Fid], latest: &HashMap<Fid, String>) {
        let values = fids
            .iter()
            .map(|fid| latest.get(fid).cloned().unwrap_or_else(|| MISSING.to_string()));
        self.push_row(query, time, values);
    }

    fn push_row(&mut self, query: &TapeSliceQuery, time: f64, values: impl Iterator<Item = String>) {
        let mut row = vec![
            format_epoch(time).unwrap_or_default(),
            query.service.clone(),
            query.ticker.clone(),
        ];
        row.extend(values);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
struct TapeStream {
    service: String,
    ticker: String,
    request_id: RequestId,
}

#[derive(Debug)]
struct TapeState {
    connected: bool,
    reverse: bool,
    streams: Vec<TapeStream>,
    queue: VecDeque<RawEvent>,
}

/// `Transport` over a `MemoryTape`. Native direction is reverse
/// chronological until `set_tape_direction(false)`.
pub struct TapeTransport {
    tape: Mutex<MemoryTape>,
    state: Mutex<TapeState>,
    ready: Condvar,
}

pub const STREAM_DONE_TEXT: &str = "Done";

impl TapeTransport {
    pub fn new(tape: MemoryTape) -> Self {
        TapeTransport {
            tape: Mutex::new(tape),
            state: Mutex::new(TapeState {
                connected: false,
                reverse: true,
                streams: Vec::new(),
                queue: VecDeque::new(),
            }),
            ready: Condvar::new(),
        }
    }

    /// Append a tick to the underlying tape.
    pub fn record(&self, tick: TapeTick) {
        self.tape.lock().record(tick);
    }

    pub fn is_reverse(&self) -> bool {
        self.state.lock().reverse
    }

    fn push(&self, events: impl IntoIterator<Item = RawEvent>) {
        let mut st = self.state.lock();
        st.queue.extend(events);
        self.ready.notify_all();
    }
}

impl Transport for TapeTransport {
    fn connect(&self, endpoint: &str, identity: &str, _binary: bool) -> TransportResult<()> {
        if self.state.lock().connected {
            return Ok(());
        }
        let mut events = vec![RawEvent::connect(LinkState::Up, endpoint)];
        {
            let tape = self.tape.lock();
            if !tape.schema().is_empty() {
                events.push(RawEvent::schema(tape.schema()));
            }
            events.extend(tape.services().into_iter().map(|svc| RawEvent::service(LinkState::Up, svc)));
            info!(endpoint, identity, ticks = tape.len(), "tape opened");
        }
        self.state.lock().connected = true;
        self.push(events);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn poll(&self, timeout: Duration) -> Option<RawEvent> {
        let mut st = self.state.lock();
        if st.queue.is_empty() {
            self.ready.wait_while_for(&mut st, |s| s.queue.is_empty(), timeout);
        }
        st.queue.pop_front()
    }

    fn disconnect(&self) {
        let mut st = self.state.lock();
        st.connected = false;
        st.streams.clear();
        st.queue.clear();
        self.ready.notify_all();
    }

    fn open_stream(&self, service: &str, ticker: &str, request_id: u32) -> TransportResult<()> {
        let mut st = self.state.lock();
        if !st.connected {
            return Err(TransportError::NotConnected);
        }
        st.streams.retain(|s| !(s.service == service && s.ticker == ticker));
        st.streams.push(TapeStream {
            service: service.to_string(),
            ticker: ticker.to_string(),
            request_id,
        });
        Ok(())
    }

    fn close_stream(&self, service: &str, ticker: &str) -> TransportResult<()> {
        let mut st = self.state.lock();
        if !st.connected {
            return Err(TransportError::NotConnected);
        }
        st.streams.retain(|s| !(s.service == service && s.ticker == ticker));
        Ok(())
    }

    fn open_broadcast(&self, _service: &str, _bds: &str, _request_id: u32) -> TransportResult<()> {
        Err(TransportError::Unsupported("broadcast streams on tape"))
    }

    fn close_broadcast(&self, _service: &str, _bds: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported("broadcast streams on tape"))
    }

    fn is_tape(&self) -> bool {
        true
    }

    fn set_tape_direction(&self, reverse: bool) -> TransportResult<bool> {
        self.state.lock().reverse = reverse;
        Ok(reverse)
    }

    fn query_tape(&self) -> TransportResult<Vec<TapeEntry>> {
        Ok(self.tape.lock().entries())
    }

    fn pump_tape(&self, window: &TapeWindow) -> TransportResult<()> {
        let tape = self.tape.lock();
        let (reverse, streams) = {
            let st = self.state.lock();
            if !st.connected {
                return Err(TransportError::NotConnected);
            }
            (st.reverse, st.streams.clone())
        };
        let bounds = window.bounds(tape.base_date());

        let mut remaining = Vec::with_capacity(streams.len());
        let mut merged: Vec<(usize, &TapeTick)> = Vec::new();
        for (i, s) in streams.iter().enumerate() {
            let ticks = tape.ticks(&s.service, &s.ticker, reverse, bounds);
            remaining.push(ticks.len());
            merged.extend(ticks.into_iter().map(|t| (i, t)));
        }
        // stable: per-stream order from the walk survives ties
        merged.sort_by(|a, b| {
            let ord = a.1.update_time.total_cmp(&b.1.update_time);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });

        let done = |s: &TapeStream| {
            RawEvent::status(EventKind::StreamDone, 0.0, s.request_id, &s.service, &s.ticker, STREAM_DONE_TEXT)
        };
        let mut events = Vec::with_capacity(merged.len() + streams.len());
        for (i, s) in streams.iter().enumerate() {
            if remaining[i] == 0 {
                events.push(done(s));
            }
        }
        for (i, tick) in merged {
            let s = &streams[i];
            events.push(RawEvent::update(
                tick.update_time,
                s.request_id,
                &s.service,
                &s.ticker,
                &tick.fields,
            ));
            remaining[i] -= 1;
            if remaining[i] == 0 {
                events.push(done(s));
            }
        }
        debug!(streams = streams.len(), events = events.len(), reverse, "tape pumped");
        drop(tape);
        self.push(events);
        Ok(())
    }

    fn snap_tape(
        &self,
        service: &str,
        ticker: &str,
        window: &TapeWindow,
        timeout: Duration,
    ) -> TransportResult<Vec<TapeTick>> {
        let tape = self
            .tape
            .try_lock_for(timeout)
            .ok_or(TransportError::Timeout(timeout))?;
        let bounds = window.bounds(tape.base_date());
        Ok(tape
            .ticks(service, ticker, false, bounds)
            .into_iter()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, Event};
    use crate::field::{FieldType, FieldValue};

    // 2024-01-02 00:00:00 UTC
    const DAY: f64 = 1_704_153_600.0;

    fn px(fid: Fid, v: f64) -> RawField {
        RawField::new(fid, FieldValue::Double(v), FieldType::Double)
    }

    fn tape() -> MemoryTape {
        let mut tape = MemoryTape::new().with_schema(vec![
            SchemaEntry::new(22, "BID", Some(FieldType::Double)),
            SchemaEntry::new(25, "ASK", Some(FieldType::Double)),
        ]);
        for i in 0..5 {
            let t = DAY + 36_000.0 + i as f64;
            tape.record(TapeTick::new(t, "bloomberg", "IBM", vec![px(22, 100.0 + i as f64)]));
            tape.record(TapeTick::new(t + 0.5, "bloomberg", "AAPL", vec![px(25, 200.0 + i as f64)]));
        }
        tape
    }

    #[test]
    fn test_walk_is_reverse_chronological() {
        let tape = tape();
        let times: Vec<f64> = tape.walk("bloomberg", "IBM").map(|t| t.update_time).collect();
        assert_eq!(times.len(), 5);
        assert!(times.windows(2).all(|w| w[0] > w[1]));

        let chrono = tape.ticks("bloomberg", "IBM", false, TapeWindow::all().bounds(None));
        assert!(chrono.windows(2).all(|w| w[0].update_time < w[1].update_time));
    }

    #[test]
    fn test_entries() {
        let entries = tape().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ticker, "IBM");
        assert_eq!(entries[0].message_count, 5);
    }

    #[test]
    fn test_time_parsing() {
        assert_eq!(
            TapeTime::parse("2024-01-02 10:00:00.500"),
            Some(TapeTime::Absolute(DAY + 36_000.5))
        );
        assert_eq!(TapeTime::parse("10:00"), Some(TapeTime::TimeOfDay(36_000.0)));
        assert!(TapeTime::parse("yesterday").is_none());

        let tape = tape();
        let window = TapeWindow::parse(Some("10:00:01"), Some("10:00:02")).unwrap();
        let ticks = tape.ticks("bloomberg", "IBM", false, window.bounds(tape.base_date()));
        assert_eq!(ticks.len(), 2);
        assert_eq!(TapeWindow::parse(Some("bogus"), None), Err("bogus".to_string()));
    }

    #[test]
    fn test_slice_rows() {
        let tape = tape();
        let schema = Schema::from_entries(tape.schema().to_vec());
        let ticks: Vec<TapeTick> = tape
            .ticks("bloomberg", "IBM", false, TapeWindow::all().bounds(None))
            .into_iter()
            .cloned()
            .collect();
        let query = TapeSliceQuery::new("bloomberg", "IBM", "BID, 25, NOPE").with_max_rows(3);
        let slice = TapeSlice::build(&query, &schema, &ticks);
        assert_eq!(slice.header, vec!["MsgTime", "Service", "Ticker", "BID", "ASK"]);
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.rows[0][0], "2024-01-02 10:00:00.000");
        assert_eq!(slice.rows[0][3], "100");
        assert_eq!(slice.rows[0][4], "None");
    }

    #[test]
    fn test_slice_sampling_carries_latest() {
        let schema = Schema::new();
        let ticks = vec![
            TapeTick::new(DAY, "s", "T", vec![px(22, 1.0)]),
            TapeTick::new(DAY + 0.5, "s", "T", vec![px(22, 2.0)]),
            TapeTick::new(DAY + 3.2, "s", "T", vec![px(22, 3.0)]),
        ];
        let query = TapeSliceQuery::new("s", "T", "22").with_sample(Duration::from_secs(1));
        let slice = TapeSlice::build(&query, &schema, &ticks);
        let values: Vec<&str> = slice.rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(values, vec!["2", "2", "2", "3"]);
        assert_eq!(slice.header[3], "22");
    }

    #[test]
    fn test_pump_chronological() {
        let transport = TapeTransport::new(tape());
        transport.connect("ibm.tape", "test", false).unwrap();
        while transport.poll(Duration::ZERO).is_some() {}

        transport.open_stream("bloomberg", "IBM", 7).unwrap();
        assert!(transport.set_tape_direction(false).is_ok());
        transport.pump_tape(&TapeWindow::all()).unwrap();

        let mut last = 0.0;
        let mut done = 0;
        while let Some(raw) = transport.poll(Duration::ZERO) {
            match Decoder::decode(raw).unwrap() {
                Event::Update { header, .. } => {
                    assert_eq!(header.request_id, 7);
                    assert!(header.update_time > last);
                    last = header.update_time;
                }
                Event::StreamDone { .. } => done += 1,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(done, 1);
    }

    #[test]
    fn test_snap_times_out_while_tape_busy() {
        let transport = TapeTransport::new(tape());
        let _busy = transport.tape.lock();
        let rc = transport.snap_tape("bloomberg", "IBM", &TapeWindow::all(), Duration::from_millis(10));
        assert_eq!(rc, Err(TransportError::Timeout(Duration::from_millis(10))));
    }
}
