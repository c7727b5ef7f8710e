/// Watchlist of open streams
///
/// Every open stream is indexed twice: by composite `"service|ticker"` key
/// and by request id. The id table is append-only; removal clears the slot
/// but never shrinks the table, so ids stay stable and lookups stay O(1).
/// Callers hold one lock over the whole `Watchlist`, which keeps both
/// indexes consistent.

use crate::message::UserArg;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

pub type RequestId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Ticker,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    Opening,
    Open,
    Recovering,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub service: String,
    pub ticker: String,
    pub request_id: RequestId,
    pub user_arg: UserArg,
    pub kind: StreamKind,
    pub state: OpenState,
    pub update_count: u64,
    pub done_count: u32,
}

impl Record {
    pub fn new(kind: StreamKind, service: &str, ticker: &str, request_id: RequestId, user_arg: UserArg) -> Self {
        Record {
            service: service.to_string(),
            ticker: ticker.to_string(),
            request_id,
            user_arg,
            kind,
            state: OpenState::Opening,
            update_count: 0,
            done_count: 0,
        }
    }
}

/// Monotonic, non-zero request id source
#[derive(Debug)]
pub struct RequestIds(AtomicU32);

impl RequestIds {
    pub fn new() -> Self {
        RequestIds(AtomicU32::new(1))
    }

    /// Skips 0 when the counter wraps.
    pub fn next(&self) -> RequestId {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| Some(bump(id)))
            .unwrap_or_else(|id| id)
    }

    #[cfg(test)]
    fn starting_at(id: RequestId) -> Self {
        RequestIds(AtomicU32::new(id))
    }
}

fn bump(id: RequestId) -> RequestId {
    match id.wrapping_add(1) {
        0 => 1,
        n => n,
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

pub fn key(service: &str, ticker: &str) -> String {
    let mut s = String::with_capacity(service.len() + ticker.len() + 1);
    s.push_str(service);
    s.push('|');
    s.push_str(ticker);
    s
}

#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    by_key: HashMap<String, RequestId>,
    bds_by_key: HashMap<String, RequestId>,
    // index = request id; slot 0 is never used
    slots: Vec<Option<Record>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Watchlist::default()
    }

    fn keys(&self, kind: StreamKind) -> &HashMap<String, RequestId> {
        match kind {
            StreamKind::Ticker => &self.by_key,
            StreamKind::Broadcast => &self.bds_by_key,
        }
    }

    fn keys_mut(&mut self, kind: StreamKind) -> &mut HashMap<String, RequestId> {
        match kind {
            StreamKind::Ticker => &mut self.by_key,
            StreamKind::Broadcast => &mut self.bds_by_key,
        }
    }

    /// Add a record under both indexes. Returns the displaced record if the
    /// key was already present.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        let id = record.request_id as usize;
        let displaced = self.remove(record.kind, &record.service, &record.ticker);
        if self.slots.len() <= id {
            self.slots.resize_with(id + 1, || None);
        }
        let k = key(&record.service, &record.ticker);
        self.keys_mut(record.kind).insert(k, record.request_id);
        self.slots[id] = Some(record);
        displaced
    }

    /// Drop a record from both indexes.
    pub fn remove(&mut self, kind: StreamKind, service: &str, ticker: &str) -> Option<Record> {
        let id = self.keys_mut(kind).remove(&key(service, ticker))?;
        self.slots.get_mut(id as usize).and_then(Option::take)
    }

    pub fn find(&self, kind: StreamKind, service: &str, ticker: &str) -> Option<&Record> {
        let id = *self.keys(kind).get(&key(service, ticker))?;
        self.get(id)
    }

    pub fn get(&self, request_id: RequestId) -> Option<&Record> {
        self.slots.get(request_id as usize).and_then(Option::as_ref)
    }

    /// Id slot first, composite key second. Streams discovered through a
    /// BDS can tick before their id slot is populated.
    pub fn resolve_mut(
        &mut self,
        kind: StreamKind,
        request_id: RequestId,
        service: &str,
        ticker: &str,
    ) -> Option<&mut Record> {
        let id = match self.slots.get(request_id as usize) {
            Some(Some(r)) if r.kind == kind && r.service == service && r.ticker == ticker => Some(request_id),
            _ => self.keys(kind).get(&key(service, ticker)).copied(),
        }?;
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    /// Drop every record; the id table keeps its length.
    pub fn clear(&mut self) {
        self.by_key.clear();
        self.bds_by_key.clear();
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Record> {
        self.slots.iter_mut().flatten()
    }

    /// Open streams on `service`, tickers and broadcasts alike
    pub fn service_records(&self, service: &str) -> Vec<Record> {
        self.iter().filter(|r| r.service == service).cloned().collect()
    }

    /// Number of open ticker streams
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty() && self.bds_by_key.is_empty()
    }

    pub fn broadcast_len(&self) -> usize {
        self.bds_by_key.len()
    }

    /// Size of the id table, including cleared slots
    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    /// `(done, subscribed)` over ticker streams
    pub fn progress(&self) -> (usize, usize) {
        let subscribed = self.iter().filter(|r| r.kind == StreamKind::Ticker);
        let mut done = 0;
        let mut total = 0;
        for r in subscribed {
            total += 1;
            if r.done_count > 0 {
                done += 1;
            }
        }
        (done, total)
    }

    pub fn reset_progress(&mut self) {
        for r in self.iter_mut() {
            r.done_count = 0;
        }
    }
}
