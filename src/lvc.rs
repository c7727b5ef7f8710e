/// Last Value Cache accessor
///
/// Reads snapshot records from an opaque `Store` and hands them out as the
/// same `Message` the streaming path uses, update and dead times included.

use crate::error::{LvcError, LvcResult};
use crate::field::{Fid, RawField};
use crate::message::Message;
use crate::schema::{Schema, SchemaEntry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One record as held by a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub service: String,
    pub ticker: String,
    pub update_time: f64,
    pub dead_time: f64,
    pub fields: Vec<RawField>,
}

impl StoredRecord {
    pub fn new(service: &str, ticker: &str, update_time: f64, fields: Vec<RawField>) -> Self {
        StoredRecord {
            service: service.to_string(),
            ticker: ticker.to_string(),
            update_time,
            dead_time: 0.0,
            fields,
        }
    }

    pub fn with_dead_time(mut self, dead_time: f64) -> Self {
        self.dead_time = dead_time;
        self
    }
}

pub trait Store {
    type Context;

    fn open(&self, path: &str) -> LvcResult<Self::Context>;

    fn schema(&self, ctx: &Self::Context) -> Vec<SchemaEntry>;

    fn keys(&self, ctx: &Self::Context) -> Vec<(String, String)>;

    fn snap_one(&self, ctx: &Self::Context, service: &str, ticker: &str) -> Option<StoredRecord>;

    fn snap_all(&self, ctx: &Self::Context) -> Vec<StoredRecord>;

    fn close(&self, ctx: Self::Context);
}

pub struct Lvc<S: Store> {
    store: S,
    ctx: Option<S::Context>,
    schema: Arc<Schema>,
}

impl<S: Store> Lvc<S> {
    pub fn new(store: S) -> Self {
        Lvc {
            store,
            ctx: None,
            schema: Arc::new(Schema::new()),
        }
    }

    /// Open `path` and load its schema. No-op when already open.
    pub fn open(&mut self, path: &str) -> LvcResult<()> {
        if self.ctx.is_some() {
            return Ok(());
        }
        let ctx = self.store.open(path)?;
        self.schema = Arc::new(Schema::from_entries(self.store.schema(&ctx)));
        self.ctx = Some(ctx);
        info!(path, fields = self.schema.size(), "LVC opened");
        Ok(())
    }

    /// Release the store and clear the schema. Safe to repeat.
    pub fn close(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.store.close(ctx);
            self.schema = Arc::new(Schema::new());
            debug!("LVC closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn field_id(&self, name: &str) -> Fid {
        self.schema.field_id(name)
    }

    pub fn field_name(&self, fid: Fid) -> String {
        self.schema.field_name(fid).into_owned()
    }

    fn ctx(&self) -> LvcResult<&S::Context> {
        self.ctx.as_ref().ok_or(LvcError::NotOpen)
    }

    pub fn keys(&self) -> LvcResult<Vec<(String, String)>> {
        Ok(self.store.keys(self.ctx()?))
    }

    /// `None` when the store does not hold the key.
    pub fn snap_one(&self, service: &str, ticker: &str) -> LvcResult<Option<Message>> {
        let rec = self.store.snap_one(self.ctx()?, service, ticker);
        Ok(rec.map(|r| self.message(r)))
    }

    /// `None` when the store is empty.
    pub fn snap_all(&self) -> LvcResult<Option<Vec<Message>>> {
        let recs = self.store.snap_all(self.ctx()?);
        if recs.is_empty() {
            return Ok(None);
        }
        Ok(Some(recs.into_iter().map(|r| self.message(r)).collect()))
    }

    fn message(&self, rec: StoredRecord) -> Message {
        let mut msg = Message::new(Arc::clone(&self.schema));
        msg.set_data(&rec.service, &rec.ticker, 0, rec.update_time, rec.fields);
        msg.set_dead_time(rec.dead_time);
        msg
    }
}

impl<S: Store> Drop for Lvc<S> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Contents of one in-memory LVC file
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    schema: Vec<SchemaEntry>,
    records: Vec<StoredRecord>,
}

impl MemoryFile {
    pub fn new(schema: Vec<SchemaEntry>) -> Self {
        MemoryFile {
            schema,
            records: Vec::new(),
        }
    }

    /// Insert or replace by `(service, ticker)`.
    pub fn with_record(mut self, rec: StoredRecord) -> Self {
        match self
            .records
            .iter_mut()
            .find(|r| r.service == rec.service && r.ticker == rec.ticker)
        {
            Some(slot) => *slot = rec,
            None => self.records.push(rec),
        }
        self
    }
}

/// Store over named in-memory files; opening a path that was never added
/// fails.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: HashMap<String, Arc<MemoryFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_file(mut self, path: &str, file: MemoryFile) -> Self {
        self.files.insert(path.to_string(), Arc::new(file));
        self
    }
}

impl Store for MemoryStore {
    type Context = Arc<MemoryFile>;

    fn open(&self, path: &str) -> LvcResult<Self::Context> {
        self.files.get(path).cloned().ok_or_else(|| LvcError::Store {
            path: path.to_string(),
            reason: "no such file".to_string(),
        })
    }

    fn schema(&self, ctx: &Self::Context) -> Vec<SchemaEntry> {
        ctx.schema.clone()
    }

    fn keys(&self, ctx: &Self::Context) -> Vec<(String, String)> {
        ctx.records
            .iter()
            .map(|r| (r.service.clone(), r.ticker.clone()))
            .collect()
    }

    fn snap_one(&self, ctx: &Self::Context, service: &str, ticker: &str) -> Option<StoredRecord> {
        ctx.records
            .iter()
            .find(|r| r.service == service && r.ticker == ticker)
            .cloned()
    }

    fn snap_all(&self, ctx: &Self::Context) -> Vec<StoredRecord> {
        ctx.records.clone()
    }

    fn close(&self, _ctx: Self::Context) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldType, FieldValue};

    fn store() -> MemoryStore {
        let file = MemoryFile::new(vec![SchemaEntry::new(6, "TRDPRC_1", Some(FieldType::Double))])
            .with_record(StoredRecord::new(
                "svc",
                "IBM",
                50.0,
                vec![RawField::new(6, FieldValue::Double(181.5), FieldType::Double)],
            ));
        MemoryStore::new().with_file("cache.lvc", file)
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut lvc = Lvc::new(store());
        assert_eq!(lvc.keys(), Err(LvcError::NotOpen));
        lvc.open("cache.lvc").unwrap();
        lvc.open("elsewhere.lvc").unwrap();
        assert!(lvc.is_open());
        assert_eq!(lvc.field_id("TRDPRC_1"), 6);
        assert_eq!(lvc.field_name(6), "TRDPRC_1");

        lvc.close();
        lvc.close();
        assert!(!lvc.is_open());
        assert_eq!(lvc.field_name(6), "6");
    }

    #[test]
    fn test_unknown_path() {
        let mut lvc = Lvc::new(store());
        assert!(matches!(lvc.open("missing.lvc"), Err(LvcError::Store { .. })));
        assert!(!lvc.is_open());
    }

    #[test]
    fn test_snap_one() {
        let mut lvc = Lvc::new(store());
        lvc.open("cache.lvc").unwrap();
        let msg = lvc.snap_one("svc", "IBM").unwrap().unwrap();
        assert_eq!(msg.field_by_name("TRDPRC_1").unwrap().as_double().unwrap(), 181.5);
        assert!(lvc.snap_one("svc", "MSFT").unwrap().is_none());
    }
}
