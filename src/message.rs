/// Message container shared by the streaming and LVC paths
///
/// A `Message` holds one update or snapshot for a (service, ticker). The
/// streaming path mutates a single instance in place per stream; take a
/// `clone()` or `field_owned()` to keep anything past the callback.

use crate::field::{format_epoch, Fid, Field, RawField};
use crate::schema::Schema;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

/// Opaque caller value carried on every message of a stream
pub type UserArg = u64;

#[derive(Debug, Clone, Default)]
pub struct Message {
    schema: Arc<Schema>,
    service: String,
    ticker: String,
    user_arg: UserArg,
    update_time: f64,
    dead_time: f64,
    fields: Vec<Field>,
    by_fid: HashMap<Fid, usize>,
    cursor: Option<usize>,
    error: String,
    image: bool,
}

impl Message {
    pub fn new(schema: Arc<Schema>) -> Self {
        Message {
            schema,
            ..Default::default()
        }
    }

    pub fn set_schema(&mut self, schema: Arc<Schema>) {
        self.schema = schema;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn set_key(&mut self, service: &str, ticker: &str, user_arg: UserArg) {
        self.service.clear();
        self.service.push_str(service);
        self.ticker.clear();
        self.ticker.push_str(ticker);
        self.user_arg = user_arg;
        self.by_fid.clear();
        self.cursor = None;
        self.error.clear();
        self.image = false;
    }

    /// Rebuild from a raw batch. Duplicate FIDs collapse onto the slot of
    /// their first occurrence, holding the value of the last one.
    pub fn set_data<I>(
        &mut self,
        service: &str,
        ticker: &str,
        user_arg: UserArg,
        update_time: f64,
        raw: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = RawField>,
    {
        self.set_key(service, ticker, user_arg);
        self.update_time = update_time;
        self.dead_time = 0.0;

        let schema = &self.schema;
        let mut n = 0;
        for f in raw {
            let name = schema.field_name(f.fid);
            match self.by_fid.get(&f.fid) {
                Some(&ix) => self.fields[ix].set(f, &name),
                None => {
                    let fid = f.fid;
                    if n < self.fields.len() {
                        self.fields[n].set(f, &name);
                    } else {
                        self.fields.push(Field::new(f.fid, &*name, f.ty, f.value));
                    }
                    self.by_fid.insert(fid, n);
                    n += 1;
                }
            }
        }
        self.fields.truncate(n);
        self
    }

    /// Clear the fields and mark the stream dead as of `time`.
    pub fn set_error(
        &mut self,
        service: &str,
        ticker: &str,
        user_arg: UserArg,
        time: f64,
        error: &str,
    ) -> &mut Self {
        self.set_key(service, ticker, user_arg);
        self.fields.clear();
        self.error.push_str(error);
        self.update_time = 0.0;
        self.dead_time = time;
        self
    }

    pub fn set_dead_time(&mut self, dead_time: f64) {
        self.dead_time = dead_time;
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn user_arg(&self) -> UserArg {
        self.user_arg
    }

    pub fn update_time(&self) -> f64 {
        self.update_time
    }

    pub fn dead_time(&self) -> f64 {
        self.dead_time
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    /// First update delivered on the stream, as opposed to a later delta.
    /// Cleared by every rebuild.
    pub fn is_image(&self) -> bool {
        self.image
    }

    pub fn set_image(&mut self, image: bool) {
        self.image = image;
    }

    pub fn is_dead(&self) -> bool {
        self.update_time == 0.0 || (self.dead_time != 0.0 && self.dead_time > self.update_time)
    }

    pub fn is_active(&self) -> bool {
        self.update_time != 0.0 && !self.is_dead()
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Shared view, valid until the next mutation of this message.
    pub fn field(&self, fid: Fid) -> Option<&Field> {
        self.by_fid.get(&fid).map(|&ix| &self.fields[ix])
    }

    /// Independent copy of a field.
    pub fn field_owned(&self, fid: Fid) -> Option<Field> {
        self.field(fid).cloned()
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.field(self.schema.field_id(name))
    }

    /// Rewind the field cursor to before the first field.
    pub fn reset(&mut self) {
        self.cursor = None;
    }

    /// Move to the next field and return it; `None` once past the end.
    pub fn advance(&mut self) -> Option<&Field> {
        let next = self.cursor.map_or(0, |c| c + 1);
        self.cursor = Some(next.min(self.fields.len()));
        self.current()
    }

    pub fn current(&self) -> Option<&Field> {
        self.cursor.and_then(|c| self.fields.get(c))
    }

    /// Update time as `YYYY-MM-DD HH:MM:SS.mmm` (UTC)
    pub fn msg_time(&self) -> String {
        format_epoch(self.update_time).unwrap_or_default()
    }

    /// One field per line
    pub fn dump(&self, with_types: bool) -> String {
        let mut s = String::new();
        for (i, f) in self.fields.iter().enumerate() {
            if i > 0 {
                s.push('\n');
            }
            let v = f.as_string(0).unwrap_or_else(|_| "<empty>".to_string());
            let _ = if with_types {
                write!(s, "   [{:04}] {:<14} ({}) : {}", f.fid(), f.name(), f.field_type(), v)
            } else {
                write!(s, "   [{:04}] {:<14} : {}", f.fid(), f.name(), v)
            };
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldType, FieldValue};
    use crate::schema::SchemaEntry;

    fn raw(fid: Fid, v: f64) -> RawField {
        RawField::new(fid, FieldValue::Double(v), FieldType::Double)
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_entries(vec![
            SchemaEntry::new(22, "BID", Some(FieldType::Double)),
            SchemaEntry::new(25, "ASK", Some(FieldType::Double)),
        ]))
    }

    #[test]
    fn test_last_occurrence_wins() {
        let mut msg = Message::new(schema());
        msg.set_data("svc", "IBM", 0, 10.0, vec![raw(22, 1.0), raw(25, 2.0), raw(22, 3.0)]);
        assert_eq!(msg.num_fields(), 2);
        assert_eq!(msg.field(22).unwrap().as_double().unwrap(), 3.0);
        assert_eq!(msg.fields()[0].fid(), 22);
        assert_eq!(msg.fields()[0].name(), "BID");
    }

    #[test]
    fn test_reuse_shrinks_field_set() {
        let mut msg = Message::new(schema());
        msg.set_data("svc", "IBM", 0, 10.0, vec![raw(22, 1.0), raw(25, 2.0), raw(30, 4.0)]);
        msg.set_data("svc", "IBM", 0, 11.0, vec![raw(25, 5.0)]);
        assert_eq!(msg.num_fields(), 1);
        assert!(msg.field(22).is_none());
        assert_eq!(msg.field(25).unwrap().as_double().unwrap(), 5.0);
        assert_eq!(msg.fields()[0].name(), "ASK");
    }

    #[test]
    fn test_liveness() {
        let mut msg = Message::default();
        assert!(msg.is_dead());
        msg.set_data("svc", "IBM", 0, 100.0, Vec::new());
        assert!(msg.is_active());
        msg.set_dead_time(150.0);
        assert!(msg.is_dead());
        msg.set_error("svc", "IBM", 0, 200.0, "Unknown ticker");
        assert!(!msg.is_active());
        assert_eq!(msg.error(), "Unknown ticker");
        assert_eq!(msg.num_fields(), 0);
        msg.set_data("svc", "IBM", 0, 300.0, vec![raw(22, 1.0)]);
        assert!(msg.is_active());
        assert!(msg.error().is_empty());
    }

    #[test]
    fn test_iteration() {
        let mut msg = Message::new(schema());
        msg.set_data("svc", "IBM", 0, 1.0, vec![raw(22, 1.0), raw(25, 2.0)]);
        assert!(msg.current().is_none());
        assert_eq!(msg.advance().unwrap().fid(), 22);
        assert_eq!(msg.advance().unwrap().fid(), 25);
        assert!(msg.advance().is_none());
        assert!(msg.advance().is_none());
        msg.reset();
        assert_eq!(msg.advance().unwrap().fid(), 22);
    }

    #[test]
    fn test_dump() {
        let mut msg = Message::new(schema());
        msg.set_data("svc", "IBM", 0, 1.0, vec![raw(22, 1.5), raw(7, 2.0)]);
        let d = msg.dump(false);
        assert_eq!(d, "   [0022] BID            : 1.5\n   [0007] 7              : 2");
        assert!(msg.dump(true).contains("(DOUBLE)"));
    }
}
