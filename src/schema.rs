/// Field dictionary: FID-to-name, name-to-FID and FID-to-type
///
/// Built once from the dictionary delivered at connect time (or loaded from
/// an LVC). Lookups never fail: unknown names resolve to FID 0, unknown
/// FIDs stringify, unknown types read as NONE.

use crate::field::{Fid, FieldType};
use std::borrow::Cow;
use std::collections::HashMap;

/// One `(fid, name[, type])` dictionary entry
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaEntry {
    pub fid: Fid,
    pub name: String,
    pub ty: Option<FieldType>,
}

impl SchemaEntry {
    pub fn new(fid: Fid, name: impl Into<String>, ty: Option<FieldType>) -> Self {
        SchemaEntry {
            fid,
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    by_fid: HashMap<Fid, String>,
    by_name: HashMap<String, Fid>,
    by_type: HashMap<Fid, FieldType>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = SchemaEntry>,
    {
        let mut schema = Schema::new();
        for e in entries {
            if let Some(ty) = e.ty {
                schema.by_type.insert(e.fid, ty);
            }
            schema.by_name.insert(e.name.clone(), e.fid);
            schema.by_fid.insert(e.fid, e.name);
        }
        schema
    }

    pub fn size(&self) -> usize {
        self.by_fid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fid.is_empty()
    }

    pub fn fids(&self, sorted: bool) -> Vec<Fid> {
        let mut rc: Vec<Fid> = self.by_fid.keys().copied().collect();
        if sorted {
            rc.sort_unstable();
        }
        rc
    }

    /// FID from a name or a stringified number; 0 if unresolvable.
    pub fn field_id(&self, name: &str) -> Fid {
        match name.trim().parse::<Fid>() {
            Ok(fid) if fid != 0 => fid,
            _ => self.by_name.get(name).copied().unwrap_or(0),
        }
    }

    /// Name of `fid`, or the FID itself stringified when unknown.
    pub fn field_name(&self, fid: Fid) -> Cow<'_, str> {
        match self.by_fid.get(&fid) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(fid.to_string()),
        }
    }

    pub fn field_type(&self, fid: Fid) -> FieldType {
        self.by_type.get(&fid).copied().unwrap_or(FieldType::None)
    }

    pub fn contains(&self, fid: Fid) -> bool {
        self.by_fid.contains_key(&fid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_entries(vec![
            SchemaEntry::new(22, "BID", Some(FieldType::Double)),
            SchemaEntry::new(25, "ASK", Some(FieldType::Double)),
            SchemaEntry::new(3, "DSPLY_NAME", None),
        ])
    }

    #[test]
    fn test_lookup_by_name() {
        let s = schema();
        assert_eq!(s.field_id("BID"), 22);
        assert_eq!(s.field_id("NOPE"), 0);
        assert_eq!(s.field_id("6"), 6);
        assert_eq!(s.field_id("0"), 0);
    }

    #[test]
    fn test_lookup_by_fid() {
        let s = schema();
        assert_eq!(s.field_name(25), "ASK");
        assert_eq!(s.field_name(999), "999");
        assert_eq!(s.field_type(22), FieldType::Double);
        assert_eq!(s.field_type(3), FieldType::None);
        assert_eq!(s.field_type(999), FieldType::None);
    }

    #[test]
    fn test_fids_sorted() {
        let s = schema();
        assert_eq!(s.size(), 3);
        assert_eq!(s.fids(true), vec![3, 22, 25]);
    }
}
