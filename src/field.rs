/// Field model: type codes, raw values and typed accessors
///
/// A `Field` is one (fid, value) pair out of an update or an LVC record.
/// Date and time family values keep their raw numeric encoding; the
/// formatting helpers at the bottom are opt-in.

use chrono::DateTime;
use std::fmt;
use thiserror::Error;

/// Field identifier as carried on the wire and in the schema.
pub type Fid = i32;

/// Value coercion failures. Callers branch on these, so they are never
/// folded into a default value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field {fid} is empty")]
    Empty { fid: Fid },

    #[error("field {fid}: bad value {value:?}")]
    BadValue { fid: Fid, value: String },
}

pub type FieldResult<T> = Result<T, FieldError>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    #[default]
    Undef = 0,
    Int = 1,
    Double = 2,
    String = 3,
    /// ( y * 10000 ) + ( m * 100 ) + d
    Date = 4,
    /// TimeSec + fractional microseconds
    Time = 5,
    /// ( h * 10000 ) + ( m * 100 ) + s
    TimeSec = 6,
    Int64 = 7,
    /// Seconds since the epoch, fractional part allowed
    UnixTime = 8,
    /// Explicit empty / NaN marker
    None = 9,
    Vector = 10,
}

impl FieldType {
    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(FieldType::Undef),
            1 => Some(FieldType::Int),
            2 => Some(FieldType::Double),
            3 => Some(FieldType::String),
            4 => Some(FieldType::Date),
            5 => Some(FieldType::Time),
            6 => Some(FieldType::TimeSec),
            7 => Some(FieldType::Int64),
            8 => Some(FieldType::UnixTime),
            9 => Some(FieldType::None),
            10 => Some(FieldType::Vector),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Undef => "UNDEF",
            FieldType::Int => "INT",
            FieldType::Double => "DOUBLE",
            FieldType::String => "STRING",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::TimeSec => "TIME_SEC",
            FieldType::Int64 => "INT64",
            FieldType::UnixTime => "UNIX_TIME",
            FieldType::None => "NONE",
            FieldType::Vector => "VECTOR",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw field value as delivered by a transport or store.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Int(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    Vector(Vec<f64>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Double(v) => write!(f, "{}", v),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            FieldValue::Vector(v) => {
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", x)?;
                }
                Ok(())
            }
        }
    }
}

/// One positional `(fid, rawValue, typeEnum)` element of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub fid: Fid,
    pub value: FieldValue,
    pub ty: FieldType,
}

impl RawField {
    pub fn new(fid: Fid, value: FieldValue, ty: FieldType) -> Self {
        RawField { fid, value, ty }
    }
}

/// A named, typed field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    fid: Fid,
    name: String,
    ty: FieldType,
    value: FieldValue,
}

impl Field {
    pub fn new(fid: Fid, name: impl Into<String>, ty: FieldType, value: FieldValue) -> Self {
        Field {
            fid,
            name: name.into(),
            ty,
            value,
        }
    }

    pub fn fid(&self) -> Fid {
        self.fid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.ty
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Reuses the existing name allocation.
    pub(crate) fn set(&mut self, raw: RawField, name: &str) {
        self.fid = raw.fid;
        self.ty = raw.ty;
        self.value = raw.value;
        self.name.clear();
        self.name.push_str(name);
    }

    fn check_empty(&self) -> FieldResult<()> {
        if self.ty == FieldType::None || self.value == FieldValue::Empty {
            return Err(FieldError::Empty { fid: self.fid });
        }
        Ok(())
    }

    /// Value as string. A non-zero `decimals` truncates the fractional
    /// digits of a value that contains a decimal point; zero keeps the
    /// value whole.
    pub fn as_string(&self, decimals: usize) -> FieldResult<String> {
        if self.ty == FieldType::None {
            return Err(FieldError::Empty { fid: self.fid });
        }
        let mut s = self.value.to_string();
        if decimals > 0 {
            if let Some(ix) = s.find('.') {
                s.truncate((ix + decimals + 1).min(s.len()));
            }
        }
        Ok(s)
    }

    pub fn as_double(&self) -> FieldResult<f64> {
        self.check_empty()?;
        let bad = || FieldError::BadValue {
            fid: self.fid,
            value: self.value.to_string(),
        };
        match &self.value {
            FieldValue::Int(v) => Ok(*v as f64),
            FieldValue::Double(v) => Ok(*v),
            FieldValue::Str(s) => s.trim().parse::<f64>().map_err(|_| bad()),
            FieldValue::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .ok_or_else(bad),
            FieldValue::Vector(_) | FieldValue::Empty => Err(bad()),
        }
    }

    /// Truncation of `as_double()`
    pub fn as_int(&self) -> FieldResult<i64> {
        self.as_double().map(|d| d.trunc() as i64)
    }

    /// `(year, month, day)` of a DATE field.
    pub fn date_parts(&self) -> Option<(i32, u32, u32)> {
        if self.ty != FieldType::Date {
            return None;
        }
        let i = self.as_double().ok()? as i64;
        Some(((i / 10000) as i32, ((i % 10000) / 100) as u32, (i % 100) as u32))
    }

    /// `(hour, minute, second, micros)` of a TIME or TIME_SEC field.
    pub fn time_parts(&self) -> Option<(u32, u32, u32, u32)> {
        if !matches!(self.ty, FieldType::Time | FieldType::TimeSec) {
            return None;
        }
        let r64 = self.as_double().ok()?;
        let i = r64.trunc() as i64;
        let micros = if self.ty == FieldType::Time {
            ((r64 - i as f64) * 1_000_000.0).round() as u32
        } else {
            0
        };
        Some((
            (i / 10000) as u32,
            ((i % 10000) / 100) as u32,
            (i % 100) as u32,
            micros.min(999_999),
        ))
    }

    /// Human readable rendering of the date/time family; `None` for any
    /// other type or an unparseable value.
    pub fn formatted(&self) -> Option<String> {
        match self.ty {
            FieldType::Date => {
                let (y, m, d) = self.date_parts()?;
                Some(format!("{:04}-{:02}-{:02}", y, m, d))
            }
            FieldType::Time => {
                let (h, m, s, us) = self.time_parts()?;
                Some(format!("{:02}:{:02}:{:02}.{:06}", h, m, s, us))
            }
            FieldType::TimeSec => {
                let (h, m, s, _) = self.time_parts()?;
                Some(format!("{:02}:{:02}:{:02}", h, m, s))
            }
            FieldType::UnixTime => {
                let t = self.as_double().ok()?;
                Some(format_epoch(t)?)
            }
            _ => None,
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS.mmm` in UTC
pub fn format_epoch(t: f64) -> Option<String> {
    let secs = t.floor() as i64;
    let nanos = ((t - secs as f64) * 1e9) as u32;
    let dt = DateTime::from_timestamp(secs, nanos.min(999_999_999))?;
    Some(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(ty: FieldType, value: FieldValue) -> Field {
        Field::new(22, "BID", ty, value)
    }

    #[test]
    fn test_type_conversion() {
        assert_eq!(FieldType::from_i64(2), Some(FieldType::Double));
        assert_eq!(FieldType::from_i64(9), Some(FieldType::None));
        assert_eq!(FieldType::from_i64(99), None);
    }

    #[test]
    fn test_none_fails_coercion() {
        let f = field(FieldType::None, FieldValue::Double(1.0));
        assert_eq!(f.as_double(), Err(FieldError::Empty { fid: 22 }));
        assert_eq!(f.as_string(0), Err(FieldError::Empty { fid: 22 }));
        assert!(f.as_int().is_err());
    }

    #[test]
    fn test_bad_value() {
        let f = field(FieldType::String, FieldValue::Str("N/A".into()));
        assert!(matches!(f.as_double(), Err(FieldError::BadValue { fid: 22, .. })));
    }

    #[test]
    fn test_string_truncation() {
        let f = field(FieldType::String, FieldValue::Str("123.456789".into()));
        assert_eq!(f.as_string(0).unwrap(), "123.456789");
        assert_eq!(f.as_string(2).unwrap(), "123.45");
        assert_eq!(f.as_string(10).unwrap(), "123.456789");
        let i = field(FieldType::Int, FieldValue::Int(42));
        assert_eq!(i.as_string(3).unwrap(), "42");
    }

    #[test]
    fn test_as_int_truncates() {
        let f = field(FieldType::Double, FieldValue::Double(-7.9));
        assert_eq!(f.as_int().unwrap(), -7);
        let s = field(FieldType::String, FieldValue::Str(" 101.25 ".into()));
        assert_eq!(s.as_int().unwrap(), 101);
    }

    #[test]
    fn test_date_time_formatting() {
        let d = field(FieldType::Date, FieldValue::Int(20240315));
        assert_eq!(d.date_parts(), Some((2024, 3, 15)));
        assert_eq!(d.formatted().unwrap(), "2024-03-15");

        let t = field(FieldType::TimeSec, FieldValue::Int(93005));
        assert_eq!(t.formatted().unwrap(), "09:30:05");

        let tm = field(FieldType::Time, FieldValue::Double(143000.25));
        assert_eq!(tm.time_parts(), Some((14, 30, 0, 250_000)));

        let u = field(FieldType::UnixTime, FieldValue::Double(0.5));
        assert_eq!(u.formatted().unwrap(), "1970-01-01 00:00:00.500");

        let raw = field(FieldType::Double, FieldValue::Double(1.0));
        assert_eq!(raw.formatted(), None);
    }
}
