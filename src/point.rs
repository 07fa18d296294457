//! The logical data model: [`Point`], [`FieldValue`] and [`Precision`].
//!
//! This module only describes *structured* data. Turning a [`Point`] into
//! line-protocol bytes is [`crate::line_protocol::encode`]; parsing bytes
//! back into [`Point`]s is [`crate::parser::parse_insert`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::ensure;

use crate::error::{Error, Result, ValidationSnafu};

/// The time unit a [`Point`]'s timestamp is expressed in.
///
/// Mirrors the `epoch` query parameter accepted by the `/query` endpoint:
/// every variant but [`Precision::Rfc3339`] has a one- or two-letter wire
/// form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Nanoseconds since the Unix epoch. This is the wire default.
    Nanoseconds,
    /// Microseconds since the Unix epoch.
    Microseconds,
    /// Milliseconds since the Unix epoch.
    Milliseconds,
    /// Seconds since the Unix epoch.
    Seconds,
    /// Minutes since the Unix epoch.
    Minutes,
    /// Hours since the Unix epoch.
    Hours,
    /// RFC3339 formatted timestamps; only valid for query responses.
    Rfc3339,
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Nanoseconds
    }
}

impl Precision {
    /// The string InfluxDB expects for the `epoch` query parameter.
    pub fn epoch(&self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
            Precision::Rfc3339 => "rfc3339",
        }
    }

    /// How many nanoseconds make up one unit of this precision.
    ///
    /// Panics (via `unreachable!`) for [`Precision::Rfc3339`], which has no
    /// fixed-width unit; callers must not call this for that variant.
    fn nanos_per_unit(&self) -> i64 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60 * 1_000_000_000,
            Precision::Hours => 60 * 60 * 1_000_000_000,
            Precision::Rfc3339 => unreachable!("rfc3339 has no fixed unit width"),
        }
    }

    /// Round a nanosecond timestamp down to this precision's unit boundary,
    /// then re-express the result in nanoseconds.
    pub fn truncate_nanos(&self, nanos: i64) -> i64 {
        if matches!(self, Precision::Rfc3339) {
            return nanos;
        }
        let unit = self.nanos_per_unit();
        (nanos / unit) * unit
    }
}

/// A typed field value, over the closed set the wire format supports.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Signed 8-bit integer.
    I8(i8),
    /// Signed 16-bit integer.
    I16(i16),
    /// Signed 32-bit integer.
    I32(i32),
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// 32-bit floating point number.
    F32(f32),
    /// 64-bit floating point number.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// Render this value the way the parameter binder's "string
    /// replacement" step does: strings verbatim, integers as bare decimal
    /// digits, floats via shortest round-trip decimal, booleans as
    /// `true`/`false`.
    pub fn stringify(&self) -> String {
        match self {
            FieldValue::I8(v) => v.to_string(),
            FieldValue::I16(v) => v.to_string(),
            FieldValue::I32(v) => v.to_string(),
            FieldValue::I64(v) => v.to_string(),
            FieldValue::U8(v) => v.to_string(),
            FieldValue::U16(v) => v.to_string(),
            FieldValue::U32(v) => v.to_string(),
            FieldValue::U64(v) => v.to_string(),
            FieldValue::F32(v) => format_shortest_f32(*v),
            FieldValue::F64(v) => format_shortest_f64(*v),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::String(v) => v.clone(),
        }
    }

    pub(crate) fn is_string(&self) -> bool {
        matches!(self, FieldValue::String(_))
    }
}

/// Shortest round-trip decimal rendering of an `f64`, via `ryu`.
pub(crate) fn format_shortest_f64(v: f64) -> String {
    let mut buf = ryu::Buffer::new();
    buf.format(v).to_string()
}

/// Shortest round-trip decimal rendering of an `f32`, via `ryu`.
pub(crate) fn format_shortest_f32(v: f32) -> String {
    let mut buf = ryu::Buffer::new();
    buf.format(v).to_string()
}

macro_rules! from_impl {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for FieldValue {
            fn from(v: $ty) -> Self {
                FieldValue::$variant(v)
            }
        }
    };
}

from_impl!(I8, i8);
from_impl!(I16, i16);
from_impl!(I32, i32);
from_impl!(I64, i64);
from_impl!(U8, u8);
from_impl!(U16, u16);
from_impl!(U32, u32);
from_impl!(U64, u64);
from_impl!(F32, f32);
from_impl!(F64, f64);
from_impl!(Bool, bool);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// A single record to send to (or parsed from) the server.
///
/// Tags and fields are kept in `BTreeMap`s: InfluxDB itself recommends
/// sorted tags for write performance, and a deterministic iteration order
/// makes encoding (and therefore tests) reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub(crate) measurement: String,
    pub(crate) tags: BTreeMap<String, String>,
    pub(crate) fields: BTreeMap<String, FieldValue>,
    pub(crate) timestamp: i64,
    pub(crate) precision: Precision,
}

/// The field/tag key reserved by the wire format for the timestamp column.
pub const RESERVED_TIME_KEY: &str = "time";

impl Point {
    /// Begin building a new point for the given measurement.
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder::new(measurement)
    }

    /// The measurement (series family) name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// The tag map.
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The field map.
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// The raw timestamp value (0 means "omit from wire form").
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The precision the timestamp is expressed in.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Whether this point is encodable: non-empty measurement and at least
    /// one field.
    pub fn is_encodable(&self) -> bool {
        !self.measurement.is_empty() && !self.fields.is_empty()
    }

    pub(crate) fn set_tag(&mut self, key: String, value: String) {
        self.tags.insert(key, value);
    }

    pub(crate) fn set_field(&mut self, key: String, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub(crate) fn set_measurement(&mut self, measurement: String) {
        self.measurement = measurement;
    }
}

/// Incrementally constructs a [`Point`].
///
/// Created via [`Point::builder`].
#[derive(Debug, Clone)]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
    precision: Precision,
}

impl PointBuilder {
    fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: 0,
            precision: Precision::Nanoseconds,
        }
    }

    /// Set a tag, replacing any existing tag of the same name.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set a field, replacing any existing field of the same name.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the timestamp directly, as a count of units at `precision()`.
    /// Zero means "omit from wire form".
    pub fn timestamp(mut self, value: i64) -> Self {
        self.timestamp = value;
        self
    }

    /// Set the precision the timestamp (or `now()`, see
    /// [`PointBuilder::now`]) is expressed in. Defaults to nanoseconds.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Stamp this point with the current wall-clock time, rounded down to
    /// `precision()`'s unit boundary then stored as nanoseconds.
    pub fn now(mut self) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_nanos() as i64;
        self.timestamp = self.precision.truncate_nanos(nanos);
        self
    }

    /// Construct a point directly from already-bound tag/field maps,
    /// bypassing the emptiness/reserved-name checks in [`PointBuilder::build`].
    ///
    /// Used by [`crate::binder::bind`], whose input is always a [`Point`]
    /// that already satisfied those invariants when it was parsed or built;
    /// binding cannot make a valid point invalid.
    pub(crate) fn build_from_parts(
        self,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Point {
        Point {
            measurement: self.measurement,
            tags,
            fields,
            timestamp: self.timestamp,
            precision: self.precision,
        }
    }

    /// Construct the point, validating: at least one field, and no tag or
    /// field named `time` (reserved by the wire format).
    pub fn build(self) -> Result<Point> {
        ensure!(
            !self.fields.is_empty(),
            ValidationSnafu {
                message: "point must have at least one field".to_string(),
            }
        );
        ensure!(
            !self.tags.contains_key(RESERVED_TIME_KEY) && !self.fields.contains_key(RESERVED_TIME_KEY),
            ValidationSnafu {
                message: "`time` is a reserved tag/field name".to_string(),
            }
        );

        Ok(Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp,
            precision: self.precision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_fields() {
        let err = Point::builder("m0").build().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn builder_rejects_reserved_time_field() {
        let err = Point::builder("m0")
            .field("time", 1_i64)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn builder_rejects_reserved_time_tag() {
        let err = Point::builder("m0")
            .tag("time", "now")
            .field("f", 1_i64)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn precision_truncates_to_unit_boundary() {
        // 1,500,000,000 ns truncated to whole seconds is 1,000,000,000 ns.
        assert_eq!(Precision::Seconds.truncate_nanos(1_500_000_000), 1_000_000_000);
        assert_eq!(Precision::Rfc3339.truncate_nanos(1_500_000_000), 1_500_000_000);
    }

    #[test]
    fn stringify_matches_binder_rules() {
        assert_eq!(FieldValue::from(42_i64).stringify(), "42");
        assert_eq!(FieldValue::from(true).stringify(), "true");
        assert_eq!(FieldValue::from("hi").stringify(), "hi");
    }
}
