//! Escape-aware line-protocol encoding.
//!
//! Encoding never fails for a [`Point`] that passed [`Point::is_encodable`]
//! checks at construction time; an empty measurement or fieldless point
//! simply encodes to zero bytes, matching the "silently skipped in batch
//! mode" rule.

use std::fmt::Write as _;

use crate::point::{FieldValue, Point};

const MEASUREMENT_DELIMS: [char; 2] = [',', ' '];
const KEY_VALUE_DELIMS: [char; 3] = [',', ' ', '='];
const STRING_FIELD_DELIMS: [char; 2] = ['"', '\\'];

/// Backslash-escape `s` ahead of every character in `delims`, appending the
/// result to `out`.
fn escape_into(s: &str, delims: &[char], out: &mut String) {
    for ch in s.chars() {
        if delims.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

fn escape(s: &str, delims: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, delims, &mut out);
    out
}

/// Render a single field value's wire form: numeric suffix, quoted string,
/// or bare boolean literal.
fn write_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::I8(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::I16(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::I32(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::I64(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::U8(v) => {
            let _ = write!(out, "{v}u");
        }
        FieldValue::U16(v) => {
            let _ = write!(out, "{v}u");
        }
        FieldValue::U32(v) => {
            let _ = write!(out, "{v}u");
        }
        FieldValue::U64(v) => {
            let _ = write!(out, "{v}u");
        }
        FieldValue::F32(v) => out.push_str(&crate::point::format_shortest_f32(*v)),
        FieldValue::F64(v) => out.push_str(&crate::point::format_shortest_f64(*v)),
        FieldValue::Bool(v) => out.push(if *v { 'T' } else { 'F' }),
        FieldValue::String(v) => {
            out.push('"');
            escape_into(v, &STRING_FIELD_DELIMS, out);
            out.push('"');
        }
    }
}

/// Encode a single [`Point`] to its line-protocol byte form.
///
/// An empty measurement or a point with no fields encodes to an empty
/// string.
pub fn encode(point: &Point) -> String {
    if !point.is_encodable() {
        return String::new();
    }

    let mut out = String::new();
    escape_into(&point.measurement, &MEASUREMENT_DELIMS, &mut out);

    for (k, v) in &point.tags {
        out.push(',');
        out.push_str(&escape(k, &KEY_VALUE_DELIMS));
        out.push('=');
        out.push_str(&escape(v, &KEY_VALUE_DELIMS));
    }

    out.push(' ');
    for (i, (k, v)) in point.fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(k, &KEY_VALUE_DELIMS));
        out.push('=');
        write_field_value(&mut out, v);
    }

    if point.timestamp != 0 {
        let _ = write!(out, " {}", point.timestamp);
    }

    out
}

/// Encode a batch of points, one line-protocol line each, joined with `\n`.
///
/// Points that are not encodable (see [`Point::is_encodable`]) are skipped
/// rather than producing a blank line.
pub fn encode_batch<'a>(points: impl IntoIterator<Item = &'a Point>) -> String {
    let mut lines = Vec::new();
    for point in points {
        let line = encode(point);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tags_or_timestamp() {
        let point = Point::builder("m0")
            .field("f0", 1.0_f64)
            .field("f1", 2_i64)
            .build()
            .unwrap();
        assert_eq!(encode(&point), "m0 f0=1,f1=2i");
    }

    #[test]
    fn tags_sorted_and_escaped() {
        let point = Point::builder("m0")
            .tag("t1", "v1")
            .tag("t0", "v0")
            .field("f1", 2_i64)
            .build()
            .unwrap();
        assert_eq!(encode(&point), "m0,t0=v0,t1=v1 f1=2i");
    }

    #[test]
    fn empty_measurement_encodes_to_nothing() {
        let mut point = Point::builder("placeholder")
            .field("f", 1_i64)
            .build()
            .unwrap();
        point.set_measurement(String::new());
        assert_eq!(encode(&point), "");
    }

    #[test]
    fn timestamp_zero_is_omitted() {
        let point = Point::builder("m0").field("f", 1_i64).build().unwrap();
        assert_eq!(encode(&point), "m0 f=1i");
    }

    #[test]
    fn structural_characters_are_escaped() {
        let point = Point::builder("weather")
            .tag("location", "beijing,fake=evil")
            .field("temperature", 25.5_f64)
            .build()
            .unwrap();
        assert_eq!(
            encode(&point),
            r#"weather,location=beijing\,fake\=evil temperature=25.5"#
        );
    }

    #[test]
    fn string_field_escapes_quotes_and_backslashes() {
        let point = Point::builder("m0")
            .field("msg", r#"say "hi"\now"#)
            .build()
            .unwrap();
        assert_eq!(encode(&point), r#"m0 msg="say \"hi\"\\now""#);
    }

    #[test]
    fn unsigned_and_bool_suffixes() {
        let point = Point::builder("m0")
            .field("u", 7_u64)
            .field("b", true)
            .build()
            .unwrap();
        assert_eq!(encode(&point), "m0 b=T,u=7u");
    }

    #[test]
    fn encode_batch_skips_empty_points() {
        let a = Point::builder("m0").field("f", 1_i64).build().unwrap();
        let mut b = a.clone();
        b.set_measurement(String::new());
        let out = encode_batch([&a, &b, &a]);
        assert_eq!(out, "m0 f=1i\nm0 f=1i");
    }
}
