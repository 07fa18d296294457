//! Parameter binding: typed, structured substitution of `$name` placeholders
//! into an already-parsed [`Point`].
//!
//! Because substitution runs on the parsed, structured point rather than on
//! line-protocol text, a parameter value containing `,`, ` `, `=`, `"`, or
//! `\n` cannot introduce additional tags, fields, or points — the encoder
//! escapes those characters when the bound point is later serialized.

use std::collections::BTreeMap;

use regex_placeholder::find_placeholders;

use crate::error::{Error, MissingParameterSnafu, Result, UnresolvedParametersSnafu};
use crate::point::{FieldValue, Point};

/// The caller-supplied parameter mapping passed to [`bind`].
pub type Params = BTreeMap<String, FieldValue>;

/// Bind `params` into `point`, returning a new, fully substituted [`Point`].
///
/// Substitutes in three steps, in order: measurement, then tags, then
/// fields (with the single-placeholder-preserves-type rule for fields).
pub fn bind(point: &Point, params: &Params) -> Result<Point> {
    let measurement = string_replace(point.measurement(), params)?;

    let mut tags = BTreeMap::new();
    for (k, v) in point.tags() {
        let bound_key = string_replace(k, params)?;
        let bound_value = string_replace(v, params)?;
        // Last-writer-wins on key collisions; BTreeMap iteration order
        // over the source tags is already deterministic.
        tags.insert(bound_key, bound_value);
    }

    let mut fields = BTreeMap::new();
    for (k, v) in point.fields() {
        let bound_value = match v {
            FieldValue::String(s) => bind_field_string(k, s, params)?,
            other => other.clone(),
        };
        fields.insert(k.clone(), bound_value);
    }

    Ok(Point::builder(measurement)
        .timestamp(point.timestamp())
        .precision(point.precision())
        .build_from_parts(tags, fields))
}

/// A raw string field value is bound one of two ways: if it is *exactly* a
/// lone `$name` placeholder, the bound value takes on the parameter's own
/// type; otherwise ordinary string replacement runs and the result (if any
/// substitution happened, or even if none did) stays a string.
fn bind_field_string(field_key: &str, raw: &str, params: &Params) -> Result<FieldValue> {
    if let Some(name) = lone_placeholder_name(raw) {
        return match params.get(name) {
            Some(value) => Ok(value.clone()),
            None => MissingParameterSnafu {
                name: name.to_string(),
                field: field_key.to_string(),
            }
            .fail(),
        };
    }

    if raw.contains('$') {
        return string_replace(raw, params).map(FieldValue::String);
    }

    Ok(FieldValue::String(raw.to_string()))
}

/// If `raw` is exactly one placeholder (`\$[A-Za-z0-9_]+`) and nothing
/// else, return the identifier name (without the `$`).
fn lone_placeholder_name(raw: &str) -> Option<&str> {
    let rest = raw.strip_prefix('$')?;
    if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(rest)
    } else {
        None
    }
}

/// Replace every `$name` occurrence in `s` with the stringified parameter
/// value. Fails if any `$identifier` remains after every supplied
/// parameter has been tried.
fn string_replace(s: &str, params: &Params) -> Result<String> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut out = s.to_string();
    for (name, value) in params {
        let needle = format!("${name}");
        if out.contains(&needle) {
            out = out.replace(&needle, &value.stringify());
        }
    }

    let remaining = find_placeholders(&out);
    if !remaining.is_empty() {
        return UnresolvedParametersSnafu { names: remaining }.fail();
    }

    Ok(out)
}

/// Minimal `$identifier`-finding helper, kept as its own tiny module so the
/// regex-shaped scan (no actual `regex` crate dependency needed for one
/// pattern) stays unit-testable in isolation.
mod regex_placeholder {
    /// Find every `$identifier` token remaining in `s` (matching
    /// `\$[A-Za-z0-9_]+`), in order of first appearance, without
    /// duplicates.
    pub fn find_placeholders(s: &str) -> Vec<String> {
        let mut found = Vec::new();
        let bytes = s.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    let token = format!("${}", &s[start..end]);
                    if !found.contains(&token) {
                        found.push(token);
                    }
                    i = end;
                    continue;
                }
            }
            i += 1;
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_protocol::encode;
    use crate::parser::parse_insert_body;

    fn parse_one(line: &str) -> Point {
        parse_insert_body(line).unwrap().remove(0)
    }

    #[test]
    fn inject_safe_single_point_write() {
        let point = parse_one("weather,location=$loc temperature=$temp");
        let mut params = Params::new();
        params.insert("loc".to_string(), FieldValue::String("beijing,fake=evil".to_string()));
        params.insert("temp".to_string(), FieldValue::F64(25.5));

        let bound = bind(&point, &params).unwrap();
        assert_eq!(bound.tags().len(), 1);
        assert_eq!(bound.tags().get("location").unwrap(), "beijing,fake=evil");
        assert_eq!(bound.fields().get("temperature").unwrap(), &FieldValue::F64(25.5));

        let encoded = encode(&bound);
        assert!(encoded.starts_with(r#"weather,location=beijing\,fake\=evil temperature=25.5"#));

        let roundtrip = parse_one(&encoded);
        assert_eq!(roundtrip.tags().len(), 1);
        assert!(!roundtrip.tags().contains_key("fake"));
        assert_eq!(roundtrip.tags().get("location").unwrap(), "beijing,fake=evil");
    }

    #[test]
    fn type_preservation_for_lone_placeholder() {
        let point = parse_one("m,t=a v=$x");

        let mut params = Params::new();
        params.insert("x".to_string(), FieldValue::I64(60));
        let bound = bind(&point, &params).unwrap();
        assert_eq!(encode(&bound), "m,t=a v=60i");

        let mut params = Params::new();
        params.insert("x".to_string(), FieldValue::F64(3.14));
        let bound = bind(&point, &params).unwrap();
        assert_eq!(encode(&bound), "m,t=a v=3.14");

        let mut params = Params::new();
        params.insert("x".to_string(), FieldValue::Bool(true));
        let bound = bind(&point, &params).unwrap();
        assert_eq!(encode(&bound), "m,t=a v=T");
    }

    #[test]
    fn missing_parameter_for_lone_placeholder_fails() {
        let point = parse_one("m,t=a v=$x");
        let err = bind(&point, &Params::new()).unwrap_err();
        match err {
            Error::MissingParameter { name, field } => {
                assert_eq!(name, "x");
                assert_eq!(field, "v");
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_remainder_after_partial_substitution_fails() {
        let point = parse_one(r#"m,t=$a v="has $b and $c inside""#);
        let mut params = Params::new();
        params.insert("a".to_string(), FieldValue::String("tagval".to_string()));
        params.insert("b".to_string(), FieldValue::String("only-b".to_string()));

        let err = bind(&point, &params).unwrap_err();
        match err {
            Error::UnresolvedParameters { names } => {
                assert_eq!(names, vec!["$c".to_string()]);
            }
            other => panic!("expected UnresolvedParameters, got {other:?}"),
        }
    }

    #[test]
    fn extra_unused_parameters_are_ignored() {
        let point = parse_one("m,t=a v=1i");
        let mut params = Params::new();
        params.insert("unused".to_string(), FieldValue::String("x".to_string()));
        let bound = bind(&point, &params).unwrap();
        assert_eq!(bound, point);
    }

    #[test]
    fn no_residual_placeholders_after_successful_bind() {
        let point = parse_one(r#"weather,city=$city temperature=$temp,note="$city says hi""#);
        let mut params = Params::new();
        params.insert("city".to_string(), FieldValue::String("nyc".to_string()));
        params.insert("temp".to_string(), FieldValue::F64(10.0));

        let bound = bind(&point, &params).unwrap();
        let encoded = encode(&bound);
        assert!(!encoded.contains('$'));
    }

    #[test]
    fn field_key_placeholders_pass_through_unchanged() {
        // Only measurement, tag keys/values, and field values are
        // substituted; a field key is structural and is left as-is.
        let mut point = Point::builder("m").field("f", 1_i64).build().unwrap();
        point.set_field("$dyn".to_string(), FieldValue::I64(2));
        let bound = bind(&point, &Params::new()).unwrap();
        assert!(bound.fields().contains_key("$dyn"));
    }
}
