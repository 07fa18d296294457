//! Line-protocol / INSERT body parsing.
//!
//! [`parse_insert_body`] accepts the text that remains after the leading
//! `INSERT` keyword has been stripped (see [`crate::classify::strip_insert_keyword`])
//! and turns each non-blank line into a [`Point`]. Unlike the encoder, the
//! parser additionally tolerates `$identifier` placeholder tokens, which it
//! passes through unevaluated for [`crate::binder`] to resolve later.

use snafu::ensure;

use crate::error::{Error, ParseSnafu, Result};
use crate::point::{FieldValue, Point, RESERVED_TIME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Measurement,
    TagKey,
    TagValue,
    FieldKey,
    FieldValue,
    Timestamp,
}

/// Parse every non-blank line of `body` (CRLF tolerated) as a line-protocol
/// point, returning them in order.
pub fn parse_insert_body(body: &str) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    for (idx, raw_line) in body.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        points.push(parse_line(line, idx + 1)?);
    }
    Ok(points)
}

fn parse_err(line: usize, message: impl Into<String>) -> Error {
    ParseSnafu {
        line,
        message: message.into(),
    }
    .build()
}

/// Parse a single line-protocol line. `line_no` is only used to annotate
/// errors with enough context to locate the offending line.
fn parse_line(line: &str, line_no: usize) -> Result<Point> {
    let mut state = State::Measurement;
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut field_was_quoted = false;

    let mut measurement = String::new();
    let mut tags: Vec<(String, String)> = Vec::new();
    let mut cur_tag_key = String::new();
    let mut fields: Vec<(String, FieldValue)> = Vec::new();
    let mut cur_field_key = String::new();

    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                buf.push(next);
            }
            continue;
        }

        match state {
            State::Measurement => match c {
                ',' => {
                    measurement = std::mem::take(&mut buf);
                    state = State::TagKey;
                }
                ' ' => {
                    measurement = std::mem::take(&mut buf);
                    state = State::FieldKey;
                }
                _ => buf.push(c),
            },
            State::TagKey => match c {
                '=' => {
                    cur_tag_key = std::mem::take(&mut buf);
                    state = State::TagValue;
                }
                _ => buf.push(c),
            },
            State::TagValue => match c {
                ',' => {
                    tags.push((std::mem::take(&mut cur_tag_key), std::mem::take(&mut buf)));
                    state = State::TagKey;
                }
                ' ' => {
                    tags.push((std::mem::take(&mut cur_tag_key), std::mem::take(&mut buf)));
                    state = State::FieldKey;
                }
                _ => buf.push(c),
            },
            State::FieldKey => match c {
                '"' => in_quotes = !in_quotes,
                '=' if !in_quotes => {
                    cur_field_key = std::mem::take(&mut buf);
                    state = State::FieldValue;
                }
                _ => buf.push(c),
            },
            State::FieldValue => match c {
                '"' => {
                    in_quotes = !in_quotes;
                    field_was_quoted = true;
                }
                ',' if !in_quotes => {
                    fields.push((
                        std::mem::take(&mut cur_field_key),
                        infer_field_value(&std::mem::take(&mut buf), field_was_quoted),
                    ));
                    field_was_quoted = false;
                    state = State::FieldKey;
                }
                ' ' if !in_quotes => {
                    fields.push((
                        std::mem::take(&mut cur_field_key),
                        infer_field_value(&std::mem::take(&mut buf), field_was_quoted),
                    ));
                    field_was_quoted = false;
                    state = State::Timestamp;
                }
                _ => buf.push(c),
            },
            State::Timestamp => buf.push(c),
        }
    }

    // End of line: finalize whatever the trailing state was.
    match state {
        State::Measurement => {
            return Err(parse_err(line_no, "line ended while reading measurement"));
        }
        State::TagKey => {
            return Err(parse_err(line_no, "line ended with a dangling tag key"));
        }
        State::TagValue => {
            tags.push((cur_tag_key, buf));
        }
        State::FieldKey => {
            return Err(parse_err(line_no, "line ended with a dangling field key"));
        }
        State::FieldValue => {
            fields.push((cur_field_key, infer_field_value(&buf, field_was_quoted)));
        }
        State::Timestamp => {
            // handled below once we have the fields list populated.
        }
    }

    let timestamp = if state == State::Timestamp {
        if buf.trim().is_empty() {
            0
        } else {
            buf.trim()
                .parse::<i64>()
                .map_err(|_| parse_err(line_no, format!("invalid timestamp `{}`", buf.trim())))?
        }
    } else {
        0
    };

    ensure!(
        !measurement.is_empty(),
        ParseSnafu {
            line: line_no,
            message: "measurement must not be empty".to_string(),
        }
    );
    ensure!(
        !fields.is_empty(),
        ParseSnafu {
            line: line_no,
            message: "line must have at least one field".to_string(),
        }
    );
    for (key, _) in &tags {
        ensure!(
            key != RESERVED_TIME_KEY,
            ParseSnafu {
                line: line_no,
                message: "`time` is a reserved tag name".to_string(),
            }
        );
    }
    for (key, _) in &fields {
        ensure!(
            key != RESERVED_TIME_KEY,
            ParseSnafu {
                line: line_no,
                message: "`time` is a reserved field name".to_string(),
            }
        );
    }

    let mut builder = Point::builder(measurement).timestamp(timestamp);
    for (k, v) in tags {
        builder = builder.tag(k, v);
    }
    for (k, v) in fields {
        builder = builder.field(k, v);
    }

    builder
        .build()
        .map_err(|_| parse_err(line_no, "internal: point failed post-parse validation"))
}

const TRUE_LITERALS: &[&str] = &["true", "True", "TRUE", "t", "T"];
const FALSE_LITERALS: &[&str] = &["false", "False", "FALSE", "f", "F"];

/// Infer the typed value of a raw (already unescaped) field token.
fn infer_field_value(raw: &str, quoted: bool) -> FieldValue {
    if quoted {
        return FieldValue::String(raw.to_string());
    }

    if let Some(digits) = raw.strip_suffix('i').or_else(|| raw.strip_suffix('I')) {
        if let Ok(v) = digits.parse::<i64>() {
            return FieldValue::I64(v);
        }
    }
    if let Some(digits) = raw.strip_suffix('u').or_else(|| raw.strip_suffix('U')) {
        if let Ok(v) = digits.parse::<u64>() {
            return FieldValue::U64(v);
        }
    }
    if TRUE_LITERALS.contains(&raw) {
        return FieldValue::Bool(true);
    }
    if FALSE_LITERALS.contains(&raw) {
        return FieldValue::Bool(false);
    }
    if let Ok(v) = raw.parse::<f64>() {
        return FieldValue::F64(v);
    }
    FieldValue::String(raw.to_string())
}
