//! Statement classification.
//!
//! [`clean_command`] strips comments the way InfluxQL tooling conventionally
//! does, and [`classify`] inspects the first significant token to decide
//! whether a statement is a query, a command, an insert, or unrecognized.

/// The coarse category a free-form statement falls into.
///
/// `Query` and `Command` are both "query-like" in the sense that they are
/// forwarded to the query path; only `Insert` is "write-like".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementType {
    /// `SELECT`, `SHOW`, `EXPLAIN`, `DESCRIBE`/`DESC`, `WITH`.
    Query,
    /// `CREATE`, `DROP`, `ALTER`, `UPDATE`, `DELETE`.
    Command,
    /// `INSERT`.
    Insert,
    /// Anything else, or empty after comment-stripping.
    Unknown,
}

impl StatementType {
    /// `true` for [`StatementType::Query`] and [`StatementType::Command`].
    pub fn is_query_like(&self) -> bool {
        matches!(self, StatementType::Query | StatementType::Command)
    }

    /// `true` only for [`StatementType::Insert`].
    pub fn is_write_like(&self) -> bool {
        matches!(self, StatementType::Insert)
    }
}

const QUERY_KEYWORDS: &[&str] = &["SELECT", "SHOW", "EXPLAIN", "DESCRIBE", "DESC", "WITH"];
const COMMAND_KEYWORDS: &[&str] = &["CREATE", "DROP", "ALTER", "UPDATE", "DELETE"];

/// Strip `--` single-line comments and `/* ... */` multi-line comments from
/// `stmt`. An unclosed `/*` is left intact: the text from that point on is
/// kept verbatim.
///
/// Idempotent: `clean_command(clean_command(x)) == clean_command(x)`.
pub fn clean_command(stmt: &str) -> String {
    let mut out = String::with_capacity(stmt.len());
    let mut chars = stmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '-' && chars.peek() == Some(&'-') {
            // Single-line comment: consume through end of line (exclusive
            // of the newline itself, which is preserved).
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }

        if c == '/' && chars.peek() == Some(&'*') {
            // Look for a closing `*/`. If none exists, treat the `/*` (and
            // everything after) as ordinary text.
            let mut lookahead = chars.clone();
            lookahead.next(); // consume the '*' we peeked
            let mut closed = false;
            let mut scan = lookahead.clone();
            while let Some(c1) = scan.next() {
                if c1 == '*' && scan.peek() == Some(&'/') {
                    closed = true;
                    break;
                }
            }
            if !closed {
                out.push(c);
                continue;
            }

            chars.next(); // consume '*'
            loop {
                match chars.next() {
                    Some('*') if chars.peek() == Some(&'/') => {
                        chars.next();
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            continue;
        }

        out.push(c);
    }

    out
}

/// Classify a free-form statement.
///
/// Case-insensitive and whitespace-insensitive on the first significant
/// word: leading/trailing whitespace and comments are stripped before the
/// first token is uppercased and matched against the keyword tables.
pub fn classify(stmt: &str) -> StatementType {
    let cleaned = clean_command(stmt);
    let first_token = cleaned.split_whitespace().next().unwrap_or("");
    if first_token.is_empty() {
        return StatementType::Unknown;
    }

    let upper = first_token.to_uppercase();
    if QUERY_KEYWORDS.contains(&upper.as_str()) {
        StatementType::Query
    } else if COMMAND_KEYWORDS.contains(&upper.as_str()) {
        StatementType::Command
    } else if upper == "INSERT" {
        StatementType::Insert
    } else {
        StatementType::Unknown
    }
}

/// Strip the leading `INSERT` keyword (and the whitespace following it)
/// from a statement already classified as [`StatementType::Insert`],
/// returning the remainder to be handed to the line-protocol parser.
///
/// Operates on the original (not comment-stripped) text, matching the
/// keyword case-insensitively.
pub fn strip_insert_keyword(stmt: &str) -> &str {
    let trimmed = stmt.trim_start();
    let keyword_len = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    trimmed[keyword_len..].trim_start()
}
