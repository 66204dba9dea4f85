//! Lexical helpers: identifier escaping and literal formatting.

use super::ast::Literal;
use crate::errors::N1qlError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Function both operands of a date-time comparison are wrapped in.
pub const DATE_CANONICALIZE_FN: &str = "STR_TO_MILLIS";

const DELIMITER: char = '`';

/// Wrap `identifier` in backticks, doubling any embedded backtick.
///
/// # Errors
/// `IdentifierInvalid` for an empty identifier.
pub fn escape_identifier(identifier: &str) -> Result<String, N1qlError> {
    if identifier.is_empty() {
        return Err(N1qlError::IdentifierInvalid("identifier is empty".into()));
    }
    let mut out = String::with_capacity(identifier.len() + 2);
    out.push(DELIMITER);
    for c in identifier.chars() {
        if c == DELIMITER {
            out.push(DELIMITER);
        }
        out.push(c);
    }
    out.push(DELIMITER);
    Ok(out)
}

/// Nullable front door for callers holding an optional name.
///
/// # Errors
/// `IdentifierInvalid` for `None` or an empty identifier.
pub fn escape(identifier: Option<&str>) -> Result<String, N1qlError> {
    match identifier {
        Some(s) => escape_identifier(s),
        None => Err(N1qlError::IdentifierInvalid("identifier is null".into())),
    }
}

#[must_use]
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Canonical instant format used for stored and literal date-times.
#[must_use]
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[must_use]
pub fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) if f.is_finite() => {
            let s = f.to_string();
            if s.contains(['.', 'e', 'E']) { s } else { format!("{s}.0") }
        }
        Literal::Float(_) => "NULL".to_string(),
        Literal::String(s) => quote_string(s),
        Literal::DateTime(dt) => quote_string(&format_datetime(dt)),
        Literal::Array(items) => {
            let parts: Vec<String> = items.iter().map(format_literal).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

/// Build a quoted LIKE pattern, escaping `%`, `_` and `\` in the user text.
#[must_use]
pub fn like_pattern(prefix: &str, text: &str, suffix: &str) -> String {
    let mut body = String::with_capacity(text.len() + 2);
    body.push_str(prefix);
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            body.push('\\');
        }
        body.push(c);
    }
    body.push_str(suffix);
    quote_string(&body)
}

/// `STR_TO_MILLIS(x)`
#[must_use]
pub fn canonicalize_datetime(rendered: &str) -> String {
    format!("{DATE_CANONICALIZE_FN}({rendered})")
}

/// True if `s` is enclosed by a single matching pair of parentheses, ignoring parens inside
/// string literals and escaped identifiers.
#[must_use]
pub fn is_wrapped(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'(' || bytes[bytes.len() - 1] != b')' {
        return false;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != bytes.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Parenthesize unless already fully wrapped.
#[must_use]
pub fn wrap(s: String) -> String {
    if is_wrapped(&s) { s } else { format!("({s})") }
}
