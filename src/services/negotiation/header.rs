//! Structured, weighted HTTP header values.
//!
//! A header field such as `Accept: text/html;level=1;q=0.8, */*;q=0.1` is split
//! into one [`ParsedHeaderValue`] per list element. Parsing is a pure function of
//! the header text; nothing here is cached across requests.

use indexmap::IndexMap;
use thiserror::Error;

use super::kind::HeaderKind;

/// Errors produced while parsing a header field.
///
/// A parse error invalidates the whole field. Callers degrade it to
/// "not acceptable" rather than failing the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("entry {index} has no value")]
    EmptyValue { index: usize },
    #[error("entry {index} has an invalid quality value: {raw:?}")]
    InvalidQuality { index: usize, raw: String },
    #[error("entry {index} is not a valid media range: {raw:?}")]
    InvalidMediaRange { index: usize, raw: String },
    #[error("unterminated quoted string")]
    UnterminatedQuote,
    #[error("header value is not valid visible ASCII")]
    NotVisibleAscii,
}

/// Result of looking up a parameter by name.
///
/// `Empty` is a parameter that was present without a value (`text/html;foo`),
/// which is not the same thing as a parameter that was never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLookup<'a> {
    Absent,
    Empty,
    Value(&'a str),
}

impl<'a> ParamLookup<'a> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    pub fn value(&self) -> Option<&'a str> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// One entry of a parsed header field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedHeaderValue {
    kind: HeaderKind,
    raw_value: String,
    value: String,
    weight: f32,
    quality_text: Option<String>,
    // `None` marks a parameter sent without a value.
    parameters: IndexMap<String, Option<String>>,
    weighted_order: usize,
}

impl ParsedHeaderValue {
    /// The unmodified text of this entry as received from the user agent.
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    /// The content before the first `;` (media range, language range, token).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Quality from the `q` parameter; 1.0 when absent (RFC 9110 §12.4.2).
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// The `q` parameter exactly as sent, kept for diagnostics.
    pub fn quality_text(&self) -> Option<&str> {
        self.quality_text.as_deref()
    }

    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    /// Look up a parameter (case-insensitive name). `q` is never present.
    pub fn parameter(&self, key: &str) -> ParamLookup<'_> {
        match self.parameters.get(&key.to_ascii_lowercase()) {
            None => ParamLookup::Absent,
            Some(None) => ParamLookup::Empty,
            Some(Some(v)) => ParamLookup::Value(v),
        }
    }

    /// All parameters in declaration order, `q` excluded.
    pub fn parameters(&self) -> &IndexMap<String, Option<String>> {
        &self.parameters
    }

    /// False only when the client explicitly excluded this value with `q=0`.
    pub fn is_permitted(&self) -> bool {
        self.weight != 0.0
    }

    /// Position of this entry in its header field.
    pub fn weighted_order(&self) -> usize {
        self.weighted_order
    }

    /// True when `match_try` is this value or something this value generalises.
    ///
    /// Wildcard segments on `self` match any concrete segment of `match_try`,
    /// never the other way round. Every parameter carried by `self` must be
    /// satisfied by `match_try`; a valueless parameter only requires presence.
    pub fn is_matched_by(&self, match_try: &ParsedHeaderValue) -> bool {
        if !self.kind.value_matches(&self.value, &match_try.value) {
            return false;
        }

        self.parameters
            .iter()
            .all(|(key, required)| match (required, match_try.parameter(key)) {
                (_, ParamLookup::Absent) => false,
                (None, _) => true,
                (Some(expected), ParamLookup::Value(actual)) => {
                    expected.eq_ignore_ascii_case(actual)
                }
                (Some(_), ParamLookup::Empty) => false,
            })
    }

    /// Media type part before `/` (`text` in `text/html`).
    pub fn component(&self) -> Option<&str> {
        self.value.split_once('/').map(|(c, _)| c)
    }

    /// Media subtype part after `/` (`html` in `text/html`).
    pub fn sub_component(&self) -> Option<&str> {
        self.value.split_once('/').map(|(_, s)| s)
    }

    /// Primary language subtag (`en` in `en-US`).
    pub fn tag(&self) -> &str {
        self.subtag(0).unwrap_or_default()
    }

    /// The language subtag at `level` (0 is the primary tag).
    pub fn subtag(&self, level: usize) -> Option<&str> {
        self.value.split('-').nth(level)
    }

    pub fn subtag_count(&self) -> usize {
        self.value.split('-').count()
    }
}

/// Parse one header field into its entries, in declaration order.
///
/// Empty list elements (`a,,b`) are skipped and do not consume a
/// `weighted_order` slot.
pub fn parse_header(kind: HeaderKind, raw: &str) -> Result<Vec<ParsedHeaderValue>, ParseError> {
    if !raw.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b)) {
        return Err(ParseError::NotVisibleAscii);
    }

    let mut out = Vec::new();
    for segment in split_top_level(raw, b',')? {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let index = out.len();
        out.push(parse_entry(kind, segment, index)?);
    }

    Ok(out)
}

fn parse_entry(kind: HeaderKind, segment: &str, index: usize) -> Result<ParsedHeaderValue, ParseError> {
    let mut parts = split_top_level(segment, b';')?.into_iter();

    let value = parts.next().unwrap_or_default().trim();
    if value.is_empty() {
        return Err(ParseError::EmptyValue { index });
    }
    let value = kind.normalize_value(value, index)?;

    let mut parameters = IndexMap::new();
    let mut weight = 1.0;
    let mut quality_text = None;

    for param in parts {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }

        let (key, val) = match param.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), Some(unquote(v.trim()))),
            None => (param.to_ascii_lowercase(), None),
        };

        if key == "q" {
            let raw = val.unwrap_or_default();
            weight = parse_quality(&raw).ok_or_else(|| ParseError::InvalidQuality {
                index,
                raw: raw.clone(),
            })?;
            quality_text = Some(raw);
            continue;
        }

        parameters.insert(key, val);
    }

    Ok(ParsedHeaderValue {
        kind,
        raw_value: segment.to_string(),
        value,
        weight,
        quality_text,
        parameters,
        weighted_order: index,
    })
}

// qvalue = ( "0" [ "." 0*3DIGIT ] ) / ( "1" [ "." 0*3("0") ] ), parsed leniently
// on digit count but strictly on range and syntax.
fn parse_quality(raw: &str) -> Option<f32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    if raw.bytes().filter(|b| *b == b'.').count() > 1 || raw.starts_with('.') {
        return None;
    }

    let q: f32 = raw.parse().ok()?;
    (0.0..=1.0).contains(&q).then_some(q)
}

/// Split on `sep` outside double-quoted strings.
pub(crate) fn split_top_level(input: &str, sep: u8) -> Result<Vec<&str>, ParseError> {
    let bytes = input.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_quotes = false;
            }
            continue;
        }

        if b == b'"' {
            in_quotes = true;
        } else if b == sep {
            parts.push(&input[start..i]);
            start = i + 1;
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    parts.push(&input[start..]);

    Ok(parts)
}

pub(crate) fn unquote(v: &str) -> String {
    let Some(inner) = v
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return v.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
