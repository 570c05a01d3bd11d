//! Per-field rules: how values are normalised, compared and ranked.

use axum::http::{HeaderName, header};

use super::header::{ParseError, ParsedHeaderValue};

/// The header fields this crate knows how to negotiate over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    Accept,
    AcceptCharset,
    AcceptEncoding,
    AcceptLanguage,
    ContentType,
}

/// How concrete a value is. Higher sorts first at equal weight.
///
/// Compared as `(level, parameter count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    level: u8,
    params: usize,
}

impl HeaderKind {
    pub fn header_name(self) -> HeaderName {
        match self {
            Self::Accept => header::ACCEPT,
            Self::AcceptCharset => header::ACCEPT_CHARSET,
            Self::AcceptEncoding => header::ACCEPT_ENCODING,
            Self::AcceptLanguage => header::ACCEPT_LANGUAGE,
            Self::ContentType => header::CONTENT_TYPE,
        }
    }

    pub fn is_media(self) -> bool {
        matches!(self, Self::Accept | Self::ContentType)
    }

    pub(crate) fn normalize_value(self, value: &str, index: usize) -> Result<String, ParseError> {
        if !self.is_media() {
            return Ok(value.to_string());
        }

        if value == "*" {
            return Ok("*/*".to_string());
        }

        let invalid = || ParseError::InvalidMediaRange {
            index,
            raw: value.to_string(),
        };
        let (ty, sub) = value.split_once('/').ok_or_else(invalid)?;
        let (ty, sub) = (ty.trim(), sub.trim());
        if ty.is_empty() || sub.is_empty() || sub.contains('/') || (ty == "*" && sub != "*") {
            return Err(invalid());
        }

        Ok(format!("{ty}/{sub}"))
    }

    pub fn specificity(self, entry: &ParsedHeaderValue) -> Specificity {
        let value = entry.value();
        let level = match self {
            Self::Accept | Self::ContentType => match value.split_once('/') {
                Some(("*", _)) => 0,
                Some((_, "*")) => 1,
                _ => 2,
            },
            Self::AcceptLanguage if value == "*" => 0,
            Self::AcceptLanguage => entry.subtag_count().min(u8::MAX as usize) as u8,
            Self::AcceptCharset | Self::AcceptEncoding if value == "*" => 0,
            Self::AcceptCharset | Self::AcceptEncoding => 1,
        };

        let params = if self.is_media() {
            entry.parameters().len()
        } else {
            0
        };

        Specificity { level, params }
    }

    /// Does the (possibly wildcarded) `range` cover the `candidate` value?
    pub(crate) fn value_matches(self, range: &str, candidate: &str) -> bool {
        match self {
            Self::Accept | Self::ContentType => {
                let (Some((rt, rs)), Some((ct, cs))) =
                    (range.split_once('/'), candidate.split_once('/'))
                else {
                    return false;
                };
                if rt == "*" {
                    return true;
                }
                rt.eq_ignore_ascii_case(ct) && (rs == "*" || rs.eq_ignore_ascii_case(cs))
            }
            // RFC 4647 basic filtering: a range matches a tag equal to it or
            // a tag that extends it at a subtag boundary.
            Self::AcceptLanguage => {
                if range == "*" || range.eq_ignore_ascii_case(candidate) {
                    return true;
                }
                candidate.as_bytes().get(range.len()) == Some(&b'-')
                    && candidate
                        .get(..range.len())
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(range))
            }
            Self::AcceptCharset | Self::AcceptEncoding => {
                range == "*" || range.eq_ignore_ascii_case(candidate)
            }
        }
    }
}
