//! Total order over the entries of one header field.
//!
//! weight (desc) → specificity (desc) → declaration order (asc).

use std::cmp::Ordering;

use super::header::ParsedHeaderValue;

/// Preference order between two entries of the same field.
pub fn compare(a: &ParsedHeaderValue, b: &ParsedHeaderValue) -> Ordering {
    b.weight()
        .total_cmp(&a.weight())
        .then_with(|| b.kind().specificity(b).cmp(&a.kind().specificity(a)))
        .then_with(|| a.weighted_order().cmp(&b.weighted_order()))
}

pub fn sort_ranked(entries: &mut [ParsedHeaderValue]) {
    entries.sort_by(compare);
}

/// Return the entries in preference order, most preferred first.
pub fn rank(mut entries: Vec<ParsedHeaderValue>) -> Vec<ParsedHeaderValue> {
    sort_ranked(&mut entries);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::negotiation::{HeaderKind, parse_header};

    fn ranked(kind: HeaderKind, raw: &str) -> Vec<String> {
        rank(parse_header(kind, raw).unwrap())
            .into_iter()
            .map(|e| e.value().to_string())
            .collect()
    }

    #[test]
    fn default_weight_outranks_explicit_lower_weights() {
        assert_eq!(
            ranked(HeaderKind::AcceptEncoding, "a;q=0.5, b, c;q=0.9"),
            ["b", "c", "a"]
        );
    }

    #[test]
    fn specificity_breaks_weight_ties() {
        assert_eq!(
            ranked(HeaderKind::Accept, "*/*, text/*, text/html, text/html;level=1"),
            ["text/html", "text/html", "text/*", "*/*"]
        );

        let entries = rank(parse_header(HeaderKind::Accept, "text/html, text/html;level=1").unwrap());
        assert_eq!(entries[0].parameters().len(), 1);
    }

    #[test]
    fn declaration_order_breaks_remaining_ties() {
        assert_eq!(
            ranked(HeaderKind::Accept, "text/plain;q=0.5, application/json;q=0.5, text/html;q=0.5"),
            ["text/plain", "application/json", "text/html"]
        );
    }

    #[test]
    fn language_ranges() {
        assert_eq!(
            ranked(HeaderKind::AcceptLanguage, "*;q=0.1, en, en-GB, fr;q=0.8"),
            ["en-GB", "en", "fr", "*"]
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let raw = "b;q=0.3, a;q=0.3, *;q=0.3, c";
        assert_eq!(
            ranked(HeaderKind::AcceptCharset, raw),
            ranked(HeaderKind::AcceptCharset, raw)
        );
        assert_eq!(ranked(HeaderKind::AcceptCharset, raw), ["c", "b", "a", "*"]);
    }
}
