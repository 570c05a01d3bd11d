use axum::http::HeaderMap;

use super::header::{ParseError, ParsedHeaderValue, parse_header};
use super::kind::HeaderKind;
use super::negotiate::{NegotiationError, negotiate};

type Field = Result<Vec<ParsedHeaderValue>, ParseError>;

/// The negotiation-related header fields of one request, parsed once.
///
/// Each field is parsed independently: a malformed `Accept-Language` does not
/// affect `Accept`. Absent fields parse to an empty list.
#[derive(Debug, Clone)]
pub struct AcceptedHeaders {
    accept: Field,
    accept_charset: Field,
    accept_encoding: Field,
    accept_language: Field,
    content_type: Field,
}

impl AcceptedHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            accept: read_field(headers, HeaderKind::Accept),
            accept_charset: read_field(headers, HeaderKind::AcceptCharset),
            accept_encoding: read_field(headers, HeaderKind::AcceptEncoding),
            accept_language: read_field(headers, HeaderKind::AcceptLanguage),
            content_type: read_field(headers, HeaderKind::ContentType),
        }
    }

    pub fn field(&self, kind: HeaderKind) -> Result<&[ParsedHeaderValue], &ParseError> {
        let field = match kind {
            HeaderKind::Accept => &self.accept,
            HeaderKind::AcceptCharset => &self.accept_charset,
            HeaderKind::AcceptEncoding => &self.accept_encoding,
            HeaderKind::AcceptLanguage => &self.accept_language,
            HeaderKind::ContentType => &self.content_type,
        };
        field.as_deref()
    }

    pub fn accept(&self) -> Result<&[ParsedHeaderValue], &ParseError> {
        self.field(HeaderKind::Accept)
    }

    pub fn accept_language(&self) -> Result<&[ParsedHeaderValue], &ParseError> {
        self.field(HeaderKind::AcceptLanguage)
    }

    /// The request body's media type, when one valid `Content-Type` was sent.
    pub fn content_type(&self) -> Option<&ParsedHeaderValue> {
        match self.content_type.as_deref() {
            Ok([single]) => Some(single),
            _ => None,
        }
    }

    pub fn best<'a, S: AsRef<str>>(
        &self,
        kind: HeaderKind,
        offered: &'a [S],
    ) -> Result<&'a S, NegotiationError> {
        match self.field(kind) {
            Ok(client) => negotiate(kind, client, offered),
            Err(err) => {
                tracing::debug!(header = %kind.header_name(), error = %err, "unparsable header treated as not acceptable");
                Err(NegotiationError::NotAcceptable)
            }
        }
    }

    pub fn best_media_type<'a, S: AsRef<str>>(&self, offered: &'a [S]) -> Result<&'a S, NegotiationError> {
        self.best(HeaderKind::Accept, offered)
    }

    pub fn best_language<'a, S: AsRef<str>>(&self, offered: &'a [S]) -> Result<&'a S, NegotiationError> {
        self.best(HeaderKind::AcceptLanguage, offered)
    }

    pub fn best_charset<'a, S: AsRef<str>>(&self, offered: &'a [S]) -> Result<&'a S, NegotiationError> {
        self.best(HeaderKind::AcceptCharset, offered)
    }

    pub fn best_encoding<'a, S: AsRef<str>>(&self, offered: &'a [S]) -> Result<&'a S, NegotiationError> {
        self.best(HeaderKind::AcceptEncoding, offered)
    }
}

// Repeated header lines are one comma-separated list (RFC 9110 §5.3).
fn read_field(headers: &HeaderMap, kind: HeaderKind) -> Field {
    let mut joined = String::new();
    for value in headers.get_all(kind.header_name()) {
        let text = value.to_str().map_err(|_| ParseError::NotVisibleAscii)?;
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined.push_str(text);
    }
    parse_header(kind, &joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};

    #[test]
    fn repeated_lines_are_joined_in_order() {
        let mut headers = HeaderMap::new();
        headers.append(ACCEPT, HeaderValue::from_static("text/plain;q=0.5"));
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));

        let accepted = AcceptedHeaders::from_headers(&headers);
        let entries = accepted.accept().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].weighted_order(), 1);
        assert_eq!(
            accepted.best_media_type(&["text/plain", "application/json"]),
            Ok(&"application/json")
        );
    }

    #[test]
    fn fields_fail_independently() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html;q=oops"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr"));

        let accepted = AcceptedHeaders::from_headers(&headers);
        assert!(accepted.accept().is_err());
        assert_eq!(
            accepted.best_media_type(&["text/html"]),
            Err(NegotiationError::NotAcceptable)
        );
        assert_eq!(accepted.best_language(&["en", "fr"]), Ok(&"fr"));
        // absent fields accept anything
        assert_eq!(accepted.best_charset(&["utf-8"]), Ok(&"utf-8"));
    }

    #[test]
    fn content_type_view() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));

        let accepted = AcceptedHeaders::from_headers(&headers);
        let ct = accepted.content_type().unwrap();
        assert_eq!(ct.component(), Some("application"));
        assert_eq!(ct.sub_component(), Some("json"));
        assert_eq!(ct.parameter("charset").value(), Some("utf-8"));

        assert!(AcceptedHeaders::from_headers(&HeaderMap::new()).content_type().is_none());
    }
}
