//! Selecting one server-offered representation from the client's preferences.

use thiserror::Error;
use tracing::{debug, warn};

use super::header::{ParsedHeaderValue, parse_header};
use super::kind::HeaderKind;
use super::rank::rank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("none of the offered representations is acceptable")]
    NotAcceptable,
}

const IDENTITY: &str = "identity";

/// Pick the offered value that best satisfies the parsed client entries.
///
/// - An empty `client` list accepts anything: the first offered value wins.
/// - An offered value matched by a `q=0` entry is excluded unless a strictly
///   more specific permitted entry also matches it.
/// - Otherwise the highest-ranked permitted entry selects the first offered
///   value (in server order) it matches.
/// - For `Accept-Encoding`, `identity` stays acceptable unless rejected.
pub fn negotiate<'a, S>(
    kind: HeaderKind,
    client: &[ParsedHeaderValue],
    offered: &'a [S],
) -> Result<&'a S, NegotiationError>
where
    S: AsRef<str>,
{
    if client.is_empty() {
        return offered.first().ok_or(NegotiationError::NotAcceptable);
    }

    let candidates: Vec<(usize, ParsedHeaderValue)> = offered
        .iter()
        .enumerate()
        .filter_map(|(i, o)| match parse_offered(kind, o.as_ref()) {
            Some(parsed) => Some((i, parsed)),
            None => {
                warn!(offered = o.as_ref(), "ignoring unparsable offered value");
                None
            }
        })
        .filter(|(_, candidate)| !is_rejected(kind, client, candidate))
        .collect();

    let ranked = rank(client.to_vec());
    for entry in ranked.iter().filter(|e| e.is_permitted()) {
        if let Some((i, _)) = candidates.iter().find(|(_, c)| entry.is_matched_by(c)) {
            return Ok(&offered[*i]);
        }
    }

    if kind == HeaderKind::AcceptEncoding
        && let Some((i, _)) = candidates
            .iter()
            .find(|(_, c)| c.value().eq_ignore_ascii_case(IDENTITY))
    {
        return Ok(&offered[*i]);
    }

    Err(NegotiationError::NotAcceptable)
}

/// Parse the raw header text and negotiate in one step.
///
/// `None` or a blank field accepts anything. A field that fails to parse is
/// treated as accepting nothing.
pub fn negotiate_raw<'a, S>(
    kind: HeaderKind,
    raw: Option<&str>,
    offered: &'a [S],
) -> Result<&'a S, NegotiationError>
where
    S: AsRef<str>,
{
    let raw = raw.map(str::trim).unwrap_or_default();
    match parse_header(kind, raw) {
        Ok(client) => negotiate(kind, &client, offered),
        Err(err) => {
            debug!(header = %kind.header_name(), error = %err, "unparsable header treated as not acceptable");
            Err(NegotiationError::NotAcceptable)
        }
    }
}

fn parse_offered(kind: HeaderKind, offered: &str) -> Option<ParsedHeaderValue> {
    let mut parsed = parse_header(kind, offered).ok()?;
    (parsed.len() == 1).then(|| parsed.remove(0))
}

fn is_rejected(kind: HeaderKind, client: &[ParsedHeaderValue], candidate: &ParsedHeaderValue) -> bool {
    client
        .iter()
        .filter(|r| !r.is_permitted() && r.is_matched_by(candidate))
        .any(|rejection| {
            let rejected_at = kind.specificity(rejection);
            !client.iter().any(|p| {
                p.is_permitted() && p.is_matched_by(candidate) && kind.specificity(p) > rejected_at
            })
        })
}
