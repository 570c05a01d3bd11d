//! HTTP content negotiation.
//!
//! raw header text → [`parse_header`] → [`rank`] → [`negotiate`]

mod accepted;
mod header;
mod kind;
mod negotiate;
mod rank;

pub use accepted::AcceptedHeaders;
pub use header::{ParamLookup, ParseError, ParsedHeaderValue, parse_header};
pub(crate) use header::{split_top_level, unquote};
pub use kind::{HeaderKind, Specificity};
pub use negotiate::{NegotiationError, negotiate, negotiate_raw};
pub use rank::{compare, rank, sort_ranked};
