//! A pull-based YAML 1.2 event parser.
//!
//! `yamlpull` turns a stream of characters into a flat stream of events
//! (stream, document, mapping and sequence boundaries, scalars and aliases)
//! without ever building a document tree. Events carry source spans, scalar
//! styles and resolved tag ids, which makes the crate suitable as the
//! foundation of loaders, linters and reformatters.
//!
//! # Usage
//!
//! ```
//! use yamlpull::{Event, Parser};
//!
//! let mut parser = Parser::new_from_str("a: b");
//! let events: Vec<Event> = parser
//!     .by_ref()
//!     .map(|r| r.expect("valid input").0)
//!     .collect();
//! assert_eq!(events.first(), Some(&Event::StreamStart));
//! assert_eq!(events.last(), Some(&Event::StreamEnd));
//! ```
//!
//! Errors are fatal: once [`Parser::next_event`] fails, the stream is
//! unusable and events already produced must be discarded. Non-fatal
//! diagnostics (an unsupported `%YAML` version, unknown directives) are
//! collected as [`Warning`]s instead.

#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod char_traits;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod tag;

pub use crate::lexer::{Marker, ScalarStyle, ScanError, Span};
pub use crate::parser::{
    CollectionStyle, Event, EventReceiver, ParseError, Parser, Properties, SpannedEvent, Warning,
};
pub use crate::tag::{TagId, TagLibrary};
