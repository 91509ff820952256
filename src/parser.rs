//! The event-producing state machine.
//!
//! The parser is a push-down automaton driven by the [`Lexer`]. Its
//! configuration is a stack of [`Level`]s, each a state paired with the
//! column that owns that structural context. A step either emits an event,
//! silently reshapes the stack, or fails. A one-slot peek buffer lets a step
//! enqueue a second event, which is how an implicit mapping opens
//! retroactively around an already-lexed key scalar.
//!
//! Events are pulled one at a time through [`Parser::next_event`] (or the
//! [`Iterator`] impl); no document tree is ever built.

use std::collections::VecDeque;

use thiserror::Error;

use crate::lexer::{Lexer, Marker, ScalarStyle, ScanError, Span, Token, TokenKind};
use crate::tag::{TagId, TagLibrary};

/// Whether a collection was written in block or flow notation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CollectionStyle {
    /// Indentation-based notation.
    Block,
    /// `[…]` / `{…}` notation.
    Flow,
}

/// The anchor and tag attached to a node.
///
/// At most one of each; the parser rejects duplicates.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Properties {
    /// The `&name` anchor, if any.
    pub anchor: Option<String>,
    /// The resolved tag id; [`TagId::QUESTION_MARK`] when the node carried
    /// no tag.
    pub tag: TagId,
}

impl Properties {
    /// Properties carrying neither anchor nor tag.
    #[must_use]
    pub fn none() -> Properties {
        Properties {
            anchor: None,
            tag: TagId::QUESTION_MARK,
        }
    }

    /// Whether neither anchor nor tag is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchor.is_none() && self.tag == TagId::QUESTION_MARK
    }
}

impl Default for Properties {
    fn default() -> Self {
        Properties::none()
    }
}

/// An element of the parser's output stream.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    /// Start of the stream; always the first event.
    StreamStart,
    /// End of the stream; always the last event.
    StreamEnd,
    /// Start of a document.
    DocumentStart {
        /// Whether a `---` marker introduced the document.
        explicit: bool,
        /// The `(major, minor)` pair of a `%YAML` directive, if one was
        /// given.
        version: Option<(u32, u32)>,
    },
    /// End of a document.
    DocumentEnd {
        /// Whether a `...` marker closed the document.
        explicit: bool,
    },
    /// Start of a mapping.
    MappingStart {
        /// Block or flow notation.
        style: CollectionStyle,
        /// Anchor and tag attached to the mapping.
        properties: Properties,
    },
    /// End of the innermost mapping.
    MappingEnd,
    /// Start of a sequence.
    SequenceStart {
        /// Block or flow notation.
        style: CollectionStyle,
        /// Anchor and tag attached to the sequence.
        properties: Properties,
    },
    /// End of the innermost sequence.
    SequenceEnd,
    /// A scalar leaf.
    Scalar {
        /// The evaluated content.
        value: String,
        /// The style the scalar was written in; [`ScalarStyle::Any`] for
        /// scalars the parser synthesized.
        style: ScalarStyle,
        /// Anchor and tag attached to the scalar.
        properties: Properties,
    },
    /// An `*name` alias leaf. The parser does not resolve it.
    Alias(String),
}

impl Event {
    fn empty_scalar(properties: Properties) -> Event {
        Event::Scalar {
            value: String::new(),
            style: ScalarStyle::Any,
            properties,
        }
    }
}

/// A non-fatal diagnostic, such as an unsupported `%YAML` version.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Warning {
    /// What happened.
    pub message: String,
    /// Where it happened.
    pub mark: Marker,
}

/// A fatal parse error.
///
/// Carries the source position and the offending line annotated with a
/// caret. The event stream is unusable after an error; events already
/// produced must be discarded.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("{info} at line {} column {}:\n{line_content}", mark.line, mark.col + 1)]
pub struct ParseError {
    info: String,
    mark: Marker,
    line_content: String,
}

impl ParseError {
    /// The error message, without position information.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.info
    }

    /// The position the error was raised at.
    #[must_use]
    pub fn mark(&self) -> Marker {
        self.mark
    }

    /// The source line containing [`ParseError::mark`], followed by a line
    /// with a caret pointing at the column.
    #[must_use]
    pub fn line_content(&self) -> &str {
        &self.line_content
    }
}

/// Consumer of a pushed event stream, fed by [`Parser::load`].
pub trait EventReceiver {
    /// Called for every event in stream order.
    fn on_event(&mut self, ev: Event, span: Span);
}

/// The states of the push-down automaton.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    AtStreamStart,
    AtStreamEnd,
    BeforeDoc,
    AfterDirectivesEnd,
    BeforeImplicitRoot,
    RequireImplicitMapStart,
    AtBlockIndentation,
    AtBlockIndentationProps,
    BeforeNodeProperties,
    AfterCompactParent,
    AfterCompactParentProps,
    RequireInlineBlockItem,
    InBlockSeq,
    BeforeBlockMapKey,
    AtBlockMapKeyProps,
    BeforeBlockMapValue,
    AfterImplicitKey,
    BeforeBlockIndentation,
    BeforeFlowItem,
    BeforeFlowItemProps,
    AfterFlowMapSep,
    AfterFlowMapKey,
    AfterFlowMapValue,
    AfterFlowSeqSep,
    AfterFlowSeqSepProps,
    AfterFlowSeqItem,
    AtEmptyPairKey,
    AfterImplicitPairStart,
    BeforePairValue,
    AfterPairValue,
    BeforeDocEnd,
}

/// One frame of the parser stack: a state and the column owning its
/// structural context, `-1` while the column is not yet decided.
#[derive(Clone, Copy, Debug)]
struct Level {
    state: State,
    indent: i32,
}

impl Level {
    fn new(state: State, indent: i32) -> Level {
        Level { state, indent }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// A spanned event, as returned by [`Parser::next_event`].
pub type SpannedEvent = (Event, Span);

/// The YAML parser.
///
/// Pulls tokens from its lexer and produces events on demand. One instance
/// parses one character stream; it is strictly serial.
#[derive(Debug)]
pub struct Parser<T: Iterator<Item = char>> {
    lexer: Lexer<T>,
    token: Option<Token>,
    levels: Vec<Level>,
    /// Events produced ahead of the caller; holds at most one entry queued
    /// by a step plus one parked by [`Parser::peek_event`].
    queued: VecDeque<SpannedEvent>,
    tags: TagLibrary,
    /// Properties whose node starts on a later line.
    header_props: Properties,
    header_start: Option<Marker>,
    /// Properties for a node on the current line.
    inline_props: Properties,
    inline_start: Option<Marker>,
    /// Column of the most recent indentation token; `-1` once the document
    /// ends.
    block_indent: i32,
    /// The `%YAML` version of the current document, if any.
    version: Option<(u32, u32)>,
    yaml_directive_seen: bool,
    doc_has_directives: bool,
    warnings: Vec<Warning>,
    stream_ended: bool,
    failed: bool,
}

impl<'a> Parser<std::str::Chars<'a>> {
    /// Create a parser over a string slice.
    #[must_use]
    pub fn new_from_str(source: &'a str) -> Parser<std::str::Chars<'a>> {
        Parser::new(source.chars())
    }
}

impl<T: Iterator<Item = char>> Parser<T> {
    /// Create a parser over a character source, with a tag library carrying
    /// the YAML 1.2 core schema.
    pub fn new(source: T) -> Parser<T> {
        Parser::with_tag_library(source, TagLibrary::extended())
    }

    /// Create a parser that records tags into the given library, so ids can
    /// be shared across sequential parses.
    pub fn with_tag_library(source: T, tags: TagLibrary) -> Parser<T> {
        Parser {
            lexer: Lexer::new(source),
            token: None,
            levels: vec![Level::new(State::AtStreamStart, -1)],
            queued: VecDeque::new(),
            tags,
            header_props: Properties::none(),
            header_start: None,
            inline_props: Properties::none(),
            inline_start: None,
            block_indent: -1,
            version: None,
            yaml_directive_seen: false,
            doc_has_directives: false,
            warnings: Vec::new(),
            stream_ended: false,
            failed: false,
        }
    }

    /// The tag library the parser resolves tags against.
    #[must_use]
    pub fn tag_library(&self) -> &TagLibrary {
        &self.tags
    }

    /// Consume the parser, returning its tag library.
    #[must_use]
    pub fn into_tag_library(self) -> TagLibrary {
        self.tags
    }

    /// Warnings collected so far (unsupported version, unknown directives).
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Drain the collected warnings.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Produce the next event.
    ///
    /// # Errors
    /// Fails on malformed input, or when called again after
    /// [`Event::StreamEnd`] was returned. Every error is fatal: events
    /// already produced must be discarded.
    pub fn next_event(&mut self) -> ParseResult<SpannedEvent> {
        let ev = match self.queued.pop_front() {
            Some(ev) => ev,
            None => self.produce()?,
        };
        if ev.0 == Event::StreamEnd {
            self.stream_ended = true;
        }
        Ok(ev)
    }

    /// Produce the next event without consuming it.
    ///
    /// # Errors
    /// Same conditions as [`Parser::next_event`].
    pub fn peek_event(&mut self) -> ParseResult<&SpannedEvent> {
        if self.queued.is_empty() {
            let ev = self.produce()?;
            self.queued.push_front(ev);
        }
        Ok(&self.queued[0])
    }

    /// Pull events to exhaustion, pushing each into `recv`.
    ///
    /// # Errors
    /// Propagates the first parse error.
    pub fn load<R: EventReceiver>(&mut self, recv: &mut R) -> ParseResult<()> {
        loop {
            let (ev, span) = self.next_event()?;
            let done = ev == Event::StreamEnd;
            recv.on_event(ev, span);
            if done {
                return Ok(());
            }
        }
    }

    /// Run steps until one emits an event.
    fn produce(&mut self) -> ParseResult<SpannedEvent> {
        if self.stream_ended {
            let mark = self.lexer.mark();
            return Err(self.error_at("the event stream has already ended", mark));
        }
        if self.failed {
            let mark = self.lexer.mark();
            return Err(self.error_at("the parser already failed", mark));
        }
        loop {
            match self.step() {
                Ok(Some(ev)) => return Ok(ev),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    return Err(e);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // plumbing

    /// The next token, without consuming it. Returns a clone so the state
    /// functions are free to mutate the parser while inspecting it.
    fn peek_tok(&mut self) -> ParseResult<Token> {
        if self.token.is_none() {
            let context = self.innermost_block_indent();
            self.lexer.set_block_context(context);
            match self.lexer.next_token() {
                Ok(tok) => self.token = Some(tok),
                Err(e) => return Err(self.wrap_scan(&e)),
            }
        }
        Ok(self.token.clone().expect("token was just fetched"))
    }

    fn take_tok(&mut self) -> Token {
        self.token.take().expect("no token to consume")
    }

    /// Indentation of the innermost level whose column is decided.
    fn innermost_block_indent(&self) -> i32 {
        self.levels
            .iter()
            .rev()
            .map(|l| l.indent)
            .find(|&i| i >= 0)
            .unwrap_or(-1)
    }

    fn top(&self) -> Level {
        *self.levels.last().expect("the level stack is never empty")
    }

    /// The level below the top, owning the context the top works inside.
    fn parent(&self) -> Level {
        if self.levels.len() >= 2 {
            self.levels[self.levels.len() - 2]
        } else {
            Level::new(State::AtStreamEnd, -1)
        }
    }

    fn transition(&mut self, state: State) {
        self.levels
            .last_mut()
            .expect("the level stack is never empty")
            .state = state;
    }

    fn transition_at(&mut self, state: State, indent: i32) {
        let top = self
            .levels
            .last_mut()
            .expect("the level stack is never empty");
        top.state = state;
        top.indent = indent;
    }

    fn push_level(&mut self, state: State) {
        self.levels.push(Level::new(state, -1));
    }

    fn pop_level(&mut self) {
        self.levels.pop();
    }

    fn wrap_scan(&mut self, e: &ScanError) -> ParseError {
        let mark = e.mark();
        ParseError {
            info: e.info().to_string(),
            mark,
            line_content: self.lexer.annotated_line(mark),
        }
    }

    fn error_at(&mut self, info: &str, mark: Marker) -> ParseError {
        ParseError {
            info: info.to_string(),
            mark,
            line_content: self.lexer.annotated_line(mark),
        }
    }

    fn unexpected(&mut self, expected: &str) -> ParseError {
        let mark = self
            .token
            .as_ref()
            .map_or_else(|| self.lexer.mark(), |t| t.span.start);
        self.error_at(&format!("Unexpected token (expected {expected})"), mark)
    }

    fn internal(&mut self, what: &str) -> ParseError {
        let mark = self.lexer.mark();
        self.error_at(
            &format!("internal error: {what}, please report this bug"),
            mark,
        )
    }

    fn warn(&mut self, message: String, mark: Marker) {
        self.warnings.push(Warning { message, mark });
    }

    // ------------------------------------------------------------------
    // properties

    fn take_inline_props(&mut self) -> (Properties, Option<Marker>) {
        (
            std::mem::take(&mut self.inline_props),
            self.inline_start.take(),
        )
    }

    fn take_header_props(&mut self) -> (Properties, Option<Marker>) {
        (
            std::mem::take(&mut self.header_props),
            self.header_start.take(),
        )
    }

    /// Combine header and inline properties for a node that consumes both.
    fn take_merged_props(&mut self, mark: Marker) -> ParseResult<(Properties, Option<Marker>)> {
        let (header, header_start) = self.take_header_props();
        let (inline, inline_start) = self.take_inline_props();
        if header.anchor.is_some() && inline.anchor.is_some() {
            return Err(self.error_at("only one anchor is allowed per node", mark));
        }
        if header.tag != TagId::QUESTION_MARK && inline.tag != TagId::QUESTION_MARK {
            return Err(self.error_at("only one tag is allowed per node", mark));
        }
        let props = Properties {
            anchor: header.anchor.or(inline.anchor),
            tag: if inline.tag == TagId::QUESTION_MARK {
                header.tag
            } else {
                inline.tag
            },
        };
        Ok((props, header_start.or(inline_start)))
    }

    /// Fail if any property is pending; aliases may not carry properties.
    fn reject_alias_props(&mut self, mark: Marker) -> ParseResult<()> {
        if !self.header_props.is_empty() || !self.inline_props.is_empty() {
            return Err(self.error_at("an alias node must not have properties", mark));
        }
        self.header_start = None;
        self.inline_start = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // the state machine

    /// Perform one transition: consume zero or more tokens and emit at most
    /// one event (plus at most one queued for the next pull).
    fn step(&mut self) -> ParseResult<Option<SpannedEvent>> {
        match self.top().state {
            State::AtStreamStart => self.at_stream_start(),
            State::AtStreamEnd => self.at_stream_end(),
            State::BeforeDoc => self.before_doc(),
            State::AfterDirectivesEnd => self.after_directives_end(),
            State::BeforeImplicitRoot
            | State::AtBlockIndentation
            | State::AtBlockIndentationProps => self.at_block_indentation(),
            State::RequireImplicitMapStart => self.require_implicit_map_start(),
            State::BeforeNodeProperties => self.before_node_properties(),
            State::AfterCompactParent => self.after_compact_parent(),
            State::AfterCompactParentProps => self.after_compact_parent_props(),
            State::RequireInlineBlockItem => self.require_inline_block_item(),
            State::InBlockSeq => self.in_block_seq(),
            State::BeforeBlockMapKey => self.before_block_map_key(),
            State::AtBlockMapKeyProps => self.at_block_map_key_props(),
            State::BeforeBlockMapValue => self.before_block_map_value(),
            State::AfterImplicitKey => self.after_implicit_key(),
            State::BeforeBlockIndentation => self.before_block_indentation(),
            State::BeforeFlowItem | State::BeforeFlowItemProps => self.before_flow_item(),
            State::AfterFlowMapSep => self.after_flow_map_sep(),
            State::AfterFlowMapKey => self.after_flow_map_key(),
            State::AfterFlowMapValue => self.after_flow_map_value(),
            State::AfterFlowSeqSep | State::AfterFlowSeqSepProps => self.after_flow_seq_sep(),
            State::AfterFlowSeqItem => self.after_flow_seq_item(),
            State::AtEmptyPairKey | State::AfterImplicitPairStart | State::BeforePairValue => {
                self.before_pair_value()
            }
            State::AfterPairValue => self.after_pair_value(),
            State::BeforeDocEnd => self.before_doc_end(),
        }
    }

    fn at_stream_start(&mut self) -> ParseResult<Option<SpannedEvent>> {
        self.transition(State::AtStreamEnd);
        self.push_level(State::BeforeDoc);
        Ok(Some((Event::StreamStart, Span::empty(Marker::start()))))
    }

    fn at_stream_end(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let mark = self.lexer.mark();
        Ok(Some((Event::StreamEnd, Span::empty(mark))))
    }

    fn before_doc(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match &tok.kind {
            TokenKind::StreamEnd => {
                self.pop_level();
                Ok(None)
            }
            TokenKind::DirectivesEnd => {
                let tok = self.take_tok();
                let version = self.version.take();
                self.doc_has_directives = false;
                self.transition(State::BeforeDocEnd);
                self.push_level(State::AfterDirectivesEnd);
                Ok(Some((
                    Event::DocumentStart {
                        explicit: true,
                        version,
                    },
                    tok.span,
                )))
            }
            TokenKind::YamlDirective => {
                let tok = self.take_tok();
                let mark = tok.span.start;
                if self.yaml_directive_seen {
                    return Err(self.error_at("duplicate %YAML directive", mark));
                }
                self.yaml_directive_seen = true;
                self.doc_has_directives = true;
                let param = self.peek_tok()?;
                let TokenKind::DirectiveParam(text) = &param.kind else {
                    return Err(self.internal("%YAML directive without parameter"));
                };
                let Some(version) = parse_version(text) else {
                    return Err(self.error_at("invalid YAML version number", param.span.start));
                };
                self.take_tok();
                if version != (1, 2) {
                    self.warn(
                        format!(
                            "unsupported YAML version {}.{}, treating it as 1.2",
                            version.0, version.1
                        ),
                        param.span.start,
                    );
                }
                self.version = Some(version);
                Ok(None)
            }
            TokenKind::TagDirective => {
                self.take_tok();
                self.doc_has_directives = true;
                let handle_tok = self.peek_tok()?;
                let TokenKind::TagHandle { handle, .. } = &handle_tok.kind else {
                    return Err(self.internal("%TAG directive without handle"));
                };
                let handle = handle.clone();
                self.take_tok();
                let prefix_tok = self.peek_tok()?;
                let TokenKind::Suffix(prefix) = &prefix_tok.kind else {
                    return Err(self.internal("%TAG directive without prefix"));
                };
                self.tags.register_handle(&handle, prefix);
                self.take_tok();
                Ok(None)
            }
            TokenKind::UnknownDirective(name) => {
                let name = name.clone();
                let tok = self.take_tok();
                self.warn(format!("unknown directive: %{name}"), tok.span.start);
                while matches!(self.peek_tok()?.kind, TokenKind::DirectiveParam(_)) {
                    self.take_tok();
                }
                Ok(None)
            }
            TokenKind::Indentation(n) => {
                let n = *n;
                let tok = self.take_tok();
                if self.doc_has_directives {
                    return Err(self.error_at("missing '---' after directives", tok.span.start));
                }
                self.block_indent = n as i32;
                self.transition(State::BeforeDocEnd);
                self.push_level(State::BeforeImplicitRoot);
                Ok(Some((
                    Event::DocumentStart {
                        explicit: false,
                        version: None,
                    },
                    Span::empty(tok.span.start),
                )))
            }
            TokenKind::DocumentEnd => {
                // a stray `...` between documents
                self.take_tok();
                Ok(None)
            }
            _ => Err(self.unexpected("a directive or '---'")),
        }
    }

    fn after_directives_end(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match &tok.kind {
            TokenKind::Indentation(n) => {
                self.block_indent = *n as i32;
                self.take_tok();
                self.transition(State::BeforeImplicitRoot);
                Ok(None)
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::RequireImplicitMapStart);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::Scalar(..)
            | TokenKind::Alias(_)
            | TokenKind::MapValueInd
            | TokenKind::SeqStart
            | TokenKind::MapStart => {
                self.transition(State::RequireImplicitMapStart);
                Ok(None)
            }
            TokenKind::SeqItemInd => {
                let start = tok.span.start;
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::InBlockSeq, start.col as i32);
                self.block_indent = start.col as i32;
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::MapKeyInd => {
                let start = tok.span.start;
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::BeforeBlockMapKey, start.col as i32);
                self.block_indent = start.col as i32;
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::DirectivesEnd
            | TokenKind::DocumentEnd
            | TokenKind::StreamEnd
            | TokenKind::YamlDirective
            | TokenKind::TagDirective
            | TokenKind::UnknownDirective(_) => {
                // an empty document
                let mark = tok.span.start;
                let (props, pstart) = self.take_merged_props(mark)?;
                self.pop_level();
                Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(mark)),
                )))
            }
            _ => Err(self.unexpected("document content")),
        }
    }

    /// A root node that starts on the `---` line, or content after
    /// properties there. A plain or quoted scalar followed by `: ` opens an
    /// implicit mapping retroactively.
    fn require_implicit_map_start(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::Indentation(n) => {
                self.block_indent = *n as i32;
                self.take_tok();
                self.transition(State::AtBlockIndentation);
                Ok(None)
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::Scalar(..) => {
                let tok = self.take_tok();
                let TokenKind::Scalar(style, value, multiline) = tok.kind else {
                    unreachable!()
                };
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    self.check_implicit_key(style, multiline, tok.span.start)?;
                    let indent = tok.span.start.col as i32;
                    let (props, pstart) = self.take_inline_props();
                    let (map_props, map_start) = self.take_header_props();
                    self.transition_at(State::AfterImplicitKey, indent);
                    self.block_indent = indent;
                    let key_span = Span::new(pstart.unwrap_or(tok.span.start), tok.span.end);
                    self.queued.push_back((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        key_span,
                    ));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: map_props,
                        },
                        Span::empty(map_start.unwrap_or(key_span.start)),
                    )))
                } else {
                    let (props, pstart) = self.take_merged_props(tok.span.start)?;
                    self.pop_level();
                    Ok(Some((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                    )))
                }
            }
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    let indent = tok.span.start.col as i32;
                    self.transition_at(State::AfterImplicitKey, indent);
                    self.block_indent = indent;
                    self.queued.push_back((Event::Alias(name), tok.span));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: Properties::none(),
                        },
                        Span::empty(tok.span.start),
                    )))
                } else {
                    self.pop_level();
                    Ok(Some((Event::Alias(name), tok.span)))
                }
            }
            TokenKind::MapValueInd => {
                let (map_props, map_start) = self.take_header_props();
                self.transition_at(State::AfterImplicitKey, start.col as i32);
                self.block_indent = start.col as i32;
                self.queued
                    .push_back((Event::empty_scalar(Properties::none()), Span::empty(start)));
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: map_props,
                    },
                    Span::empty(map_start.unwrap_or(start)),
                )))
            }
            TokenKind::SeqStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowSeqSep);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::MapStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowMapSep);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::DirectivesEnd | TokenKind::DocumentEnd | TokenKind::StreamEnd => {
                let (props, pstart) = self.take_merged_props(start)?;
                self.pop_level();
                Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            _ => Err(self.unexpected("node content")),
        }
    }

    /// A node position on a fresh line in block context. Serves the document
    /// root and every indented child position; decides between starting a
    /// node here and synthesizing an empty one when the line belongs to an
    /// outer level.
    fn at_block_indentation(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let parent = self.parent();
        let bi = self.block_indent;
        let tok = self.peek_tok()?;
        let start = tok.span.start;

        if bi <= parent.indent {
            // The line is not deeper than the owner of this position. A
            // sequence item may still continue a mapping at the same
            // indentation; anything else means the node here is empty.
            let indentless_seq = tok.kind == TokenKind::SeqItemInd
                && bi == parent.indent
                && matches!(
                    parent.state,
                    State::BeforeBlockMapKey | State::BeforeBlockMapValue
                );
            if !indentless_seq {
                let (props, pstart) = self.take_merged_props(start)?;
                self.pop_level();
                return Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(start)),
                )));
            }
        }

        match &tok.kind {
            TokenKind::Indentation(n) => {
                // properties were on their own line; the node follows here
                self.block_indent = *n as i32;
                self.take_tok();
                Ok(None)
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::AtBlockIndentationProps);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::SeqItemInd => {
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::InBlockSeq, bi);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::MapKeyInd => {
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::BeforeBlockMapKey, bi);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::MapValueInd => {
                // an implicit mapping whose first key is empty
                let (map_props, map_start) = self.take_header_props();
                self.transition_at(State::AfterImplicitKey, bi);
                self.queued
                    .push_back((Event::empty_scalar(Properties::none()), Span::empty(start)));
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: map_props,
                    },
                    Span::empty(map_start.unwrap_or(start)),
                )))
            }
            TokenKind::Scalar(..) => {
                let tok = self.take_tok();
                let TokenKind::Scalar(style, value, multiline) = tok.kind else {
                    unreachable!()
                };
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    self.check_implicit_key(style, multiline, tok.span.start)?;
                    let (props, pstart) = self.take_inline_props();
                    let (map_props, map_start) = self.take_header_props();
                    self.transition_at(State::AfterImplicitKey, bi);
                    let key_span = Span::new(pstart.unwrap_or(tok.span.start), tok.span.end);
                    self.queued.push_back((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        key_span,
                    ));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: map_props,
                        },
                        Span::empty(map_start.unwrap_or(key_span.start)),
                    )))
                } else {
                    let (props, pstart) = self.take_merged_props(tok.span.start)?;
                    self.transition(State::BeforeBlockIndentation);
                    Ok(Some((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                    )))
                }
            }
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    self.transition_at(State::AfterImplicitKey, bi);
                    self.queued.push_back((Event::Alias(name), tok.span));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: Properties::none(),
                        },
                        Span::empty(tok.span.start),
                    )))
                } else {
                    self.transition(State::BeforeBlockIndentation);
                    Ok(Some((Event::Alias(name), tok.span)))
                }
            }
            TokenKind::SeqStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::BeforeBlockIndentation);
                self.push_level(State::AfterFlowSeqSep);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::MapStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::BeforeBlockIndentation);
                self.push_level(State::AfterFlowMapSep);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            _ => Err(self.unexpected("node content")),
        }
    }

    fn before_node_properties(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) => {
                let tok = self.take_tok();
                let id = self.resolve_tag(&tok)?;
                if self.inline_props.tag != TagId::QUESTION_MARK {
                    return Err(self.error_at("only one tag is allowed per node", start));
                }
                self.inline_props.tag = id;
                self.inline_start.get_or_insert(start);
                Ok(None)
            }
            TokenKind::Anchor(_) => {
                let tok = self.take_tok();
                let TokenKind::Anchor(name) = tok.kind else {
                    unreachable!()
                };
                if self.inline_props.anchor.is_some() {
                    return Err(self.error_at("only one anchor is allowed per node", start));
                }
                self.inline_props.anchor = Some(name);
                self.inline_start.get_or_insert(start);
                Ok(None)
            }
            TokenKind::Indentation(_) => {
                // the node lives on a later line; carry the properties over
                let (inline, inline_start) = self.take_inline_props();
                if inline.anchor.is_some() {
                    if self.header_props.anchor.is_some() {
                        return Err(self.error_at("only one anchor is allowed per node", start));
                    }
                    self.header_props.anchor = inline.anchor;
                }
                if inline.tag != TagId::QUESTION_MARK {
                    if self.header_props.tag != TagId::QUESTION_MARK {
                        return Err(self.error_at("only one tag is allowed per node", start));
                    }
                    self.header_props.tag = inline.tag;
                }
                if self.header_start.is_none() {
                    self.header_start = inline_start;
                }
                self.pop_level();
                Ok(None)
            }
            TokenKind::Alias(_) => {
                Err(self.error_at("an alias node must not have properties", start))
            }
            _ => {
                self.pop_level();
                Ok(None)
            }
        }
    }

    /// Resolve a tag token against the tag library.
    fn resolve_tag(&mut self, tok: &Token) -> ParseResult<TagId> {
        match &tok.kind {
            TokenKind::VerbatimTag(uri) => Ok(self.tags.register_uri(uri)),
            TokenKind::TagHandle { handle, suffix } => {
                if suffix.is_empty() && handle == "!" {
                    return Ok(TagId::EXCLAMATION_MARK);
                }
                let prefix = self.tags.resolve(handle);
                if prefix.is_empty() {
                    let msg = format!("unknown tag handle: {handle}");
                    return Err(self.error_at(&msg, tok.span.start));
                }
                let uri = format!("{prefix}{suffix}");
                Ok(self.tags.register_uri(&uri))
            }
            _ => Err(self.internal("resolving a non-tag token")),
        }
    }

    fn check_implicit_key(
        &mut self,
        style: ScalarStyle,
        multiline: bool,
        mark: Marker,
    ) -> ParseResult<()> {
        if matches!(style, ScalarStyle::Literal | ScalarStyle::Folded) {
            return Err(self.error_at("a block scalar may not be an implicit mapping key", mark));
        }
        if multiline {
            return Err(self.error_at("an implicit mapping key may not span multiple lines", mark));
        }
        Ok(())
    }

    /// A nested block node on the same line as its parent indicator
    /// (`- `, `? ` or `: `).
    fn after_compact_parent(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match &tok.kind {
            TokenKind::Indentation(n) => {
                self.block_indent = *n as i32;
                self.take_tok();
                self.transition(State::AtBlockIndentation);
                Ok(None)
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::AfterCompactParentProps);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::SeqItemInd => {
                let start = tok.span.start;
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::InBlockSeq, start.col as i32);
                self.block_indent = start.col as i32;
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::MapKeyInd => {
                let start = tok.span.start;
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition_at(State::BeforeBlockMapKey, start.col as i32);
                self.block_indent = start.col as i32;
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            _ => self.require_inline_block_item(),
        }
    }

    fn after_compact_parent_props(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match &tok.kind {
            TokenKind::Indentation(n) => {
                self.block_indent = *n as i32;
                self.take_tok();
                self.transition(State::AtBlockIndentation);
                Ok(None)
            }
            _ => {
                self.transition(State::RequireInlineBlockItem);
                Ok(None)
            }
        }
    }

    /// A node that must be completed on the current line: a scalar, an
    /// alias, a flow collection or nothing at all. Block indicators are not
    /// allowed here.
    fn require_inline_block_item(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::Scalar(..) => {
                let tok = self.take_tok();
                let TokenKind::Scalar(style, value, multiline) = tok.kind else {
                    unreachable!()
                };
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    // a compact mapping opens around this key
                    self.check_implicit_key(style, multiline, tok.span.start)?;
                    let indent = tok.span.start.col as i32;
                    let (props, pstart) = self.take_inline_props();
                    let (map_props, map_start) = self.take_header_props();
                    self.transition_at(State::AfterImplicitKey, indent);
                    self.block_indent = indent;
                    let key_span = Span::new(pstart.unwrap_or(tok.span.start), tok.span.end);
                    self.queued.push_back((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        key_span,
                    ));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: map_props,
                        },
                        Span::empty(map_start.unwrap_or(key_span.start)),
                    )))
                } else {
                    let (props, pstart) = self.take_merged_props(tok.span.start)?;
                    self.transition(State::BeforeBlockIndentation);
                    Ok(Some((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                    )))
                }
            }
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    let indent = tok.span.start.col as i32;
                    self.transition_at(State::AfterImplicitKey, indent);
                    self.block_indent = indent;
                    self.queued.push_back((Event::Alias(name), tok.span));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Block,
                            properties: Properties::none(),
                        },
                        Span::empty(tok.span.start),
                    )))
                } else {
                    self.transition(State::BeforeBlockIndentation);
                    Ok(Some((Event::Alias(name), tok.span)))
                }
            }
            TokenKind::MapValueInd => {
                // a compact mapping whose first key is empty
                let (map_props, map_start) = self.take_header_props();
                self.transition_at(State::AfterImplicitKey, start.col as i32);
                self.block_indent = start.col as i32;
                self.queued
                    .push_back((Event::empty_scalar(Properties::none()), Span::empty(start)));
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Block,
                        properties: map_props,
                    },
                    Span::empty(map_start.unwrap_or(start)),
                )))
            }
            TokenKind::SeqStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::BeforeBlockIndentation);
                self.push_level(State::AfterFlowSeqSep);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::MapStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::BeforeBlockIndentation);
                self.push_level(State::AfterFlowMapSep);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::StreamEnd | TokenKind::DocumentEnd | TokenKind::DirectivesEnd => {
                // the node is empty; the document ends here
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition(State::BeforeBlockIndentation);
                Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            _ => Err(self.unexpected("node content")),
        }
    }

    fn in_block_seq(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let indent = self.top().indent;
        let bi = self.block_indent;
        if bi < indent {
            self.pop_level();
            let mark = self.current_mark();
            return Ok(Some((Event::SequenceEnd, Span::empty(mark))));
        }
        if bi > indent {
            return Err(self.unexpected("a sequence item at its sequence's indentation"));
        }
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::SeqItemInd => {
                self.take_tok();
                self.push_level(State::AfterCompactParent);
                Ok(None)
            }
            _ => {
                // the sequence shares its column with an enclosing mapping
                self.pop_level();
                let mark = self.current_mark();
                Ok(Some((Event::SequenceEnd, Span::empty(mark))))
            }
        }
    }

    fn before_block_map_key(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let indent = self.top().indent;
        let bi = self.block_indent;
        if bi < indent {
            self.pop_level();
            let mark = self.current_mark();
            return Ok(Some((Event::MappingEnd, Span::empty(mark))));
        }
        if bi > indent {
            return Err(self.unexpected("a mapping key at its mapping's indentation"));
        }
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::MapKeyInd => {
                self.take_tok();
                self.transition(State::BeforeBlockMapValue);
                self.push_level(State::AfterCompactParent);
                Ok(None)
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::AtBlockMapKeyProps);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::Scalar(..) => self.block_map_implicit_key(),
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                if self.peek_tok()?.kind != TokenKind::MapValueInd {
                    return Err(self.unexpected("':'"));
                }
                self.transition(State::AfterImplicitKey);
                Ok(Some((Event::Alias(name), tok.span)))
            }
            TokenKind::MapValueInd => {
                // an entry with an empty key
                self.transition(State::AfterImplicitKey);
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            _ => Err(self.unexpected("a mapping key")),
        }
    }

    /// A scalar key inside an already-open block mapping.
    fn block_map_implicit_key(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.take_tok();
        let TokenKind::Scalar(style, value, multiline) = tok.kind else {
            return Err(self.internal("expected a scalar key token"));
        };
        if self.peek_tok()?.kind != TokenKind::MapValueInd {
            return Err(self.unexpected("':'"));
        }
        self.check_implicit_key(style, multiline, tok.span.start)?;
        let (props, pstart) = self.take_inline_props();
        self.transition(State::AfterImplicitKey);
        Ok(Some((
            Event::Scalar {
                value,
                style,
                properties: props,
            },
            Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
        )))
    }

    fn at_block_map_key_props(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::Scalar(..) => {
                self.transition(State::BeforeBlockMapKey);
                self.block_map_implicit_key()
            }
            TokenKind::MapValueInd => {
                let (props, pstart) = self.take_inline_props();
                self.transition(State::AfterImplicitKey);
                Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::Alias(_) => {
                Err(self.error_at("an alias node must not have properties", start))
            }
            _ => Err(self.unexpected("a mapping key")),
        }
    }

    fn before_block_map_value(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let indent = self.top().indent;
        let bi = self.block_indent;
        let mark = self.current_mark();
        if bi < indent {
            // the value never appeared
            self.transition(State::BeforeBlockMapKey);
            return Ok(Some((
                Event::empty_scalar(Properties::none()),
                Span::empty(mark),
            )));
        }
        if bi > indent {
            return Err(self.unexpected("':'"));
        }
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::MapValueInd => {
                self.take_tok();
                self.transition(State::BeforeBlockMapKey);
                self.push_level(State::AfterCompactParent);
                Ok(None)
            }
            _ => {
                // the next entry begins; this one has an empty value
                self.transition(State::BeforeBlockMapKey);
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(mark),
                )))
            }
        }
    }

    fn after_implicit_key(&mut self) -> ParseResult<Option<SpannedEvent>> {
        if self.peek_tok()?.kind != TokenKind::MapValueInd {
            return Err(self.internal("implicit key without a following ':'"));
        }
        self.take_tok();
        self.transition(State::BeforeBlockMapKey);
        self.push_level(State::AfterCompactParent);
        Ok(None)
    }

    /// After a node completed in block context: consume the next
    /// indentation token and let the owning levels decide whether they
    /// continue or close.
    fn before_block_indentation(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::Indentation(n) => {
                self.block_indent = n as i32;
                self.take_tok();
                self.pop_level();
                Ok(None)
            }
            TokenKind::DirectivesEnd | TokenKind::DocumentEnd | TokenKind::StreamEnd => {
                // the document ends; every open block level is deeper
                self.block_indent = -1;
                self.pop_level();
                Ok(None)
            }
            _ => Err(self.unexpected("a line break or the end of the document")),
        }
    }

    // ------------------------------------------------------------------
    // flow collections

    /// A node inside a flow collection; pops back to its caller once the
    /// node was produced.
    fn before_flow_item(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::BeforeFlowItemProps);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::Scalar(..) => {
                let tok = self.take_tok();
                let TokenKind::Scalar(style, value, _) = tok.kind else {
                    unreachable!()
                };
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.pop_level();
                Ok(Some((
                    Event::Scalar {
                        value,
                        style,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                self.pop_level();
                Ok(Some((Event::Alias(name), tok.span)))
            }
            TokenKind::SeqStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowSeqSep);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::MapStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowMapSep);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::SeqSep | TokenKind::SeqEnd | TokenKind::MapEnd | TokenKind::MapValueInd => {
                // the node is empty
                let (props, pstart) = self.take_merged_props(start)?;
                self.pop_level();
                Ok(Some((
                    Event::empty_scalar(props),
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::StreamEnd => {
                Err(self.error_at("unexpected end of stream inside a flow collection", start))
            }
            _ => Err(self.unexpected("a flow node")),
        }
    }

    fn after_flow_map_sep(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::MapEnd => {
                let tok = self.take_tok();
                self.lexer.leave_flow();
                self.pop_level();
                Ok(Some((Event::MappingEnd, tok.span)))
            }
            TokenKind::MapKeyInd => {
                self.take_tok();
                self.transition(State::AfterFlowMapKey);
                self.push_level(State::BeforeFlowItem);
                Ok(None)
            }
            TokenKind::MapValueInd => {
                // an entry with an empty key
                self.transition(State::AfterFlowMapKey);
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            TokenKind::SeqSep => Err(self.unexpected("a mapping key or '}'")),
            TokenKind::StreamEnd => {
                Err(self.error_at("unexpected end of stream inside a flow mapping", start))
            }
            _ => {
                self.transition(State::AfterFlowMapKey);
                self.push_level(State::BeforeFlowItem);
                Ok(None)
            }
        }
    }

    fn after_flow_map_key(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match tok.kind {
            TokenKind::MapValueInd => {
                self.take_tok();
                self.transition(State::AfterFlowMapValue);
                self.push_level(State::BeforeFlowItem);
                Ok(None)
            }
            TokenKind::SeqSep => {
                // the value is missing
                self.take_tok();
                self.transition(State::AfterFlowMapSep);
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            TokenKind::MapEnd => {
                let tok = self.take_tok();
                self.lexer.leave_flow();
                self.pop_level();
                self.queued.push_back((Event::MappingEnd, tok.span));
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            _ => Err(self.unexpected("':', ',' or '}'")),
        }
    }

    fn after_flow_map_value(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::SeqSep => {
                self.take_tok();
                self.transition(State::AfterFlowMapSep);
                Ok(None)
            }
            TokenKind::MapEnd => {
                let tok = self.take_tok();
                self.lexer.leave_flow();
                self.pop_level();
                Ok(Some((Event::MappingEnd, tok.span)))
            }
            _ => Err(self.unexpected("',' or '}'")),
        }
    }

    /// An item position in a flow sequence. YAML admits single-pair
    /// mappings without braces here, so `a: b`, `? a` and `: b` all start a
    /// mapping on the fly.
    fn after_flow_seq_sep(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match &tok.kind {
            TokenKind::SeqEnd => {
                let tok = self.take_tok();
                self.lexer.leave_flow();
                self.pop_level();
                Ok(Some((Event::SequenceEnd, tok.span)))
            }
            TokenKind::SeqSep => {
                // an empty item
                self.take_tok();
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            TokenKind::TagHandle { .. } | TokenKind::VerbatimTag(_) | TokenKind::Anchor(_) => {
                self.transition(State::AfterFlowSeqSepProps);
                self.push_level(State::BeforeNodeProperties);
                Ok(None)
            }
            TokenKind::MapKeyInd => {
                // a single-pair mapping with an explicit key
                self.take_tok();
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition(State::AfterFlowSeqItem);
                self.push_level(State::BeforePairValue);
                self.push_level(State::BeforeFlowItem);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::MapValueInd => {
                // a single-pair mapping with an empty key
                let (props, pstart) = self.take_merged_props(start)?;
                self.transition(State::AfterFlowSeqItem);
                self.push_level(State::AtEmptyPairKey);
                self.queued
                    .push_back((Event::empty_scalar(Properties::none()), Span::empty(start)));
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::empty(pstart.unwrap_or(start)),
                )))
            }
            TokenKind::Scalar(..) => {
                let tok = self.take_tok();
                let TokenKind::Scalar(style, value, multiline) = tok.kind else {
                    unreachable!()
                };
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    // a single-pair mapping with a scalar key
                    self.check_implicit_key(style, multiline, tok.span.start)?;
                    let (props, pstart) = self.take_inline_props();
                    self.transition(State::AfterFlowSeqItem);
                    self.push_level(State::AfterImplicitPairStart);
                    let key_span = Span::new(pstart.unwrap_or(tok.span.start), tok.span.end);
                    self.queued.push_back((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        key_span,
                    ));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Flow,
                            properties: Properties::none(),
                        },
                        Span::empty(key_span.start),
                    )))
                } else {
                    let (props, pstart) = self.take_merged_props(tok.span.start)?;
                    self.transition(State::AfterFlowSeqItem);
                    Ok(Some((
                        Event::Scalar {
                            value,
                            style,
                            properties: props,
                        },
                        Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                    )))
                }
            }
            TokenKind::Alias(_) => {
                let tok = self.take_tok();
                let TokenKind::Alias(name) = tok.kind else {
                    unreachable!()
                };
                self.reject_alias_props(tok.span.start)?;
                if self.peek_tok()?.kind == TokenKind::MapValueInd {
                    self.transition(State::AfterFlowSeqItem);
                    self.push_level(State::AfterImplicitPairStart);
                    self.queued.push_back((Event::Alias(name), tok.span));
                    Ok(Some((
                        Event::MappingStart {
                            style: CollectionStyle::Flow,
                            properties: Properties::none(),
                        },
                        Span::empty(tok.span.start),
                    )))
                } else {
                    self.transition(State::AfterFlowSeqItem);
                    Ok(Some((Event::Alias(name), tok.span)))
                }
            }
            TokenKind::SeqStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowSeqItem);
                self.push_level(State::AfterFlowSeqSep);
                Ok(Some((
                    Event::SequenceStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::MapStart => {
                let tok = self.take_tok();
                let (props, pstart) = self.take_merged_props(tok.span.start)?;
                self.lexer.enter_flow();
                self.transition(State::AfterFlowSeqItem);
                self.push_level(State::AfterFlowMapSep);
                Ok(Some((
                    Event::MappingStart {
                        style: CollectionStyle::Flow,
                        properties: props,
                    },
                    Span::new(pstart.unwrap_or(tok.span.start), tok.span.end),
                )))
            }
            TokenKind::StreamEnd => {
                Err(self.error_at("unexpected end of stream inside a flow sequence", start))
            }
            _ => Err(self.unexpected("a flow sequence item")),
        }
    }

    fn after_flow_seq_item(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::SeqSep => {
                self.take_tok();
                self.transition(State::AfterFlowSeqSep);
                Ok(None)
            }
            TokenKind::SeqEnd => {
                let tok = self.take_tok();
                self.lexer.leave_flow();
                self.pop_level();
                Ok(Some((Event::SequenceEnd, tok.span)))
            }
            _ => Err(self.unexpected("',' or ']'")),
        }
    }

    /// The `: ` of a single-pair mapping inside a flow sequence, after its
    /// key was produced (or synthesized, for an empty key).
    fn before_pair_value(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let explicit_key = self.top().state == State::BeforePairValue;
        let tok = self.peek_tok()?;
        let start = tok.span.start;
        match tok.kind {
            TokenKind::MapValueInd => {
                self.take_tok();
                self.transition(State::AfterPairValue);
                self.push_level(State::BeforeFlowItem);
                Ok(None)
            }
            TokenKind::SeqSep | TokenKind::SeqEnd if explicit_key => {
                // an explicit key with no value
                self.pop_level();
                self.queued
                    .push_back((Event::MappingEnd, Span::empty(start)));
                Ok(Some((
                    Event::empty_scalar(Properties::none()),
                    Span::empty(start),
                )))
            }
            _ => {
                if explicit_key {
                    Err(self.unexpected("':', ',' or ']'"))
                } else {
                    Err(self.internal("single-pair key without a following ':'"))
                }
            }
        }
    }

    fn after_pair_value(&mut self) -> ParseResult<Option<SpannedEvent>> {
        self.pop_level();
        let mark = self.current_mark();
        Ok(Some((Event::MappingEnd, Span::empty(mark))))
    }

    fn before_doc_end(&mut self) -> ParseResult<Option<SpannedEvent>> {
        let tok = self.peek_tok()?;
        match tok.kind {
            TokenKind::DocumentEnd => {
                let tok = self.take_tok();
                self.end_document();
                self.transition(State::BeforeDoc);
                Ok(Some((Event::DocumentEnd { explicit: true }, tok.span)))
            }
            TokenKind::StreamEnd => {
                let mark = tok.span.start;
                self.end_document();
                self.pop_level();
                Ok(Some((
                    Event::DocumentEnd { explicit: false },
                    Span::empty(mark),
                )))
            }
            TokenKind::DirectivesEnd
            | TokenKind::YamlDirective
            | TokenKind::TagDirective
            | TokenKind::UnknownDirective(_) => {
                let mark = tok.span.start;
                self.end_document();
                self.transition(State::BeforeDoc);
                Ok(Some((
                    Event::DocumentEnd { explicit: false },
                    Span::empty(mark),
                )))
            }
            _ => Err(self.unexpected("'...' or '---'")),
        }
    }

    /// Reset per-document state when a document closes.
    fn end_document(&mut self) {
        self.tags.reset_handles();
        self.version = None;
        self.yaml_directive_seen = false;
        self.doc_has_directives = false;
        self.block_indent = -1;
    }

    fn current_mark(&self) -> Marker {
        self.token
            .as_ref()
            .map_or_else(|| self.lexer.mark(), |t| t.span.start)
    }
}

fn parse_version(text: &str) -> Option<(u32, u32)> {
    let (major, minor) = text.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

impl<T: Iterator<Item = char>> Iterator for Parser<T> {
    type Item = Result<SpannedEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stream_ended || self.failed {
            return None;
        }
        Some(self.next_event())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn events_of(source: &str) -> Vec<Event> {
        Parser::new_from_str(source)
            .map(|r| r.expect("parse failed").0)
            .collect()
    }

    fn plain(value: &str) -> Event {
        Event::Scalar {
            value: value.to_string(),
            style: ScalarStyle::Plain,
            properties: Properties::none(),
        }
    }

    fn empty() -> Event {
        Event::Scalar {
            value: String::new(),
            style: ScalarStyle::Any,
            properties: Properties::none(),
        }
    }

    fn block_map() -> Event {
        Event::MappingStart {
            style: CollectionStyle::Block,
            properties: Properties::none(),
        }
    }

    fn block_seq() -> Event {
        Event::SequenceStart {
            style: CollectionStyle::Block,
            properties: Properties::none(),
        }
    }

    fn flow_map() -> Event {
        Event::MappingStart {
            style: CollectionStyle::Flow,
            properties: Properties::none(),
        }
    }

    fn flow_seq() -> Event {
        Event::SequenceStart {
            style: CollectionStyle::Flow,
            properties: Properties::none(),
        }
    }

    fn doc() -> Event {
        Event::DocumentStart {
            explicit: false,
            version: None,
        }
    }

    fn doc_explicit() -> Event {
        Event::DocumentStart {
            explicit: true,
            version: None,
        }
    }

    fn doc_end() -> Event {
        Event::DocumentEnd { explicit: false }
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(events_of(""), [Event::StreamStart, Event::StreamEnd]);
    }

    #[test]
    fn test_empty_explicit_document() {
        assert_eq!(
            events_of("---\n"),
            [
                Event::StreamStart,
                doc_explicit(),
                empty(),
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_simple_mapping() {
        assert_eq!(
            events_of("a: b\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("a"),
                plain("b"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_simple_sequence() {
        assert_eq!(
            events_of("- 1\n- 2\n"),
            [
                Event::StreamStart,
                doc(),
                block_seq(),
                plain("1"),
                plain("2"),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_flow_in_block() {
        assert_eq!(
            events_of("{a: [1, 2]}\n"),
            [
                Event::StreamStart,
                doc(),
                flow_map(),
                plain("a"),
                flow_seq(),
                plain("1"),
                plain("2"),
                Event::SequenceEnd,
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_nested_block() {
        assert_eq!(
            events_of("a:\n  b: c\nd: e\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("a"),
                block_map(),
                plain("b"),
                plain("c"),
                Event::MappingEnd,
                plain("d"),
                plain("e"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_explicit_block_mapping() {
        assert_eq!(
            events_of("? key\n: value\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("key"),
                plain("value"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_explicit_key_without_value() {
        assert_eq!(
            events_of("? key\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("key"),
                empty(),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_missing_value_between_keys() {
        assert_eq!(
            events_of("a:\nb: c\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("a"),
                empty(),
                plain("b"),
                plain("c"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_indentless_sequence_as_value() {
        assert_eq!(
            events_of("key:\n- item 1\n- item 2\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("key"),
                block_seq(),
                plain("item 1"),
                plain("item 2"),
                Event::SequenceEnd,
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_compact_nested_sequence() {
        assert_eq!(
            events_of("- - a\n  - b\n- 2\n"),
            [
                Event::StreamStart,
                doc(),
                block_seq(),
                block_seq(),
                plain("a"),
                plain("b"),
                Event::SequenceEnd,
                plain("2"),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_compact_mapping_in_sequence() {
        assert_eq!(
            events_of("- a: 1\n  b: 2\n- c: 3\n"),
            [
                Event::StreamStart,
                doc(),
                block_seq(),
                block_map(),
                plain("a"),
                plain("1"),
                plain("b"),
                plain("2"),
                Event::MappingEnd,
                block_map(),
                plain("c"),
                plain("3"),
                Event::MappingEnd,
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_sequence_of_empty_items() {
        assert_eq!(
            events_of("-\n-\n"),
            [
                Event::StreamStart,
                doc(),
                block_seq(),
                empty(),
                empty(),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_multiple_documents() {
        assert_eq!(
            events_of("a\n---\nb\n...\n"),
            [
                Event::StreamStart,
                doc(),
                plain("a"),
                doc_end(),
                doc_explicit(),
                plain("b"),
                Event::DocumentEnd { explicit: true },
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_yaml_directive_version() {
        assert_eq!(
            events_of("%YAML 1.2\n---\na\n"),
            [
                Event::StreamStart,
                Event::DocumentStart {
                    explicit: true,
                    version: Some((1, 2)),
                },
                plain("a"),
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_unsupported_version_warns() {
        let mut parser = Parser::new_from_str("%YAML 1.1\n---\na\n");
        while let Some(r) = parser.next() {
            r.expect("parse failed");
        }
        assert_eq!(parser.warnings().len(), 1);
        assert!(parser.warnings()[0].message.contains("1.1"));
    }

    #[test]
    fn test_duplicate_yaml_directive_fails() {
        let result: Result<Vec<_>, _> =
            Parser::new_from_str("%YAML 1.2\n%YAML 1.2\n---\na\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_directive_warns() {
        let mut parser = Parser::new_from_str("%FOO bar\n---\na\n");
        while let Some(r) = parser.next() {
            r.expect("parse failed");
        }
        assert_eq!(parser.warnings().len(), 1);
        assert!(parser.warnings()[0].message.contains("FOO"));
    }

    #[test]
    fn test_directives_require_document_start() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("%YAML 1.2\na\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_anchor_on_scalar() {
        assert_eq!(
            events_of("&x a\n"),
            [
                Event::StreamStart,
                doc(),
                Event::Scalar {
                    value: "a".to_string(),
                    style: ScalarStyle::Plain,
                    properties: Properties {
                        anchor: Some("x".to_string()),
                        tag: TagId::QUESTION_MARK,
                    },
                },
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_anchor_and_alias_in_flow_seq() {
        assert_eq!(
            events_of("[&a 1, *a]\n"),
            [
                Event::StreamStart,
                doc(),
                flow_seq(),
                Event::Scalar {
                    value: "1".to_string(),
                    style: ScalarStyle::Plain,
                    properties: Properties {
                        anchor: Some("a".to_string()),
                        tag: TagId::QUESTION_MARK,
                    },
                },
                Event::Alias("a".to_string()),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_anchor_on_next_line_collection() {
        assert_eq!(
            events_of("&s\n- a\n"),
            [
                Event::StreamStart,
                doc(),
                Event::SequenceStart {
                    style: CollectionStyle::Block,
                    properties: Properties {
                        anchor: Some("s".to_string()),
                        tag: TagId::QUESTION_MARK,
                    },
                },
                plain("a"),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_tag_on_implicit_key() {
        let events = events_of("!!str a: b\n");
        assert_eq!(
            events[3],
            Event::Scalar {
                value: "a".to_string(),
                style: ScalarStyle::Plain,
                properties: Properties {
                    anchor: None,
                    tag: TagId::STR,
                },
            }
        );
    }

    #[test]
    fn test_verbatim_tag() {
        let mut parser = Parser::new_from_str("!<tag:example.com,2000:app/foo> a\n");
        let mut tag = None;
        while let Some(r) = parser.next() {
            if let (Event::Scalar { properties, .. }, _) = r.expect("parse failed") {
                tag = Some(properties.tag);
            }
        }
        let tag = tag.expect("no scalar event");
        assert_eq!(
            parser.tag_library().uri_of(tag),
            Some("tag:example.com,2000:app/foo")
        );
    }

    #[test]
    fn test_custom_tag_handle() {
        let source = "%TAG !e! tag:example.com,2000:app/\n---\n!e!foo bar\n";
        let mut parser = Parser::new_from_str(source);
        let mut tag = None;
        while let Some(r) = parser.next() {
            if let (Event::Scalar { properties, .. }, _) = r.expect("parse failed") {
                tag = Some(properties.tag);
            }
        }
        let tag = tag.expect("no scalar event");
        assert_eq!(
            parser.tag_library().uri_of(tag),
            Some("tag:example.com,2000:app/foo")
        );
    }

    #[test]
    fn test_unknown_tag_handle_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("!e!foo bar\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_non_specific_tag() {
        let events = events_of("! a\n");
        assert_eq!(
            events[2],
            Event::Scalar {
                value: "a".to_string(),
                style: ScalarStyle::Plain,
                properties: Properties {
                    anchor: None,
                    tag: TagId::EXCLAMATION_MARK,
                },
            }
        );
    }

    #[test]
    fn test_two_anchors_fail() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("&a &b c\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_two_tags_fail() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("!!str !!int a\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_alias_with_properties_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("&a *b\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_single_pair_mapping_in_flow_seq() {
        assert_eq!(
            events_of("[a: b, c]\n"),
            [
                Event::StreamStart,
                doc(),
                flow_seq(),
                flow_map(),
                plain("a"),
                plain("b"),
                Event::MappingEnd,
                plain("c"),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_value_only_pair_in_flow_seq() {
        assert_eq!(
            events_of("[: b]\n"),
            [
                Event::StreamStart,
                doc(),
                flow_seq(),
                flow_map(),
                empty(),
                plain("b"),
                Event::MappingEnd,
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_key_only_pair_in_flow_seq() {
        assert_eq!(
            events_of("[? a]\n"),
            [
                Event::StreamStart,
                doc(),
                flow_seq(),
                flow_map(),
                plain("a"),
                empty(),
                Event::MappingEnd,
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_empty_flow_seq_entries() {
        assert_eq!(
            events_of("[a,,b]\n"),
            [
                Event::StreamStart,
                doc(),
                flow_seq(),
                plain("a"),
                empty(),
                plain("b"),
                Event::SequenceEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_flow_map_missing_value() {
        assert_eq!(
            events_of("{a, b: c}\n"),
            [
                Event::StreamStart,
                doc(),
                flow_map(),
                plain("a"),
                empty(),
                plain("b"),
                plain("c"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_flow_collection_as_key() {
        assert_eq!(
            events_of("{[a]: b}\n"),
            [
                Event::StreamStart,
                doc(),
                flow_map(),
                flow_seq(),
                plain("a"),
                Event::SequenceEnd,
                plain("b"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_root_content_on_marker_line() {
        assert_eq!(
            events_of("--- a: b\n"),
            [
                Event::StreamStart,
                doc_explicit(),
                block_map(),
                plain("a"),
                plain("b"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_block_scalar_styles() {
        assert_eq!(
            events_of("a: |\n  text\nb: >\n  text\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("a"),
                Event::Scalar {
                    value: "text\n".to_string(),
                    style: ScalarStyle::Literal,
                    properties: Properties::none(),
                },
                plain("b"),
                Event::Scalar {
                    value: "text\n".to_string(),
                    style: ScalarStyle::Folded,
                    properties: Properties::none(),
                },
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_sequence_item_at_mapping_indentation_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("a: b\n - c\n").collect();
        let err = result.unwrap_err();
        assert_eq!(err.mark().line, 2);
        assert_eq!(err.mark().col, 1);
    }

    #[test]
    fn test_multiline_implicit_key_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("a\nb: c\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_unclosed_flow_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("[a, b\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_mismatched_flow_bracket_fails() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("key: [1, 2]]\n").collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_error_line_annotation() {
        let result: Result<Vec<_>, _> = Parser::new_from_str("a: b\n - c\n").collect();
        let err = result.unwrap_err();
        let mut lines = err.line_content().lines();
        assert_eq!(lines.next(), Some(" - c"));
        assert_eq!(lines.next(), Some(" ^"));
    }

    #[test]
    fn test_no_events_after_stream_end() {
        let mut parser = Parser::new_from_str("a\n");
        while parser.next().is_some() {}
        assert!(parser.next().is_none());
        assert!(parser.next_event().is_err());
    }

    #[test]
    fn test_peek_matches_next() {
        let mut parser = Parser::new_from_str("a: b\n");
        loop {
            let peeked = parser.peek_event().expect("peek failed").clone();
            let got = parser.next_event().expect("next failed");
            assert_eq!(peeked, got);
            if got.0 == Event::StreamEnd {
                break;
            }
        }
    }

    #[test]
    fn test_event_marks_are_monotonic() {
        let source = "a:\n  - 1\n  - {x: y}\nb: |\n  text\n";
        let mut last = Marker::start();
        for r in Parser::new_from_str(source) {
            let (_, span) = r.expect("parse failed");
            assert!(span.start.index >= last.index);
            last = span.start;
        }
    }

    #[test]
    fn test_comment_only_lines_are_skipped() {
        assert_eq!(
            events_of("# leading\na: b # trailing\n  # indented\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                plain("a"),
                plain("b"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_load_pushes_all_events() {
        struct Counter {
            events: usize,
            scalars: usize,
        }
        impl EventReceiver for Counter {
            fn on_event(&mut self, ev: Event, _span: Span) {
                self.events += 1;
                if matches!(ev, Event::Scalar { .. }) {
                    self.scalars += 1;
                }
            }
        }
        let mut counter = Counter {
            events: 0,
            scalars: 0,
        };
        Parser::new_from_str("a: [1, 2]\n")
            .load(&mut counter)
            .expect("parse failed");
        assert_eq!(counter.events, 11);
        assert_eq!(counter.scalars, 3);
    }

    #[test]
    fn test_empty_key_in_block_mapping() {
        assert_eq!(
            events_of(": b\n"),
            [
                Event::StreamStart,
                doc(),
                block_map(),
                empty(),
                plain("b"),
                Event::MappingEnd,
                doc_end(),
                Event::StreamEnd,
            ]
        );
    }
}
