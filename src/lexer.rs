//! The lexical analyzer: turns a character stream into [`Token`]s.
//!
//! The lexer is purely forward. It never backtracks on raw characters and
//! keeps only a bounded lookahead window. Scalar content is evaluated while
//! lexing: escape sequences are resolved, line folding is applied and block
//! scalar chomping is performed, so the parser only ever sees finished
//! strings.
//!
//! Block structure is *not* decided here. The lexer reports the indentation
//! of every content line through [`TokenKind::Indentation`] tokens and leaves
//! the nesting decisions to the parser. Two pieces of context flow the other
//! way: the parser signals flow-collection boundaries ([`Lexer::enter_flow`],
//! [`Lexer::leave_flow`]) and, before each token, the indentation of the
//! innermost open block collection, which bounds multiline plain scalars and
//! block scalar content.

use std::collections::VecDeque;

use thiserror::Error;

use crate::char_traits::{
    as_hex, is_anchor_char, is_blank, is_blank_or_breakz, is_bom, is_break, is_breakz, is_digit,
    is_flow, is_hex, is_tag_char, is_uri_char, is_word_char, is_z,
};
use crate::input::BufferedInput;

/// A position in the source: line, column and absolute offset.
///
/// Lines are 1-based, columns and offsets 0-based.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Marker {
    /// Absolute offset in characters from the start of the stream.
    pub index: usize,
    /// 1-based line number.
    pub line: usize,
    /// 0-based column.
    pub col: usize,
}

impl Marker {
    pub(crate) fn new(index: usize, line: usize, col: usize) -> Marker {
        Marker { index, line, col }
    }

    /// The marker at the very start of the stream.
    #[must_use]
    pub fn start() -> Marker {
        Marker::new(0, 1, 0)
    }
}

/// A source range, attached to every token and event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Span {
    /// Position of the first character.
    pub start: Marker,
    /// Position one past the last character.
    pub end: Marker,
}

impl Span {
    pub(crate) fn new(start: Marker, end: Marker) -> Span {
        Span { start, end }
    }

    pub(crate) fn empty(mark: Marker) -> Span {
        Span::new(mark, mark)
    }
}

/// The style a scalar was written in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ScalarStyle {
    /// No source style; used for scalars the parser synthesizes (empty
    /// mapping values and the like). Never appears on a token.
    Any,
    /// An unquoted scalar.
    Plain,
    /// `'…'`
    SingleQuoted,
    /// `"…"`
    DoubleQuoted,
    /// `|`
    Literal,
    /// `>`
    Folded,
}

/// An error raised while scanning the character stream.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
#[error("{info} at line {} column {}", mark.line, mark.col + 1)]
pub struct ScanError {
    mark: Marker,
    info: String,
}

impl ScanError {
    pub(crate) fn new(mark: Marker, info: &str) -> ScanError {
        ScanError {
            mark,
            info: info.to_string(),
        }
    }

    /// The position the error was raised at.
    #[must_use]
    pub fn mark(&self) -> Marker {
        self.mark
    }

    /// The error message, without position information.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.info
    }
}

/// What a token is, along with any evaluated content.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// End of input. Emitted indefinitely once reached.
    StreamEnd,
    /// Start of a content line in block context; carries the column of the
    /// first non-blank character. Blank and comment-only lines emit nothing.
    Indentation(usize),
    /// `---` at column zero.
    DirectivesEnd,
    /// `...` at column zero.
    DocumentEnd,
    /// `%YAML`
    YamlDirective,
    /// `%TAG`
    TagDirective,
    /// Any other `%…` directive, with its name.
    UnknownDirective(String),
    /// A whitespace-separated directive argument.
    DirectiveParam(String),
    /// A tag shorthand: the handle (`!`, `!!` or `!name!`) and its suffix.
    /// In a `%TAG` directive the suffix is empty.
    TagHandle {
        /// The handle, including its surrounding `!`s.
        handle: String,
        /// The part after the handle; may be empty.
        suffix: String,
    },
    /// The URI prefix argument of a `%TAG` directive.
    Suffix(String),
    /// `!<…>`, carrying the URI between the angle brackets.
    VerbatimTag(String),
    /// `&name`
    Anchor(String),
    /// `*name`
    Alias(String),
    /// `- ` in block context.
    SeqItemInd,
    /// `? `
    MapKeyInd,
    /// `: `
    MapValueInd,
    /// `{`
    MapStart,
    /// `}`
    MapEnd,
    /// `[`
    SeqStart,
    /// `]`
    SeqEnd,
    /// `,`
    SeqSep,
    /// Scalar content with escapes resolved and folding applied. The last
    /// field records whether the scalar spanned more than one source line.
    Scalar(ScalarStyle, String, bool),
}

/// A lexed token with its source range.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Where it was lexed from.
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, start: Marker, end: Marker) -> Token {
        Token {
            kind,
            span: Span::new(start, end),
        }
    }
}

/// Where the lexer currently is within the line cycle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LexState {
    /// Before anything was read; a BOM may be consumed here.
    StreamStart,
    /// At the start of a line. Leading blanks may already have been
    /// consumed when a multiline scalar ended here.
    LineStart,
    /// Within a line, after at least one token.
    InLine,
    /// The end of input was reached.
    End,
}

pub(crate) type ScanResult<T> = Result<T, ScanError>;

/// The lexical analyzer.
///
/// Produces one [`Token`] per [`Lexer::next_token`] call.
#[derive(Debug)]
pub struct Lexer<T: Iterator<Item = char>> {
    input: BufferedInput<T>,
    mark: Marker,
    state: LexState,
    /// Nesting depth of flow collections, maintained by parser signals.
    flow_depth: usize,
    /// Indentation of the innermost open block collection, set by the
    /// parser before each token. `-1` at the document root.
    block_context: i32,
    /// Tokens already lexed but not yet handed out. Directive lines produce
    /// several tokens in one pass.
    pending: VecDeque<Token>,
    /// Copy of the current source line, for error annotation.
    line_buf: String,
    /// Whether the previous token allows an adjacent `:` (quoted scalars
    /// and flow collection ends, as in `{"a":1}`).
    after_json_like: bool,
}

impl<T: Iterator<Item = char>> Lexer<T> {
    /// Create a lexer over the given character source.
    pub fn new(source: T) -> Lexer<T> {
        Lexer {
            input: BufferedInput::new(source),
            mark: Marker::start(),
            state: LexState::StreamStart,
            flow_depth: 0,
            block_context: -1,
            pending: VecDeque::new(),
            line_buf: String::new(),
            after_json_like: false,
        }
    }

    /// The current source position.
    #[must_use]
    pub fn mark(&self) -> Marker {
        self.mark
    }

    /// Signal that the parser entered a flow collection.
    pub(crate) fn enter_flow(&mut self) {
        self.flow_depth += 1;
    }

    /// Signal that the parser left a flow collection.
    pub(crate) fn leave_flow(&mut self) {
        debug_assert!(self.flow_depth > 0);
        self.flow_depth = self.flow_depth.saturating_sub(1);
    }

    /// Signal the indentation of the innermost open block collection.
    pub(crate) fn set_block_context(&mut self, indent: i32) {
        self.block_context = indent;
    }

    /// The source line the given mark is on, followed by a caret line
    /// pointing at its column. Reads ahead to the end of the current line,
    /// so only call this when abandoning the stream.
    pub(crate) fn annotated_line(&mut self, mark: Marker) -> String {
        while !is_breakz(self.input.peek()) {
            let c = self.input.skip();
            self.line_buf.push(c);
        }
        let mut out = String::with_capacity(self.line_buf.len() + mark.col + 2);
        out.push_str(&self.line_buf);
        out.push('\n');
        for _ in 0..mark.col {
            out.push(' ');
        }
        out.push('^');
        out
    }

    #[inline]
    fn peek(&mut self) -> char {
        self.input.peek()
    }

    #[inline]
    fn peek_nth(&mut self, n: usize) -> char {
        self.input.peek_nth(n)
    }

    /// Consume one non-break character.
    #[inline]
    fn skip(&mut self) {
        let c = self.input.skip();
        self.line_buf.push(c);
        self.mark.index += 1;
        self.mark.col += 1;
    }

    /// Consume a line break (`\n`, `\r` or `\r\n`).
    fn skip_break(&mut self) {
        let c = self.input.skip();
        self.mark.index += 1;
        if c == '\r' && self.input.peek() == '\n' {
            self.input.skip();
            self.mark.index += 1;
        }
        self.mark.line += 1;
        self.mark.col = 0;
        self.line_buf.clear();
    }

    /// Consume a break and append its evaluated form (`\n`) to `out`.
    fn read_break(&mut self, out: &mut String) {
        out.push('\n');
        self.skip_break();
    }

    fn skip_blanks(&mut self) {
        while is_blank(self.peek()) {
            self.skip();
        }
    }

    fn skip_comment(&mut self) {
        while !is_breakz(self.peek()) {
            self.skip();
        }
    }

    /// Whether a document marker (`---` or `...`) starts at the current
    /// position. Only meaningful at column zero.
    fn at_document_marker(&mut self) -> bool {
        self.mark.col == 0
            && (self.input.next_is("---") || self.input.next_is("..."))
            && is_blank_or_breakz(self.peek_nth(3))
    }

    fn token(&self, kind: TokenKind, start: Marker) -> Token {
        Token::new(kind, start, self.mark)
    }

    /// Lex the next token.
    ///
    /// After the end of input this keeps returning [`TokenKind::StreamEnd`].
    ///
    /// # Errors
    /// Returns a [`ScanError`] on malformed input. The stream must not be
    /// used further after an error.
    pub fn next_token(&mut self) -> ScanResult<Token> {
        if let Some(tok) = self.pending.pop_front() {
            return Ok(tok);
        }
        loop {
            match self.state {
                LexState::StreamStart => {
                    if is_bom(self.peek()) {
                        self.skip();
                        self.line_buf.clear();
                    }
                    self.state = LexState::LineStart;
                }
                LexState::LineStart => {
                    if let Some(tok) = self.lex_line_start()? {
                        return Ok(tok);
                    }
                }
                LexState::InLine => {
                    if let Some(tok) = self.lex_in_line()? {
                        return Ok(tok);
                    }
                }
                LexState::End => {
                    return Ok(self.token(TokenKind::StreamEnd, self.mark));
                }
            }
        }
    }

    /// Handle the start of a line. Returns a token, or `None` if the line
    /// was blank or a comment and lexing must continue.
    fn lex_line_start(&mut self) -> ScanResult<Option<Token>> {
        self.skip_blanks();
        let c = self.peek();

        if is_break(c) {
            self.skip_break();
            return Ok(None);
        }
        if c == '#' {
            self.skip_comment();
            return Ok(None);
        }
        if is_z(c) {
            self.state = LexState::End;
            return Ok(Some(self.token(TokenKind::StreamEnd, self.mark)));
        }

        if self.mark.col == 0 {
            if self.at_document_marker() {
                let start = self.mark;
                let kind = if self.peek() == '-' {
                    TokenKind::DirectivesEnd
                } else {
                    TokenKind::DocumentEnd
                };
                self.skip();
                self.skip();
                self.skip();
                self.after_json_like = false;
                self.state = LexState::InLine;
                return Ok(Some(self.token(kind, start)));
            }
            if c == '%' && self.flow_depth == 0 {
                self.lex_directive_line()?;
                return Ok(self.pending.pop_front());
            }
        }

        self.after_json_like = false;
        self.state = LexState::InLine;
        if self.flow_depth == 0 {
            let start = self.mark;
            return Ok(Some(self.token(TokenKind::Indentation(self.mark.col), start)));
        }
        Ok(None)
    }

    /// Dispatch on the first character of the next token within a line.
    fn lex_in_line(&mut self) -> ScanResult<Option<Token>> {
        self.skip_blanks();
        let c = self.peek();

        if is_break(c) {
            self.skip_break();
            self.state = LexState::LineStart;
            return Ok(None);
        }
        if is_z(c) {
            self.state = LexState::LineStart;
            return Ok(None);
        }
        if c == '#' {
            self.skip_comment();
            return Ok(None);
        }

        let start = self.mark;
        let nc = self.peek_nth(1);
        let in_flow = self.flow_depth > 0;
        let tok = match c {
            '-' if !in_flow && is_blank_or_breakz(nc) => {
                self.skip();
                self.simple(TokenKind::SeqItemInd, start)
            }
            '?' if is_blank_or_breakz(nc) || (in_flow && is_flow(nc)) => {
                self.skip();
                self.simple(TokenKind::MapKeyInd, start)
            }
            ':' if is_blank_or_breakz(nc) || (in_flow && is_flow(nc)) || self.after_json_like => {
                self.skip();
                self.simple(TokenKind::MapValueInd, start)
            }
            '{' => {
                self.skip();
                self.simple(TokenKind::MapStart, start)
            }
            '}' => {
                self.skip();
                self.json_like(TokenKind::MapEnd, start)
            }
            '[' => {
                self.skip();
                self.simple(TokenKind::SeqStart, start)
            }
            ']' => {
                self.skip();
                self.json_like(TokenKind::SeqEnd, start)
            }
            ',' => {
                self.skip();
                self.simple(TokenKind::SeqSep, start)
            }
            '&' => self.scan_anchor_or_alias(true)?,
            '*' => self.scan_anchor_or_alias(false)?,
            '!' => self.scan_tag()?,
            '|' if !in_flow => self.scan_block_scalar(true)?,
            '>' if !in_flow => self.scan_block_scalar(false)?,
            '\'' => self.scan_quoted_scalar(true)?,
            '"' => self.scan_quoted_scalar(false)?,
            '%' | '@' | '`' => {
                return Err(ScanError::new(
                    self.mark,
                    &format!("unexpected character: `{c}'"),
                ));
            }
            _ => self.scan_plain_scalar()?,
        };
        Ok(Some(tok))
    }

    fn simple(&mut self, kind: TokenKind, start: Marker) -> Token {
        self.after_json_like = false;
        self.token(kind, start)
    }

    fn json_like(&mut self, kind: TokenKind, start: Marker) -> Token {
        self.after_json_like = true;
        self.token(kind, start)
    }

    fn scan_anchor_or_alias(&mut self, anchor: bool) -> ScanResult<Token> {
        let start = self.mark;
        self.skip();
        let mut name = String::new();
        while is_anchor_char(self.peek()) {
            name.push(self.peek());
            self.skip();
        }
        if name.is_empty() {
            return Err(ScanError::new(
                start,
                if anchor {
                    "while scanning an anchor, could not find expected name"
                } else {
                    "while scanning an alias, could not find expected name"
                },
            ));
        }
        let kind = if anchor {
            TokenKind::Anchor(name)
        } else {
            TokenKind::Alias(name)
        };
        Ok(self.simple(kind, start))
    }

    /// Lex `!`, `!suffix`, `!!suffix`, `!handle!suffix` or `!<uri>`.
    fn scan_tag(&mut self) -> ScanResult<Token> {
        let start = self.mark;
        self.skip();

        if self.peek() == '<' {
            self.skip();
            let mut uri = String::new();
            while self.peek() != '>' && is_uri_char(self.peek()) {
                uri.push(self.peek());
                self.skip();
            }
            if self.peek() != '>' {
                return Err(ScanError::new(
                    start,
                    "while scanning a verbatim tag, did not find expected '>'",
                ));
            }
            self.skip();
            if uri.is_empty() {
                return Err(ScanError::new(
                    start,
                    "while scanning a verbatim tag, found an empty tag",
                ));
            }
            return Ok(self.simple(TokenKind::VerbatimTag(uri), start));
        }

        let mut name = String::new();
        while is_word_char(self.peek()) {
            name.push(self.peek());
            self.skip();
        }
        let handle;
        let mut suffix;
        if self.peek() == '!' {
            self.skip();
            handle = format!("!{name}!");
            suffix = String::new();
        } else {
            handle = "!".to_string();
            suffix = name;
        }
        while is_tag_char(self.peek()) {
            suffix.push(self.peek());
            self.skip();
        }
        let c = self.peek();
        if !is_blank_or_breakz(c) && !(self.flow_depth > 0 && is_flow(c)) {
            return Err(ScanError::new(
                self.mark,
                "while scanning a tag, found an unexpected character",
            ));
        }
        Ok(self.simple(TokenKind::TagHandle { handle, suffix }, start))
    }

    /// Lex an entire `%…` directive line into `pending`.
    fn lex_directive_line(&mut self) -> ScanResult<()> {
        let start = self.mark;
        self.skip();
        let mut name = String::new();
        while self.peek().is_ascii_alphanumeric() {
            name.push(self.peek());
            self.skip();
        }
        if name.is_empty() {
            return Err(ScanError::new(
                start,
                "while scanning a directive, could not find expected directive name",
            ));
        }
        if !is_blank_or_breakz(self.peek()) {
            return Err(ScanError::new(
                start,
                "while scanning a directive, found unexpected non-alphabetical character",
            ));
        }

        match name.as_str() {
            "YAML" => {
                let tok = self.token(TokenKind::YamlDirective, start);
                self.pending.push_back(tok);
                self.skip_blanks();
                let pstart = self.mark;
                let mut param = String::new();
                while !is_blank_or_breakz(self.peek()) {
                    param.push(self.peek());
                    self.skip();
                }
                if param.is_empty() {
                    return Err(ScanError::new(
                        start,
                        "while scanning a YAML directive, did not find expected version",
                    ));
                }
                let tok = self.token(TokenKind::DirectiveParam(param), pstart);
                self.pending.push_back(tok);
            }
            "TAG" => {
                let tok = self.token(TokenKind::TagDirective, start);
                self.pending.push_back(tok);
                self.skip_blanks();
                let hstart = self.mark;
                if self.peek() != '!' {
                    return Err(ScanError::new(
                        hstart,
                        "while scanning a TAG directive, did not find expected tag handle",
                    ));
                }
                self.skip();
                let mut handle = String::from("!");
                while is_word_char(self.peek()) {
                    handle.push(self.peek());
                    self.skip();
                }
                if self.peek() == '!' {
                    handle.push('!');
                    self.skip();
                } else if handle.len() > 1 {
                    // a named handle requires the closing `!`
                    return Err(ScanError::new(
                        hstart,
                        "while scanning a TAG directive, did not find expected '!'",
                    ));
                }
                let tok = self.token(
                    TokenKind::TagHandle {
                        handle,
                        suffix: String::new(),
                    },
                    hstart,
                );
                self.pending.push_back(tok);
                self.skip_blanks();
                let pstart = self.mark;
                let mut prefix = String::new();
                while is_uri_char(self.peek()) {
                    prefix.push(self.peek());
                    self.skip();
                }
                if prefix.is_empty() {
                    return Err(ScanError::new(
                        pstart,
                        "while scanning a TAG directive, did not find expected tag prefix",
                    ));
                }
                let tok = self.token(TokenKind::Suffix(prefix), pstart);
                self.pending.push_back(tok);
            }
            _ => {
                let tok = self.token(TokenKind::UnknownDirective(name), start);
                self.pending.push_back(tok);
                loop {
                    self.skip_blanks();
                    if is_breakz(self.peek()) || self.peek() == '#' {
                        break;
                    }
                    let pstart = self.mark;
                    let mut param = String::new();
                    while !is_blank_or_breakz(self.peek()) {
                        param.push(self.peek());
                        self.skip();
                    }
                    let tok = self.token(TokenKind::DirectiveParam(param), pstart);
                    self.pending.push_back(tok);
                }
            }
        }

        self.skip_blanks();
        if self.peek() == '#' {
            self.skip_comment();
        }
        if !is_breakz(self.peek()) {
            return Err(ScanError::new(
                start,
                "while scanning a directive, did not find expected comment or line break",
            ));
        }
        if is_break(self.peek()) {
            self.skip_break();
        }
        self.state = LexState::LineStart;
        Ok(())
    }

    /// Lex a plain scalar, folding continuation lines.
    ///
    /// In block context a continuation line must be indented past the
    /// innermost open block collection. The scalar ends at `:` followed by a
    /// blank (or, in flow, a flow indicator), at flow indicators inside flow
    /// collections, at a comment, at a document marker or at less-indented
    /// content.
    fn scan_plain_scalar(&mut self) -> ScanResult<Token> {
        let start = self.mark;
        let in_flow = self.flow_depth > 0;

        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();
        let mut leading_blanks = false;
        let mut multiline = false;
        let mut end = self.mark;

        loop {
            // content characters on the current line
            loop {
                let c = self.peek();
                if is_blank_or_breakz(c) {
                    break;
                }
                let nc = self.peek_nth(1);
                if c == ':' && (is_blank_or_breakz(nc) || (in_flow && is_flow(nc))) {
                    break;
                }
                if in_flow && is_flow(c) {
                    break;
                }
                if leading_blanks {
                    if !leading_break.is_empty() {
                        if trailing_breaks.is_empty() {
                            string.push(' ');
                        } else {
                            string.push_str(&trailing_breaks);
                            trailing_breaks.clear();
                        }
                        leading_break.clear();
                    } else {
                        string.push_str(&leading_break);
                        string.push_str(&trailing_breaks);
                        leading_break.clear();
                        trailing_breaks.clear();
                    }
                    leading_blanks = false;
                } else if !whitespaces.is_empty() {
                    string.push_str(&whitespaces);
                    whitespaces.clear();
                }
                string.push(c);
                self.skip();
                end = self.mark;
            }

            if !is_blank(self.peek()) && !is_break(self.peek()) {
                // stop character or end of input
                break;
            }

            // blanks and line breaks between content
            loop {
                let c = self.peek();
                if is_blank(c) {
                    if !leading_blanks {
                        whitespaces.push(c);
                    }
                    self.skip();
                } else if is_break(c) {
                    if leading_blanks {
                        self.read_break(&mut trailing_breaks);
                    } else {
                        whitespaces.clear();
                        self.read_break(&mut leading_break);
                        leading_blanks = true;
                    }
                } else {
                    break;
                }
            }

            if self.peek() == '#' {
                break;
            }
            if leading_blanks {
                // at the first non-blank of a fresh line
                if is_z(self.peek()) {
                    break;
                }
                if self.at_document_marker() {
                    break;
                }
                if !in_flow && (self.mark.col as i32) <= self.block_context {
                    break;
                }
                multiline = true;
            }
        }

        self.state = if leading_blanks {
            LexState::LineStart
        } else {
            LexState::InLine
        };
        self.after_json_like = false;
        Ok(Token::new(
            TokenKind::Scalar(ScalarStyle::Plain, string, multiline),
            start,
            end,
        ))
    }

    /// Lex a single or double quoted scalar, resolving escapes and folding
    /// line breaks.
    fn scan_quoted_scalar(&mut self, single: bool) -> ScanResult<Token> {
        let start = self.mark;
        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();
        let mut multiline = false;

        // the opening quote
        self.skip();

        loop {
            if self.at_document_marker() {
                return Err(ScanError::new(
                    start,
                    "while scanning a quoted scalar, found unexpected document indicator",
                ));
            }
            if is_z(self.peek()) {
                return Err(ScanError::new(
                    start,
                    "while scanning a quoted scalar, found unexpected end of stream",
                ));
            }

            let mut leading_blanks = false;
            while !is_blank_or_breakz(self.peek()) {
                match self.peek() {
                    '\'' if single && self.peek_nth(1) == '\'' => {
                        string.push('\'');
                        self.skip();
                        self.skip();
                    }
                    '\'' if single => break,
                    '"' if !single => break,
                    '\\' if !single && is_break(self.peek_nth(1)) => {
                        // escaped line break: no space is folded in
                        self.skip();
                        self.skip_break();
                        multiline = true;
                        leading_blanks = true;
                        break;
                    }
                    '\\' if !single => self.scan_escape(&mut string, start)?,
                    c => {
                        string.push(c);
                        self.skip();
                    }
                }
            }
            match self.peek() {
                '\'' if single => break,
                '"' if !single => break,
                _ => {}
            }

            while is_blank(self.peek()) || is_break(self.peek()) {
                if is_blank(self.peek()) {
                    if !leading_blanks {
                        whitespaces.push(self.peek());
                    }
                    self.skip();
                } else {
                    multiline = true;
                    if leading_blanks {
                        self.read_break(&mut trailing_breaks);
                    } else {
                        whitespaces.clear();
                        self.read_break(&mut leading_break);
                        leading_blanks = true;
                    }
                }
            }

            if leading_blanks {
                if leading_break.is_empty() {
                    string.push_str(&trailing_breaks);
                    trailing_breaks.clear();
                } else {
                    if trailing_breaks.is_empty() {
                        string.push(' ');
                    } else {
                        string.push_str(&trailing_breaks);
                        trailing_breaks.clear();
                    }
                    leading_break.clear();
                }
            } else {
                string.push_str(&whitespaces);
                whitespaces.clear();
            }
        }

        // the closing quote
        self.skip();
        let style = if single {
            ScalarStyle::SingleQuoted
        } else {
            ScalarStyle::DoubleQuoted
        };
        Ok(self.json_like(TokenKind::Scalar(style, string, multiline), start))
    }

    /// Resolve one escape sequence after a `\` in a double quoted scalar.
    fn scan_escape(&mut self, out: &mut String, start: Marker) -> ScanResult<()> {
        // the backslash
        self.skip();
        let mut code_length = 0usize;
        match self.peek() {
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            't' | '\t' => out.push('\t'),
            'n' => out.push('\n'),
            'v' => out.push('\x0b'),
            'f' => out.push('\x0c'),
            'r' => out.push('\r'),
            'e' => out.push('\x1b'),
            ' ' => out.push(' '),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '/' => out.push('/'),
            '\\' => out.push('\\'),
            // NEL (#x85)
            'N' => out.push('\u{85}'),
            // #xA0
            '_' => out.push('\u{a0}'),
            // LS (#x2028)
            'L' => out.push('\u{2028}'),
            // PS (#x2029)
            'P' => out.push('\u{2029}'),
            'x' => code_length = 2,
            'u' => code_length = 4,
            'U' => code_length = 8,
            _ => {
                return Err(ScanError::new(
                    start,
                    "while parsing a quoted scalar, found unknown escape character",
                ));
            }
        }
        self.skip();

        if code_length > 0 {
            let mut value = 0u32;
            for i in 0..code_length {
                let c = self.peek_nth(i);
                if !is_hex(c) {
                    return Err(ScanError::new(
                        start,
                        "while parsing a quoted scalar, did not find expected hexadecimal number",
                    ));
                }
                value = (value << 4) + as_hex(c);
            }
            let Some(c) = char::from_u32(value) else {
                return Err(ScanError::new(
                    start,
                    "while parsing a quoted scalar, found invalid Unicode character escape code",
                ));
            };
            out.push(c);
            for _ in 0..code_length {
                self.skip();
            }
        }
        Ok(())
    }

    /// Lex a literal (`|`) or folded (`>`) block scalar.
    fn scan_block_scalar(&mut self, literal: bool) -> ScanResult<Token> {
        let start = self.mark;
        let parent = self.block_context;
        let mut chomping = 0i32;
        let mut increment = 0usize;
        let mut indent = 0usize;

        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut leading_blank = false;

        // the indicator
        self.skip();

        // chomping and indentation may come in either order
        if self.peek() == '+' || self.peek() == '-' {
            chomping = if self.peek() == '+' { 1 } else { -1 };
            self.skip();
            if is_digit(self.peek()) {
                if self.peek() == '0' {
                    return Err(ScanError::new(
                        start,
                        "while scanning a block scalar, found an indentation indicator equal to 0",
                    ));
                }
                increment = (self.peek() as usize) - ('0' as usize);
                self.skip();
            }
        } else if is_digit(self.peek()) {
            if self.peek() == '0' {
                return Err(ScanError::new(
                    start,
                    "while scanning a block scalar, found an indentation indicator equal to 0",
                ));
            }
            increment = (self.peek() as usize) - ('0' as usize);
            self.skip();
            if self.peek() == '+' || self.peek() == '-' {
                chomping = if self.peek() == '+' { 1 } else { -1 };
                self.skip();
            }
        }

        self.skip_blanks();
        if self.peek() == '#' {
            self.skip_comment();
        }
        if !is_breakz(self.peek()) {
            return Err(ScanError::new(
                start,
                "while scanning a block scalar, did not find expected comment or line break",
            ));
        }
        if is_break(self.peek()) {
            self.skip_break();
        }

        if increment > 0 {
            indent = if parent >= 0 {
                parent as usize + increment
            } else {
                increment
            };
        }

        // leading breaks; detects the content indentation if implicit
        self.block_scalar_breaks(&mut indent, parent, &mut trailing_breaks)?;

        while self.mark.col == indent && !is_z(self.peek()) {
            if self.at_document_marker() {
                break;
            }
            let trailing_blank = is_blank(self.peek());
            if !literal && !leading_break.is_empty() && !leading_blank && !trailing_blank {
                if trailing_breaks.is_empty() {
                    string.push(' ');
                }
                leading_break.clear();
            } else {
                string.push_str(&leading_break);
                leading_break.clear();
            }
            string.push_str(&trailing_breaks);
            trailing_breaks.clear();

            leading_blank = is_blank(self.peek());
            while !is_breakz(self.peek()) {
                string.push(self.peek());
                self.skip();
            }
            if is_break(self.peek()) {
                self.read_break(&mut leading_break);
            }

            self.block_scalar_breaks(&mut indent, parent, &mut trailing_breaks)?;
        }

        if chomping != -1 {
            string.push_str(&leading_break);
        }
        if chomping == 1 {
            string.push_str(&trailing_breaks);
        }

        self.state = LexState::LineStart;
        self.after_json_like = false;
        let style = if literal {
            ScalarStyle::Literal
        } else {
            ScalarStyle::Folded
        };
        Ok(Token::new(
            TokenKind::Scalar(style, string, true),
            start,
            self.mark,
        ))
    }

    /// Consume blank lines inside a block scalar, collecting their breaks.
    /// While the indentation is still implicit (`*indent == 0`), tracks the
    /// deepest column seen to detect it.
    fn block_scalar_breaks(
        &mut self,
        indent: &mut usize,
        parent: i32,
        breaks: &mut String,
    ) -> ScanResult<()> {
        let mut max_indent = 0;
        loop {
            while (*indent == 0 || self.mark.col < *indent) && self.peek() == ' ' {
                self.skip();
            }
            if self.mark.col > max_indent {
                max_indent = self.mark.col;
            }
            if (*indent == 0 || self.mark.col < *indent) && self.peek() == '\t' {
                return Err(ScanError::new(
                    self.mark,
                    "while scanning a block scalar, found a tab character where an indentation space is expected",
                ));
            }
            if !is_break(self.peek()) {
                break;
            }
            self.read_break(breaks);
        }

        if *indent == 0 {
            *indent = max_indent.max((parent + 1).max(1) as usize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::TokenKind::*;
    use super::*;

    macro_rules! next {
        ($l:ident, $tk:pat) => {{
            let tok = $l.next_token().unwrap();
            match tok.kind {
                $tk => {}
                _ => panic!("unexpected token: {:?}", tok),
            }
        }};
    }

    macro_rules! next_scalar {
        ($l:ident, $style:expr, $v:expr) => {{
            let tok = $l.next_token().unwrap();
            match tok.kind {
                Scalar(style, ref v, _) => {
                    assert_eq!(style, $style);
                    assert_eq!(v, $v);
                }
                _ => panic!("unexpected token: {:?}", tok),
            }
        }};
    }

    #[test]
    fn test_empty() {
        let mut l = Lexer::new("".chars());
        next!(l, StreamEnd);
        next!(l, StreamEnd);
    }

    #[test]
    fn test_scalar() {
        let mut l = Lexer::new("a scalar".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "a scalar");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_explicit_scalar() {
        let mut l = Lexer::new("---\n'a scalar'\n...\n".chars());
        next!(l, DirectivesEnd);
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::SingleQuoted, "a scalar");
        next!(l, DocumentEnd);
        next!(l, StreamEnd);
    }

    #[test]
    fn test_block_mapping_tokens() {
        let mut l = Lexer::new("a simple key: a value\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "a simple key");
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "a value");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_explicit_key_tokens() {
        let mut l = Lexer::new("? a key\n: a value\n".chars());
        next!(l, Indentation(0));
        next!(l, MapKeyInd);
        next_scalar!(l, ScalarStyle::Plain, "a key");
        next!(l, Indentation(0));
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "a value");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_block_sequence_tokens() {
        let mut l = Lexer::new("- item 1\n- item 2\n".chars());
        next!(l, Indentation(0));
        next!(l, SeqItemInd);
        next_scalar!(l, ScalarStyle::Plain, "item 1");
        next!(l, Indentation(0));
        next!(l, SeqItemInd);
        next_scalar!(l, ScalarStyle::Plain, "item 2");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_flow_tokens_need_parser_signal() {
        let mut l = Lexer::new("[item 1, {a: b}]".chars());
        next!(l, Indentation(0));
        next!(l, SeqStart);
        l.enter_flow();
        next_scalar!(l, ScalarStyle::Plain, "item 1");
        next!(l, SeqSep);
        next!(l, MapStart);
        l.enter_flow();
        next_scalar!(l, ScalarStyle::Plain, "a");
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "b");
        next!(l, MapEnd);
        l.leave_flow();
        next!(l, SeqEnd);
        l.leave_flow();
        next!(l, StreamEnd);
    }

    #[test]
    fn test_no_indentation_inside_flow() {
        let mut l = Lexer::new("[a,\n b]".chars());
        next!(l, Indentation(0));
        next!(l, SeqStart);
        l.enter_flow();
        next_scalar!(l, ScalarStyle::Plain, "a");
        next!(l, SeqSep);
        next_scalar!(l, ScalarStyle::Plain, "b");
        next!(l, SeqEnd);
        l.leave_flow();
        next!(l, StreamEnd);
    }

    #[test]
    fn test_plain_folding() {
        let mut l = Lexer::new("word one\n word two\n\n word three\n".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        match tok.kind {
            Scalar(ScalarStyle::Plain, ref v, multiline) => {
                assert_eq!(v, "word one word two\nword three");
                assert!(multiline);
            }
            _ => panic!("unexpected token: {:?}", tok),
        }
        next!(l, StreamEnd);
    }

    #[test]
    fn test_plain_stops_at_lower_indentation() {
        let mut l = Lexer::new("b\nc: d\n".chars());
        next!(l, Indentation(0));
        l.set_block_context(0);
        next_scalar!(l, ScalarStyle::Plain, "b");
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "c");
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "d");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_plain_trailing_comment() {
        let mut l = Lexer::new("value # a comment\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "value");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_single_quote_escape() {
        let mut l = Lexer::new("'here''s to \"quotes\"'".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::SingleQuoted, "here's to \"quotes\"");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_double_quote_escapes() {
        let mut l = Lexer::new(r#""a\tb\nc \x41 é \\""#.chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::DoubleQuoted, "a\tb\nc A \u{e9} \\");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_double_quote_folding() {
        let mut l = Lexer::new("\"folded\n to a space\"".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        match tok.kind {
            Scalar(ScalarStyle::DoubleQuoted, ref v, multiline) => {
                assert_eq!(v, "folded to a space");
                assert!(multiline);
            }
            _ => panic!("unexpected token: {:?}", tok),
        }
        next!(l, StreamEnd);
    }

    #[test]
    fn test_escaped_line_break() {
        let mut l = Lexer::new("\"escaped\\\nbreak\"".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::DoubleQuoted, "escapedbreak");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_bad_escape() {
        let mut l = Lexer::new(r#""\q""#.chars());
        next!(l, Indentation(0));
        assert!(l.next_token().is_err());
    }

    #[test]
    fn test_unterminated_quoted() {
        let mut l = Lexer::new("'never closed".chars());
        next!(l, Indentation(0));
        assert!(l.next_token().is_err());
    }

    #[test]
    fn test_literal_block_scalar() {
        let mut l = Lexer::new("|\n line 1\n line 2\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Literal, "line 1\nline 2\n");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_folded_block_scalar() {
        let mut l = Lexer::new(">\n fold\n me\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Folded, "fold me\n");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_block_scalar_chomping() {
        let mut l = Lexer::new("|-\n stripped\n\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Literal, "stripped");
        next!(l, StreamEnd);

        let mut l = Lexer::new("|+\n kept\n\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Literal, "kept\n\n");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_block_scalar_explicit_indent() {
        let mut l = Lexer::new("|2\n  two\n   three\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Literal, "two\n three\n");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_block_scalar_zero_indent_indicator() {
        let mut l = Lexer::new("|0\n x\n".chars());
        next!(l, Indentation(0));
        assert!(l.next_token().is_err());
    }

    #[test]
    fn test_anchor_and_alias() {
        let mut l = Lexer::new("&a x\n".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, Anchor("a".to_string()));
        next_scalar!(l, ScalarStyle::Plain, "x");
        next!(l, StreamEnd);

        let mut l = Lexer::new("*a\n".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, Alias("a".to_string()));
        next!(l, StreamEnd);
    }

    #[test]
    fn test_tag_shorthands() {
        let mut l = Lexer::new("!!str x".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        assert_eq!(
            tok.kind,
            TagHandle {
                handle: "!!".to_string(),
                suffix: "str".to_string()
            }
        );
        next_scalar!(l, ScalarStyle::Plain, "x");

        let mut l = Lexer::new("!e!foo x".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        assert_eq!(
            tok.kind,
            TagHandle {
                handle: "!e!".to_string(),
                suffix: "foo".to_string()
            }
        );

        let mut l = Lexer::new("!<tag:example.com,2000:x> x".chars());
        next!(l, Indentation(0));
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, VerbatimTag("tag:example.com,2000:x".to_string()));
    }

    #[test]
    fn test_yaml_directive_tokens() {
        let mut l = Lexer::new("%YAML 1.2\n---\n".chars());
        next!(l, YamlDirective);
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, DirectiveParam("1.2".to_string()));
        next!(l, DirectivesEnd);
        next!(l, StreamEnd);
    }

    #[test]
    fn test_tag_directive_tokens() {
        let mut l = Lexer::new("%TAG !e! tag:example.com,2000:app/\n".chars());
        next!(l, TagDirective);
        let tok = l.next_token().unwrap();
        assert_eq!(
            tok.kind,
            TagHandle {
                handle: "!e!".to_string(),
                suffix: String::new()
            }
        );
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, Suffix("tag:example.com,2000:app/".to_string()));
        next!(l, StreamEnd);
    }

    #[test]
    fn test_unknown_directive_tokens() {
        let mut l = Lexer::new("%FOO bar baz\n".chars());
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, UnknownDirective("FOO".to_string()));
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, DirectiveParam("bar".to_string()));
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, DirectiveParam("baz".to_string()));
        next!(l, StreamEnd);
    }

    #[test]
    fn test_document_markers_only_at_column_zero() {
        let mut l = Lexer::new(" --- x\n".chars());
        next!(l, Indentation(1));
        next_scalar!(l, ScalarStyle::Plain, "--- x");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_dashes_glued_to_content_are_plain() {
        let mut l = Lexer::new("----\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "----");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut l = Lexer::new("\u{feff}a".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "a");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_reserved_indicator() {
        let mut l = Lexer::new("@no\n".chars());
        next!(l, Indentation(0));
        assert!(l.next_token().is_err());
    }

    #[test]
    fn test_marks() {
        let mut l = Lexer::new("a: b\n".chars());
        let ind = l.next_token().unwrap();
        assert_eq!(ind.span.start, Marker::new(0, 1, 0));
        let a = l.next_token().unwrap();
        assert_eq!(a.span.start, Marker::new(0, 1, 0));
        assert_eq!(a.span.end, Marker::new(1, 1, 1));
        let colon = l.next_token().unwrap();
        assert_eq!(colon.span.start, Marker::new(1, 1, 1));
        let b = l.next_token().unwrap();
        assert_eq!(b.span.start, Marker::new(3, 1, 3));
        assert_eq!(b.span.end, Marker::new(4, 1, 4));
    }

    #[test]
    fn test_crlf_breaks() {
        let mut l = Lexer::new("a: b\r\nc: d\r\n".chars());
        next!(l, Indentation(0));
        next_scalar!(l, ScalarStyle::Plain, "a");
        next!(l, MapValueInd);
        l.set_block_context(0);
        next_scalar!(l, ScalarStyle::Plain, "b");
        let tok = l.next_token().unwrap();
        assert_eq!(tok.kind, Indentation(0));
        assert_eq!(tok.span.start.line, 2);
        next_scalar!(l, ScalarStyle::Plain, "c");
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "d");
        next!(l, StreamEnd);
    }

    #[test]
    fn test_adjacent_value_after_quoted_key() {
        let mut l = Lexer::new("{\"a\":1}".chars());
        next!(l, Indentation(0));
        next!(l, MapStart);
        l.enter_flow();
        next_scalar!(l, ScalarStyle::DoubleQuoted, "a");
        next!(l, MapValueInd);
        next_scalar!(l, ScalarStyle::Plain, "1");
        next!(l, MapEnd);
        l.leave_flow();
        next!(l, StreamEnd);
    }
}
