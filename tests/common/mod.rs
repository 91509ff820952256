//! Shared helpers: render an event stream in the yaml-test-suite
//! `test.event` notation (`+STR`, `+DOC`, `=VAL :…`, …).

use yamlpull::{
    CollectionStyle, Event, ParseError, Parser, Properties, ScalarStyle, TagId, TagLibrary,
};

/// Parse `source` and render one line per event.
///
/// Returns the rendered lines, or the parse error.
pub fn parse_to_event_lines(source: &str) -> Result<Vec<String>, ParseError> {
    let mut parser = Parser::new_from_str(source);
    let mut lines = vec![];
    loop {
        let (ev, _span) = parser.next_event()?;
        let done = ev == Event::StreamEnd;
        lines.push(render_event(&ev, parser.tag_library()));
        if done {
            return Ok(lines);
        }
    }
}

fn render_event(ev: &Event, tags: &TagLibrary) -> String {
    match ev {
        Event::StreamStart => "+STR".into(),
        Event::StreamEnd => "-STR".into(),
        Event::DocumentStart { explicit, .. } => {
            if *explicit {
                "+DOC ---".into()
            } else {
                "+DOC".into()
            }
        }
        Event::DocumentEnd { explicit } => {
            if *explicit {
                "-DOC ...".into()
            } else {
                "-DOC".into()
            }
        }
        Event::SequenceStart { style, properties } => {
            let style = match style {
                CollectionStyle::Flow => " []",
                CollectionStyle::Block => "",
            };
            format!("+SEQ{}{}", style, render_props(properties, tags))
        }
        Event::SequenceEnd => "-SEQ".into(),
        Event::MappingStart { style, properties } => {
            let style = match style {
                CollectionStyle::Flow => " {}",
                CollectionStyle::Block => "",
            };
            format!("+MAP{}{}", style, render_props(properties, tags))
        }
        Event::MappingEnd => "-MAP".into(),
        Event::Scalar {
            value,
            style,
            properties,
        } => {
            let kind = match style {
                ScalarStyle::Plain | ScalarStyle::Any => ":",
                ScalarStyle::SingleQuoted => "'",
                ScalarStyle::DoubleQuoted => "\"",
                ScalarStyle::Literal => "|",
                ScalarStyle::Folded => ">",
            };
            format!(
                "=VAL{} {}{}",
                render_props(properties, tags),
                kind,
                escape_text(value)
            )
        }
        Event::Alias(name) => format!("=ALI *{name}"),
    }
}

fn render_props(props: &Properties, tags: &TagLibrary) -> String {
    let mut out = String::new();
    if let Some(anchor) = &props.anchor {
        out.push_str(&format!(" &{anchor}"));
    }
    if props.tag == TagId::EXCLAMATION_MARK {
        out.push_str(" <!>");
    } else if props.tag != TagId::QUESTION_MARK {
        let uri = tags.uri_of(props.tag).unwrap_or("?");
        out.push_str(&format!(" <{uri}>"));
    }
    out
}

fn escape_text(text: &str) -> String {
    let mut text = text.to_owned();
    for (ch, replacement) in [
        ('\\', r"\\"),
        ('\n', "\\n"),
        ('\r', "\\r"),
        ('\x08', "\\b"),
        ('\t', "\\t"),
    ] {
        text = text.replace(ch, replacement);
    }
    text
}
