//! Pattern-based location of quoted literals and function headers.
//!
//! Nothing here parses PowerShell. The scanner produces immutable span lists and
//! the transforms decide what to do with the text inside or outside them. Known
//! heuristic limits: an apostrophe in a comment opens a single-quoted span, and
//! an unterminated quote yields no span at all.

use once_cell::sync::Lazy;
use regex::Regex;

/// One literal, double- or single-quoted, leftmost-first so the two kinds never
/// overlap. Double-quoted bodies honor backtick escapes and doubled `""`;
/// single-quoted bodies honor doubled `''`.
static LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)"(?:[^"`]|`.|"")*"|'(?:[^']|'')*'"#).expect("literal pattern is valid")
});

static FUNCTION_WITH_PARAMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bfunction\s+([A-Za-z_][A-Za-z0-9_-]*)\s*\(")
        .expect("function header pattern is valid")
});

static FUNCTION_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bfunction\s+([A-Za-z_][A-Za-z0-9_-]*)\s*\{")
        .expect("function header pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Double,
    Single,
}

/// Half-open byte range `[start, end)` covering a literal including its quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: LiteralKind,
}

impl Span {
    /// The literal as written, quotes included.
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// The literal body without its surrounding quotes.
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start + 1..self.end - 1]
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Whether the body evaluates to itself once quote doubling is undone.
    ///
    /// Double-quoted bodies with `$` or a backtick interpolate or escape, so their
    /// runtime value is not recoverable from the source text alone.
    pub fn is_static(&self, text: &str) -> bool {
        match self.kind {
            LiteralKind::Single => true,
            LiteralKind::Double => {
                let body = self.inner(text);
                !body.contains('$') && !body.contains('`')
            }
        }
    }

    /// Runtime value of a static literal.
    pub fn value(&self, text: &str) -> String {
        match self.kind {
            LiteralKind::Single => self.inner(text).replace("''", "'"),
            LiteralKind::Double => self.inner(text).replace("\"\"", "\""),
        }
    }
}

/// A slice of the text, either outside every literal or exactly one literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    Code(&'a str),
    Literal(Span, &'a str),
}

/// All literal spans, sorted by start offset and non-overlapping.
pub fn literal_spans(text: &str) -> Vec<Span> {
    LITERAL
        .find_iter(text)
        .map(|m| Span {
            start: m.start(),
            end: m.end(),
            kind: if text.as_bytes()[m.start()] == b'"' {
                LiteralKind::Double
            } else {
                LiteralKind::Single
            },
        })
        .collect()
}

/// Splits `text` into alternating code and literal pieces, in order.
pub fn pieces<'a>(text: &'a str, spans: &[Span]) -> Vec<Piece<'a>> {
    let mut out = Vec::with_capacity(spans.len() * 2 + 1);
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            out.push(Piece::Code(&text[cursor..span.start]));
        }
        out.push(Piece::Literal(*span, span.raw(text)));
        cursor = span.end;
    }
    if cursor < text.len() {
        out.push(Piece::Code(&text[cursor..]));
    }
    out
}

/// The span covering `offset`, if any. `spans` must be sorted.
pub fn span_at(spans: &[Span], offset: usize) -> Option<&Span> {
    let idx = spans.partition_point(|s| s.end <= offset);
    spans.get(idx).filter(|s| s.contains(offset))
}

pub fn in_literal(spans: &[Span], offset: usize) -> bool {
    span_at(spans, offset).is_some()
}

/// Names declared by `function Name(` or `function Name {` headers outside
/// literals, first-seen order, deduplicated case-insensitively.
pub fn function_names(text: &str) -> Vec<String> {
    let spans = literal_spans(text);
    let mut found: Vec<(usize, &str)> = FUNCTION_WITH_PARAMS
        .captures_iter(text)
        .chain(FUNCTION_BARE.captures_iter(text))
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?;
            (!in_literal(&spans, whole.start())).then_some((whole.start(), name.as_str()))
        })
        .collect();
    found.sort_by_key(|(offset, _)| *offset);

    let mut names: Vec<String> = Vec::new();
    for (_, name) in found {
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
    }
    names
}

/// Start offsets of `function Name {` headers that are not inside a literal.
pub fn bare_function_headers(text: &str, spans: &[Span]) -> Vec<usize> {
    FUNCTION_BARE
        .find_iter(text)
        .map(|m| m.start())
        .filter(|offset| !in_literal(spans, *offset))
        .collect()
}

/// End offset (exclusive) of the brace block opened by the first `{` at or after
/// `from`, ignoring braces inside literals. `None` if the block never closes.
pub fn matching_brace_end(text: &str, spans: &[Span], from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut opened = false;
    let mut pos = from;
    while pos < bytes.len() {
        if let Some(span) = span_at(spans, pos) {
            pos = span.end;
            continue;
        }
        match bytes[pos] {
            b'{' => {
                depth += 1;
                opened = true;
            }
            b'}' if opened => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

/// Characters PowerShell accepts as a single quote: the ASCII apostrophe and
/// U+2018 through U+201B.
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Encodes `value` as a single-quoted PowerShell literal. Every quote-like
/// character is doubled so none of them ends the literal early.
pub fn quote_single(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if SINGLE_QUOTES.contains(&c) {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_both_literal_kinds_in_order() {
        let text = r#"Write-Host "hello" 'world'"#;
        let spans = literal_spans(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, LiteralKind::Double);
        assert_eq!(spans[0].raw(text), "\"hello\"");
        assert_eq!(spans[1].kind, LiteralKind::Single);
        assert_eq!(spans[1].inner(text), "world");
    }

    #[test]
    fn apostrophe_inside_double_quotes_does_not_open_a_span() {
        let text = r#"$a = "it's fine"; $b = 'x'"#;
        let spans = literal_spans(text);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].inner(text), "it's fine");
        assert_eq!(spans[1].inner(text), "x");
    }

    #[test]
    fn escapes_are_honored() {
        let text = "\"say `\"hi`\" now\" 'don''t' \"a\"\"b\"";
        let spans = literal_spans(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].inner(text), "say `\"hi`\" now");
        assert_eq!(spans[1].value(text), "don't");
        assert_eq!(spans[2].value(text), "a\"b");
    }

    #[test]
    fn unterminated_quote_yields_no_span() {
        assert!(literal_spans("Write-Host \"oops").is_empty());
    }

    #[test]
    fn static_detection() {
        let text = r#""plain" "with $var" "tick`n" 'single $x'"#;
        let flags: Vec<bool> = literal_spans(text)
            .iter()
            .map(|s| s.is_static(text))
            .collect();
        assert_eq!(flags, vec![true, false, false, true]);
    }

    #[test]
    fn pieces_reassemble_the_text() {
        let text = r#"a "b" c 'd'"#;
        let spans = literal_spans(text);
        let rebuilt: String = pieces(text, &spans)
            .iter()
            .map(|p| match p {
                Piece::Code(s) => *s,
                Piece::Literal(_, s) => *s,
            })
            .collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn function_names_cover_both_header_shapes() {
        let text = "function Get-Thing($a) { }\nfunction helper {\n}\nFUNCTION get-thing { }\n'function Fake {'";
        assert_eq!(function_names(text), vec!["Get-Thing", "helper"]);
    }

    #[test]
    fn brace_matching_skips_literals_and_nesting() {
        let text = "function a { if ($x) { '}' } }\nrest";
        let spans = literal_spans(text);
        let end = matching_brace_end(text, &spans, 0).unwrap();
        assert_eq!(&text[..end], "function a { if ($x) { '}' } }");
        assert_eq!(matching_brace_end("function a { ", &[], 0), None);
    }

    #[test]
    fn quote_single_doubles_apostrophes() {
        assert_eq!(quote_single("it's"), "'it''s'");
        assert_eq!(quote_single(""), "''");
    }

    #[test]
    fn quote_single_doubles_typographic_quotes() {
        assert_eq!(quote_single("don\u{2019}t"), "'don\u{2019}\u{2019}t'");
        assert_eq!(
            quote_single("\u{2018}a\u{201A}b\u{201B}"),
            "'\u{2018}\u{2018}a\u{201A}\u{201A}b\u{201B}\u{201B}'"
        );
        assert_eq!(quote_single("\u{201C}x\u{201D}"), "'\u{201C}x\u{201D}'");
    }
}
