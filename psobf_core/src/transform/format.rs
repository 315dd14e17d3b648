use super::{Transform, TransformError};
use crate::context::RewriteContext;
use crate::random::chance;
use crate::scanner::{self, Span};
use rand::Rng;

const TRIM_PERCENT: u8 = 35;
const PREPEND_PERCENT: u8 = 30;
const APPEND_PERCENT: u8 = 30;

/// Cosmetic whitespace noise: trims or pads lines and varies blank lines.
///
/// Lines that are part of a multi-line literal or a here-string stay byte for
/// byte, as does the newline after a backtick continuation.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatJitterTransform;

struct Line<'a> {
    text: &'a str,
    /// Must be emitted verbatim and followed by exactly one newline.
    frozen: bool,
}

fn classify<'a>(text: &'a str, spans: &[Span]) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    let mut in_here_string = false;
    for raw in text.split('\n') {
        let start = offset;
        let end = start + raw.len();
        offset = end + 1;

        let body = raw.trim_end_matches('\r');
        let opens_here_string = body.trim_end().ends_with("@\"") || body.trim_end().ends_with("@'");
        let closes_here_string = body.starts_with("\"@") || body.starts_with("'@");

        let in_span = scanner::in_literal(spans, start)
            || (end < text.len() && scanner::in_literal(spans, end));
        let frozen = in_span || in_here_string || opens_here_string;

        if in_here_string && closes_here_string {
            in_here_string = false;
        } else if !in_here_string && opens_here_string {
            in_here_string = true;
        }
        lines.push(Line { text: raw, frozen });
    }
    lines
}

fn continues(line: &str) -> bool {
    line.trim_end_matches('\r').ends_with('`')
}

/// Trims both ends, except that whitespace escaped by a trailing backtick is
/// kept so the line does not turn into a continuation.
fn trim(line: &str) -> &str {
    let trimmed = line.trim();
    if continues(trimmed) && !continues(line) {
        line.trim_start()
    } else {
        trimmed
    }
}

impl Transform for FormatJitterTransform {
    fn name(&self) -> &'static str {
        "format-jitter"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        let spans = scanner::literal_spans(text);
        let lines = classify(text, &spans);
        let mut out = String::with_capacity(text.len() + text.len() / 4);

        for (i, line) in lines.iter().enumerate() {
            let mut glue_single = line.frozen;
            if line.frozen {
                out.push_str(line.text);
            } else {
                let mut jittered = if chance(&mut ctx.rng, TRIM_PERCENT) {
                    trim(line.text).to_string()
                } else {
                    line.text.to_string()
                };
                if chance(&mut ctx.rng, PREPEND_PERCENT) {
                    jittered.insert(0, ' ');
                }
                let append = chance(&mut ctx.rng, APPEND_PERCENT);
                if continues(&jittered) {
                    glue_single = true;
                } else if append {
                    jittered.push(' ');
                }
                out.push_str(&jittered);
            }

            if i + 1 < lines.len() {
                let newlines = if glue_single {
                    1
                } else {
                    ctx.rng.random_range(1..=2)
                };
                for _ in 0..newlines {
                    out.push('\n');
                }
            }
        }
        Ok(out)
    }
}
