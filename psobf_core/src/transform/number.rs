use super::{Transform, TransformError};
use crate::context::RewriteContext;
use crate::scanner::{self, Piece};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\b").expect("number pattern is valid"));

/// Largest literal rewritten. Keeps `a = (n + c) ^ b` below 2^31 so PowerShell
/// reads the emitted hex as a positive Int32.
const MAX_ENCODED: i64 = i32::MAX as i64 - 5;

/// Rewrites bare integers outside literals as `((0xA -bxor 0xB)-c)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberEncodeTransform;

/// Digits that belong to a fractional/version token, a redirection such as
/// `2>&1`, or an automatic variable like `$1` are not numeric literals.
fn skip_context(seg: &str, start: usize, end: usize) -> bool {
    let bytes = seg.as_bytes();
    let before = start.checked_sub(1).map(|i| bytes[i]);
    let after = bytes.get(end).copied();
    if before == Some(b'.') || after == Some(b'.') || before == Some(b'$') {
        return true;
    }
    if after == Some(b'>') {
        return true;
    }
    start >= 2 && matches!(&bytes[start - 2..start], b">&" | b"<&")
}

pub fn encode_number<R: Rng + ?Sized>(n: i64, rng: &mut R) -> String {
    let c: i64 = rng.random_range(1..=5);
    let b: i64 = rng.random_range(0..0x7FFF);
    let a = (n + c) ^ b;
    format!("((0x{a:X} -bxor 0x{b:X})-{c})")
}

fn encode_segment<R: Rng + ?Sized>(seg: &str, rng: &mut R) -> String {
    let mut out = String::with_capacity(seg.len());
    let mut last = 0;
    for m in NUMBER.find_iter(seg) {
        out.push_str(&seg[last..m.start()]);
        match m.as_str().parse::<i64>() {
            Ok(n) if n <= MAX_ENCODED && !skip_context(seg, m.start(), m.end()) => {
                out.push_str(&encode_number(n, rng))
            }
            _ => out.push_str(m.as_str()),
        }
        last = m.end();
    }
    out.push_str(&seg[last..]);
    out
}

impl Transform for NumberEncodeTransform {
    fn name(&self) -> &'static str {
        "number-encode"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        let spans = scanner::literal_spans(text);
        let mut out = String::with_capacity(text.len() * 2);
        for piece in scanner::pieces(text, &spans) {
            match piece {
                Piece::Code(code) => out.push_str(&encode_segment(code, &mut ctx.rng)),
                Piece::Literal(_, raw) => out.push_str(raw),
            }
        }
        Ok(out)
    }
}
