use super::{RESERVED_PREFIX, Transform, TransformError, check_percent};
use crate::context::RewriteContext;
use crate::random::{chance, random_ident};
use crate::scanner::{self, Piece, quote_single};
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

/// Literals shorter than this (in characters) are never tokenized.
const MIN_LITERAL_CHARS: usize = 10;
const MIN_FRAGMENT: usize = 3;
const MAX_FRAGMENT: usize = 6;

/// Unique fragments in first-seen order.
#[derive(Debug, Default)]
struct TokenDictionary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
}

impl TokenDictionary {
    fn intern(&mut self, fragment: &str) -> usize {
        if let Some(&id) = self.index.get(fragment) {
            return id;
        }
        let id = self.tokens.len();
        self.tokens.push(fragment.to_string());
        self.index.insert(fragment.to_string(), id);
        id
    }

    fn prologue(&self, var: &str) -> String {
        let items: Vec<String> = self.tokens.iter().map(|t| quote_single(t)).collect();
        format!("{var}=@({});\n", items.join(","))
    }
}

/// Slices literals into 3-6 character fragments held in a shared array and
/// replaces each literal with an index concatenation.
///
/// Double-quoted literals that interpolate or escape are skipped since their
/// value is only known at run time.
#[derive(Debug, Clone, Copy)]
pub struct StringDictTransform {
    pub percent: u8,
}

impl StringDictTransform {
    pub fn new(percent: u8) -> Self {
        Self { percent }
    }
}

fn split_fragments<R: Rng + ?Sized>(rng: &mut R, value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let left = chars.len() - i;
        if left <= MIN_FRAGMENT {
            out.push(chars[i..].iter().collect());
            break;
        }
        let size = rng.random_range(MIN_FRAGMENT..=MAX_FRAGMENT).min(left);
        out.push(chars[i..i + size].iter().collect());
        i += size;
    }
    out
}

impl Transform for StringDictTransform {
    fn name(&self) -> &'static str {
        "string-dict"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        check_percent(self.percent)?;
        if self.percent == 0 {
            return Ok(text.to_string());
        }

        let var = format!("{RESERVED_PREFIX}D{}", random_ident(&mut ctx.rng, 6));
        let spans = scanner::literal_spans(text);
        let mut dict = TokenDictionary::default();
        let mut tokenized = 0usize;
        let mut out = String::with_capacity(text.len());

        for piece in scanner::pieces(text, &spans) {
            match piece {
                Piece::Code(code) => out.push_str(code),
                Piece::Literal(span, raw) => {
                    let eligible = span.is_static(text)
                        && span.value(text).chars().count() >= MIN_LITERAL_CHARS;
                    if !eligible || !chance(&mut ctx.rng, self.percent) {
                        out.push_str(raw);
                        continue;
                    }
                    let parts: Vec<String> = split_fragments(&mut ctx.rng, &span.value(text))
                        .iter()
                        .map(|f| format!("{var}[{}]", dict.intern(f)))
                        .collect();
                    out.push('(');
                    out.push_str(&parts.join("+"));
                    out.push(')');
                    tokenized += 1;
                }
            }
        }

        if tokenized == 0 {
            return Ok(out);
        }
        debug!(
            literals = tokenized,
            fragments = dict.tokens.len(),
            "tokenized string literals"
        );
        Ok(dict.prologue(&var) + &out)
    }
}
