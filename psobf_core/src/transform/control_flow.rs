use super::{Transform, TransformError};
use crate::context::RewriteContext;
use crate::random::permute;
use crate::scanner;
use rand::seq::IndexedRandom;
use tracing::debug;

/// Conditions that always hold but are not a bare `$true` every time.
const OPAQUE_PREDICATES: &[&str] = &[
    "(1 -eq 1)",
    "($true)",
    "(2 -gt 1)",
    "([math]::Abs(-3) -eq 3)",
    "((7 -band 1) -eq 1)",
];

/// Wraps the whole script in an `if` whose condition is always true.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaquePredicateTransform;

impl Transform for OpaquePredicateTransform {
    fn name(&self) -> &'static str {
        "cf-opaque"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        let predicate = OPAQUE_PREDICATES
            .choose(&mut ctx.rng)
            .copied()
            .unwrap_or("($true)");
        Ok(format!("if{predicate}{{\n{text}\n}}"))
    }
}

/// Moves top-level `function Name { ... }` blocks to the end of the script in
/// random order.
///
/// Functions defined this way are only callable after their definition runs,
/// so a script that calls a function before the shuffled block ends up below
/// the call will fail. Accepted: the pass is opt-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockShuffleTransform;

impl Transform for BlockShuffleTransform {
    fn name(&self) -> &'static str {
        "cf-shuffle"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        let spans = scanner::literal_spans(text);
        let mut blocks: Vec<&str> = Vec::new();
        let mut rest = String::with_capacity(text.len() + 8);
        let mut cursor = 0;

        for start in scanner::bare_function_headers(text, &spans) {
            // Nested inside a block already taken.
            if start < cursor {
                continue;
            }
            let Some(end) = scanner::matching_brace_end(text, &spans, start) else {
                continue;
            };
            rest.push_str(&text[cursor..start]);
            blocks.push(&text[start..end]);
            cursor = end;
        }
        if blocks.is_empty() {
            return Ok(text.to_string());
        }
        rest.push_str(&text[cursor..]);

        debug!(blocks = blocks.len(), "shuffling function blocks");
        permute(&mut ctx.rng, &mut blocks);
        for block in blocks {
            rest.push('\n');
            rest.push_str(block);
            rest.push('\n');
        }
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_predicate_wraps_the_script() {
        let mut ctx = RewriteContext::new(Some(3), "");
        let out = OpaquePredicateTransform
            .apply("Write-Output 1", &mut ctx)
            .unwrap();
        assert!(out.starts_with("if("));
        assert!(out.ends_with("){\nWrite-Output 1\n}"));
        let predicate = &out[2..out.find("){").unwrap() + 1];
        assert!(OPAQUE_PREDICATES.contains(&predicate), "{predicate}");
    }

    #[test]
    fn shuffle_moves_every_block_after_the_remaining_code() {
        let text = "function a { 'a' }\n$x = 1\nfunction b { 'b' }\nfunction c { 'c' }\na";
        let mut ctx = RewriteContext::new(Some(11), text);
        let out = BlockShuffleTransform.apply(text, &mut ctx).unwrap();
        assert!(out.starts_with("\n$x = 1\n\n\na\n"), "{out:?}");
        for block in ["function a { 'a' }", "function b { 'b' }", "function c { 'c' }"] {
            assert_eq!(out.matches(block).count(), 1, "{block}");
            assert!(out.contains(&format!("\n{block}\n")));
        }
    }

    #[test]
    fn nested_blocks_stay_inside_their_parent() {
        let text = "function outer {\n  function inner { 1 }\n  inner\n}";
        let mut ctx = RewriteContext::new(Some(5), text);
        let out = BlockShuffleTransform.apply(text, &mut ctx).unwrap();
        assert_eq!(out, format!("\n{text}\n"));
    }

    #[test]
    fn braces_and_headers_inside_literals_are_ignored() {
        let text = "function f { Write-Output '}' }\n$s = 'function g { '";
        let mut ctx = RewriteContext::new(Some(9), text);
        let out = BlockShuffleTransform.apply(text, &mut ctx).unwrap();
        assert_eq!(out, "\n$s = 'function g { '\nfunction f { Write-Output '}' }\n");
    }

    #[test]
    fn text_without_blocks_is_unchanged() {
        let text = "function p($a) { $a }\nWrite-Output 2";
        let mut ctx = RewriteContext::new(Some(1), text);
        assert_eq!(BlockShuffleTransform.apply(text, &mut ctx).unwrap(), text);
    }
}
