use super::{Transform, TransformError, check_percent};
use crate::context::RewriteContext;
use crate::random::{chance, random_ident};

/// Appends no-op snippets after the script.
///
/// The pass fires with `probability` percent; when it does, each of the three
/// snippets is again kept with the same probability.
#[derive(Debug, Clone, Copy)]
pub struct DeadCodeTransform {
    pub probability: u8,
}

impl DeadCodeTransform {
    pub fn new(probability: u8) -> Self {
        Self { probability }
    }
}

impl Transform for DeadCodeTransform {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        check_percent(self.probability)?;
        if !chance(&mut ctx.rng, self.probability) {
            return Ok(text.to_string());
        }

        let snippets = [
            format!("function __dummy{}{{ return }}", random_ident(&mut ctx.rng, 6)),
            "for($__i=0;$__i -lt 0;$__i++){Start-Sleep -Milliseconds 0}".to_string(),
            "$__x='canary';$__y=$__x+$__x|Out-Null".to_string(),
        ];
        let mut out = text.to_string();
        for snippet in snippets {
            if chance(&mut ctx.rng, self.probability) {
                out.push('\n');
                out.push_str(&snippet);
                out.push('\n');
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certain_probability_appends_all_snippets() {
        let mut ctx = RewriteContext::new(Some(2), "");
        let out = DeadCodeTransform::new(100)
            .apply("Write-Output 1", &mut ctx)
            .unwrap();
        assert!(out.starts_with("Write-Output 1\nfunction __dummy"));
        assert!(out.contains("\nfor($__i=0;$__i -lt 0;$__i++){Start-Sleep -Milliseconds 0}\n"));
        assert!(out.ends_with("\n$__x='canary';$__y=$__x+$__x|Out-Null\n"));
    }

    #[test]
    fn zero_probability_is_identity() {
        let mut ctx = RewriteContext::new(Some(2), "");
        for _ in 0..20 {
            assert_eq!(
                DeadCodeTransform::new(0).apply("x", &mut ctx).unwrap(),
                "x"
            );
        }
    }

    #[test]
    fn partial_probability_only_appends() {
        let mut ctx = RewriteContext::new(Some(7), "");
        for _ in 0..50 {
            let out = DeadCodeTransform::new(50).apply("$a = 1", &mut ctx).unwrap();
            assert!(out.starts_with("$a = 1"));
        }
    }

    #[test]
    fn out_of_range_probability_fails() {
        let mut ctx = RewriteContext::new(Some(1), "");
        assert_eq!(
            DeadCodeTransform::new(150).apply("x", &mut ctx),
            Err(TransformError::PercentOutOfRange(150))
        );
    }
}
