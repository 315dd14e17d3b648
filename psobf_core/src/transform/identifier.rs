use super::{RESERVED_PREFIX, Transform, TransformError};
use crate::context::RewriteContext;
use crate::random::random_ident;
use crate::scanner::{self, LiteralKind, Piece};
use once_cell::sync::Lazy;
use rand_chacha::ChaCha8Rng;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

/// `$name`, optionally scope-qualified (`$script:name`).
static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$(?:(global|script|local|private|using):)?([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable pattern is valid")
});

/// A bare word as PowerShell command names are written, dashes included.
static WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_-]*").expect("word pattern is valid"));

/// Automatic and preference variables, plus `$env`, whose meaning comes from the
/// host. Lowercase, without the sigil.
const HOST_VARIABLES: &[&str] = &[
    "_",
    "args",
    "confirmpreference",
    "consolefilename",
    "debugpreference",
    "env",
    "error",
    "erroractionpreference",
    "event",
    "eventargs",
    "eventsubscriber",
    "executioncontext",
    "false",
    "foreach",
    "global",
    "home",
    "host",
    "informationpreference",
    "input",
    "iscoreclr",
    "islinux",
    "ismacos",
    "iswindows",
    "lastexitcode",
    "local",
    "matches",
    "myinvocation",
    "nestedpromptlevel",
    "null",
    "ofs",
    "pid",
    "private",
    "profile",
    "progresspreference",
    "psboundparameters",
    "pscmdlet",
    "pscommandpath",
    "psculture",
    "psdebugcontext",
    "pshome",
    "psitem",
    "psscriptroot",
    "pssenderinfo",
    "psuiculture",
    "psversiontable",
    "pwd",
    "script",
    "sender",
    "shellid",
    "stacktrace",
    "switch",
    "this",
    "true",
    "using",
    "verbosepreference",
    "warningpreference",
    "whatifpreference",
];

/// Renames user variables and functions to random identifiers of the same length.
///
/// Names starting with the reserved `__` prefix (variables or functions) and
/// host-provided variables keep their names. Single-quoted literals are left
/// alone; double-quoted ones are rewritten because their `$name` references
/// interpolate. New names are unique
/// within one run but are not checked against identifiers that already exist in
/// the script.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentifierTransform;

/// Original (lowercased) to generated names for one run.
struct Renamer<'r> {
    rng: &'r mut ChaCha8Rng,
    functions: HashMap<String, String>,
    variables: HashMap<String, String>,
    generated: HashSet<String>,
}

impl<'r> Renamer<'r> {
    fn new(rng: &'r mut ChaCha8Rng) -> Self {
        Self {
            rng,
            functions: HashMap::new(),
            variables: HashMap::new(),
            generated: HashSet::new(),
        }
    }

    fn fresh(&mut self, len: usize) -> String {
        loop {
            let candidate = random_ident(&mut *self.rng, len);
            let folded = candidate.to_ascii_lowercase();
            if !HOST_VARIABLES.contains(&folded.as_str()) && self.generated.insert(folded) {
                return candidate;
            }
        }
    }

    fn declare_function(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        if key.starts_with(&RESERVED_PREFIX[1..]) {
            return;
        }
        if !self.functions.contains_key(&key) {
            let fresh = self.fresh(name.len());
            self.functions.insert(key, fresh);
        }
    }

    fn variable(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        if key.starts_with(&RESERVED_PREFIX[1..]) || HOST_VARIABLES.contains(&key.as_str()) {
            return None;
        }
        if let Some(existing) = self.variables.get(&key) {
            return Some(existing.clone());
        }
        let fresh = self.fresh(name.len());
        self.variables.insert(key, fresh.clone());
        Some(fresh)
    }

    fn rewrite(&mut self, segment: &str) -> String {
        let renamed = self.rename_functions(segment);
        VARIABLE
            .replace_all(&renamed, |caps: &Captures| {
                let name = &caps[2];
                match self.variable(name) {
                    Some(fresh) => match caps.get(1) {
                        Some(scope) => format!("${}:{fresh}", scope.as_str()),
                        None => format!("${fresh}"),
                    },
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Replaces whole-word function names that are not part of a variable,
    /// parameter, member access, or path.
    fn rename_functions(&self, segment: &str) -> String {
        if self.functions.is_empty() {
            return segment.to_string();
        }
        let bytes = segment.as_bytes();
        let mut out = String::with_capacity(segment.len());
        let mut cursor = 0;
        for m in WORD.find_iter(segment) {
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(m.end()).copied();
            if matches!(before, Some(b'$' | b'-' | b'.' | b':' | b'\\' | b'/'))
                || after == Some(b'.')
            {
                continue;
            }
            if let Some(fresh) = self.functions.get(&m.as_str().to_ascii_lowercase()) {
                out.push_str(&segment[cursor..m.start()]);
                out.push_str(fresh);
                cursor = m.end();
            }
        }
        out.push_str(&segment[cursor..]);
        out
    }
}

impl Transform for IdentifierTransform {
    fn name(&self) -> &'static str {
        "identifier"
    }

    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError> {
        let mut renamer = Renamer::new(&mut ctx.rng);
        for name in scanner::function_names(text) {
            renamer.declare_function(&name);
        }

        let spans = scanner::literal_spans(text);
        let mut out = String::with_capacity(text.len());
        for piece in scanner::pieces(text, &spans) {
            match piece {
                Piece::Literal(span, raw) if span.kind == LiteralKind::Single => {
                    out.push_str(raw)
                }
                Piece::Literal(_, segment) | Piece::Code(segment) => {
                    out.push_str(&renamer.rewrite(segment))
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, seed: u64) -> String {
        let mut ctx = RewriteContext::new(Some(seed), text);
        IdentifierTransform.apply(text, &mut ctx).unwrap()
    }

    fn variables(text: &str) -> Vec<String> {
        VARIABLE
            .captures_iter(text)
            .map(|c| c[2].to_string())
            .collect()
    }

    #[test]
    fn renames_variables_consistently_and_case_insensitively() {
        let out = run("$count = 1; $Count++; Write-Output $COUNT", 1);
        let vars = variables(&out);
        assert_eq!(vars.len(), 3);
        assert!(vars.iter().all(|v| v == &vars[0]));
        assert_eq!(vars[0].len(), 5);
        assert!(!out.to_ascii_lowercase().contains("$count"));
    }

    #[test]
    fn renaming_is_bijective_and_avoids_reserved_prefix() {
        let originals: Vec<String> = (0..60).map(|i| format!("$v{i}x")).collect();
        let text = originals.join("; ");
        let out = run(&text, 7);
        let renamed = variables(&out);
        assert_eq!(renamed.len(), originals.len());
        let distinct: HashSet<String> = renamed.iter().map(|v| v.to_ascii_lowercase()).collect();
        assert_eq!(distinct.len(), originals.len());
        assert!(renamed.iter().all(|v| !v.starts_with("__")));
    }

    #[test]
    fn keeps_reserved_and_host_variables() {
        let text = "$__dec = 1; $true; $null; $_.Name; $env:PATH; $PSScriptRoot; $args[0]";
        assert_eq!(run(text, 3), text);
    }

    #[test]
    fn scope_qualified_variables_share_the_plain_name() {
        let out = run("$script:total = 0; $total += 1", 5);
        let vars = variables(&out);
        assert_eq!(vars[0], vars[1]);
        assert!(out.starts_with("$script:"));
        assert_ne!(vars[0], "total");
    }

    #[test]
    fn single_quoted_literals_are_untouched_double_quoted_are_rewritten() {
        let out = run(r#"$name = 'x'; 'keep $name'; "hi $name""#, 9);
        assert!(out.contains("'keep $name'"));
        let vars = variables(&out);
        // assignment, literal (kept), interpolation
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0], vars[2]);
        assert_eq!(vars[1], "name");
    }

    #[test]
    fn renames_functions_at_definition_and_call_sites() {
        let text = "function Get-Data($Path) { $Path }\nfunction helper {\n Get-Data -Path 'x'\n}\nHELPER";
        let out = run(text, 11);
        assert!(!out.contains("Get-Data"));
        assert!(!out.to_ascii_lowercase().contains("helper"));
        assert!(out.contains(" -Path "), "parameter names stay intact: {out}");
        let names = scanner::function_names(&out);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].len(), "Get-Data".len());
        assert_eq!(names[1].len(), "helper".len());
        assert!(out.trim_end().ends_with(&names[1]));
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let text = "function f { $a + $b }; f";
        assert_eq!(run(text, 21), run(text, 21));
    }
}
