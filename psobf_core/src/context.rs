use crate::random::init_rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Per-run state threaded through every transform.
///
/// A context belongs to exactly one run and is discarded afterwards, so parallel
/// variant runs never observe each other's helpers or random stream.
#[derive(Debug)]
pub struct RewriteContext {
    pub rng: ChaCha8Rng,
    /// Helper id (e.g. `"rc4"`) to the routine name injected for it.
    helpers: HashMap<&'static str, String>,
    /// Hex MD5 of the original input. Informational only.
    input_digest: String,
}

impl RewriteContext {
    pub fn new(seed: Option<u64>, input: &str) -> Self {
        Self {
            rng: init_rng(seed),
            helpers: HashMap::new(),
            input_digest: format!("{:x}", md5::compute(input.as_bytes())),
        }
    }

    pub fn input_digest(&self) -> &str {
        &self.input_digest
    }

    /// Name of the routine already injected for `helper`, if any.
    pub fn helper(&self, helper: &str) -> Option<&str> {
        self.helpers.get(helper).map(String::as_str)
    }

    /// Records that `helper` was injected under `routine`. Returns false if the
    /// helper was already present, in which case the first name is kept.
    pub fn mark_helper(&mut self, helper: &'static str, routine: String) -> bool {
        if self.helpers.contains_key(helper) {
            return false;
        }
        self.helpers.insert(helper, routine);
        true
    }
}
