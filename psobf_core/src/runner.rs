use crate::config::{ConfigError, Options, ResolvedOptions};
use crate::context::RewriteContext;
use crate::encoder::{self, EncodeError};
use crate::pipeline::{self, PipelineError};
use crate::random::derive_variant_seed;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ObfuscateError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Resolves `opts`, runs the pipeline, and applies the final level encoding.
pub fn obfuscate(text: &str, opts: &Options) -> Result<String, ObfuscateError> {
    let resolved = opts.resolve()?;
    obfuscate_resolved(text, &resolved)
}

/// Same as [`obfuscate`] for options that are already resolved.
pub fn obfuscate_resolved(text: &str, opts: &ResolvedOptions) -> Result<String, ObfuscateError> {
    let transforms = pipeline::build_pipeline(opts)?;
    let mut ctx = RewriteContext::new(opts.seed, text);
    info!(
        level = %opts.level,
        transforms = transforms.len(),
        input_md5 = ctx.input_digest(),
        "obfuscating"
    );

    let rewritten = pipeline::run_pipeline(text, &transforms, &mut ctx)?;
    let out = encoder::encode_final(&rewritten, opts.level, opts.no_exec, opts.fragments)?;
    debug!(len = out.len(), "encoded output");
    Ok(out)
}

/// Produces `count` independent variants of `text`.
///
/// Variant `i` (1-based) runs with `derive_variant_seed(base_seed, i)`, so a
/// fixed base seed reproduces the whole batch. Variants run in parallel and are
/// returned in index order.
pub fn obfuscate_variants(
    text: &str,
    opts: &Options,
    count: usize,
    base_seed: u64,
) -> Result<Vec<String>, ObfuscateError> {
    let resolved = opts.resolve()?;
    (0..count)
        .into_par_iter()
        .map(|i| {
            let index = i as u64 + 1;
            let variant = ResolvedOptions {
                seed: Some(derive_variant_seed(base_seed, index)),
                ..resolved.clone()
            };
            obfuscate_resolved(text, &variant)
        })
        .collect()
}
