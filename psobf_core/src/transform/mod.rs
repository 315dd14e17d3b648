//! The rewriting passes.
//!
//! Every pass takes the whole script text and returns a new one. Passes never
//! keep state between runs; anything that must be shared within a run (the
//! random stream, injected helper routines) lives in [`RewriteContext`].

use crate::context::RewriteContext;
use thiserror::Error;

pub mod control_flow;
pub mod dead_code;
pub mod format;
pub mod identifier;
pub mod number;
pub mod string_dict;
pub mod string_encrypt;

pub use control_flow::{BlockShuffleTransform, OpaquePredicateTransform};
pub use dead_code::DeadCodeTransform;
pub use format::FormatJitterTransform;
pub use identifier::IdentifierTransform;
pub use number::NumberEncodeTransform;
pub use string_dict::StringDictTransform;
pub use string_encrypt::{Cipher, StringEncryptTransform};

/// Prefix of names that rewriting passes inject and that renaming never touches.
pub const RESERVED_PREFIX: &str = "$__";

/// Errors raised while a pass is rewriting text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A cipher pass was constructed with no key bytes.
    #[error("encryption key is empty")]
    EmptyKey,
    /// A percentage or probability outside `0..=100`.
    #[error("percentage {0} is outside 0..=100")]
    PercentOutOfRange(u8),
}

/// A single rewriting pass.
///
/// Implementations must be `Send + Sync` so pipelines can be built once and
/// shared by parallel variant runs.
pub trait Transform: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Rewrites `text`, drawing randomness from and recording helpers in `ctx`.
    fn apply(&self, text: &str, ctx: &mut RewriteContext) -> Result<String, TransformError>;
}

fn check_percent(percent: u8) -> Result<(), TransformError> {
    if percent > 100 {
        return Err(TransformError::PercentOutOfRange(percent));
    }
    Ok(())
}
