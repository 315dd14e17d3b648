pub mod cipher;
pub mod config;
pub mod context;
pub mod encoder;
pub mod pipeline;
pub mod profile;
pub mod random;
pub mod runner;
pub mod scanner;
pub mod transform;

pub use cipher::EncryptionKey;
pub use config::{
    ConfigError, FormatMode, FragmentBounds, IdentifierMode, Options, ResolvedOptions,
    StringEncryption,
};
pub use context::RewriteContext;
pub use encoder::{EncodeError, Level, encode_final};
pub use pipeline::{PipelineError, PipelineItem, build_pipeline, run_pipeline};
pub use profile::{FragmentProfile, Profile};
pub use random::derive_variant_seed;
pub use runner::{ObfuscateError, obfuscate, obfuscate_resolved, obfuscate_variants};
pub use transform::{Transform, TransformError};
