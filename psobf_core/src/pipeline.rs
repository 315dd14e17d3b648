use crate::config::{ConfigError, FormatMode, IdentifierMode, ResolvedOptions, StringEncryption};
use crate::context::RewriteContext;
use crate::transform::{
    BlockShuffleTransform, Cipher, DeadCodeTransform, FormatJitterTransform, IdentifierTransform,
    NumberEncodeTransform, OpaquePredicateTransform, StringDictTransform, StringEncryptTransform,
    Transform, TransformError,
};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transform {name} failed: {source}")]
    TransformFailed {
        name: &'static str,
        #[source]
        source: TransformError,
    },
}

/// One entry of the user's pipeline list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineItem {
    Identifier,
    StringDict,
    StringEncrypt,
    NumberEncode,
    FormatJitter,
    ControlFlow,
    DeadCode,
    /// Accepted for compatibility with preset lists. Fragmentation is the
    /// level-5 encoder's job, so it adds no transform.
    Fragment,
}

impl PipelineItem {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineItem::Identifier => "identifier",
            PipelineItem::StringDict => "string-dict",
            PipelineItem::StringEncrypt => "string-encrypt",
            PipelineItem::NumberEncode => "number-encode",
            PipelineItem::FormatJitter => "format-jitter",
            PipelineItem::ControlFlow => "control-flow",
            PipelineItem::DeadCode => "dead-code",
            PipelineItem::Fragment => "frag",
        }
    }
}

impl fmt::Display for PipelineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineItem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identifier" | "iden" => Ok(PipelineItem::Identifier),
            "string-dict" | "stringdict" => Ok(PipelineItem::StringDict),
            "string-encrypt" | "strenc" => Ok(PipelineItem::StringEncrypt),
            "number-encode" | "numenc" => Ok(PipelineItem::NumberEncode),
            "format-jitter" | "fmt" => Ok(PipelineItem::FormatJitter),
            "control-flow" | "cf" => Ok(PipelineItem::ControlFlow),
            "dead-code" | "dead" => Ok(PipelineItem::DeadCode),
            "frag" => Ok(PipelineItem::Fragment),
            _ => Err(ConfigError::UnknownPipelineItem(s.trim().to_string())),
        }
    }
}

/// Parses a comma-separated list, skipping empty entries.
pub fn parse_items(list: &str) -> Result<Vec<PipelineItem>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

/// Turns the resolved pipeline list into transforms, in list order.
///
/// An item whose knob is off contributes nothing. `control-flow` contributes
/// the opaque wrapper and then the block shuffle, each when enabled.
pub fn build_pipeline(opts: &ResolvedOptions) -> Result<Vec<Box<dyn Transform>>, ConfigError> {
    let mut out: Vec<Box<dyn Transform>> = Vec::with_capacity(opts.pipeline.len() + 1);
    for item in &opts.pipeline {
        match item {
            PipelineItem::Identifier => {
                if opts.identifiers == IdentifierMode::Obf {
                    out.push(Box::new(IdentifierTransform));
                }
            }
            PipelineItem::StringEncrypt => {
                let cipher = match opts.string_encryption {
                    StringEncryption::Off => continue,
                    StringEncryption::Xor => Cipher::Xor,
                    StringEncryption::Rc4 => Cipher::Rc4,
                };
                let key = opts.key.as_ref().ok_or(ConfigError::MissingKey)?;
                out.push(Box::new(StringEncryptTransform::new(cipher, key)));
            }
            PipelineItem::StringDict => {
                if opts.string_dict > 0 {
                    out.push(Box::new(StringDictTransform::new(opts.string_dict)));
                }
            }
            PipelineItem::NumberEncode => {
                if opts.number_encode {
                    out.push(Box::new(NumberEncodeTransform));
                }
            }
            PipelineItem::FormatJitter => {
                if opts.format == FormatMode::Jitter {
                    out.push(Box::new(FormatJitterTransform));
                }
            }
            PipelineItem::ControlFlow => {
                if opts.cf_opaque {
                    out.push(Box::new(OpaquePredicateTransform));
                }
                if opts.cf_shuffle {
                    out.push(Box::new(BlockShuffleTransform));
                }
            }
            PipelineItem::DeadCode => {
                if opts.dead_code > 0 {
                    out.push(Box::new(DeadCodeTransform::new(opts.dead_code)));
                }
            }
            PipelineItem::Fragment => {}
        }
    }
    Ok(out)
}

/// Applies `pipeline` to `text` in order. The first failure aborts the run.
pub fn run_pipeline(
    text: &str,
    pipeline: &[Box<dyn Transform>],
    ctx: &mut RewriteContext,
) -> Result<String, PipelineError> {
    let mut current = text.to_string();
    for transform in pipeline {
        let before = current.len();
        current = transform
            .apply(&current, ctx)
            .map_err(|source| PipelineError::TransformFailed {
                name: transform.name(),
                source,
            })?;
        debug!(
            transform = transform.name(),
            before,
            after = current.len(),
            "applied transform"
        );
    }
    Ok(current)
}
