use crate::cipher::EncryptionKey;
use crate::encoder::Level;
use crate::pipeline::{self, PipelineItem};
use crate::profile::{self, Profile};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_LEVEL: u8 = 1;
pub const DEFAULT_MIN_FRAGMENT: usize = 10;
pub const DEFAULT_MAX_FRAGMENT: usize = 20;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown pipeline item: {0}")]
    UnknownPipelineItem(String),
    #[error("invalid profile: {0} (light|balanced|heavy)")]
    UnknownProfile(String),
    #[error("invalid fragment profile: {0} (profile=tight|medium|loose)")]
    InvalidFragmentProfile(String),
    #[error("invalid string encryption mode: {0} (off|xor|rc4)")]
    UnknownCipher(String),
    #[error("invalid identifier mode: {0} (keep|obf)")]
    UnknownIdentifierMode(String),
    #[error("invalid format mode: {0} (off|jitter)")]
    UnknownFormatMode(String),
    #[error("string encryption requires a hex key")]
    MissingKey,
    #[error("invalid hex key: {0}")]
    InvalidKey(String),
    #[error("invalid {knob}: {value} (0..100)")]
    PercentOutOfRange { knob: &'static str, value: u8 },
    #[error("unsupported level: {0} (valid 1..5)")]
    UnsupportedLevel(u8),
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StringEncryption {
    #[default]
    Off,
    Xor,
    Rc4,
}

impl FromStr for StringEncryption {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(StringEncryption::Off),
            "xor" => Ok(StringEncryption::Xor),
            "rc4" => Ok(StringEncryption::Rc4),
            _ => Err(ConfigError::UnknownCipher(s.to_string())),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierMode {
    #[default]
    Keep,
    Obf,
}

impl FromStr for IdentifierMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(IdentifierMode::Keep),
            "obf" => Ok(IdentifierMode::Obf),
            _ => Err(ConfigError::UnknownIdentifierMode(s.to_string())),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FormatMode {
    #[default]
    Off,
    Jitter,
}

impl FromStr for FormatMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(FormatMode::Off),
            "jitter" => Ok(FormatMode::Jitter),
            _ => Err(ConfigError::UnknownFormatMode(s.to_string())),
        }
    }
}

/// Level-5 fragment size bounds, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for FragmentBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_FRAGMENT,
            max: DEFAULT_MAX_FRAGMENT,
        }
    }
}

/// Every user-facing knob, as read from a config file or the command line.
///
/// Knobs a profile can default are `Option`s: `None` means "not chosen", which
/// is different from an explicit `off` or `0`.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct Options {
    pub level: Option<u8>,
    pub no_exec: bool,
    /// Comma-separated pipeline items, e.g. `"iden,strenc,numenc"`.
    pub pipeline: Option<String>,
    pub identifiers: Option<IdentifierMode>,
    pub string_dict: Option<u8>,
    pub string_encryption: Option<StringEncryption>,
    /// Hex key for `string-encryption`.
    pub string_key: Option<String>,
    pub number_encode: Option<bool>,
    pub format: Option<FormatMode>,
    pub cf_opaque: Option<bool>,
    pub cf_shuffle: Option<bool>,
    pub dead_code: Option<u8>,
    pub min_fragment: Option<usize>,
    pub max_fragment: Option<usize>,
    /// `profile=tight|medium|loose`.
    pub fragment_profile: Option<String>,
    /// `light|balanced|heavy`.
    pub profile: Option<String>,
    pub seed: Option<u64>,
}

impl Options {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layers `overrides` on top of `self`: any knob set in `overrides` wins.
    pub fn overlay(self, overrides: Options) -> Options {
        Options {
            level: overrides.level.or(self.level),
            no_exec: overrides.no_exec || self.no_exec,
            pipeline: overrides.pipeline.or(self.pipeline),
            identifiers: overrides.identifiers.or(self.identifiers),
            string_dict: overrides.string_dict.or(self.string_dict),
            string_encryption: overrides.string_encryption.or(self.string_encryption),
            string_key: overrides.string_key.or(self.string_key),
            number_encode: overrides.number_encode.or(self.number_encode),
            format: overrides.format.or(self.format),
            cf_opaque: overrides.cf_opaque.or(self.cf_opaque),
            cf_shuffle: overrides.cf_shuffle.or(self.cf_shuffle),
            dead_code: overrides.dead_code.or(self.dead_code),
            min_fragment: overrides.min_fragment.or(self.min_fragment),
            max_fragment: overrides.max_fragment.or(self.max_fragment),
            fragment_profile: overrides.fragment_profile.or(self.fragment_profile),
            profile: overrides.profile.or(self.profile),
            seed: overrides.seed.or(self.seed),
        }
    }

    /// Applies the profile and fragment profile, then validates every knob.
    ///
    /// All configuration errors surface here, before any text is rewritten.
    pub fn resolve(&self) -> Result<ResolvedOptions, ConfigError> {
        let mut opts = self.clone();
        if let Some(name) = self.profile.as_deref() {
            name.parse::<Profile>()?.apply(&mut opts);
        }
        let fragments = profile::resolve_fragments(&opts)?;

        let level_number = opts.level.unwrap_or(DEFAULT_LEVEL);
        let level =
            Level::try_from(level_number).map_err(|_| ConfigError::UnsupportedLevel(level_number))?;

        let string_dict = check_percent("string-dict", opts.string_dict.unwrap_or(0))?;
        let dead_code = check_percent("dead-code", opts.dead_code.unwrap_or(0))?;

        let string_encryption = opts.string_encryption.unwrap_or_default();
        let key = match string_encryption {
            StringEncryption::Off => None,
            StringEncryption::Xor | StringEncryption::Rc4 => {
                let hex = opts.string_key.as_deref().ok_or(ConfigError::MissingKey)?;
                Some(EncryptionKey::from_hex(hex)?)
            }
        };

        let pipeline = match opts.pipeline.as_deref() {
            Some(list) => pipeline::parse_items(list)?,
            None => Vec::new(),
        };

        Ok(ResolvedOptions {
            level,
            no_exec: opts.no_exec,
            pipeline,
            identifiers: opts.identifiers.unwrap_or_default(),
            string_dict,
            string_encryption,
            key,
            number_encode: opts.number_encode.unwrap_or(false),
            format: opts.format.unwrap_or_default(),
            cf_opaque: opts.cf_opaque.unwrap_or(false),
            cf_shuffle: opts.cf_shuffle.unwrap_or(false),
            dead_code,
            fragments,
            seed: opts.seed,
        })
    }
}

fn check_percent(knob: &'static str, value: u8) -> Result<u8, ConfigError> {
    if value > 100 {
        return Err(ConfigError::PercentOutOfRange { knob, value });
    }
    Ok(value)
}

/// Options after profile resolution and validation. Every field is concrete;
/// only the seed stays optional, `None` meaning entropy-seeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub level: Level,
    pub no_exec: bool,
    pub pipeline: Vec<PipelineItem>,
    pub identifiers: IdentifierMode,
    pub string_dict: u8,
    pub string_encryption: StringEncryption,
    /// Present exactly when `string_encryption` is not `Off`.
    pub key: Option<EncryptionKey>,
    pub number_encode: bool,
    pub format: FormatMode,
    pub cf_opaque: bool,
    pub cf_shuffle: bool,
    pub dead_code: u8,
    pub fragments: FragmentBounds,
    pub seed: Option<u64>,
}
