//! Named presets.
//!
//! A profile only fills knobs the user left unset; it never overrides an
//! explicit choice, including an explicit `off` or `0`.

use crate::config::{
    ConfigError, FormatMode, FragmentBounds, IdentifierMode, Options, StringEncryption,
    DEFAULT_MAX_FRAGMENT, DEFAULT_MIN_FRAGMENT,
};
use std::str::FromStr;

const LIGHT_PIPELINE: &str = "iden,stringdict,numenc,frag";
const FULL_PIPELINE: &str = "iden,strenc,stringdict,numenc,fmt,cf,dead,frag";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Light,
    Balanced,
    Heavy,
}

impl FromStr for Profile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Profile::Light),
            "balanced" => Ok(Profile::Balanced),
            "heavy" => Ok(Profile::Heavy),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

/// Values a profile supplies for unset knobs.
struct Preset {
    pipeline: &'static str,
    seed: u64,
    fragments: FragmentProfile,
    cipher: Option<(StringEncryption, &'static str)>,
    string_dict: Option<u8>,
    dead_code: Option<u8>,
    jitter: bool,
    cf_opaque: bool,
    cf_shuffle: bool,
}

impl Profile {
    fn preset(self) -> Preset {
        match self {
            Profile::Light => Preset {
                pipeline: LIGHT_PIPELINE,
                seed: 1337,
                fragments: FragmentProfile::Tight,
                cipher: None,
                string_dict: None,
                dead_code: None,
                jitter: false,
                cf_opaque: false,
                cf_shuffle: false,
            },
            Profile::Balanced => Preset {
                pipeline: FULL_PIPELINE,
                seed: 424242,
                fragments: FragmentProfile::Medium,
                cipher: Some((StringEncryption::Xor, "a1b2c3d4")),
                string_dict: Some(30),
                dead_code: Some(10),
                jitter: true,
                cf_opaque: true,
                cf_shuffle: false,
            },
            Profile::Heavy => Preset {
                pipeline: FULL_PIPELINE,
                seed: 987654321,
                fragments: FragmentProfile::Loose,
                cipher: Some((StringEncryption::Rc4, "00112233445566778899aabbccddeeff")),
                string_dict: Some(50),
                dead_code: Some(25),
                jitter: true,
                cf_opaque: true,
                cf_shuffle: true,
            },
        }
    }

    /// Fills every unset knob of `opts` that this profile has an opinion on.
    pub fn apply(self, opts: &mut Options) {
        let preset = self.preset();
        opts.pipeline.get_or_insert_with(|| preset.pipeline.to_string());
        opts.seed.get_or_insert(preset.seed);
        opts.fragment_profile
            .get_or_insert_with(|| preset.fragments.as_str().to_string());
        opts.identifiers.get_or_insert(IdentifierMode::Obf);
        opts.number_encode.get_or_insert(true);

        if let Some((cipher, key)) = preset.cipher {
            // Preset key only accompanies the preset cipher.
            if opts.string_encryption.is_none() {
                opts.string_encryption = Some(cipher);
                opts.string_key.get_or_insert_with(|| key.to_string());
            }
        }
        if let Some(percent) = preset.string_dict {
            opts.string_dict.get_or_insert(percent);
        }
        if let Some(percent) = preset.dead_code {
            opts.dead_code.get_or_insert(percent);
        }
        if preset.jitter {
            opts.format.get_or_insert(FormatMode::Jitter);
        }
        if preset.cf_opaque {
            opts.cf_opaque.get_or_insert(true);
        }
        if preset.cf_shuffle {
            opts.cf_shuffle.get_or_insert(true);
        }
    }
}

/// Level-5 fragment sizing presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentProfile {
    Tight,
    Medium,
    Loose,
}

impl FragmentProfile {
    pub fn bounds(self) -> FragmentBounds {
        match self {
            FragmentProfile::Tight => FragmentBounds { min: 6, max: 10 },
            FragmentProfile::Medium => FragmentBounds { min: 10, max: 18 },
            FragmentProfile::Loose => FragmentBounds { min: 14, max: 28 },
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FragmentProfile::Tight => "profile=tight",
            FragmentProfile::Medium => "profile=medium",
            FragmentProfile::Loose => "profile=loose",
        }
    }
}

impl FromStr for FragmentProfile {
    type Err = ConfigError;

    /// Accepts `profile=<name>` or the bare name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = match s.trim().split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("profile") => value,
            Some(_) => return Err(ConfigError::InvalidFragmentProfile(s.to_string())),
            None => s,
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "tight" => Ok(FragmentProfile::Tight),
            "medium" => Ok(FragmentProfile::Medium),
            "loose" => Ok(FragmentProfile::Loose),
            _ => Err(ConfigError::InvalidFragmentProfile(s.to_string())),
        }
    }
}

/// Level-5 bounds for `opts`. A fragment profile is still validated when
/// explicit bounds win, so a typo never goes unnoticed.
pub fn resolve_fragments(opts: &Options) -> Result<FragmentBounds, ConfigError> {
    let preset = opts
        .fragment_profile
        .as_deref()
        .map(str::parse::<FragmentProfile>)
        .transpose()?;

    match (preset, opts.min_fragment, opts.max_fragment) {
        (Some(profile), None, None) => Ok(profile.bounds()),
        (_, min, max) => Ok(FragmentBounds {
            min: min.unwrap_or(DEFAULT_MIN_FRAGMENT),
            max: max.unwrap_or(DEFAULT_MAX_FRAGMENT),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineItem;

    fn with_profile(name: &str) -> Options {
        Options {
            profile: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn profile_names_are_case_insensitive() {
        assert_eq!("Heavy".parse::<Profile>().unwrap(), Profile::Heavy);
        assert!(matches!(
            "extreme".parse::<Profile>(),
            Err(ConfigError::UnknownProfile(name)) if name == "extreme"
        ));
    }

    #[test]
    fn light_profile_defaults() {
        let r = with_profile("light").resolve().unwrap();
        assert_eq!(r.seed, Some(1337));
        assert_eq!(r.fragments, FragmentBounds { min: 6, max: 10 });
        assert_eq!(
            r.pipeline,
            vec![
                PipelineItem::Identifier,
                PipelineItem::StringDict,
                PipelineItem::NumberEncode,
                PipelineItem::Fragment,
            ]
        );
        assert_eq!(r.string_encryption, StringEncryption::Off);
        assert_eq!(r.string_dict, 0);
        assert_eq!(r.identifiers, IdentifierMode::Obf);
        assert!(r.number_encode);
    }

    #[test]
    fn balanced_profile_defaults() {
        let r = with_profile("balanced").resolve().unwrap();
        assert_eq!(r.seed, Some(424242));
        assert_eq!(r.fragments, FragmentBounds { min: 10, max: 18 });
        assert_eq!(r.string_encryption, StringEncryption::Xor);
        assert_eq!(r.key.unwrap().to_hex_upper(), "A1B2C3D4");
        assert_eq!(r.string_dict, 30);
        assert_eq!(r.dead_code, 10);
        assert_eq!(r.format, FormatMode::Jitter);
        assert!(r.cf_opaque && !r.cf_shuffle);
        assert_eq!(r.pipeline.len(), 8);
    }

    #[test]
    fn heavy_profile_defaults() {
        let r = with_profile("heavy").resolve().unwrap();
        assert_eq!(r.seed, Some(987654321));
        assert_eq!(r.fragments, FragmentBounds { min: 14, max: 28 });
        assert_eq!(r.string_encryption, StringEncryption::Rc4);
        assert_eq!(r.key.unwrap().as_bytes().len(), 16);
        assert_eq!(r.string_dict, 50);
        assert_eq!(r.dead_code, 25);
        assert!(r.cf_opaque && r.cf_shuffle);
    }

    #[test]
    fn explicit_settings_win_over_the_profile() {
        let opts = Options {
            profile: Some("heavy".to_string()),
            pipeline: Some("numenc".to_string()),
            seed: Some(5),
            string_encryption: Some(StringEncryption::Off),
            string_dict: Some(0),
            dead_code: Some(0),
            cf_shuffle: Some(false),
            ..Default::default()
        };
        let r = opts.resolve().unwrap();
        assert_eq!(r.pipeline, vec![PipelineItem::NumberEncode]);
        assert_eq!(r.seed, Some(5));
        assert_eq!(r.string_encryption, StringEncryption::Off);
        assert_eq!(r.key, None);
        assert_eq!(r.string_dict, 0);
        assert_eq!(r.dead_code, 0);
        assert!(!r.cf_shuffle);
    }

    #[test]
    fn preset_key_only_follows_the_preset_cipher() {
        let opts = Options {
            profile: Some("balanced".to_string()),
            string_encryption: Some(StringEncryption::Rc4),
            ..Default::default()
        };
        assert!(matches!(opts.resolve(), Err(ConfigError::MissingKey)));

        let opts = Options {
            profile: Some("balanced".to_string()),
            string_key: Some("ff".to_string()),
            ..Default::default()
        };
        assert_eq!(opts.resolve().unwrap().key.unwrap().as_bytes(), &[0xFF]);
    }

    #[test]
    fn fragment_profile_parsing() {
        assert_eq!(
            "profile=tight".parse::<FragmentProfile>().unwrap(),
            FragmentProfile::Tight
        );
        assert_eq!("LOOSE".parse::<FragmentProfile>().unwrap(), FragmentProfile::Loose);
        for bad in ["profile=huge", "size=tight", ""] {
            assert!(matches!(
                bad.parse::<FragmentProfile>(),
                Err(ConfigError::InvalidFragmentProfile(_))
            ));
        }
    }

    #[test]
    fn explicit_bounds_suppress_the_fragment_profile() {
        let mut opts = Options {
            fragment_profile: Some("profile=medium".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_fragments(&opts).unwrap(),
            FragmentBounds { min: 10, max: 18 }
        );

        opts.max_fragment = Some(40);
        assert_eq!(
            resolve_fragments(&opts).unwrap(),
            FragmentBounds { min: 10, max: 40 }
        );

        opts.fragment_profile = Some("profile=bogus".to_string());
        assert!(resolve_fragments(&opts).is_err());
    }
}
