//! Final level encoding.
//!
//! The last step of every run. Each level wraps the (possibly rewritten) script
//! in a self-decoding expression; `no_exec` drops the `Invoke-Expression` tail
//! and emits only the payload.

use crate::config::FragmentBounds;
use crate::scanner::quote_single;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

/// Level-5 fragments are never shorter than this, except the last one.
pub const MIN_FRAGMENT_FLOOR: usize = 4;
/// Added to `min` when the configured maximum is below the minimum.
const FALLBACK_SPREAD: usize = 6;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("unsupported level: {0} (valid 1..5)")]
    UnsupportedLevel(u8),
    #[error("gzip compression failed: {0}")]
    Compression(#[from] io::Error),
}

/// The mutually exclusive output strategies, numbered 1 to 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    /// `[char[]]` code point array joined back into a string.
    #[default]
    CharJoin,
    /// Base64 decoded inline.
    Base64,
    /// Base64 decoded through an intermediate byte variable.
    Base64Alt,
    /// Gzip then base64, decoded through a `GzipStream`.
    GzipBase64,
    /// Single-quoted fragments joined at run time.
    Fragments,
}

impl Level {
    pub fn number(self) -> u8 {
        match self {
            Level::CharJoin => 1,
            Level::Base64 => 2,
            Level::Base64Alt => 3,
            Level::GzipBase64 => 4,
            Level::Fragments => 5,
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = EncodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Level::CharJoin),
            2 => Ok(Level::Base64),
            3 => Ok(Level::Base64Alt),
            4 => Ok(Level::GzipBase64),
            5 => Ok(Level::Fragments),
            other => Err(EncodeError::UnsupportedLevel(other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

pub fn encode_final(
    text: &str,
    level: Level,
    no_exec: bool,
    bounds: FragmentBounds,
) -> Result<String, EncodeError> {
    let out = match level {
        Level::CharJoin => {
            let payload = char_join(text);
            if no_exec {
                payload
            } else {
                format!("$obfuscated = {payload}; Invoke-Expression $obfuscated")
            }
        }
        Level::Base64 => {
            let payload = STANDARD.encode(text.as_bytes());
            if no_exec {
                payload
            } else {
                format!(
                    "$obfuscated = [Text.Encoding]::UTF8.GetString([Convert]::FromBase64String('{payload}')); \
                     Invoke-Expression $obfuscated"
                )
            }
        }
        Level::Base64Alt => {
            let payload = STANDARD.encode(text.as_bytes());
            if no_exec {
                payload
            } else {
                format!(
                    "$e = [Convert]::FromBase64String('{payload}'); \
                     $obfuscated = [Text.Encoding]::UTF8.GetString($e); Invoke-Expression $obfuscated"
                )
            }
        }
        Level::GzipBase64 => {
            let payload = gzip_base64(text)?;
            if no_exec {
                payload
            } else {
                format!(
                    "$compressed = '{payload}'; $bytes = [Convert]::FromBase64String($compressed); \
                     $ms = New-Object IO.MemoryStream(,$bytes); \
                     $gz = New-Object IO.Compression.GzipStream($ms,[IO.Compression.CompressionMode]::Decompress); \
                     $sr = New-Object IO.StreamReader($gz); $obfuscated = $sr.ReadToEnd(); \
                     Invoke-Expression $obfuscated"
                )
            }
        }
        Level::Fragments => {
            let quoted: Vec<String> = fragment(text, bounds)
                .iter()
                .map(|f| quote_single(f))
                .collect();
            let array = format!("@({})", quoted.join(","));
            if no_exec {
                array
            } else {
                format!("$fragments = {array}; $script = $fragments -join ''; Invoke-Expression $script")
            }
        }
    };
    Ok(out)
}

/// `$([char[]](72,105) -join '')` for `"Hi"`. Code points above the BMP do
/// not survive the round trip through `[char]`.
fn char_join(text: &str) -> String {
    let codes: Vec<String> = text.chars().map(|c| u32::from(c).to_string()).collect();
    format!("$([char[]]({}) -join '')", codes.join(","))
}

fn gzip_base64(text: &str) -> Result<String, io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// Splits `text` into character-counted fragments for level 5.
///
/// The size of each fragment depends only on how many characters remain, so a
/// given text and bounds always produce the same split.
pub fn fragment(text: &str, bounds: FragmentBounds) -> Vec<String> {
    let min = bounds.min.max(MIN_FRAGMENT_FLOOR);
    let max = if bounds.max < min {
        min.saturating_add(FALLBACK_SPREAD)
    } else {
        bounds.max
    };

    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::with_capacity(chars.len() / min + 1);
    let mut i = 0;
    while i < chars.len() {
        let remaining = chars.len() - i;
        let size = min.saturating_add(remaining % (max - min).saturating_add(1));
        let end = i.saturating_add(size).min(chars.len());
        out.push(chars[i..end].iter().collect());
        i = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner;
    use flate2::read::GzDecoder;
    use std::io::Read;

    const SCRIPT: &str = "function Get-It { param($n) \"It's $n\" }\r\nGet-It 'día' # ünïcode";

    fn bounds(min: usize, max: usize) -> FragmentBounds {
        FragmentBounds { min, max }
    }

    fn single_quoted_payload(out: &str) -> &str {
        let start = out.find('\'').unwrap() + 1;
        let end = start + out[start..].find('\'').unwrap();
        &out[start..end]
    }

    #[test]
    fn level_numbers_round_trip_and_reject_out_of_range() {
        for n in 1..=5u8 {
            assert_eq!(Level::try_from(n).unwrap().number(), n);
        }
        for n in [0u8, 6, 255] {
            let err = Level::try_from(n).unwrap_err();
            assert!(matches!(err, EncodeError::UnsupportedLevel(v) if v == n));
            assert!(err.to_string().starts_with("unsupported level"));
        }
    }

    #[test]
    fn level_two_matches_golden_payload() {
        let out = encode_final("Write-Output \"hi\"", Level::Base64, false, FragmentBounds::default())
            .unwrap();
        assert_eq!(
            out,
            "$obfuscated = [Text.Encoding]::UTF8.GetString([Convert]::FromBase64String('V3JpdGUtT3V0cHV0ICJoaSI=')); Invoke-Expression $obfuscated"
        );
    }

    #[test]
    fn level_one_code_points_rebuild_the_text() {
        let out = encode_final(SCRIPT, Level::CharJoin, true, FragmentBounds::default()).unwrap();
        let inner = out
            .strip_prefix("$([char[]](")
            .and_then(|s| s.strip_suffix(") -join '')"))
            .unwrap();
        let rebuilt: String = inner
            .split(',')
            .map(|n| char::from_u32(n.parse().unwrap()).unwrap())
            .collect();
        assert_eq!(rebuilt, SCRIPT);

        let wrapped = encode_final("Hi", Level::CharJoin, false, FragmentBounds::default()).unwrap();
        assert_eq!(wrapped, "$obfuscated = $([char[]](72,105) -join ''); Invoke-Expression $obfuscated");
    }

    #[test]
    fn base64_levels_decode_to_the_text() {
        for level in [Level::Base64, Level::Base64Alt] {
            let out = encode_final(SCRIPT, level, false, FragmentBounds::default()).unwrap();
            let decoded = STANDARD.decode(single_quoted_payload(&out)).unwrap();
            assert_eq!(String::from_utf8(decoded).unwrap(), SCRIPT);
            let bare = encode_final(SCRIPT, level, true, FragmentBounds::default()).unwrap();
            assert_eq!(bare, STANDARD.encode(SCRIPT));
        }
        let alt = encode_final("x", Level::Base64Alt, false, FragmentBounds::default()).unwrap();
        assert!(alt.starts_with("$e = [Convert]::FromBase64String('eA=='); "));
    }

    #[test]
    fn gzip_level_decompresses_to_the_text() {
        let out = encode_final(SCRIPT, Level::GzipBase64, false, FragmentBounds::default()).unwrap();
        assert!(out.starts_with("$compressed = '"));
        assert!(out.ends_with("Invoke-Expression $obfuscated"));
        let compressed = STANDARD.decode(single_quoted_payload(&out)).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, SCRIPT);
    }

    #[test]
    fn fragments_rejoin_to_the_text() {
        let out = encode_final(SCRIPT, Level::Fragments, true, bounds(6, 10)).unwrap();
        assert!(out.starts_with("@('") && out.ends_with("')"));
        let array = &out[2..out.len() - 1];
        let rebuilt: String = scanner::literal_spans(array)
            .iter()
            .map(|s| s.value(array))
            .collect();
        assert_eq!(rebuilt, SCRIPT);

        let wrapped = encode_final("abcd", Level::Fragments, false, bounds(4, 4)).unwrap();
        assert_eq!(
            wrapped,
            "$fragments = @('abcd'); $script = $fragments -join ''; Invoke-Expression $script"
        );
    }

    #[test]
    fn fragment_sizes_respect_the_floor_and_bounds() {
        let text = "x".repeat(503);
        for (min, max) in [(0, 0), (1, 3), (6, 10), (10, 20), (14, 28), (9, 2)] {
            let frags = fragment(&text, bounds(min, max));
            assert_eq!(frags.concat(), text);
            let floor = min.max(MIN_FRAGMENT_FLOOR);
            let ceiling = if max < floor { floor + FALLBACK_SPREAD } else { max };
            for f in &frags[..frags.len() - 1] {
                assert!((floor..=ceiling).contains(&f.len()), "{min}-{max}: {}", f.len());
            }
        }
    }

    #[test]
    fn huge_bounds_yield_a_single_fragment() {
        let text = "Write-Output 1";
        for (min, max) in [
            (usize::MAX, 20),
            (usize::MAX, usize::MAX),
            (4, usize::MAX),
            (usize::MAX - 3, 0),
        ] {
            assert_eq!(fragment(text, bounds(min, max)), vec![text], "{min}-{max}");
        }
        assert_eq!(
            encode_final("Write-Output 1", Level::Fragments, true, bounds(usize::MAX, 20)).unwrap(),
            "@('Write-Output 1')"
        );
    }

    #[test]
    fn fragment_split_is_deterministic_and_char_based() {
        let text = "ääääääääääääääääääää";
        let a = fragment(text, bounds(4, 8));
        assert_eq!(a, fragment(text, bounds(4, 8)));
        assert!(a.iter().all(|f| f.chars().all(|c| c == 'ä')));
    }

    #[test]
    fn empty_text_encodes_at_every_level() {
        for n in 1..=5u8 {
            let level = Level::try_from(n).unwrap();
            assert!(encode_final("", level, false, FragmentBounds::default()).is_ok());
        }
    }
}
