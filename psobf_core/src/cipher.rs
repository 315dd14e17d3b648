//! Byte-level ciphers behind the string encryption transform.
//!
//! These exist to keep literals out of plain sight, not to keep them secret: the
//! key travels inside the rewritten script.

use crate::config::ConfigError;
use std::str::FromStr;

/// Non-empty key bytes, parsed from hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey(Vec<u8>);

impl EncryptionKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        if bytes.is_empty() {
            return Err(ConfigError::MissingKey);
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(digits: &str) -> Result<Self, ConfigError> {
        let digits = digits.trim();
        if digits.is_empty() {
            return Err(ConfigError::MissingKey);
        }
        let bytes = hex::decode(digits).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Uppercase hex, as embedded in decode expressions.
    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl FromStr for EncryptionKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Repeating-key XOR. Applying it twice with the same key is the identity.
pub fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}

/// RC4 with a freshly scheduled state. Encryption and decryption are the same
/// operation.
pub fn rc4(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }

    let mut i: u8 = 0;
    let mut j: u8 = 0;
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(s[i as usize]);
            s.swap(i as usize, j as usize);
            let k = s[s[i as usize].wrapping_add(s[j as usize]) as usize];
            byte ^ k
        })
        .collect()
}
