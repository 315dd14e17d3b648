use rand::Rng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use tracing::debug;

const IDENT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Seed stride between consecutive fuzz variants.
const VARIANT_SEED_STRIDE: u64 = 137;

/// Builds the generator for one run.
///
/// `Some(seed)` gives a reproducible stream. `None` draws a fresh seed from the
/// thread-local entropy source; the drawn seed is logged so a surprising run can
/// be replayed with `--seed`.
pub fn init_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => {
            let drawn: u64 = rand::random();
            debug!(seed = drawn, "no seed configured, drew one from entropy");
            ChaCha8Rng::seed_from_u64(drawn)
        }
    }
}

/// Seed for fuzz variant `index`, a pure function of the base seed and index.
pub fn derive_variant_seed(base: u64, index: u64) -> u64 {
    base.wrapping_add(index.wrapping_mul(VARIANT_SEED_STRIDE))
}

/// Random ASCII-letter identifier of length `len` (at least 2).
pub fn random_ident<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let len = len.max(2);
    (0..len)
        .map(|_| IDENT_ALPHABET[rng.random_range(0..IDENT_ALPHABET.len())] as char)
        .collect()
}

/// Returns true with probability `percent / 100`.
pub fn chance<R: Rng + ?Sized>(rng: &mut R, percent: u8) -> bool {
    rng.random_range(0..100u32) < u32::from(percent)
}

/// Shuffles `items` in place.
pub fn permute<T, R: Rng + ?Sized>(rng: &mut R, items: &mut [T]) {
    items.shuffle(rng);
}
