// Hashing and random secrets

use anyhow::Result;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

const PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// SHA-256 hex digest (lowercase).
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Uniform value in `0..bound` from `rng`, by rejection sampling a single byte.
fn uniform_below(rng: &SystemRandom, bound: u8) -> Result<u8> {
    // Largest multiple of `bound` that fits in a byte; bytes at or above it would bias the result.
    let zone = 256 - (256 % u16::from(bound));
    loop {
        let mut byte = [0u8; 1];
        rng.fill(&mut byte)
            .map_err(|_| anyhow::anyhow!("Failed to generate random bytes"))?;
        if u16::from(byte[0]) < zone {
            return Ok(byte[0] % bound);
        }
    }
}

/// Random alphanumeric password with a length drawn uniformly from `min_len..=max_len`.
pub fn generate_password(min_len: usize, max_len: usize) -> Result<String> {
    anyhow::ensure!(
        min_len > 0 && min_len <= max_len && max_len - min_len < 255,
        "Invalid password length range {}..={}",
        min_len,
        max_len
    );
    let rng = SystemRandom::new();
    let span = (max_len - min_len + 1) as u8;
    let len = min_len + usize::from(uniform_below(&rng, span)?);

    (0..len)
        .map(|_| {
            uniform_below(&rng, PASSWORD_ALPHABET.len() as u8)
                .map(|i| char::from(PASSWORD_ALPHABET[usize::from(i)]))
        })
        .collect()
}
