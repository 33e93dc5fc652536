//! Random secrets and the one-way hash used to store them.

use base64::Engine;
use sha2::{Digest, Sha256};

/// Generate a URL-safe random token with 256 bits of entropy.
pub fn generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a uniformly distributed numeric code of `digits` digits (at most 9).
pub fn generate_numeric_code(digits: u32) -> Result<String, getrandom::Error> {
    let modulus = 10u32.pow(digits.min(9));
    // Largest multiple of `modulus` that fits, so `% modulus` stays unbiased.
    let zone = u32::MAX - (u32::MAX % modulus);
    loop {
        let mut buf = [0u8; 4];
        getrandom::fill(&mut buf)?;
        let n = u32::from_le_bytes(buf);
        if n < zone {
            return Ok(format!("{:0width$}", n % modulus, width = digits as usize));
        }
    }
}

/// SHA-256 of a secret, hex encoded. Lookups always go through this.
pub fn hash_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}
