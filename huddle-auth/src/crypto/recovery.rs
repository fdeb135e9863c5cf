//! Recovery code generation and verification.
//!
//! Codes substitute for a TOTP code when the authenticator device is gone.
//! Hashes are Argon2id with a server-side pepper, so a leaked database alone
//! is not enough to forge one.

use anyhow::{Context, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, RngCore};

/// Number of codes issued per batch. Regenerating a batch invalidates every
/// prior code for the user.
pub const RECOVERY_CODE_COUNT: usize = 10;

const RECOVERY_CODE_LEN: usize = 12;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;
// No 0/O/1/I to keep hand-typed codes unambiguous.
const RECOVERY_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated recovery-code batch (plaintext + hashes).
///
/// The plaintext codes are returned to the user exactly once; only the
/// hashes are retained.
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    pub fn generate(pepper: &[u8]) -> Result<Self> {
        let mut rng = OsRng;
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code(&mut rng)?;
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize user input: strip separators, uppercase, check the alphabet.
pub fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }

    if !normalized
        .as_bytes()
        .iter()
        .all(|ch| RECOVERY_CODE_ALPHABET.contains(ch))
    {
        return Err(anyhow::anyhow!("invalid recovery code characters"));
    }

    Ok(normalized)
}

/// Verify a recovery code against a stored peppered hash.
pub fn verify_recovery_code(code: &str, stored_hash: &str, pepper: &[u8]) -> Result<bool> {
    let normalized = normalize_recovery_code(code)?;
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|_| anyhow::anyhow!("invalid recovery code hash"))?;
    Ok(peppered_argon2(pepper)?
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok())
}

fn format_recovery_code(normalized: &str) -> Result<String> {
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 2);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN];
    rng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        let idx = usize::from(byte) % RECOVERY_CODE_ALPHABET.len();
        normalized.push(RECOVERY_CODE_ALPHABET[idx] as char);
    }
    format_recovery_code(&normalized)
}

fn hash_recovery_code(code: &str, pepper: &[u8]) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = peppered_argon2(pepper)?
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow::anyhow!("failed to initialize Argon2id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_has_fixed_count_of_formatted_codes() {
        let batch = RecoveryCodeBatch::generate(b"pepper").unwrap();
        assert_eq!(batch.codes.len(), RECOVERY_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), RECOVERY_CODE_COUNT);
        for code in &batch.codes {
            assert_eq!(code.len(), RECOVERY_CODE_LEN + 2);
            assert_eq!(code.matches('-').count(), 2);
        }
    }

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        let normalized = normalize_recovery_code("abcd-efgh-jklm").unwrap();
        assert_eq!(normalized, "ABCDEFGHJKLM");
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert!(normalize_recovery_code("too-short").is_err());
        assert!(normalize_recovery_code("ABCD-EFGH-JKL0").is_err()); // 0 not in alphabet
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let pepper = b"pepper";
        let batch = RecoveryCodeBatch::generate(pepper).unwrap();
        let code = &batch.codes[0];
        let hash = &batch.code_hashes[0];
        assert!(verify_recovery_code(code, hash, pepper).unwrap());
        assert!(!verify_recovery_code("ABCD-EFGH-9999", hash, pepper).unwrap());
    }

    #[test]
    fn verify_fails_with_wrong_pepper() {
        let batch = RecoveryCodeBatch::generate(b"pepper").unwrap();
        let code = &batch.codes[0];
        let hash = &batch.code_hashes[0];
        assert!(!verify_recovery_code(code, hash, b"other-pepper").unwrap());
    }
}
