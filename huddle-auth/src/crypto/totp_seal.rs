//! At-rest encryption for TOTP secrets.
//!
//! Secrets are sealed with ChaCha20-Poly1305 under a server-held key, with
//! an AAD binding the ciphertext to its owning user so a row copied between
//! users fails to decrypt.

use anyhow::Result;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

const NONCE_BYTES: usize = 12;

/// Encrypt a TOTP secret. Returns `nonce (12 bytes) || ciphertext`.
pub fn seal_totp_secret(enc_key: &[u8; 32], secret: &[u8], user_id: Uuid) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(enc_key));

    let mut nonce_bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(user_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: secret,
                aad: &aad,
            },
        )
        .map_err(|e| anyhow::anyhow!("Encryption failure: {e}"))?;

    let mut result = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a sealed TOTP secret. Expects `nonce (12 bytes) || ciphertext`.
pub fn open_totp_secret(enc_key: &[u8; 32], data: &[u8], user_id: Uuid) -> Result<Vec<u8>> {
    if data.len() < NONCE_BYTES {
        return Err(anyhow::anyhow!("Invalid ciphertext length"));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_BYTES);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(enc_key));

    let aad = construct_aad(user_id);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|e| anyhow::anyhow!("Decryption failure: {e}"))?;

    Ok(plaintext)
}

fn construct_aad(user_id: Uuid) -> Vec<u8> {
    format!("totp-secret:v1|{user_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; 32];
        let secret = b"JBSWY3DPEHPK3PXP-raw-bytes";
        let user_id = Uuid::new_v4();

        let sealed = seal_totp_secret(&key, secret, user_id).unwrap();
        assert_ne!(&sealed[NONCE_BYTES..], secret.as_slice());

        let opened = open_totp_secret(&key, &sealed, user_id).unwrap();
        assert_eq!(opened, secret);
    }

    #[test]
    fn test_open_fails_for_other_user() {
        let key = [7u8; 32];
        let sealed = seal_totp_secret(&key, b"secret", Uuid::new_v4()).unwrap();
        assert!(open_totp_secret(&key, &sealed, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_open_fails_on_tampered_ciphertext() {
        let key = [7u8; 32];
        let user_id = Uuid::new_v4();
        let mut sealed = seal_totp_secret(&key, b"secret", user_id).unwrap();

        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(open_totp_secret(&key, &sealed, user_id).is_err());
    }

    #[test]
    fn test_open_fails_on_wrong_key() {
        let user_id = Uuid::new_v4();
        let sealed = seal_totp_secret(&[7u8; 32], b"secret", user_id).unwrap();
        assert!(open_totp_secret(&[8u8; 32], &sealed, user_id).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        assert!(open_totp_secret(&[7u8; 32], &[0u8; 4], Uuid::new_v4()).is_err());
    }
}
