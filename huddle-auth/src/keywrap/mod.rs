//! Org-key wrapping: the client side of key distribution.
//!
//! Every device holds an X25519 keypair; only the public half is registered
//! server-side. An org key is wrapped for one member by key agreement
//! between a fresh ephemeral keypair and the member's registered public key,
//! a keyed BLAKE2b derivation of the wrapping key from the shared secret,
//! and ChaCha20-Poly1305 over the org key itself. The server stores the
//! resulting envelope verbatim and is never a participant in the agreement.
//!
//! Everything in this module runs client-side (and in tests); nothing here
//! touches the store.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

/// Org key length (32 bytes).
pub const ORG_KEY_BYTES: usize = 32;

/// X25519 public key length (32 bytes).
pub const PUBLIC_KEY_BYTES: usize = 32;

const NONCE_BYTES: usize = 12;
const ALG_V1: &str = "x25519-chacha20poly1305";

#[derive(Debug, Error)]
pub enum KeyWrapError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("malformed key envelope: {0}")]
    InvalidEnvelope(String),

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("unsupported wrap algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("wrapping failed")]
    WrapFailed,

    #[error("unwrapping failed")]
    UnwrapFailed,
}

/// A device keypair used only for key agreement, distinct from any session
/// credential.
pub struct DeviceKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DeviceKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a keypair from its 32 secret bytes (device-local storage).
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The only half that is ever sent to the server.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }
}

/// Generate a fresh random org key.
pub fn generate_org_key() -> Zeroizing<[u8; ORG_KEY_BYTES]> {
    let mut key = [0u8; ORG_KEY_BYTES];
    OsRng.fill_bytes(&mut key);
    Zeroizing::new(key)
}

/// Decode a base64 X25519 public key as registered with the server.
pub fn decode_public_key(b64: &str) -> Result<PublicKey, KeyWrapError> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| KeyWrapError::InvalidEnvelope(format!("bad public key encoding: {e}")))?;
    let arr: [u8; PUBLIC_KEY_BYTES] =
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| KeyWrapError::InvalidKeyLength {
                expected: PUBLIC_KEY_BYTES,
                actual: v.len(),
            })?;
    Ok(PublicKey::from(arr))
}

/// Binding context for a wrap. The AAD ties a blob to its (org, member,
/// version) slot so a ciphertext copied to another row fails to open.
#[derive(Debug, Clone, Copy)]
pub struct WrapContext {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub key_version: i64,
}

impl WrapContext {
    fn aad(&self) -> Vec<u8> {
        format!(
            "org-key:v1|{}|{}|{}",
            self.org_id, self.user_id, self.key_version
        )
        .into_bytes()
    }
}

/// Wrapped-key envelope, tagged and versioned so future algorithms can
/// coexist with existing blobs during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyWrapEnvelope {
    V1 {
        /// Sender's ephemeral public key.
        epk: [u8; PUBLIC_KEY_BYTES],
        nonce: [u8; NONCE_BYTES],
        ct: Vec<u8>,
    },
}

/// Wire shape of an envelope: `{ v, alg, epk, nonce, ct }`, all byte fields
/// base64.
#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    v: u32,
    alg: String,
    epk: String,
    nonce: String,
    ct: String,
}

impl KeyWrapEnvelope {
    pub fn encode(&self) -> String {
        match self {
            KeyWrapEnvelope::V1 { epk, nonce, ct } => {
                let raw = RawEnvelope {
                    v: 1,
                    alg: ALG_V1.to_string(),
                    epk: BASE64.encode(epk),
                    nonce: BASE64.encode(nonce),
                    ct: BASE64.encode(ct),
                };
                // RawEnvelope has no map keys or non-string values that can fail
                serde_json::to_string(&raw).expect("envelope serialization is infallible")
            }
        }
    }

    pub fn decode(blob: &str) -> Result<Self, KeyWrapError> {
        let raw: RawEnvelope = serde_json::from_str(blob)
            .map_err(|e| KeyWrapError::InvalidEnvelope(e.to_string()))?;

        match raw.v {
            1 => {
                if raw.alg != ALG_V1 {
                    return Err(KeyWrapError::UnsupportedAlgorithm(raw.alg));
                }
                let epk = decode_fixed::<PUBLIC_KEY_BYTES>(&raw.epk)?;
                let nonce = decode_fixed::<NONCE_BYTES>(&raw.nonce)?;
                let ct = BASE64
                    .decode(&raw.ct)
                    .map_err(|e| KeyWrapError::InvalidEnvelope(e.to_string()))?;
                Ok(KeyWrapEnvelope::V1 { epk, nonce, ct })
            }
            other => Err(KeyWrapError::UnsupportedVersion(other)),
        }
    }
}

fn decode_fixed<const N: usize>(b64: &str) -> Result<[u8; N], KeyWrapError> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| KeyWrapError::InvalidEnvelope(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| KeyWrapError::InvalidKeyLength {
            expected: N,
            actual: v.len(),
        })
}

/// Wrap an org key for one member.
///
/// Performed by the publishing client: ephemeral X25519 agreement against
/// the member's registered public key, then AEAD over the org key.
pub fn wrap_org_key(
    org_key: &[u8; ORG_KEY_BYTES],
    recipient: &PublicKey,
    ctx: &WrapContext,
) -> Result<KeyWrapEnvelope, KeyWrapError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let epk = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let wrap_key = derive_wrap_key(&shared, &epk, recipient);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_key.as_ref()));

    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);

    let ct = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: org_key,
                aad: &ctx.aad(),
            },
        )
        .map_err(|_| KeyWrapError::WrapFailed)?;

    Ok(KeyWrapEnvelope::V1 {
        epk: *epk.as_bytes(),
        nonce,
        ct,
    })
}

/// Unwrap an org key with the member's device keypair.
///
/// Re-derives the same wrapping key from the sender's ephemeral public key
/// (embedded in the envelope) and the member's private key. Any tampering
/// with the blob fails authentication rather than returning wrong bytes.
pub fn unwrap_org_key(
    envelope: &KeyWrapEnvelope,
    device: &DeviceKeyPair,
    ctx: &WrapContext,
) -> Result<Zeroizing<[u8; ORG_KEY_BYTES]>, KeyWrapError> {
    let KeyWrapEnvelope::V1 { epk, nonce, ct } = envelope;

    let sender_public = PublicKey::from(*epk);
    let shared = device.secret.diffie_hellman(&sender_public);

    let wrap_key = derive_wrap_key(&shared, &sender_public, &device.public);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(wrap_key.as_ref()));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ct.as_slice(),
                aad: &ctx.aad(),
            },
        )
        .map_err(|_| KeyWrapError::UnwrapFailed)?;

    let arr: [u8; ORG_KEY_BYTES] =
        plaintext
            .try_into()
            .map_err(|v: Vec<u8>| KeyWrapError::InvalidKeyLength {
                expected: ORG_KEY_BYTES,
                actual: v.len(),
            })?;
    Ok(Zeroizing::new(arr))
}

/// Derive the symmetric wrapping key from the shared secret.
///
/// Keyed BLAKE2b over both public halves, domain-separated by the personal
/// string, so the key binds the exact pair of keys that agreed on it.
fn derive_wrap_key(
    shared: &SharedSecret,
    epk: &PublicKey,
    recipient: &PublicKey,
) -> Zeroizing<[u8; 32]> {
    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .key(shared.as_bytes())
        .personal(b"huddle.orgwrap")
        .to_state()
        .update(epk.as_bytes())
        .update(recipient.as_bytes())
        .finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_bytes());
    Zeroizing::new(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx() -> WrapContext {
        WrapContext {
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            key_version: 1,
        }
    }

    #[test]
    fn wrap_unwrap_round_trip() {
        let device = DeviceKeyPair::generate();
        let org_key = generate_org_key();
        let ctx = test_ctx();

        let envelope = wrap_org_key(&org_key, device.public_key(), &ctx).unwrap();
        let unwrapped = unwrap_org_key(&envelope, &device, &ctx).unwrap();

        assert_eq!(unwrapped.as_ref(), org_key.as_ref());
    }

    #[test]
    fn round_trip_survives_wire_encoding() {
        let device = DeviceKeyPair::generate();
        let org_key = generate_org_key();
        let ctx = test_ctx();

        let blob = wrap_org_key(&org_key, device.public_key(), &ctx)
            .unwrap()
            .encode();
        let envelope = KeyWrapEnvelope::decode(&blob).unwrap();
        let unwrapped = unwrap_org_key(&envelope, &device, &ctx).unwrap();

        assert_eq!(unwrapped.as_ref(), org_key.as_ref());
    }

    #[test]
    fn wrong_device_cannot_unwrap() {
        let device = DeviceKeyPair::generate();
        let other_device = DeviceKeyPair::generate();
        let org_key = generate_org_key();
        let ctx = test_ctx();

        let envelope = wrap_org_key(&org_key, device.public_key(), &ctx).unwrap();
        assert!(matches!(
            unwrap_org_key(&envelope, &other_device, &ctx),
            Err(KeyWrapError::UnwrapFailed)
        ));
    }

    #[test]
    fn tampering_any_ciphertext_byte_fails_unwrap() {
        let device = DeviceKeyPair::generate();
        let org_key = generate_org_key();
        let ctx = test_ctx();

        let envelope = wrap_org_key(&org_key, device.public_key(), &ctx).unwrap();
        let KeyWrapEnvelope::V1 { epk, nonce, ct } = envelope;

        for i in 0..ct.len() {
            let mut tampered = ct.clone();
            tampered[i] ^= 0x01;
            let bad = KeyWrapEnvelope::V1 {
                epk,
                nonce,
                ct: tampered,
            };
            assert!(
                unwrap_org_key(&bad, &device, &ctx).is_err(),
                "flipping ciphertext byte {} must not go unnoticed",
                i
            );
        }
    }

    #[test]
    fn context_mismatch_fails_unwrap() {
        let device = DeviceKeyPair::generate();
        let org_key = generate_org_key();
        let ctx = test_ctx();

        let envelope = wrap_org_key(&org_key, device.public_key(), &ctx).unwrap();

        let wrong_version = WrapContext {
            key_version: ctx.key_version + 1,
            ..ctx
        };
        assert!(unwrap_org_key(&envelope, &device, &wrong_version).is_err());

        let wrong_member = WrapContext {
            user_id: Uuid::new_v4(),
            ..ctx
        };
        assert!(unwrap_org_key(&envelope, &device, &wrong_member).is_err());
    }

    #[test]
    fn unknown_envelope_version_is_rejected() {
        let blob = r#"{"v":9,"alg":"x25519-chacha20poly1305","epk":"","nonce":"","ct":""}"#;
        assert!(matches!(
            KeyWrapEnvelope::decode(blob),
            Err(KeyWrapError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let device = DeviceKeyPair::generate();
        let ctx = test_ctx();
        let blob = wrap_org_key(&generate_org_key(), device.public_key(), &ctx)
            .unwrap()
            .encode();
        let swapped = blob.replace("x25519-chacha20poly1305", "rot13");
        assert!(matches!(
            KeyWrapEnvelope::decode(&swapped),
            Err(KeyWrapError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn public_key_base64_round_trips() {
        let device = DeviceKeyPair::generate();
        let decoded = decode_public_key(&device.public_key_base64()).unwrap();
        assert_eq!(decoded.as_bytes(), device.public_key().as_bytes());
    }

    #[test]
    fn decode_public_key_rejects_wrong_length() {
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(
            decode_public_key(&short),
            Err(KeyWrapError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn restored_keypair_matches_original() {
        let device = DeviceKeyPair::generate();
        let restored = DeviceKeyPair::from_secret_bytes(device.secret.to_bytes());
        assert_eq!(
            restored.public_key().as_bytes(),
            device.public_key().as_bytes()
        );
    }
}
