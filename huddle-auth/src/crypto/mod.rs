//! Server-side credential cryptography: TOTP secret sealing and
//! recovery-code hashing. Key wrapping lives in [`crate::keywrap`].

pub mod recovery;
pub mod totp_seal;

pub use recovery::{normalize_recovery_code, verify_recovery_code, RecoveryCodeBatch};
pub use totp_seal::{open_totp_secret, seal_totp_secret};
