//! Custodial wallet derivation.
//!
//! Every user's wallet is derived deterministically from one master seed and
//! the profile's derivation index, so the desk holds a single secret while
//! each user gets a distinct key and address. Private key material stays
//! inside `SecretString` until the chain gateway needs it for signing.

use hkdf::Hkdf;
use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::error::WalletError;

const DERIVATION_SALT: &[u8] = b"swapdesk.wallet.v1";

/// Keys for one derived wallet.
#[derive(Debug, Clone)]
pub struct WalletKeys {
    /// 0x-prefixed lowercase address.
    pub address: String,
    /// Hex-encoded secp256k1 private key.
    pub secret: SecretString,
}

/// Derives per-user wallets from custodial key material.
pub trait WalletVault: Send + Sync {
    fn derive(&self, index: u32) -> Result<WalletKeys, WalletError>;
}

/// HKDF-SHA256 expansion of the master seed by derivation index.
#[derive(Debug)]
pub struct HkdfWalletVault {
    master_seed: SecretString,
}

impl HkdfWalletVault {
    pub fn new(master_seed: SecretString) -> Result<Self, WalletError> {
        if master_seed.expose_secret().trim().is_empty() {
            return Err(WalletError::EmptyMasterSeed);
        }
        Ok(Self { master_seed })
    }
}

impl WalletVault for HkdfWalletVault {
    fn derive(&self, index: u32) -> Result<WalletKeys, WalletError> {
        let hkdf = Hkdf::<Sha256>::new(
            Some(DERIVATION_SALT),
            self.master_seed.expose_secret().as_bytes(),
        );

        // A 32-byte HKDF output falls outside the secp256k1 scalar range with
        // negligible probability; counter-bumping keeps derivation total.
        for counter in 0u8..=255 {
            let mut info = [0u8; 5];
            info[..4].copy_from_slice(&index.to_be_bytes());
            info[4] = counter;

            let mut okm = [0u8; 32];
            hkdf.expand(&info, &mut okm)
                .map_err(|e| WalletError::Derivation {
                    index,
                    message: e.to_string(),
                })?;

            if let Ok(signing_key) = SigningKey::from_slice(&okm) {
                return Ok(WalletKeys {
                    address: address_of(&signing_key),
                    secret: SecretString::from(hex::encode(okm)),
                });
            }
        }

        Err(WalletError::Derivation {
            index,
            message: "no valid scalar after 256 attempts".to_string(),
        })
    }
}

/// Keccak-256 of the uncompressed public key, last 20 bytes.
pub fn address_of(signing_key: &SigningKey) -> String {
    let public = signing_key.verifying_key().to_encoded_point(false);
    let digest = Keccak256::digest(&public.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Reconstruct a signing key from its hex encoding.
pub fn signing_key_from_hex(secret: &SecretString) -> Result<SigningKey, WalletError> {
    let raw = hex::decode(secret.expose_secret().trim_start_matches("0x"))
        .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
    SigningKey::from_slice(&raw).map_err(|e| WalletError::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> HkdfWalletVault {
        HkdfWalletVault::new(SecretString::from(
            "test master seed, long enough to be plausible",
        ))
        .unwrap()
    }

    #[test]
    fn empty_seed_is_rejected() {
        let err = HkdfWalletVault::new(SecretString::from("  ")).unwrap_err();
        assert!(matches!(err, WalletError::EmptyMasterSeed));
    }

    #[test]
    fn derivation_is_deterministic() {
        let vault = vault();
        let a = vault.derive(3).unwrap();
        let b = vault.derive(3).unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.secret.expose_secret(), b.secret.expose_secret());
    }

    #[test]
    fn indices_yield_distinct_wallets() {
        let vault = vault();
        let a = vault.derive(0).unwrap();
        let b = vault.derive(1).unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn address_shape() {
        let keys = vault().derive(0).unwrap();
        assert!(keys.address.starts_with("0x"));
        assert_eq!(keys.address.len(), 42);
        assert_eq!(keys.address, keys.address.to_lowercase());
    }

    #[test]
    fn secret_roundtrips_to_same_address() {
        let keys = vault().derive(5).unwrap();
        let signing_key = signing_key_from_hex(&keys.secret).unwrap();
        assert_eq!(address_of(&signing_key), keys.address);
    }
}
