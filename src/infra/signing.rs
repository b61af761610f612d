//! Signed JSON envelopes around merchant API payloads.
//!
//! Envelopes are signed with the miner's secp256k1 key: the signature is a
//! hex DER-encoded ECDSA signature over the SHA-256 digest of the payload
//! bytes, and the public key is the hex-encoded bitcoin public key.

use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::{Network, PrivateKey};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{AppError, ConfigError, JsonEnvelope};

pub const ENVELOPE_ENCODING: &str = "UTF-8";
pub const ENVELOPE_MIME_TYPE: &str = "application/json";

/// Wraps payloads in a [`JsonEnvelope`], signing them when a miner key is configured.
#[derive(Clone)]
pub struct EnvelopeSigner {
    miner_key: Option<PrivateKey>,
    secp: Secp256k1<All>,
}

impl Default for EnvelopeSigner {
    fn default() -> Self {
        Self {
            miner_key: None,
            secp: Secp256k1::new(),
        }
    }
}

impl EnvelopeSigner {
    #[must_use]
    pub fn new(miner_key: PrivateKey) -> Self {
        Self {
            miner_key: Some(miner_key),
            ..Self::default()
        }
    }

    /// Signer that emits envelopes with null signature and key
    #[must_use]
    pub fn unsigned() -> Self {
        Self::default()
    }

    /// Hex public key, also reported as the miner id
    #[must_use]
    pub fn public_key(&self) -> Option<String> {
        self.miner_key
            .as_ref()
            .map(|key| key.public_key(&self.secp).to_string())
    }

    /// Hex DER ECDSA signature over the SHA-256 digest of `message`
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Option<String> {
        self.miner_key.as_ref().map(|key| {
            let digest: [u8; 32] = Sha256::digest(message).into();
            let signature = self
                .secp
                .sign_ecdsa(&Message::from_digest(digest), &key.inner);
            hex::encode(signature.serialize_der())
        })
    }

    pub fn wrap<T: Serialize>(&self, payload: &T) -> Result<JsonEnvelope, AppError> {
        let payload = serde_json::to_string(payload)?;
        let signature = self.sign(payload.as_bytes());

        Ok(JsonEnvelope {
            payload,
            signature,
            public_key: self.public_key(),
            encoding: ENVELOPE_ENCODING.to_string(),
            mime_type: ENVELOPE_MIME_TYPE.to_string(),
        })
    }
}

/// Parse the miner key, given either as WIF or as 32 hex-encoded bytes
pub fn miner_key_from_secret(secret: &SecretString) -> Result<PrivateKey, AppError> {
    let invalid = |message: String| {
        AppError::Config(ConfigError::Invalid {
            key: "MINER_PRIVATE_KEY".to_string(),
            message,
        })
    };

    let secret = secret.expose_secret().trim();

    if let Ok(key) = PrivateKey::from_wif(secret) {
        return Ok(key);
    }

    let key_bytes = hex::decode(secret)
        .map_err(|_| invalid("Key must be WIF or 32 hex-encoded bytes".to_string()))?;
    if key_bytes.len() != 32 {
        return Err(invalid(format!("Key must be 32 bytes, got {}", key_bytes.len())));
    }

    let secret_key = SecretKey::from_slice(&key_bytes).map_err(|e| invalid(e.to_string()))?;
    Ok(PrivateKey::new(secret_key, Network::Bitcoin))
}
