//! Reference crypto engine: AES-256-GCM sealed, HMAC-SHA256 signed.
//!
//! # Transmit format
//! ```text
//! {"data": base64(ciphertext), "iv": base64(nonce), "signature": hex(hmac)}
//! ```
//! - cipher key: SHA-256(secret1)
//! - signature: HMAC-SHA256(secret2, nonce || ciphertext)
//! - plaintext: the JSON envelope (id, timestamp, method, url, headers, data, uploads)

use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{generic_array::GenericArray, Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::crypto::{CryptoEngine, CryptoError, SealInput, Sealed, SecretPair};
use crate::envelope::{HeaderSet, InboundEnvelope, OutboundEnvelope};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    data: String,
    iv: String,
    signature: String,
}

/// Default engine shipped with the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmEngine;

impl AesGcmEngine {
    pub fn new() -> Self {
        Self
    }

    /// Seal a response envelope answering request `id`.
    ///
    /// Server-side counterpart of `encrypt`; responses never carry
    /// method, url or uploads.
    pub fn encrypt_response(
        &self,
        id: &str,
        headers: &HeaderSet,
        data: &[u8],
        secrets: &SecretPair,
    ) -> Result<Bytes, CryptoError> {
        let envelope = OutboundEnvelope {
            id: id.to_string(),
            timestamp: unix_now(),
            method: None,
            url: None,
            headers: headers.clone(),
            data: Bytes::copy_from_slice(data),
            uploads: None,
        };
        self.seal(&envelope, secrets).map(|(transmit, _)| transmit)
    }

    fn seal(&self, envelope: &OutboundEnvelope, secrets: &SecretPair) -> Result<(Bytes, String), CryptoError> {
        let plaintext =
            serde_json::to_vec(envelope).map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher(secrets)?
            .encrypt(GenericArray::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let signature = hex::encode(sign(secrets, &nonce, &ciphertext)?.finalize().into_bytes());

        let payload = Payload {
            data: STANDARD.encode(&ciphertext),
            iv: STANDARD.encode(nonce),
            signature: signature.clone(),
        };
        let transmit =
            serde_json::to_vec(&payload).map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok((Bytes::from(transmit), signature))
    }
}

impl CryptoEngine for AesGcmEngine {
    fn encrypt(&self, input: SealInput<'_>, secrets: &SecretPair) -> Result<Sealed, CryptoError> {
        let id = Uuid::new_v4().to_string();
        let envelope = OutboundEnvelope {
            id: id.clone(),
            timestamp: unix_now(),
            method: (!input.file_only).then(|| input.method.to_string()),
            url: (!input.file_only).then(|| input.uri.to_string()),
            headers: input.headers.clone(),
            data: Bytes::copy_from_slice(input.data),
            uploads: if input.file_only {
                None
            } else {
                input.uploads.map(<[_]>::to_vec)
            },
        };

        let (transmit, signature) = self.seal(&envelope, secrets)?;
        Ok(Sealed {
            transmit,
            id,
            signature,
        })
    }

    fn decrypt(&self, body: &[u8], secrets: &SecretPair) -> Result<InboundEnvelope, CryptoError> {
        let payload: Payload =
            serde_json::from_slice(body).map_err(|e| CryptoError::Format(e.to_string()))?;

        let nonce = STANDARD
            .decode(&payload.iv)
            .map_err(|e| CryptoError::Format(format!("iv: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Format(format!(
                "iv must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(&payload.data)
            .map_err(|e| CryptoError::Format(format!("data: {}", e)))?;
        let signature = hex::decode(&payload.signature)
            .map_err(|e| CryptoError::Format(format!("signature: {}", e)))?;

        sign(secrets, &nonce, &ciphertext)?
            .verify_slice(&signature)
            .map_err(|_| CryptoError::Signature)?;

        let plaintext = cipher(secrets)?
            .decrypt(GenericArray::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|e| CryptoError::Decryption(e.to_string()))?;

        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Format(e.to_string()))
    }
}

fn cipher(secrets: &SecretPair) -> Result<Aes256Gcm, CryptoError> {
    let key = Sha256::digest(secrets.secret1());
    <Aes256Gcm as KeyInit>::new_from_slice(&key).map_err(|e| CryptoError::Encryption(e.to_string()))
}

fn sign(secrets: &SecretPair, nonce: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secrets.secret2())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
