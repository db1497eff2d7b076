//! Envelope sealing and opening.
//!
//! Layout of an envelope (format version 1):
//!
//! ```text
//! magic "ENOM" | version | mode id | flags | nonce (12) | ciphertext + tag (16)
//! ```
//!
//! The 19 header bytes are bound to the ciphertext as associated data, so a
//! change anywhere in the envelope is caught by the AEAD tag. When flag bit 0
//! is set the plaintext starts with the original file name:
//! `u16 big-endian length | UTF-8 name | file content`.

use std::fmt;
use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::key_management::DerivedKeyMaterial;

pub const ENCRYPTED_EXTENSION: &str = "enom";
pub const MAGIC: [u8; 4] = *b"ENOM";
pub const FORMAT_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = MAGIC.len() + 3 + NONCE_LEN;

const FLAG_EMBEDDED_NAME: u8 = 0b0000_0001;
const KNOWN_FLAGS: u8 = FLAG_EMBEDDED_NAME;
const NAME_CONTEXT: &str = "dircrypt file name anonymization v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherMode {
    #[serde(rename = "gcm", alias = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20", alias = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl CipherMode {
    fn id(&self) -> u8 {
        match self {
            CipherMode::Aes256Gcm => 1,
            CipherMode::ChaCha20Poly1305 => 2,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(CipherMode::Aes256Gcm),
            2 => Some(CipherMode::ChaCha20Poly1305),
            _ => None,
        }
    }

    pub fn identifier(&self) -> &'static str {
        match self {
            CipherMode::Aes256Gcm => "gcm",
            CipherMode::ChaCha20Poly1305 => "chacha20",
        }
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMode::Aes256Gcm => write!(f, "AES-256-GCM"),
            CipherMode::ChaCha20Poly1305 => write!(f, "ChaCha20-Poly1305"),
        }
    }
}

impl FromStr for CipherMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcm" | "aes-256-gcm" => Ok(CipherMode::Aes256Gcm),
            "chacha20" | "chacha20-poly1305" => Ok(CipherMode::ChaCha20Poly1305),
            "ecb" | "aes-256-ecb" => Err(EngineError::UnsupportedAlgorithm(
                "ECB is unauthenticated and cannot detect tampering".to_string(),
            )),
            other => Err(EngineError::UnsupportedAlgorithm(format!(
                "unknown cipher mode '{}'",
                other
            ))),
        }
    }
}

/// Plaintext recovered from an envelope.
#[derive(Debug)]
pub struct DecodedPayload {
    pub content: Vec<u8>,
    pub original_name: Option<String>,
}

pub fn encode(plaintext: &[u8], material: &DerivedKeyMaterial, mode: CipherMode) -> Result<Vec<u8>> {
    encode_with_name(plaintext, None, material, mode)
}

/// Seals `plaintext`, optionally embedding the file's original name.
pub fn encode_with_name(
    plaintext: &[u8],
    original_name: Option<&str>,
    material: &DerivedKeyMaterial,
    mode: CipherMode,
) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let flags = if original_name.is_some() { FLAG_EMBEDDED_NAME } else { 0 };
    let header = build_header(mode, flags, &nonce);

    let sealed = match original_name {
        Some(name) => {
            let name_len = u16::try_from(name.len()).map_err(|_| {
                EngineError::InvalidParameters(format!("file name too long to embed: {} bytes", name.len()))
            })?;
            let mut payload = Vec::with_capacity(2 + name.len() + plaintext.len());
            payload.extend_from_slice(&name_len.to_be_bytes());
            payload.extend_from_slice(name.as_bytes());
            payload.extend_from_slice(plaintext);
            seal(mode, material.key(), &nonce, &header, &payload)?
        }
        None => seal(mode, material.key(), &nonce, &header, plaintext)?,
    };

    let mut envelope = Vec::with_capacity(HEADER_LEN + sealed.len());
    envelope.extend_from_slice(&header);
    envelope.extend_from_slice(&sealed);
    Ok(envelope)
}

/// Opens an envelope. Never returns unauthenticated bytes.
pub fn decode(envelope: &[u8], material: &DerivedKeyMaterial, mode: CipherMode) -> Result<DecodedPayload> {
    let (header, flags) = inspect_header(envelope, mode)?;
    let nonce = &header[HEADER_LEN - NONCE_LEN..];

    let mut plaintext = open(mode, material.key(), nonce, header, &envelope[HEADER_LEN..])?;

    if flags & FLAG_EMBEDDED_NAME == 0 {
        return Ok(DecodedPayload {
            content: plaintext,
            original_name: None,
        });
    }

    if plaintext.len() < 2 {
        return Err(EngineError::DecryptionFailed("embedded name is truncated".to_string()));
    }
    let name_len = u16::from_be_bytes([plaintext[0], plaintext[1]]) as usize;
    if plaintext.len() < 2 + name_len {
        return Err(EngineError::DecryptionFailed("embedded name is truncated".to_string()));
    }
    let name = std::str::from_utf8(&plaintext[2..2 + name_len])
        .map_err(|_| EngineError::DecryptionFailed("embedded name is not UTF-8".to_string()))?
        .to_owned();
    plaintext.drain(..2 + name_len);

    Ok(DecodedPayload {
        content: plaintext,
        original_name: Some(name),
    })
}

/// Checks the fixed header without touching the key.
///
/// Returns the header slice and its flags.
pub fn inspect_header(envelope: &[u8], mode: CipherMode) -> Result<(&[u8], u8)> {
    if envelope.len() < HEADER_LEN + TAG_LEN {
        return Err(EngineError::DecryptionFailed(format!(
            "envelope truncated: {} bytes",
            envelope.len()
        )));
    }

    let header = &envelope[..HEADER_LEN];
    if header[..MAGIC.len()] != MAGIC {
        return Err(EngineError::DecryptionFailed("not an encrypted envelope".to_string()));
    }

    let version = header[4];
    if version != FORMAT_VERSION {
        return Err(EngineError::DecryptionFailed(format!(
            "unsupported envelope version {}",
            version
        )));
    }

    match CipherMode::from_id(header[5]) {
        Some(found) if found == mode => {}
        Some(found) => {
            return Err(EngineError::DecryptionFailed(format!(
                "envelope was sealed with {}, request uses {}",
                found, mode
            )))
        }
        None => {
            return Err(EngineError::DecryptionFailed(format!(
                "unknown cipher mode id {}",
                header[5]
            )))
        }
    }

    let flags = header[6];
    if flags & !KNOWN_FLAGS != 0 {
        return Err(EngineError::DecryptionFailed(format!("unknown envelope flags {:#04x}", flags)));
    }

    Ok((header, flags))
}

/// Opaque file name for anonymized output, stable for a given key and name.
pub fn anonymized_file_name(material: &DerivedKeyMaterial, original_name: &str) -> String {
    let subkey = blake3::derive_key(NAME_CONTEXT, material.key());
    let tag = blake3::keyed_hash(&subkey, original_name.as_bytes());
    format!("{}.{}", hex::encode(&tag.as_bytes()[..16]), ENCRYPTED_EXTENSION)
}

fn build_header(mode: CipherMode, flags: u8, nonce: &[u8; NONCE_LEN]) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..4].copy_from_slice(&MAGIC);
    header[4] = FORMAT_VERSION;
    header[5] = mode.id();
    header[6] = flags;
    header[7..].copy_from_slice(nonce);
    header
}

fn seal(mode: CipherMode, key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let payload = Payload { msg, aad };

    let sealed = match mode {
        CipherMode::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| EngineError::EncryptionFailed(format!("invalid key: {}", e)))?;
            cipher.encrypt(aes_gcm::Nonce::from_slice(nonce), payload)
        }
        CipherMode::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| EngineError::EncryptionFailed(format!("invalid key: {}", e)))?;
            cipher.encrypt(chacha20poly1305::Nonce::from_slice(nonce), payload)
        }
    };

    sealed.map_err(|_| EngineError::EncryptionFailed(format!("{} sealing failed", mode)))
}

fn open(mode: CipherMode, key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    let payload = Payload { msg, aad };

    let opened = match mode {
        CipherMode::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| EngineError::DecryptionFailed(format!("invalid key: {}", e)))?;
            cipher.decrypt(aes_gcm::Nonce::from_slice(nonce), payload)
        }
        CipherMode::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| EngineError::DecryptionFailed(format!("invalid key: {}", e)))?;
            cipher.decrypt(chacha20poly1305::Nonce::from_slice(nonce), payload)
        }
    };

    opened.map_err(|_| {
        EngineError::DecryptionFailed("authentication failed: wrong password, salt or mode, or the file was modified".to_string())
    })
}
