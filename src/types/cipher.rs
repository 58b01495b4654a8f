//! Authenticated encryption for [`FieldType::Ciphered`](super::FieldType::Ciphered).
//!
//! Payload layout: `base64(iv || hmac || ciphertext)` where `iv` is 16 random
//! bytes, `ciphertext` is the AES-128-CBC (PKCS#7) encryption of the JSON-encoded
//! value and `hmac` is HMAC-SHA-256 over `ciphertext`.
//!
//! The AES key is the first 16 bytes of the configured key, zero-padded when the
//! key is shorter; the HMAC key is the whole configured key. This matches what
//! OpenSSL does with an AES-128 cipher and a text key, so payloads written by
//! other OpenSSL-based writers of the same format decode here.
//!
//! The tag covers the ciphertext only. A flipped IV byte changes the first
//! plaintext block, which almost always surfaces as an integrity error when the
//! JSON is parsed, but it is not cryptographically detected.

use crate::error::{QuarryError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

fn aes_key(key: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let bytes = key.as_bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn mac(key: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| QuarryError::configuration(format!("invalid cipher key: {e}")))
}

/// Encrypt the JSON encoding of `value` under `key`.
pub fn encrypt(value: &serde_json::Value, key: &str) -> Result<String> {
    let plaintext = serde_json::to_vec(value)
        .map_err(|e| QuarryError::conversion(format!("cannot encode ciphered value: {e}")))?;

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext =
        Aes128CbcEnc::new(&aes_key(key).into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let mut mac = mac(key)?;
    mac.update(&ciphertext);
    let tag = mac.finalize().into_bytes();

    let mut payload = Vec::with_capacity(IV_LEN + MAC_LEN + ciphertext.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&tag);
    payload.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(payload))
}

/// Authenticate and decrypt a payload produced by [`encrypt`].
///
/// The tag is checked in constant time before anything is decrypted; any
/// mismatch or malformed payload is a [`QuarryError::Integrity`].
pub fn decrypt(payload: &str, key: &str) -> Result<serde_json::Value> {
    let raw = STANDARD
        .decode(payload.trim())
        .map_err(|e| QuarryError::Integrity(format!("ciphered payload is not base64: {e}")))?;
    if raw.len() < IV_LEN + MAC_LEN + BLOCK_LEN {
        return Err(QuarryError::Integrity(format!(
            "ciphered payload too short ({} bytes)",
            raw.len()
        )));
    }

    let (iv, rest) = raw.split_at(IV_LEN);
    let (tag, ciphertext) = rest.split_at(MAC_LEN);

    let mut mac = mac(key)?;
    mac.update(ciphertext);
    mac.verify_slice(tag)
        .map_err(|_| QuarryError::Integrity("HMAC mismatch on ciphered field".to_string()))?;

    let iv: [u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| QuarryError::Integrity("invalid IV length".to_string()))?;
    let plaintext = Aes128CbcDec::new(&aes_key(key).into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| QuarryError::Integrity("invalid padding in ciphered field".to_string()))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| QuarryError::Integrity(format!("decrypted value is not JSON: {e}")))
}
