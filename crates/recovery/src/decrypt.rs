//! Decrypting versioned ciphertext blobs recovered from the stores.
//!
//! A 3-byte version prefix selects the cipher: on Windows the blob is
//! AES-256-GCM with a 12-byte IV after the prefix and a trailing 16-byte
//! authentication tag; on macOS and Linux it is AES-128-CBC with a fixed
//! all-space IV. Authentication or padding failure is a decryption failure,
//! never a panic. Some schemes prepend integrity-hash bytes to the
//! plaintext, so the token is located by grammar rather than assumed at
//! offset 0.

use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use tracing::trace;

use crate::paths::Os;
use crate::platform::PlatformAdapter;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const VERSION_PREFIX_LEN: usize = 3;
const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
/// Legacy CBC scheme uses sixteen space characters as the IV.
const CBC_IV: [u8; 16] = [0x20; 16];

/// Whether `blob` carries a known version prefix.
pub fn has_version_prefix(blob: &[u8]) -> bool {
    blob.len() >= VERSION_PREFIX_LEN && matches!(&blob[..VERSION_PREFIX_LEN], b"v10" | b"v11")
}

/// Decrypt a versioned blob with the platform's working key. Blobs without
/// a version prefix pass through as plaintext.
pub fn decrypt_blob(blob: &[u8], key: &[u8], os: Os) -> Option<Vec<u8>> {
    if !has_version_prefix(blob) {
        return Some(blob.to_vec());
    }
    match os {
        Os::Windows => decrypt_gcm(blob, key),
        Os::MacOs | Os::Linux => decrypt_cbc(blob, key),
    }
}

fn decrypt_gcm(blob: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    if blob.len() < VERSION_PREFIX_LEN + GCM_IV_LEN + GCM_TAG_LEN {
        return None;
    }
    let iv = &blob[VERSION_PREFIX_LEN..VERSION_PREFIX_LEN + GCM_IV_LEN];
    let ciphertext = &blob[VERSION_PREFIX_LEN + GCM_IV_LEN..];
    let cipher = Aes256Gcm::new_from_slice(key).ok()?;
    match cipher.decrypt(Nonce::from_slice(iv), ciphertext) {
        Ok(plain) => Some(plain),
        Err(_) => {
            trace!("GCM authentication failed for candidate blob");
            None
        }
    }
}

fn decrypt_cbc(blob: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let data = &blob[VERSION_PREFIX_LEN..];
    if data.is_empty() || data.len() % 16 != 0 {
        return None;
    }
    Aes128CbcDec::new_from_slices(key, &CBC_IV)
        .ok()?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .ok()
}

/// Locate the grammar-matching token inside decrypted plaintext.
pub fn token_from_plaintext(plain: &[u8], adapter: &dyn PlatformAdapter) -> Option<String> {
    let text = String::from_utf8_lossy(plain);
    adapter.find_token(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use crate::platform::Platform;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    fn sample_token() -> String {
        format!(
            "xoxc-2534008726-2534008727-2534008728-{}",
            "0123456789abcdef".repeat(4)
        )
    }

    fn encrypt_cbc(plain: &[u8], key: &[u8], prefix: &[u8]) -> Vec<u8> {
        let mut blob = prefix.to_vec();
        let ct = Aes128CbcEnc::new_from_slices(key, &CBC_IV)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain);
        blob.extend_from_slice(&ct);
        blob
    }

    fn encrypt_gcm(plain: &[u8], key: &[u8], iv: &[u8; 12]) -> Vec<u8> {
        let cipher = Aes256Gcm::new_from_slice(key).unwrap();
        let mut blob = b"v10".to_vec();
        blob.extend_from_slice(iv);
        blob.extend_from_slice(&cipher.encrypt(Nonce::from_slice(iv), plain).unwrap());
        blob
    }

    #[test]
    fn cbc_round_trip_both_prefixes() {
        let key = keys::derive_from_passphrase(b"peanuts", 1);
        let token = sample_token();
        for prefix in [b"v10".as_slice(), b"v11".as_slice()] {
            let blob = encrypt_cbc(token.as_bytes(), &key, prefix);
            let plain = decrypt_blob(&blob, &key, Os::Linux).unwrap();
            assert_eq!(plain, token.as_bytes());
        }
    }

    #[test]
    fn gcm_round_trip_on_windows() {
        let key = [0x42u8; 32];
        let token = sample_token();
        let blob = encrypt_gcm(token.as_bytes(), &key, &[7u8; 12]);
        let plain = decrypt_blob(&blob, &key, Os::Windows).unwrap();
        assert_eq!(plain, token.as_bytes());
    }

    #[test]
    fn gcm_tag_tamper_is_a_failure_not_a_panic() {
        let key = [0x42u8; 32];
        let mut blob = encrypt_gcm(sample_token().as_bytes(), &key, &[7u8; 12]);
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(decrypt_blob(&blob, &key, Os::Windows).is_none());
    }

    #[test]
    fn wrong_cbc_key_is_a_failure() {
        let key = keys::derive_from_passphrase(b"peanuts", 1);
        let other = keys::derive_from_passphrase(b"walnuts", 1);
        let blob = encrypt_cbc(sample_token().as_bytes(), &key, b"v10");
        // Padding check rejects the garbage plaintext with high probability;
        // the grammar search below is the real gate either way.
        let plain = decrypt_blob(&blob, &other, Os::Linux);
        let adapter = Platform::Slack.adapter();
        assert!(
            plain
                .and_then(|p| token_from_plaintext(&p, adapter.as_ref()))
                .is_none()
        );
    }

    #[test]
    fn unversioned_blob_passes_through() {
        let token = sample_token();
        let plain = decrypt_blob(token.as_bytes(), &[0u8; 16], Os::Linux).unwrap();
        assert_eq!(plain, token.as_bytes());
    }

    #[test]
    fn token_is_found_behind_integrity_hash_bytes() {
        let adapter = Platform::Slack.adapter();
        let token = sample_token();
        let mut plain = vec![0x9Eu8; 32]; // hash prefix some schemes prepend
        plain.extend_from_slice(token.as_bytes());
        assert_eq!(
            token_from_plaintext(&plain, adapter.as_ref()).as_deref(),
            Some(token.as_str())
        );
    }

    #[test]
    fn short_gcm_blob_is_rejected() {
        assert!(decrypt_blob(b"v10short", &[0u8; 32], Os::Windows).is_none());
    }
}
