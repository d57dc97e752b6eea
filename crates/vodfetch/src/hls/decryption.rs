// Decryption: key/IV resolution and AES-128-CBC segment decryption.

use std::sync::LazyLock;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use regex::Regex;
use tracing::debug;

use crate::DownloadError;
use crate::hls::fetcher::Fetcher;
use crate::hls::manifest::EncryptionInfo;

pub const SUPPORTED_METHOD: &str = "AES-128";
const BLOCK_SIZE: usize = 16;

static IV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IV=0[xX]([0-9a-fA-F]+)").expect("static IV pattern is valid")
});

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Resolved key and IV, shared read-only by every worker of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherContext {
    key: [u8; BLOCK_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl CipherContext {
    pub fn new(key: [u8; BLOCK_SIZE], iv: [u8; BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }
}

// Key material stays out of logs.
impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("iv", &hex::encode(self.iv))
            .finish_non_exhaustive()
    }
}

/// Fetches the key referenced by the manifest and extracts the inline IV.
pub struct KeyResolver<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> KeyResolver<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Fails with `UnsupportedCipher` before any network access when the
    /// method is not AES-128 (case-insensitive).
    pub async fn resolve(
        &self,
        encryption: &EncryptionInfo,
        manifest_text: &str,
    ) -> Result<CipherContext, DownloadError> {
        ensure_supported(&encryption.method)?;
        let iv = parse_iv(manifest_text)?;

        let key_bytes = self.fetcher.fetch(&encryption.key_url).await?;
        let key: [u8; BLOCK_SIZE] = key_bytes.as_ref().try_into().map_err(|_| {
            DownloadError::Decryption(format!(
                "key from {} has incorrect length: {} bytes (expected {BLOCK_SIZE})",
                encryption.key_url,
                key_bytes.len()
            ))
        })?;

        debug!(key_url = %encryption.key_url, iv = %hex::encode(iv), "Resolved cipher context");
        Ok(CipherContext::new(key, iv))
    }
}

pub fn ensure_supported(method: &str) -> Result<(), DownloadError> {
    if method.eq_ignore_ascii_case(SUPPORTED_METHOD) {
        Ok(())
    } else {
        Err(DownloadError::UnsupportedCipher(method.to_string()))
    }
}

/// Inline `IV=0x...` attribute, or the all-zero IV when absent.
pub fn parse_iv(manifest_text: &str) -> Result<[u8; BLOCK_SIZE], DownloadError> {
    let Some(caps) = IV_PATTERN.captures(manifest_text) else {
        return Ok([0u8; BLOCK_SIZE]);
    };
    let mut iv = [0u8; BLOCK_SIZE];
    hex::decode_to_slice(&caps[1], &mut iv)
        .map_err(|e| DownloadError::Manifest(format!("failed to parse IV '{}': {e}", &caps[1])))?;
    Ok(iv)
}

/// Decrypts whole segments in one buffer.
///
/// Padding is not removed: the output has exactly the input's length, and
/// any trailing padding bytes end up in the assembled artifact.
pub struct SegmentDecryptor;

impl SegmentDecryptor {
    pub fn decrypt(data: Bytes, cipher: Option<&CipherContext>) -> Result<Bytes, DownloadError> {
        let Some(cipher) = cipher else {
            return Ok(data);
        };

        let mut buffer = data.to_vec();
        let decryptor = Aes128CbcDec::new(&cipher.key.into(), &cipher.iv.into());
        let decrypted_len = decryptor
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| {
                DownloadError::Decryption(format!(
                    "segment length {} is not a multiple of the {BLOCK_SIZE}-byte block size",
                    data.len()
                ))
            })?
            .len();
        buffer.truncate(decrypted_len);
        Ok(Bytes::from(buffer))
    }
}
