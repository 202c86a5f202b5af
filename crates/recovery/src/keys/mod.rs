//! Deriving and caching the symmetric key that protects stored secrets.
//!
//! Each OS has its own strategy: the macOS keychain holds a per-app password
//! that feeds PBKDF2, Windows protects the raw AES key with DPAPI inside the
//! app's "Local State" file, and Linux builds derive from a fixed, publicly
//! known passphrase. Derived keys are cached on disk per platform so repeated
//! extractions do not re-prompt the OS credential store.

mod linux;
mod macos;
mod windows;

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::Sha1;
use tracing::debug;

use crate::error::RecoveryError;
use crate::paths::{Os, StoreLocation};
use crate::platform::{Platform, PlatformAdapter};

/// Fixed PBKDF2 salt used by the target apps' own key derivation.
pub const PBKDF2_SALT: &[u8] = b"saltysalt";
/// Iteration count on macOS (keychain-password input).
pub const PBKDF2_ITERATIONS_MACOS: u32 = 1003;
/// Iteration count on Linux (fixed-passphrase input).
pub const PBKDF2_ITERATIONS_LINUX: u32 = 1;
/// Derived key length for the CBC scheme.
pub const DERIVED_KEY_LEN: usize = 16;

/// A working key for one platform's stored secrets.
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub platform: Platform,
    pub key: Vec<u8>,
}

pub(crate) fn derive_from_passphrase(passphrase: &[u8], iterations: u32) -> Vec<u8> {
    pbkdf2::pbkdf2_hmac_array::<Sha1, DERIVED_KEY_LEN>(passphrase, PBKDF2_SALT, iterations).to_vec()
}

/// On-disk cache of derived keys, scoped per platform.
///
/// An explicit object with caller-owned lifecycle: `get`/`set`/`clear`/
/// `clear_all`, nothing ambient. The file is a small JSON map of platform
/// tag to base64 key, written with owner-only permissions.
pub struct KeyCache {
    path: PathBuf,
}

impl KeyCache {
    /// Cache file under the user's configuration directory.
    pub fn open_default() -> Result<Self, RecoveryError> {
        let dir = dirs::config_dir()
            .ok_or(RecoveryError::NoHomeDir)?
            .join("sessrec");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("keys.json"),
        })
    }

    /// Cache at an explicit path (tests, alternate roots).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn get(&self, platform: Platform) -> Option<Vec<u8>> {
        let encoded = self.load().remove(platform.as_str())?;
        BASE64.decode(encoded).ok()
    }

    pub fn set(&self, platform: Platform, key: &[u8]) -> Result<(), RecoveryError> {
        let mut map = self.load();
        map.insert(platform.as_str().to_string(), BASE64.encode(key));
        self.store(&map)
    }

    pub fn clear(&self, platform: Platform) -> Result<(), RecoveryError> {
        let mut map = self.load();
        if map.remove(platform.as_str()).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), RecoveryError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn load(&self) -> BTreeMap<String, String> {
        std::fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn store(&self, map: &BTreeMap<String, String>) -> Result<(), RecoveryError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        std::fs::write(&self.path, bytes)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

/// Derive the working key for `adapter` on `os`, without touching the cache.
/// Every failure is "no key": the caller moves on to the next candidate.
pub fn derive_key(adapter: &dyn PlatformAdapter, os: Os, loc: &StoreLocation) -> Option<DerivedKey> {
    let key = match os {
        Os::MacOs => macos::derive(adapter)?,
        Os::Linux => linux::derive(adapter),
        Os::Windows => windows::derive(&loc.local_state)?,
    };
    Some(DerivedKey {
        platform: adapter.platform(),
        key,
    })
}

/// Fetch the working key, consulting the cache first when `use_cache`.
/// Returns the key and whether it came from the cache, so the caller can
/// invalidate and rederive after a decryption failure.
pub fn obtain_key(
    adapter: &dyn PlatformAdapter,
    os: Os,
    loc: &StoreLocation,
    cache: &KeyCache,
    use_cache: bool,
) -> Option<(DerivedKey, bool)> {
    let platform = adapter.platform();
    if use_cache && let Some(key) = cache.get(platform) {
        debug!(%platform, "using cached derived key");
        return Some((DerivedKey { platform, key }, true));
    }

    let derived = derive_key(adapter, os, loc)?;
    if let Err(e) = cache.set(platform, &derived.key) {
        debug!(%platform, error = %e, "failed to persist derived key");
    }
    Some((derived, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, KeyCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = KeyCache::at(dir.path().join("keys.json"));
        (dir, cache)
    }

    #[test]
    fn derivation_is_deterministic_and_sized() {
        let a = derive_from_passphrase(b"peanuts", PBKDF2_ITERATIONS_LINUX);
        let b = derive_from_passphrase(b"peanuts", PBKDF2_ITERATIONS_LINUX);
        assert_eq!(a, b);
        assert_eq!(a.len(), DERIVED_KEY_LEN);
        assert_ne!(a, derive_from_passphrase(b"walnuts", PBKDF2_ITERATIONS_LINUX));
        assert_ne!(a, derive_from_passphrase(b"peanuts", PBKDF2_ITERATIONS_MACOS));
    }

    #[test]
    fn cache_round_trips_per_platform() {
        let (_dir, cache) = cache();
        cache.set(Platform::Slack, &[1u8; 16]).unwrap();
        cache.set(Platform::Discord, &[2u8; 32]).unwrap();

        assert_eq!(cache.get(Platform::Slack).unwrap(), vec![1u8; 16]);
        assert_eq!(cache.get(Platform::Discord).unwrap(), vec![2u8; 32]);
        assert!(cache.get(Platform::Teams).is_none());

        cache.clear(Platform::Slack).unwrap();
        assert!(cache.get(Platform::Slack).is_none());
        assert!(cache.get(Platform::Discord).is_some());

        cache.clear_all().unwrap();
        assert!(cache.get(Platform::Discord).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn cache_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, cache) = cache();
        cache.set(Platform::Slack, &[0u8; 16]).unwrap();
        let mode = std::fs::metadata(cache.path.clone()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn corrupt_cache_file_reads_as_empty() {
        let (_dir, cache) = cache();
        std::fs::write(&cache.path, b"not json").unwrap();
        assert!(cache.get(Platform::Slack).is_none());
        cache.set(Platform::Slack, &[3u8; 16]).unwrap();
        assert_eq!(cache.get(Platform::Slack).unwrap(), vec![3u8; 16]);
    }
}
