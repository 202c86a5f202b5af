//! The extraction orchestrator: path candidates, then files, then tokens,
//! tried in order; the first valid credential short-circuits the rest.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cdp;
use crate::decrypt;
use crate::error::RecoveryError;
use crate::keys::{self, KeyCache};
use crate::paths::{Os, StoreLocation};
use crate::platform::{Platform, PlatformAdapter, UNKNOWN};
use crate::store::{self, CandidateToken};
use crate::util::mask_token;

/// A recovered, grammar-validated session credential. Immutable; the caller
/// owns persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedCredential {
    pub token: String,
    pub account_id: String,
    pub account_name: String,
}

/// Drives recovery for one platform.
pub struct Extractor {
    adapter: Box<dyn PlatformAdapter>,
    cache: KeyCache,
    os: Os,
    home: PathBuf,
}

impl Extractor {
    pub fn new(platform: Platform) -> Result<Self, RecoveryError> {
        Ok(Self {
            adapter: platform.adapter(),
            cache: KeyCache::open_default()?,
            os: Os::current(),
            home: dirs::home_dir().ok_or(RecoveryError::NoHomeDir)?,
        })
    }

    /// Fully injected constructor for tests and embedding.
    pub fn with_parts(
        adapter: Box<dyn PlatformAdapter>,
        cache: KeyCache,
        os: Os,
        home: PathBuf,
    ) -> Self {
        Self {
            adapter,
            cache,
            os,
            home,
        }
    }

    /// Recover a credential. `Ok(None)` means "no credential found", which
    /// is a normal outcome, distinct from I/O-level errors and from a token
    /// the API later rejects as expired.
    pub async fn extract(&self) -> Result<Option<ExtractedCredential>, RecoveryError> {
        for loc in self.adapter.store_candidates(self.os, &self.home) {
            if !loc.store_path.exists() {
                debug!(store = %loc.store_path.display(), "candidate store absent");
                continue;
            }
            debug!(store = %loc.store_path.display(), "scanning candidate store");
            for candidate in store::scan_location(&loc, self.adapter.as_ref()) {
                if let Some(token) = self.resolve_candidate(&candidate, &loc) {
                    info!(
                        platform = %self.adapter.platform(),
                        token = %mask_token(&token),
                        account = %candidate.context.id,
                        "credential recovered"
                    );
                    return Ok(Some(ExtractedCredential {
                        token,
                        account_id: candidate.context.id,
                        account_name: candidate.context.name,
                    }));
                }
            }
        }

        if self.adapter.cdp_probe().is_some() {
            debug!("static extraction empty, trying live fallback");
            if let Some(token) = cdp::live_extract(self.adapter.as_ref(), self.os, &self.home).await
            {
                return Ok(Some(ExtractedCredential {
                    token,
                    account_id: UNKNOWN.to_string(),
                    account_name: UNKNOWN.to_string(),
                }));
            }
        }

        Ok(None)
    }

    /// Turn one candidate into a validated token, or discard it.
    fn resolve_candidate(&self, candidate: &CandidateToken, loc: &StoreLocation) -> Option<String> {
        if !candidate.encrypted {
            let token = std::str::from_utf8(&candidate.raw).ok()?;
            return self
                .adapter
                .is_valid_token(token)
                .then(|| token.to_string());
        }

        if !decrypt::has_version_prefix(&candidate.raw) {
            // Cookie stores sometimes hold unversioned plaintext blobs.
            return decrypt::token_from_plaintext(&candidate.raw, self.adapter.as_ref());
        }

        let (key, from_cache) =
            keys::obtain_key(self.adapter.as_ref(), self.os, loc, &self.cache, true)?;
        if let Some(token) = self.try_decrypt(candidate, &key.key) {
            return Some(token);
        }

        // A cached key goes stale when the app's storage scheme changes;
        // invalidate it and rederive once.
        if from_cache {
            debug!(platform = %self.adapter.platform(), "cached key failed, rederiving");
            let _ = self.cache.clear(self.adapter.platform());
            let (key, _) =
                keys::obtain_key(self.adapter.as_ref(), self.os, loc, &self.cache, false)?;
            return self.try_decrypt(candidate, &key.key);
        }
        None
    }

    fn try_decrypt(&self, candidate: &CandidateToken, key: &[u8]) -> Option<String> {
        let plain = decrypt::decrypt_blob(&candidate.raw, key, self.os)?;
        decrypt::token_from_plaintext(&plain, self.adapter.as_ref())
    }
}
