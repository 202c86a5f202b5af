//! Scanning the app's local record stores for candidate token byte-strings.

pub mod cookiedb;
pub mod leveldb;

use crate::paths::{StoreKind, StoreLocation};
use crate::platform::{AccountContext, PlatformAdapter, UNKNOWN};

/// A plausible token pulled out of a record store. Transient; never persisted.
#[derive(Debug, Clone)]
pub struct CandidateToken {
    /// Reconstructed token bytes, or decoded ciphertext when `encrypted`.
    pub raw: Vec<u8>,
    /// Byte offset of the hit in the source file (row index for cookie DBs).
    pub source_offset: usize,
    pub encrypted: bool,
    pub context: AccountContext,
}

/// Scan one candidate location. Missing or unreadable stores yield an empty
/// list; an empty result is not an error.
pub fn scan_location(loc: &StoreLocation, adapter: &dyn PlatformAdapter) -> Vec<CandidateToken> {
    match loc.kind {
        StoreKind::LevelDb => leveldb::scan_dir(&loc.store_path, adapter),
        StoreKind::CookieDb => cookiedb::scan_db(&loc.store_path, adapter),
    }
}

/// Deduplicate candidates by account id, preferring entries whose name
/// resolved to something other than the unknown sentinel. Identical raw
/// values always collapse.
pub(crate) fn dedup_candidates(candidates: Vec<CandidateToken>) -> Vec<CandidateToken> {
    let mut out: Vec<CandidateToken> = Vec::new();
    for cand in candidates {
        let existing = out.iter_mut().find(|e| {
            e.encrypted == cand.encrypted
                && (e.raw == cand.raw || (e.context.id != UNKNOWN && e.context.id == cand.context.id))
        });
        match existing {
            Some(e) => {
                if e.context.name == UNKNOWN && cand.context.name != UNKNOWN {
                    e.context = cand.context;
                }
            }
            None => out.push(cand),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(raw: &str, id: &str, name: &str) -> CandidateToken {
        CandidateToken {
            raw: raw.as_bytes().to_vec(),
            source_offset: 0,
            encrypted: false,
            context: AccountContext {
                id: id.to_string(),
                name: name.to_string(),
            },
        }
    }

    #[test]
    fn dedup_merges_same_account_and_keeps_resolved_name() {
        let merged = dedup_candidates(vec![
            cand("tok-a", "T01234567", UNKNOWN),
            cand("tok-b", "T01234567", "acme"),
            cand("tok-c", "T09999999", UNKNOWN),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].context.name, "acme");
    }

    #[test]
    fn dedup_keeps_distinct_unknown_accounts() {
        let merged = dedup_candidates(vec![
            cand("tok-a", UNKNOWN, UNKNOWN),
            cand("tok-b", UNKNOWN, UNKNOWN),
        ]);
        assert_eq!(merged.len(), 2);
    }
}
