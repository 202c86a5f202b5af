use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{AccountContext, Platform, PlatformAdapter, UNKNOWN};
use crate::paths::{Os, StoreLocation, app_support_root, cookie_locations};

// Workspace client tokens: xoxc-<num>-<num>-<num>-<64 hex>.
static SESSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xox[a-z]-\d{6,}-\d{6,}-\d{6,}-[0-9a-f]{64}").unwrap());
// The `d` session cookie: an opaque base64-ish value, often URL-encoded.
static COOKIE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xoxd-[A-Za-z0-9+/%._=-]{24,}").unwrap());
static TEAM_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bT[A-Z0-9]{8,12}\b").unwrap());
static TEAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name":"([^"]{1,80})""#).unwrap());

fn whole_match(re: &Regex, s: &str) -> bool {
    re.find(s).is_some_and(|m| m.start() == 0 && m.end() == s.len())
}

/// Slack desktop: plaintext `xoxc-` tokens in Local Storage, an encrypted
/// `xoxd-` session cookie in the Chromium cookie database.
pub struct Slack;

impl PlatformAdapter for Slack {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    fn store_candidates(&self, os: Os, home: &Path) -> Vec<StoreLocation> {
        let mut roots = Vec::new();
        if os == Os::MacOs {
            // Sandboxed App Store packaging first.
            roots.push(
                home.join("Library")
                    .join("Containers")
                    .join("com.tinyspeck.slackmacgap")
                    .join("Data")
                    .join("Library")
                    .join("Application Support")
                    .join("Slack"),
            );
        }
        roots.push(app_support_root(os, home, "Slack"));

        let mut out = Vec::new();
        for root in &roots {
            out.push(StoreLocation::leveldb(root));
            out.extend(cookie_locations(root));
        }
        out
    }

    fn plaintext_markers(&self) -> &[&'static [u8]] {
        &[b"xoxc-"]
    }

    fn token_alphabet(&self, b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'/' | b'%' | b'=' | b'.' | b'_')
    }

    fn is_valid_token(&self, s: &str) -> bool {
        whole_match(&SESSION_TOKEN, s) || whole_match(&COOKIE_TOKEN, s)
    }

    fn find_token(&self, s: &str) -> Option<String> {
        SESSION_TOKEN
            .find(s)
            .or_else(|| COOKIE_TOKEN.find(s))
            .map(|m| m.as_str().to_string())
    }

    fn cookie_names(&self) -> &[&'static str] {
        &["d"]
    }

    fn keychain_entries(&self) -> &[(&'static str, &'static str)] {
        &[
            ("Slack App Store Key", "Slack App Store Key"),
            ("Slack Safe Storage", "Slack Key"),
            ("Slack Safe Storage", "Slack"),
        ]
    }

    fn account_context(&self, window: &str) -> AccountContext {
        let id = TEAM_ID
            .find(window)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let name = TEAM_NAME
            .captures(window)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        AccountContext { id, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_token() -> String {
        format!("xoxc-1234567890-1234567890123-1234567890123-{}", "ab12cd34".repeat(8))
    }

    #[test]
    fn accepts_canonical_session_token() {
        assert!(Slack.is_valid_token(&canonical_token()));
    }

    #[test]
    fn accepts_session_cookie_value() {
        assert!(Slack.is_valid_token("xoxd-Ab3%2FCdEfGh9kLmNoPqRsTuVwXyZ01234"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(!Slack.is_valid_token(""));
        assert!(!Slack.is_valid_token("xoxc-"));
        assert!(!Slack.is_valid_token("xoxc-123-456"));
        assert!(!Slack.is_valid_token("hunter2"));
    }

    #[test]
    fn finds_token_with_leading_noise() {
        let buried = format!("\u{fffd}\u{fffd}junk{}", canonical_token());
        assert_eq!(Slack.find_token(&buried), Some(canonical_token()));
    }

    #[test]
    fn context_prefers_team_markers() {
        let ctx = Slack.account_context(r#"...T0ABCDEF12..."name":"acme-corp"..."#);
        assert_eq!(ctx.id, "T0ABCDEF12");
        assert_eq!(ctx.name, "acme-corp");
    }

    #[test]
    fn macos_candidates_try_sandboxed_layout_first() {
        let locs = Slack.store_candidates(Os::MacOs, Path::new("/Users/u"));
        assert!(
            locs[0]
                .store_path
                .to_string_lossy()
                .contains("Containers/com.tinyspeck.slackmacgap")
        );
        assert!(locs.len() >= 6);
    }
}
