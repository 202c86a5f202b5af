use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{AccountContext, Platform, PlatformAdapter, UNKNOWN};
use crate::paths::{Os, StoreLocation, app_support_root, cookie_locations};

/// Opaque bearer-style tokens: length-only heuristic over the JWT alphabet.
const MIN_TOKEN_LEN: usize = 50;

static OBJECT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""oid":"([0-9a-f]{8}-[0-9a-f-]{27})""#).unwrap());
static PRINCIPAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:userPrincipalName|upn)":"([^"]{1,120})""#).unwrap());

fn bearer_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'+' | b'/' | b'=' | b'-')
}

/// Microsoft Teams: session tokens live in the embedded browser's cookie
/// database (new WebView2 packaging first, classic Electron layout after).
pub struct Teams;

impl PlatformAdapter for Teams {
    fn platform(&self) -> Platform {
        Platform::Teams
    }

    fn store_candidates(&self, os: Os, home: &Path) -> Vec<StoreLocation> {
        let mut roots = Vec::new();
        match os {
            Os::Windows => {
                // New Teams keeps a WebView2 profile per package; the work
                // package ships first, the personal one after it.
                for package in ["MSTeams_8wekyb3d8bbwe", "MicrosoftTeams_8wekyb3d8bbwe"] {
                    roots.push(
                        home.join("AppData")
                            .join("Local")
                            .join("Packages")
                            .join(package)
                            .join("LocalCache")
                            .join("Microsoft")
                            .join("MSTeams")
                            .join("EBWebView"),
                    );
                }
                roots.push(app_support_root(os, home, "Microsoft").join("Teams"));
            }
            Os::MacOs => {
                roots.push(app_support_root(os, home, "Microsoft").join("Teams"));
            }
            Os::Linux => {
                roots.push(app_support_root(os, home, "Microsoft").join("Microsoft Teams"));
            }
        }

        let mut out = Vec::new();
        for root in &roots {
            // WebView2 profiles keep the databases one level down.
            if root.ends_with("EBWebView") {
                out.push(StoreLocation::cookie_db(root, "Default/Network/Cookies"));
                out.push(StoreLocation::cookie_db(root, "Default/Cookies"));
            } else {
                out.extend(cookie_locations(root));
            }
        }
        out
    }

    fn token_alphabet(&self, b: u8) -> bool {
        bearer_byte(b)
    }

    fn is_valid_token(&self, s: &str) -> bool {
        s.len() >= MIN_TOKEN_LEN && s.bytes().all(bearer_byte)
    }

    fn find_token(&self, s: &str) -> Option<String> {
        // Longest run of bearer bytes; accepted when it clears the length bar.
        let bytes = s.as_bytes();
        let mut best: Option<(usize, usize)> = None;
        let mut start = None;
        for (i, &b) in bytes.iter().enumerate() {
            match (bearer_byte(b), start) {
                (true, None) => start = Some(i),
                (false, Some(s0)) => {
                    if best.is_none_or(|(bs, be)| i - s0 > be - bs) {
                        best = Some((s0, i));
                    }
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s0) = start
            && best.is_none_or(|(bs, be)| bytes.len() - s0 > be - bs)
        {
            best = Some((s0, bytes.len()));
        }
        let (s0, e) = best?;
        let run = &s[s0..e];
        self.is_valid_token(run).then(|| run.to_string())
    }

    fn cookie_names(&self) -> &[&'static str] {
        &["skypetoken_asm", "authtoken"]
    }

    fn keychain_entries(&self) -> &[(&'static str, &'static str)] {
        &[
            ("Microsoft Teams Safe Storage", "Microsoft Teams Key"),
            ("Microsoft Teams Safe Storage", "Microsoft Teams"),
            ("Teams Safe Storage", "Teams"),
        ]
    }

    fn account_context(&self, window: &str) -> AccountContext {
        let id = OBJECT_ID
            .captures(window)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let name = PRINCIPAL
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

    #[test]
    fn accepts_long_bearer_like_string() {
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{}.{}", "a".repeat(60), "b".repeat(30));
        assert!(Teams.is_valid_token(&token));
    }

    #[test]
    fn rejects_short_or_spaced_strings() {
        assert!(!Teams.is_valid_token(""));
        assert!(!Teams.is_valid_token("short.token"));
        assert!(!Teams.is_valid_token(&format!("has spaces {}", "a".repeat(60))));
    }

    #[test]
    fn finds_longest_run_in_noise() {
        let token = "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiJ9.payloadpayloadpayloadpayload.sig";
        let text = format!("\u{0001}ab\u{0002}{token}\u{0003}");
        assert_eq!(Teams.find_token(&text).as_deref(), Some(token));
    }

    #[test]
    fn windows_candidates_prefer_webview_packaging() {
        let locs = Teams.store_candidates(Os::Windows, Path::new(r"C:\Users\u"));
        assert!(locs[0].store_path.to_string_lossy().contains("EBWebView"));
        let classic = locs.last().unwrap();
        assert!(classic.store_path.to_string_lossy().contains("Teams"));
    }
}
