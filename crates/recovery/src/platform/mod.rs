//! Platform model: the three supported apps and the adapter trait that
//! captures everything platform-specific about their credential storage.

mod discord;
mod slack;
mod teams;

pub use discord::Discord;
pub use slack::Slack;
pub use teams::Teams;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::RecoveryError;
use crate::paths::{Os, StoreLocation};

/// Sentinel for account fields the scanner could not resolve.
pub const UNKNOWN: &str = "unknown";

/// The supported messaging platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Slack,
    Discord,
    Teams,
}

impl Platform {
    pub fn adapter(self) -> Box<dyn PlatformAdapter> {
        match self {
            Platform::Slack => Box::new(Slack),
            Platform::Discord => Box::new(Discord),
            Platform::Teams => Box::new(Teams),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Discord => "discord",
            Platform::Teams => "teams",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slack" => Ok(Platform::Slack),
            "discord" => Ok(Platform::Discord),
            "teams" | "msteams" => Ok(Platform::Teams),
            other => Err(RecoveryError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Best-effort account identity recovered from the bytes around a token hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub id: String,
    pub name: String,
}

impl Default for AccountContext {
    fn default() -> Self {
        Self {
            id: UNKNOWN.to_string(),
            name: UNKNOWN.to_string(),
        }
    }
}

/// Description of the live-debugging fallback for platforms that expose one.
#[derive(Debug, Clone, Copy)]
pub struct CdpProbe {
    /// Process names the app runs under, per OS spelling.
    pub process_names: &'static [&'static str],
    /// Substring identifying the app's own web surface by URL.
    pub page_domain: &'static str,
    /// Substring identifying the app's own web surface by title.
    pub page_title: &'static str,
    /// Expression evaluated in the app's JS runtime to read the token.
    pub eval_expression: &'static str,
}

/// Everything the generic recovery engine needs to know about one platform.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Ordered store candidates, newer packaging layouts first. Empty when
    /// the OS has no known layout for this app.
    fn store_candidates(&self, os: Os, home: &Path) -> Vec<StoreLocation>;

    /// Literal byte sequences that prefix plaintext tokens in the record
    /// store. The marker bytes are part of the token.
    fn plaintext_markers(&self) -> &[&'static [u8]] {
        &[]
    }

    /// Literal marker preceding base64 versioned ciphertext in the record
    /// store, when the app encrypts stored tokens.
    fn encrypted_marker(&self) -> Option<&'static [u8]> {
        None
    }

    /// Whether `b` may appear inside a token for this platform.
    fn token_alphabet(&self, b: u8) -> bool;

    /// The platform's token grammar, applied to a whole candidate string.
    fn is_valid_token(&self, s: &str) -> bool;

    /// Find a grammar-matching token anywhere inside decrypted plaintext.
    /// Some schemes prepend integrity-hash bytes, so offset 0 is not assumed.
    fn find_token(&self, s: &str) -> Option<String>;

    /// Cookie rows that carry this platform's session token.
    fn cookie_names(&self) -> &[&'static str] {
        &[]
    }

    /// macOS keychain (service, account) pairs, new packaging before legacy.
    fn keychain_entries(&self) -> &[(&'static str, &'static str)];

    /// The fixed passphrase the app's Linux build derives its key from.
    fn linux_passphrase(&self) -> &'static str {
        "peanuts"
    }

    /// Best-effort account id/name from the text around a token hit.
    fn account_context(&self, window: &str) -> AccountContext {
        let _ = window;
        AccountContext::default()
    }

    /// Live-debugging fallback, for platforms whose desktop app exposes one.
    fn cdp_probe(&self) -> Option<CdpProbe> {
        None
    }

    /// Candidate app binaries for relaunching with a debugging port open.
    fn launch_candidates(&self, os: Os, home: &Path) -> Vec<PathBuf> {
        let _ = (os, home);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        for p in [Platform::Slack, Platform::Discord, Platform::Teams] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("irc".parse::<Platform>().is_err());
    }

    #[test]
    fn default_context_is_unknown() {
        let ctx = AccountContext::default();
        assert_eq!(ctx.id, UNKNOWN);
        assert_eq!(ctx.name, UNKNOWN);
    }
}
