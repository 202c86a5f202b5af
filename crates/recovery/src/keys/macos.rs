//! macOS: the app stores a random password in the login keychain and derives
//! its storage key from it. Service/account names vary with app packaging,
//! so the known variants are tried in priority order.

use std::process::Command;

use tracing::debug;

use super::{PBKDF2_ITERATIONS_MACOS, derive_from_passphrase};
use crate::platform::PlatformAdapter;

pub(crate) fn derive(adapter: &dyn PlatformAdapter) -> Option<Vec<u8>> {
    for (service, account) in adapter.keychain_entries() {
        if let Some(password) = keychain_password(service, account) {
            debug!(service, "keychain password found");
            return Some(derive_from_passphrase(
                password.as_bytes(),
                PBKDF2_ITERATIONS_MACOS,
            ));
        }
    }
    debug!(platform = %adapter.platform(), "no keychain entry matched");
    None
}

/// One generic-password lookup. A refused or missing entry is `None`.
fn keychain_password(service: &str, account: &str) -> Option<String> {
    let output = Command::new("security")
        .args(["find-generic-password", "-w", "-s", service, "-a", account])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let password = String::from_utf8(output.stdout).ok()?;
    let password = password.trim();
    if password.is_empty() {
        None
    } else {
        Some(password.to_string())
    }
}
