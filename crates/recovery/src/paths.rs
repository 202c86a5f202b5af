//! Candidate locations for an app's on-disk credential stores.
//!
//! Resolution is a pure function of (adapter, OS, home directory): no
//! filesystem access happens here, and unknown OS identifiers resolve to an
//! empty candidate list rather than an error.

use std::path::{Path, PathBuf};

use crate::platform::PlatformAdapter;

/// Operating systems with a known storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Windows,
    Linux,
}

impl Os {
    /// The OS this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(windows) {
            Os::Windows
        } else {
            Os::Linux
        }
    }

    /// Parse an OS identifier. Unknown names yield `None`, never a panic.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "mac" => Some(Os::MacOs),
            "windows" | "win32" => Some(Os::Windows),
            "linux" => Some(Os::Linux),
            _ => None,
        }
    }
}

/// The kind of record store at a candidate location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// A LevelDB-family directory of `.log`/`.ldb` files.
    LevelDb,
    /// A Chromium SQLite cookie database.
    CookieDb,
}

/// One place the app may keep its credential store, together with the
/// master-key file ("Local State") that protects values stored there.
#[derive(Debug, Clone)]
pub struct StoreLocation {
    /// The LevelDB directory or the cookie database file.
    pub store_path: PathBuf,
    /// The app's "Local State" JSON file (Windows master key).
    pub local_state: PathBuf,
    pub kind: StoreKind,
}

impl StoreLocation {
    /// The LevelDB store under a Chromium-style user-data root.
    pub fn leveldb(root: &Path) -> Self {
        Self {
            store_path: root.join("Local Storage").join("leveldb"),
            local_state: root.join("Local State"),
            kind: StoreKind::LevelDb,
        }
    }

    /// A cookie database below a user-data root. `db` is relative to `root`.
    pub fn cookie_db(root: &Path, db: &str) -> Self {
        Self {
            store_path: root.join(db),
            local_state: root.join("Local State"),
            kind: StoreKind::CookieDb,
        }
    }
}

/// The per-user application-support root for `name` on `os`.
pub(crate) fn app_support_root(os: Os, home: &Path, name: &str) -> PathBuf {
    match os {
        Os::MacOs => home.join("Library").join("Application Support").join(name),
        Os::Windows => home.join("AppData").join("Roaming").join(name),
        Os::Linux => home.join(".config").join(name),
    }
}

/// Both cookie-database layouts under a user-data root, newer first.
pub(crate) fn cookie_locations(root: &Path) -> Vec<StoreLocation> {
    vec![
        StoreLocation::cookie_db(root, "Network/Cookies"),
        StoreLocation::cookie_db(root, "Cookies"),
    ]
}

/// Resolve candidates for an OS given by name. Unknown identifiers return an
/// empty list.
pub fn resolve_candidates(
    adapter: &dyn PlatformAdapter,
    os_name: &str,
    home: &Path,
) -> Vec<StoreLocation> {
    match Os::from_name(os_name) {
        Some(os) => adapter.store_candidates(os, home),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    #[test]
    fn unknown_os_name_yields_empty_list() {
        let home = Path::new("/home/user");
        for platform in [Platform::Slack, Platform::Discord, Platform::Teams] {
            let adapter = platform.adapter();
            assert!(resolve_candidates(adapter.as_ref(), "plan9", home).is_empty());
        }
    }

    #[test]
    fn known_os_names_parse_case_insensitively() {
        assert_eq!(Os::from_name("Darwin"), Some(Os::MacOs));
        assert_eq!(Os::from_name("WINDOWS"), Some(Os::Windows));
        assert_eq!(Os::from_name("linux"), Some(Os::Linux));
        assert_eq!(Os::from_name(""), None);
    }

    #[test]
    fn leveldb_location_points_inside_the_root() {
        let loc = StoreLocation::leveldb(Path::new("/data/app"));
        assert!(loc.store_path.ends_with("Local Storage/leveldb"));
        assert!(loc.local_state.ends_with("Local State"));
        assert_eq!(loc.kind, StoreKind::LevelDb);
    }
}
