//! Recovery of messaging-platform session credentials from the platform's
//! own desktop app.
//!
//! The pipeline is one-directional: candidate paths are resolved per
//! platform and OS, the app's record stores are scanned for token-shaped
//! byte ranges, encrypted candidates are decrypted with the key the OS
//! secret store protects, and the result is validated against the
//! platform's token grammar. Discord additionally has a live
//! remote-debugging fallback for when static extraction comes up empty.
//!
//! Expected misses are not errors anywhere in this crate: extraction
//! returns `Ok(None)` when no credential exists, and every per-candidate
//! failure silently advances to the next candidate.

pub mod cdp;
pub mod decrypt;
pub mod error;
pub mod extractor;
pub mod keys;
pub mod paths;
pub mod platform;
pub mod store;
mod util;

pub use error::RecoveryError;
pub use extractor::{ExtractedCredential, Extractor};
pub use keys::{DerivedKey, KeyCache};
pub use paths::{Os, StoreKind, StoreLocation};
pub use platform::{AccountContext, Platform, PlatformAdapter};
pub use util::mask_token;
