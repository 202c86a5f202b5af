//! Linux: no OS secret store is involved. The apps' Linux builds derive
//! their storage key from a fixed, publicly known passphrase with a single
//! PBKDF2 iteration. That weakness is upstream behavior, mirrored here.

use super::{PBKDF2_ITERATIONS_LINUX, derive_from_passphrase};
use crate::platform::PlatformAdapter;

pub(crate) fn derive(adapter: &dyn PlatformAdapter) -> Vec<u8> {
    derive_from_passphrase(
        adapter.linux_passphrase().as_bytes(),
        PBKDF2_ITERATIONS_LINUX,
    )
}
