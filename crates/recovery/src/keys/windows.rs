//! Windows: the app's "Local State" JSON carries the AES key, base64-encoded
//! and protected with DPAPI under the current user's account.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

/// Prefix DPAPI-wrapped key blobs carry inside "Local State".
const DPAPI_PREFIX: &[u8] = b"DPAPI";

pub(crate) fn derive(local_state: &Path) -> Option<Vec<u8>> {
    let wrapped = encrypted_key_from_local_state(local_state)?;
    dpapi_unprotect(&wrapped)
}

/// Read `os_crypt.encrypted_key`, decode it, and strip the DPAPI prefix.
/// Portable; only the unprotect step needs the OS.
pub(crate) fn encrypted_key_from_local_state(local_state: &Path) -> Option<Vec<u8>> {
    let content = match std::fs::read_to_string(local_state) {
        Ok(content) => content,
        Err(e) => {
            debug!(file = %local_state.display(), error = %e, "Local State not readable");
            return None;
        }
    };
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    let encoded = json.get("os_crypt")?.get("encrypted_key")?.as_str()?;
    let decoded = BASE64.decode(encoded).ok()?;
    if !decoded.starts_with(DPAPI_PREFIX) {
        debug!("encrypted key missing DPAPI prefix");
        return None;
    }
    Some(decoded[DPAPI_PREFIX.len()..].to_vec())
}

#[cfg(windows)]
fn dpapi_unprotect(data: &[u8]) -> Option<Vec<u8>> {
    use std::ptr::null_mut;

    use winapi::um::dpapi::CryptUnprotectData;
    use winapi::um::winbase::LocalFree;
    use winapi::um::wincrypt::CRYPTOAPI_BLOB;

    let mut input = data.to_vec();
    let mut blob_in = CRYPTOAPI_BLOB {
        cbData: input.len() as u32,
        pbData: input.as_mut_ptr(),
    };
    let mut blob_out = CRYPTOAPI_BLOB {
        cbData: 0,
        pbData: null_mut(),
    };

    let ok = unsafe {
        CryptUnprotectData(
            &mut blob_in,
            null_mut(),
            null_mut(),
            null_mut(),
            null_mut(),
            0,
            &mut blob_out,
        )
    };
    if ok == 0 || blob_out.pbData.is_null() {
        debug!("CryptUnprotectData refused the key blob");
        return None;
    }

    let out =
        unsafe { std::slice::from_raw_parts(blob_out.pbData, blob_out.cbData as usize).to_vec() };
    unsafe {
        LocalFree(blob_out.pbData as _);
    }
    Some(out)
}

#[cfg(not(windows))]
fn dpapi_unprotect(_data: &[u8]) -> Option<Vec<u8>> {
    debug!("DPAPI is unavailable on this OS");
    None
}
