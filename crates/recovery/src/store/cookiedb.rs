//! Chromium SQLite cookie databases.
//!
//! The database is opened read-only with the immutable URI flag so a running
//! app holding the write lock does not block the scan; if that still fails,
//! the file is copied aside and the copy is read instead.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::CandidateToken;
use crate::platform::PlatformAdapter;

/// Pull token-bearing cookie rows out of a cookie database. Any failure is
/// "no token here", never an error.
pub fn scan_db(path: &Path, adapter: &dyn PlatformAdapter) -> Vec<CandidateToken> {
    if adapter.cookie_names().is_empty() {
        return Vec::new();
    }

    let (conn, scratch) = match open_readonly(path) {
        Ok(conn) => (conn, None),
        Err(e) => {
            debug!(db = %path.display(), error = %e, "read-only open failed, copying aside");
            match open_copy(path) {
                Some((conn, copy)) => (conn, Some(copy)),
                None => return Vec::new(),
            }
        }
    };

    let rows = read_rows(&conn, adapter).unwrap_or_else(|e| {
        debug!(db = %path.display(), error = %e, "cookie query failed");
        Vec::new()
    });

    drop(conn);
    if let Some(copy) = scratch {
        let _ = std::fs::remove_file(copy);
    }
    rows
}

fn read_rows(
    conn: &Connection,
    adapter: &dyn PlatformAdapter,
) -> rusqlite::Result<Vec<CandidateToken>> {
    let mut stmt = conn.prepare("SELECT name, value, encrypted_value FROM cookies")?;
    let mut rows = stmt.query([])?;

    let mut out = Vec::new();
    let mut index = 0usize;
    while let Some(row) = rows.next()? {
        index += 1;
        let name: String = row.get(0)?;
        if !adapter.cookie_names().contains(&name.as_str()) {
            continue;
        }
        let value: String = row.get(1).unwrap_or_default();
        let encrypted: Vec<u8> = row.get(2).unwrap_or_default();

        if !value.is_empty() && adapter.is_valid_token(&value) {
            out.push(CandidateToken {
                raw: value.into_bytes(),
                source_offset: index,
                encrypted: false,
                context: Default::default(),
            });
        } else if !encrypted.is_empty() {
            out.push(CandidateToken {
                raw: encrypted,
                source_offset: index,
                encrypted: true,
                context: Default::default(),
            });
        }
    }
    Ok(out)
}

fn open_readonly(path: &Path) -> rusqlite::Result<Connection> {
    let uri = format!(
        "file:{}?immutable=1",
        path.display().to_string().replace('\\', "/")
    );
    Connection::open_with_flags(
        uri,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
    )
}

fn open_copy(path: &Path) -> Option<(Connection, PathBuf)> {
    let copy = std::env::temp_dir().join(format!("sessrec-cookies-{}.db", std::process::id()));
    if let Err(e) = std::fs::copy(path, &copy) {
        debug!(db = %path.display(), error = %e, "cookie database copy failed");
        return None;
    }
    match Connection::open_with_flags(&copy, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(conn) => Some((conn, copy)),
        Err(e) => {
            debug!(error = %e, "copied cookie database unreadable");
            let _ = std::fs::remove_file(&copy);
            None
        }
    }
}
