//! Flat-JSON credential cache: `{token, account_id, account_name}` per
//! platform, written with owner-only permissions.

use std::path::PathBuf;

use anyhow::Result;
use sessrec_recovery::{ExtractedCredential, Platform};

pub struct CredentialCache {
    dir: PathBuf,
}

impl CredentialCache {
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("no config directory for the current user"))?
            .join("sessrec")
            .join("credentials");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[cfg(test)]
    pub fn at(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{platform}.json"))
    }

    pub fn load(&self, platform: Platform) -> Option<ExtractedCredential> {
        let bytes = std::fs::read(self.path(platform)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn store(&self, platform: Platform, credential: &ExtractedCredential) -> Result<()> {
        let path = self.path(platform);
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_vec_pretty(credential)?)?;
        restrict_permissions(&path)?;
        Ok(())
    }

    pub fn clear(&self, platform: Platform) -> Result<()> {
        let path = self.path(platform);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}
