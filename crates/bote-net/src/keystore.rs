//! Destination keypair persistence
//!
//! A keyfile holds two lines: the public destination, then the private key
//! material, both in I2P base64.

use crate::addr::Addr;
use crate::control::SamClient;
use crate::error::{Result, SamError};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// A destination keypair
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    public: Addr,
    private: String,
}

impl Destination {
    pub fn new(public: Addr, private: impl Into<String>) -> Self {
        Self {
            public,
            private: private.into(),
        }
    }

    pub fn public(&self) -> &Addr {
        &self.public
    }

    /// Private key material; sent only in SESSION CREATE.
    pub fn private(&self) -> &str {
        &self.private
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("public", &self.public)
            .field("private", &"[redacted]")
            .finish()
    }
}

/// Read a keyfile written by [`write_keyfile`].
pub async fn read_keyfile(path: &Path) -> Result<Destination> {
    let contents = fs::read_to_string(path).await?;
    let corrupt = |reason: &str| SamError::KeyfileCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut lines = contents.lines().map(str::trim);
    let public = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| corrupt("missing public destination"))?;
    let private = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| corrupt("missing private key"))?;
    let public = Addr::new(public).map_err(|_| corrupt("public destination is not base64"))?;

    Ok(Destination::new(public, private))
}

/// Create a new keyfile; fails if one already exists.
pub async fn write_keyfile(path: &Path, dest: &Destination) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(format!("{}\n{}\n", dest.public, dest.private).as_bytes())
        .await?;
    file.sync_all().await?;
    Ok(())
}

/// Load the keyfile at `path`, generating and saving a new destination if
/// the file does not exist yet.
pub async fn ensure_keyfile(client: &SamClient, path: &Path) -> Result<Destination> {
    match fs::metadata(path).await {
        Ok(_) => {
            let dest = read_keyfile(path).await?;
            debug!("Loaded destination {} from {}", dest.public.short(), path.display());
            return Ok(dest);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let dest = client.generate_destination().await?;
    match write_keyfile(path, &dest).await {
        Ok(()) => info!(
            "Generated destination {} into {}",
            dest.public.short(),
            path.display()
        ),
        // another process created it first
        Err(SamError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    read_keyfile(path).await
}
