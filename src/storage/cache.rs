use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::LockerResult;

/// Distinguishes staging files of writes running at the same time
static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// On-disk cache for dirt pictures and avatars.
///
/// Layout under the cache root:
/// - `dirt/<attachment_id>.img`
/// - `avatars/<user_id>.png`
#[derive(Debug, Clone)]
pub struct DirtStorage {
    dirt_dir: PathBuf,
    avatar_dir: PathBuf,
}

impl DirtStorage {
    /// Create the cache sections under `root` if they don't exist
    pub fn new(root: &Path) -> LockerResult<Self> {
        let dirt_dir = root.join("dirt");
        let avatar_dir = root.join("avatars");

        std::fs::create_dir_all(&dirt_dir)?;
        std::fs::create_dir_all(&avatar_dir)?;

        Ok(Self {
            dirt_dir,
            avatar_dir,
        })
    }

    /// Get the cache path for a dirt picture (doesn't fetch, just returns the expected path)
    pub fn dirt_picture_path(&self, attachment_id: i64) -> PathBuf {
        self.dirt_dir.join(format!("{}.img", attachment_id))
    }

    pub fn avatar_path(&self, user_id: &str) -> PathBuf {
        self.avatar_dir.join(format!("{}.png", user_id))
    }

    /// Read a cached file, `None` if it isn't cached
    pub async fn read(&self, path: &Path) -> LockerResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through to the cache, replacing anything already there.
    ///
    /// The bytes go to a sibling staging file that is then renamed over
    /// `path`, so readers see either the old file or the complete new one.
    pub async fn write(&self, path: &Path, content: &[u8]) -> LockerResult<()> {
        let staging = staging_path(path);

        if let Err(e) = stage_and_rename(&staging, path, content).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), bytes = content.len(), "Cached file");
        Ok(())
    }

    /// Best-effort removal. A missing file is fine; anything else is logged
    /// and swallowed. Returns whether a file was actually removed.
    pub async fn remove(&self, path: &Path) -> bool {
        match fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "⚠️  Could not remove cached file");
                false
            }
        }
    }
}

/// `<name>.<pid>.<seq>.tmp` next to the target file
fn staging_path(path: &Path) -> PathBuf {
    let sequence = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".{}.{}.tmp", std::process::id(), sequence));
    path.with_file_name(name)
}

async fn stage_and_rename(staging: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(staging, content).await?;
    fs::rename(staging, path).await
}
