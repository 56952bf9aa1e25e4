/// Read-through resolution of dirt pictures and avatars
///
/// Lookup order for both kinds of image:
/// 1. the on-disk cache
/// 2. the blob copy in the database (`AttachmentStorage` / `AvatarStorage`)
/// 3. the remote source (attachment URL, Discord CDN)
///
/// Whatever answers is written back to every layer above it.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::AppContext;
use crate::error::{LockerError, LockerResult};
use crate::remote::default_avatar_url;
use crate::state::data::RowImage;
use crate::state::library::Library;
use crate::storage::thumbnail::decode_scaled;

/// Which blob table an image lives in
#[derive(Debug, Clone)]
enum Blob {
    Attachment(i64),
    Avatar(String),
}

/// Resolve a dirt picture scaled to `max_size`, fetching and caching it on a miss
pub async fn content_image(
    ctx: &AppContext,
    attachment_id: i64,
    max_size: u32,
) -> LockerResult<RowImage> {
    let path = ctx.storage.dirt_picture_path(attachment_id);
    if let Some(image) = decode_cached(ctx, &path, max_size).await? {
        return Ok(image);
    }

    let bytes = stored_content(ctx, attachment_id).await?;
    ctx.storage.write(&path, &bytes).await?;
    decode_scaled(bytes, max_size).await
}

/// Resolve a user's avatar scaled to `max_size`, fetching and caching it on a miss
pub async fn avatar_image(ctx: &AppContext, user_id: &str, max_size: u32) -> LockerResult<RowImage> {
    let path = ctx.storage.avatar_path(user_id);
    if let Some(image) = decode_cached(ctx, &path, max_size).await? {
        return Ok(image);
    }

    let bytes = stored_avatar(ctx, user_id).await?;
    ctx.storage.write(&path, &bytes).await?;
    decode_scaled(bytes, max_size).await
}

/// Decode the disk copy of an image. A file that doesn't decode (empty,
/// truncated) counts as a miss so the lower layers get to replace it.
async fn decode_cached(
    ctx: &AppContext,
    path: &Path,
    max_size: u32,
) -> LockerResult<Option<RowImage>> {
    let Some(bytes) = ctx.storage.read(path).await? else {
        return Ok(None);
    };

    match decode_scaled(bytes, max_size).await {
        Ok(image) => Ok(Some(image)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "⚠️  Unreadable cached image, refetching");
            Ok(None)
        }
    }
}

/// Blob copy of a dirt picture, or the download from its attachment URL
async fn stored_content(ctx: &AppContext, attachment_id: i64) -> LockerResult<Vec<u8>> {
    let db_path = ctx.database_path().to_path_buf();
    let (stored, attachment) = tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        Ok::<_, LockerError>((
            library.stored_attachment(attachment_id)?,
            library.attachment(attachment_id)?,
        ))
    })
    .await??;

    if let Some(bytes) = stored {
        return Ok(bytes);
    }

    let attachment = attachment.ok_or_else(|| {
        LockerError::ContentUnavailable(format!("attachment {}", attachment_id))
    })?;
    debug!(attachment_id, url = %attachment.attachment_url, "Downloading dirt picture");

    let bytes = ctx.fetcher.download(&attachment.attachment_url).await?;
    store_blob(ctx, Blob::Attachment(attachment_id), bytes.clone()).await?;
    Ok(bytes)
}

/// Blob copy of an avatar, or the download from Discord
async fn stored_avatar(ctx: &AppContext, user_id: &str) -> LockerResult<Vec<u8>> {
    let db_path = ctx.database_path().to_path_buf();
    let owned_id = user_id.to_string();
    let stored = tokio::task::spawn_blocking(move || {
        Library::open(&db_path)?.stored_avatar(&owned_id)
    })
    .await??;

    match stored {
        Some(bytes) => Ok(bytes),
        None => download_avatar(ctx, user_id, None).await,
    }
}

/// Fetch the current avatar from Discord and overwrite both cached copies.
/// `avatar_url` skips the user lookup when the caller already has it.
pub async fn refresh_avatar(
    ctx: &AppContext,
    user_id: &str,
    avatar_url: Option<String>,
) -> LockerResult<Vec<u8>> {
    let bytes = download_avatar(ctx, user_id, avatar_url).await?;
    ctx.storage.write(&ctx.storage.avatar_path(user_id), &bytes).await?;
    Ok(bytes)
}

/// Persist freshly downloaded content for a new attachment
pub async fn persist_content(
    ctx: &AppContext,
    attachment_id: i64,
    bytes: Vec<u8>,
) -> LockerResult<()> {
    let path = ctx.storage.dirt_picture_path(attachment_id);
    ctx.storage.write(&path, &bytes).await?;
    store_blob(ctx, Blob::Attachment(attachment_id), bytes).await
}

/// Remove cached files left behind by a delete. Never fails.
pub async fn forget(ctx: &AppContext, attachment_id: i64, user_id: Option<&str>) {
    let paths: Vec<PathBuf> = std::iter::once(ctx.storage.dirt_picture_path(attachment_id))
        .chain(user_id.map(|id| ctx.storage.avatar_path(id)))
        .collect();

    for path in paths {
        if ctx.storage.remove(&path).await {
            debug!(path = %path.display(), "Removed cached file");
        }
    }
}

async fn download_avatar(
    ctx: &AppContext,
    user_id: &str,
    avatar_url: Option<String>,
) -> LockerResult<Vec<u8>> {
    let url = match avatar_url {
        Some(url) => url,
        None => match ctx.users.fetch_user(user_id).await? {
            Some(user) => user.avatar_url(),
            None => default_avatar_url(user_id),
        },
    };
    debug!(user_id, %url, "Downloading avatar");

    let bytes = ctx.fetcher.download(&url).await?;
    store_blob(ctx, Blob::Avatar(user_id.to_string()), bytes.clone()).await?;
    Ok(bytes)
}

async fn store_blob(ctx: &AppContext, blob: Blob, bytes: Vec<u8>) -> LockerResult<()> {
    let db_path = ctx.database_path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        match blob {
            Blob::Attachment(id) => library.store_attachment(id, &bytes),
            Blob::Avatar(user_id) => library.store_avatar(&user_id, &bytes),
        }
    })
    .await?
}
