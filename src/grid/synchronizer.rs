/// Grid Synchronizer: the operations behind the grid's buttons
///
/// - `reload`: filtered fetch, concurrent hydration, one atomic swap
/// - `add_entry`: validate, record in one transaction, cache images
/// - `delete_entry`: transactional delete with user cascade, then cache cleanup
/// - `load_details`: the entry view
///
/// Each operation opens its own database connection on a blocking thread.

use tracing::{info, warn};

use super::hydrator;
use crate::config::AppContext;
use crate::error::{AddEntryError, AddField, LockerError, LockerResult};
use crate::remote::parse_attachment_url;
use crate::state::data::{
    Attachment, DeletedEntry, DirtRecord, DisplayRow, InfoFormat, NewDirt, RowImage, UserRecord,
};
use crate::state::filter::FilterSet;
use crate::state::library::Library;
use crate::storage::resolver;
use crate::storage::thumbnail::{decode_scaled, DETAIL_IMAGE_SIZE, ROW_IMAGE_SIZE};

/// Fallback when Discord has no username for the account
const UNKNOWN_USERNAME: &str = "Unknown";

/// Rows for the grid, most recent first
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub rows: Vec<DisplayRow>,
    /// Rows shown without images because hydration failed
    pub failed: usize,
}

/// Raw contents of the add form
#[derive(Debug, Clone, Default)]
pub struct NewEntryForm {
    pub user_id: String,
    pub attachment_url: String,
    pub notes: String,
}

/// Everything the entry view shows
#[derive(Debug, Clone)]
pub struct EntryDetails {
    pub record: DirtRecord,
    pub information: String,
    pub user: Option<UserRecord>,
    pub attachment: Option<Attachment>,
    pub avatar: Option<RowImage>,
    pub content: Option<RowImage>,
}

/// Fetch every record matching `filter` and hydrate them all before returning
pub async fn reload(ctx: &AppContext, filter: FilterSet) -> LockerResult<ReloadOutcome> {
    let db_path = ctx.database_path().to_path_buf();
    let mut records =
        tokio::task::spawn_blocking(move || Library::open(&db_path)?.select_dirt(&filter))
            .await??;

    // Newest entries on top
    records.reverse();
    info!(count = records.len(), "🔄 Reloading grid");

    let mut failed = 0;
    let rows = hydrator::hydrate_all(ctx, records)
        .await
        .into_iter()
        .map(|result| match result {
            Ok(row) => row,
            Err((record, e)) => {
                failed += 1;
                warn!(indexation_id = %record.indexation_id, error = %e, "⚠️  Showing row without images");
                DisplayRow::unresolved(record)
            }
        })
        .collect();

    Ok(ReloadOutcome { rows, failed })
}

/// Validate the add form and record a new entry.
///
/// Validation stops at the first failing check and nothing is written
/// before all of them pass. The database writes share one transaction.
pub async fn add_entry(ctx: &AppContext, form: NewEntryForm) -> Result<DisplayRow, AddEntryError> {
    let user_id = form.user_id.trim().to_string();
    if user_id.parse::<u64>().is_err() {
        return Err(AddEntryError::invalid(
            AddField::UserId,
            "Wrongly formatted UUID (Numbers only!)",
        ));
    }

    let attachment_url = form.attachment_url.trim().to_string();
    if parse_attachment_url(&attachment_url).is_none() {
        return Err(AddEntryError::invalid(AddField::AttachmentUrl, "Invalid URL"));
    }

    let user = ctx
        .users
        .fetch_user(&user_id)
        .await?
        .ok_or_else(|| AddEntryError::invalid(AddField::UserId, "This user does not exist."))?;

    let content = match ctx.fetcher.probe(&attachment_url).await {
        Ok(Some(content)) if content.is_picture() => content,
        Ok(_) => return Err(AddEntryError::invalid(AddField::AttachmentUrl, "Invalid URL")),
        Err(e) => {
            warn!(url = %attachment_url, error = %e, "Attachment probe failed");
            return Err(AddEntryError::invalid(AddField::AttachmentUrl, "Invalid URL"));
        }
    };

    let db_path = ctx.database_path().to_path_buf();
    let url = attachment_url.clone();
    let duplicate = tokio::task::spawn_blocking(move || {
        Library::open(&db_path)?.attachment_url_exists(&url)
    })
    .await
    .map_err(LockerError::from)??;
    if duplicate {
        return Err(already_registered());
    }

    let username = if user.username.trim().is_empty() {
        UNKNOWN_USERNAME.to_string()
    } else {
        user.username.clone()
    };

    let entry = NewDirt {
        user_id: user_id.clone(),
        username,
        attachment_url: attachment_url.clone(),
        content_type: content.content_type,
        size: content.size,
        notes: form.notes.trim().to_string(),
    };
    let record = commit_entry(ctx, entry).await?;

    // The entry is committed; image failures from here on only cost the thumbnails
    let (content, avatar) = tokio::join!(
        cache_new_content(ctx, record.attachment_id, &attachment_url),
        cache_new_avatar(ctx, &user_id, user.avatar_url()),
    );

    Ok(DisplayRow {
        information: record.information_string(InfoFormat::Display),
        record,
        avatar,
        content,
    })
}

/// Write the entry. Another add can register the same URL between the
/// duplicate check and this commit; that still reads as a form error.
async fn commit_entry(ctx: &AppContext, entry: NewDirt) -> Result<DirtRecord, AddEntryError> {
    let db_path = ctx.database_path().to_path_buf();
    let committed =
        tokio::task::spawn_blocking(move || Library::open(&db_path)?.record_entry(&entry))
            .await
            .map_err(LockerError::from)?;

    match committed {
        Ok(record) => Ok(record),
        Err(LockerError::DuplicateAttachment(_)) => Err(already_registered()),
        Err(e) => Err(e.into()),
    }
}

fn already_registered() -> AddEntryError {
    AddEntryError::invalid(AddField::AttachmentUrl, "This attachment is already registered.")
}

/// Delete an entry and everything that only existed for it
pub async fn delete_entry(ctx: &AppContext, indexation_id: &str) -> LockerResult<DeletedEntry> {
    let db_path = ctx.database_path().to_path_buf();
    let id = indexation_id.to_string();
    let deleted = tokio::task::spawn_blocking(move || Library::open(&db_path)?.delete_entry(&id))
        .await??
        .ok_or_else(|| LockerError::EntryNotFound(indexation_id.to_string()))?;

    let orphaned_user = deleted.user_removed.then_some(deleted.user_id.as_str());
    resolver::forget(ctx, deleted.attachment_id, orphaned_user).await;

    Ok(deleted)
}

/// Load an entry with its user and attachment rows and larger images
pub async fn load_details(ctx: &AppContext, indexation_id: &str) -> LockerResult<EntryDetails> {
    let db_path = ctx.database_path().to_path_buf();
    let id = indexation_id.to_string();
    let (record, user, attachment) = tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        let record = library
            .find_dirt(&id)?
            .ok_or_else(|| LockerError::EntryNotFound(id.clone()))?;
        let user = library.user(&record.user_id)?;
        let attachment = library.attachment(record.attachment_id)?;
        Ok::<_, LockerError>((record, user, attachment))
    })
    .await??;

    let (content, avatar) = tokio::join!(
        resolver::content_image(ctx, record.attachment_id, DETAIL_IMAGE_SIZE),
        resolver::avatar_image(ctx, &record.user_id, DETAIL_IMAGE_SIZE),
    );
    let content = image_or_none(content);
    let avatar = image_or_none(avatar);

    Ok(EntryDetails {
        information: record.information_string(InfoFormat::Display),
        record,
        user,
        attachment,
        avatar,
        content,
    })
}

async fn cache_new_content(ctx: &AppContext, attachment_id: i64, url: &str) -> Option<RowImage> {
    let bytes = match ctx.fetcher.download(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(attachment_id, error = %e, "⚠️  Could not download new attachment");
            return None;
        }
    };

    if let Err(e) = resolver::persist_content(ctx, attachment_id, bytes.clone()).await {
        warn!(attachment_id, error = %e, "⚠️  Could not cache new attachment");
    }
    decode_optional(Ok(bytes), ROW_IMAGE_SIZE).await
}

async fn cache_new_avatar(ctx: &AppContext, user_id: &str, avatar_url: String) -> Option<RowImage> {
    let bytes = resolver::refresh_avatar(ctx, user_id, Some(avatar_url)).await;
    decode_optional(bytes, ROW_IMAGE_SIZE).await
}

async fn decode_optional(bytes: LockerResult<Vec<u8>>, max_size: u32) -> Option<RowImage> {
    match bytes {
        Ok(bytes) => image_or_none(decode_scaled(bytes, max_size).await),
        Err(e) => image_or_none(Err(e)),
    }
}

fn image_or_none(image: LockerResult<RowImage>) -> Option<RowImage> {
    match image {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(error = %e, "⚠️  Image unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::thumbnail::png_bytes;
    use crate::testing::{context, FakeDirectory, FakeFetcher};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const USER: &str = "80351110224678912";
    const OTHER_USER: &str = "41771983423143937";

    struct Fixture {
        _dir: TempDir,
        ctx: AppContext,
        users: Arc<FakeDirectory>,
        fetcher: Arc<FakeFetcher>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let users = Arc::new(
                FakeDirectory::default()
                    .with_user(USER, "nelly")
                    .with_user(OTHER_USER, "getos"),
            );
            let fetcher = Arc::new(FakeFetcher::default());
            fetcher.serve("avatar", "image/png", png_bytes(32, 32));
            let ctx = context(dir.path(), users.clone(), fetcher.clone());

            Self {
                _dir: dir,
                ctx,
                users,
                fetcher,
            }
        }

        fn serve_picture(&self, url: &str) {
            self.fetcher.serve(url, "image/png", png_bytes(120, 80));
        }

        async fn add(&self, user_id: &str, url: &str) -> Result<DisplayRow, AddEntryError> {
            self.serve_picture(url);
            add_entry(
                &self.ctx,
                NewEntryForm {
                    user_id: user_id.to_string(),
                    attachment_url: url.to_string(),
                    notes: format!("from {}", url),
                },
            )
            .await
        }

        fn library(&self) -> Library {
            Library::open(self.ctx.database_path()).unwrap()
        }
    }

    fn ids(rows: &[DisplayRow]) -> Vec<&str> {
        rows.iter().map(|row| row.indexation_id()).collect()
    }

    #[tokio::test]
    async fn test_add_records_and_caches() {
        let fx = Fixture::new();

        let row = fx.add(USER, "https://cdn.test/1.png").await.unwrap();

        assert_eq!(row.indexation_id(), format!("{}-1", USER));
        assert_eq!(row.record.username, "nelly");
        assert!(row.content.is_some());
        assert!(row.avatar.is_some());

        let library = fx.library();
        assert_eq!(library.dirt_count().unwrap(), 1);
        assert_eq!(library.user(USER).unwrap().unwrap().total_dirt_count, 1);
        assert!(library.stored_attachment(row.record.attachment_id).unwrap().is_some());
        assert!(library.stored_avatar(USER).unwrap().is_some());
        assert!(fx.ctx.storage.avatar_path(USER).exists());
    }

    #[tokio::test]
    async fn test_non_numeric_user_id_never_mutates() {
        let fx = Fixture::new();

        let err = fx.add("nelly", "https://cdn.test/1.png").await.unwrap_err();

        assert_eq!(err.field(), Some(AddField::UserId));
        assert_eq!(fx.library().dirt_count().unwrap(), 0);
        // Fail-fast: no lookup was attempted
        assert_eq!(fx.users.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_url_is_rejected_before_lookup() {
        let fx = Fixture::new();

        let err = fx.add(USER, "cdn.test/1.png").await.unwrap_err();

        assert_eq!(err.field(), Some(AddField::AttachmentUrl));
        assert_eq!(fx.users.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_rejected() {
        let fx = Fixture::new();

        let err = fx.add("123", "https://cdn.test/1.png").await.unwrap_err();

        assert!(matches!(
            err,
            AddEntryError::Invalid { field: AddField::UserId, ref message } if message == "This user does not exist."
        ));
        assert_eq!(fx.library().dirt_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_picture_url_is_rejected() {
        let fx = Fixture::new();
        fx.fetcher
            .serve("https://cdn.test/page", "text/html", b"<html>".to_vec());

        let err = add_entry(
            &fx.ctx,
            NewEntryForm {
                user_id: USER.to_string(),
                attachment_url: "https://cdn.test/page".to_string(),
                notes: String::new(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.field(), Some(AddField::AttachmentUrl));
        assert_eq!(fx.library().dirt_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_url_never_mutates() {
        let fx = Fixture::new();
        fx.add(USER, "https://cdn.test/1.png").await.unwrap();

        let err = fx.add(OTHER_USER, "https://cdn.test/1.png").await.unwrap_err();

        assert!(matches!(
            err,
            AddEntryError::Invalid { field: AddField::AttachmentUrl, ref message } if message == "This attachment is already registered."
        ));
        let library = fx.library();
        assert_eq!(library.dirt_count().unwrap(), 1);
        assert!(library.user(OTHER_USER).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_url_registered_during_add_is_a_form_error() {
        let fx = Fixture::new();
        fx.add(USER, "https://cdn.test/1.png").await.unwrap();

        // Passed the duplicate check, then lost the race to the first add
        let err = commit_entry(
            &fx.ctx,
            NewDirt {
                user_id: OTHER_USER.to_string(),
                username: "getos".to_string(),
                attachment_url: "https://cdn.test/1.png".to_string(),
                content_type: "image/png".to_string(),
                size: 0,
                notes: String::new(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AddEntryError::Invalid { field: AddField::AttachmentUrl, ref message } if message == "This attachment is already registered."
        ));
        let library = fx.library();
        assert_eq!(library.dirt_count().unwrap(), 1);
        assert!(library.user(OTHER_USER).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_broken_download_after_commit_keeps_entry() {
        let fx = Fixture::new();
        fx.serve_picture("https://cdn.test/flaky.png");
        fx.fetcher.break_url("https://cdn.test/flaky.png");

        let row = add_entry(
            &fx.ctx,
            NewEntryForm {
                user_id: USER.to_string(),
                attachment_url: "https://cdn.test/flaky.png".to_string(),
                notes: String::new(),
            },
        )
        .await
        .unwrap();

        assert!(row.content.is_none());
        assert_eq!(fx.library().dirt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reload_is_most_recent_first_regardless_of_latency() {
        let fx = Fixture::new();
        let mut added = Vec::new();
        for i in 0..6 {
            let url = format!("https://cdn.test/{}.png", i);
            added.push(fx.add(USER, &url).await.unwrap().indexation_id().to_string());
        }

        // Wipe the picture caches so every row goes back to the network,
        // with the earliest entries answering slowest
        for i in 0..6u64 {
            let url = format!("https://cdn.test/{}.png", i);
            fx.fetcher.delay(&url, Duration::from_millis((6 - i) * 15));
        }
        let dirt_dir = fx.ctx.config.cache_dir.join("dirt");
        for entry in std::fs::read_dir(dirt_dir).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }
        rusqlite::Connection::open(fx.ctx.database_path())
            .unwrap()
            .execute("DELETE FROM AttachmentStorage", [])
            .unwrap();

        let outcome = reload(&fx.ctx, FilterSet::default()).await.unwrap();

        added.reverse();
        assert_eq!(ids(&outcome.rows), added.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(outcome.failed, 0);
        assert!(outcome.rows.iter().all(|row| row.content.is_some()));
    }

    #[tokio::test]
    async fn test_failed_row_does_not_hide_others() {
        let fx = Fixture::new();
        let first = fx.add(USER, "https://cdn.test/a.png").await.unwrap();
        let broken = fx.add(USER, "https://cdn.test/b.png").await.unwrap();
        let last = fx.add(OTHER_USER, "https://cdn.test/c.png").await.unwrap();

        std::fs::remove_file(fx.ctx.storage.dirt_picture_path(broken.record.attachment_id)).unwrap();
        rusqlite::Connection::open(fx.ctx.database_path())
            .unwrap()
            .execute(
                "DELETE FROM AttachmentStorage WHERE content_id = ?1",
                [broken.record.attachment_id],
            )
            .unwrap();
        fx.fetcher.break_url("https://cdn.test/b.png");

        let outcome = reload(&fx.ctx, FilterSet::default()).await.unwrap();

        assert_eq!(
            ids(&outcome.rows),
            vec![last.indexation_id(), broken.indexation_id(), first.indexation_id()]
        );
        assert_eq!(outcome.failed, 1);
        assert!(outcome.rows[1].content.is_none());
        assert!(outcome.rows[0].content.is_some());
        assert!(outcome.rows[2].content.is_some());
    }

    #[tokio::test]
    async fn test_reload_applies_filter() {
        let fx = Fixture::new();
        fx.add(USER, "https://cdn.test/a.png").await.unwrap();
        let other = fx.add(OTHER_USER, "https://cdn.test/b.png").await.unwrap();

        let filter = FilterSet {
            username: "get".to_string(),
            ..Default::default()
        };
        let outcome = reload(&fx.ctx, filter).await.unwrap();

        assert_eq!(ids(&outcome.rows), vec![other.indexation_id()]);
    }

    #[tokio::test]
    async fn test_delete_second_to_last_keeps_user() {
        let fx = Fixture::new();
        let first = fx.add(USER, "https://cdn.test/a.png").await.unwrap();
        let second = fx.add(USER, "https://cdn.test/b.png").await.unwrap();

        let deleted = delete_entry(&fx.ctx, first.indexation_id()).await.unwrap();

        assert!(!deleted.user_removed);
        let library = fx.library();
        assert_eq!(library.dirt_count().unwrap(), 1);
        assert!(library.find_dirt(second.indexation_id()).unwrap().is_some());
        assert_eq!(library.user(USER).unwrap().unwrap().total_dirt_count, 1);
        assert!(library.stored_avatar(USER).unwrap().is_some());
        assert!(!fx.ctx.storage.dirt_picture_path(first.record.attachment_id).exists());
        assert!(fx.ctx.storage.avatar_path(USER).exists());
    }

    #[tokio::test]
    async fn test_delete_last_entry_removes_user_and_avatar() {
        let fx = Fixture::new();
        let only = fx.add(USER, "https://cdn.test/a.png").await.unwrap();
        let kept = fx.add(OTHER_USER, "https://cdn.test/b.png").await.unwrap();

        let deleted = delete_entry(&fx.ctx, only.indexation_id()).await.unwrap();

        assert!(deleted.user_removed);
        let library = fx.library();
        assert!(library.user(USER).unwrap().is_none());
        assert!(library.stored_avatar(USER).unwrap().is_none());
        assert!(library.attachment(only.record.attachment_id).unwrap().is_none());
        assert!(!fx.ctx.storage.avatar_path(USER).exists());

        assert!(library.user(OTHER_USER).unwrap().is_some());
        assert!(library.find_dirt(kept.indexation_id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_survives_missing_cache_file() {
        let fx = Fixture::new();
        let row = fx.add(USER, "https://cdn.test/a.png").await.unwrap();
        std::fs::remove_file(fx.ctx.storage.dirt_picture_path(row.record.attachment_id)).unwrap();

        assert!(delete_entry(&fx.ctx, row.indexation_id()).await.is_ok());
        assert_eq!(fx.library().dirt_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_entry() {
        let fx = Fixture::new();
        assert!(matches!(
            delete_entry(&fx.ctx, "1-1").await,
            Err(LockerError::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_details() {
        let fx = Fixture::new();
        let row = fx.add(USER, "https://cdn.test/a.png").await.unwrap();

        let details = load_details(&fx.ctx, row.indexation_id()).await.unwrap();

        assert_eq!(details.record, row.record);
        assert_eq!(details.user.unwrap().username, "nelly");
        let attachment = details.attachment.unwrap();
        assert_eq!(attachment.attachment_url, "https://cdn.test/a.png");
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(details.content.unwrap().width, 120);
    }
}
