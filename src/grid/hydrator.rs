/// Row Hydrator: turns a raw `DirtRecord` into a display-ready row
///
/// The content image and the avatar resolve concurrently. A reload fans out
/// over every record with a bounded, order-preserving stream, so rows come
/// back in the order the records went in regardless of which fetch finishes
/// first.

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::config::AppContext;
use crate::error::{LockerError, LockerResult};
use crate::state::data::{DirtRecord, DisplayRow, InfoFormat};
use crate::storage::resolver;
use crate::storage::thumbnail::ROW_IMAGE_SIZE;

/// A record that could not be hydrated, with the reason
pub type HydrationFailure = (DirtRecord, LockerError);

/// Resolve one record into a grid row
pub async fn hydrate_row(ctx: &AppContext, record: DirtRecord) -> LockerResult<DisplayRow> {
    let information = record.information_string(InfoFormat::Display);

    let (content, avatar) = tokio::try_join!(
        resolver::content_image(ctx, record.attachment_id, ROW_IMAGE_SIZE),
        resolver::avatar_image(ctx, &record.user_id, ROW_IMAGE_SIZE),
    )?;

    debug!(indexation_id = %record.indexation_id, "Hydrated row");

    Ok(DisplayRow {
        record,
        information,
        avatar: Some(avatar),
        content: Some(content),
    })
}

/// Hydrate every record, at most `hydration_concurrency` at a time.
/// Output order matches input order; a failure only affects its own slot.
pub async fn hydrate_all(
    ctx: &AppContext,
    records: Vec<DirtRecord>,
) -> Vec<Result<DisplayRow, HydrationFailure>> {
    let limit = ctx.config.hydration_concurrency.max(1);

    stream::iter(records)
        .map(|record| async move {
            let fallback = record.clone();
            hydrate_row(ctx, record).await.map_err(|e| (fallback, e))
        })
        .buffered(limit)
        .collect()
        .await
}
