/// Shared data structures for the locker state
///
/// These structs represent the data model that flows between
/// the database layer, the hydration pipeline and the UI layer.

use iced::widget::image::Handle;
use std::sync::Arc;

/// One dirt entry as stored in the `Dirt` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtRecord {
    /// Unique display key, e.g. "123456789012345678-4"
    pub indexation_id: String,
    /// Discord user id (numeric, kept as text)
    pub user_id: String,
    /// Owning attachment, one stored file per attachment
    pub attachment_id: i64,
    /// Username cached at the time the entry was added
    pub username: String,
    pub notes: String,
}

/// Layout of the information string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoFormat {
    /// Plain lines for the grid cell
    Display,
    /// Markdown that pastes cleanly into a Discord message
    Discord,
}

impl DirtRecord {
    pub fn information_string(&self, format: InfoFormat) -> String {
        let notes = if self.notes.trim().is_empty() {
            "None"
        } else {
            self.notes.as_str()
        };

        match format {
            InfoFormat::Display => format!(
                "Indexation ID: {}\nUsername: {}\nUser ID: {}\nNotes: {}",
                self.indexation_id, self.username, self.user_id, notes
            ),
            InfoFormat::Discord => format!(
                "**Indexation ID:** `{}`\n**User:** <@{}> (`{}`, {})\n**Notes:** {}",
                self.indexation_id, self.user_id, self.user_id, self.username, notes
            ),
        }
    }
}

/// Row in the `DiscordUser` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    /// Live dirt entries for this user
    pub total_dirt_count: i64,
    /// Only ever grows, feeds the next indexation id
    pub indexation_sequence: i64,
}

/// Row in the `Attachment` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub attachment_id: i64,
    pub content_type: String,
    pub attachment_url: String,
    pub size: i64,
}

/// Everything needed to record a new dirt entry in one transaction
#[derive(Debug, Clone)]
pub struct NewDirt {
    pub user_id: String,
    pub username: String,
    pub attachment_url: String,
    pub content_type: String,
    pub size: i64,
    pub notes: String,
}

/// What a delete removed, so the caller can clean up the disk cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedEntry {
    pub indexation_id: String,
    pub attachment_id: i64,
    pub user_id: String,
    /// The user's last entry went with this delete
    pub user_removed: bool,
}

/// A decoded, scaled image ready for the grid
#[derive(Debug, Clone)]
pub struct RowImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, kept for clipboard writes
    pub rgba: Arc<Vec<u8>>,
    pub handle: Handle,
}

impl RowImage {
    pub fn from_rgba(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image.into_raw();
        let handle = Handle::from_rgba(width, height, pixels.clone());

        Self {
            width,
            height,
            rgba: Arc::new(pixels),
            handle,
        }
    }
}

/// A fully hydrated grid row. Rebuilt on every reload, never persisted.
#[derive(Debug, Clone)]
pub struct DisplayRow {
    pub record: DirtRecord,
    pub information: String,
    /// `None` when the image could not be resolved
    pub avatar: Option<RowImage>,
    pub content: Option<RowImage>,
}

impl DisplayRow {
    /// A row that shows the record text only
    pub fn unresolved(record: DirtRecord) -> Self {
        let information = record.information_string(InfoFormat::Display);
        Self {
            record,
            information,
            avatar: None,
            content: None,
        }
    }

    pub fn indexation_id(&self) -> &str {
        &self.record.indexation_id
    }
}
