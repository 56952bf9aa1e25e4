use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::data::{Attachment, DeletedEntry, DirtRecord, NewDirt, UserRecord};
use super::filter::FilterSet;
use crate::error::{LockerError, LockerResult};

/// The Library manages the SQLite locker database.
/// It stores users, attachments, dirt entries, and blob copies of the
/// cached images.
///
/// Every background job opens its own `Library`: connections are never
/// shared between concurrent tasks.
pub struct Library {
    conn: Connection,
    db_path: PathBuf,
}

const DIRT_COLUMNS: &str = "indexation_id, user_id, attachment_id, username, notes";

impl Library {
    /// Open (or create) the database at `db_path` and make sure the schema exists
    pub fn open(db_path: &Path) -> LockerResult<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        // Background jobs write through their own connections at the same time
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %db_path.display(), "Opened locker database");

        let library = Library {
            conn,
            db_path: db_path.to_path_buf(),
        };
        library.init_schema()?;

        Ok(library)
    }

    /// Initialize the database schema.
    /// Creates all necessary tables and indexes if they don't exist.
    fn init_schema(&self) -> LockerResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS DiscordUser (
                user_id              TEXT PRIMARY KEY,
                username             TEXT NOT NULL,
                total_dirt_count     INTEGER NOT NULL DEFAULT 0,
                indexation_sequence  INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS Attachment (
                attachment_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                content_type    TEXT NOT NULL,
                attachment_url  TEXT NOT NULL UNIQUE,
                size            INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS Dirt (
                indexation_id   TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                attachment_id   INTEGER NOT NULL UNIQUE,
                username        TEXT NOT NULL,
                notes           TEXT NOT NULL DEFAULT '',
                added_at        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS AttachmentStorage (
                content_id  INTEGER PRIMARY KEY,
                content     BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS AvatarStorage (
                content_id  TEXT PRIMARY KEY,
                content     BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_dirt_user_id ON Dirt(user_id);",
        )?;

        Ok(())
    }

    /// Get a count of dirt entries in the locker
    #[cfg(test)]
    pub fn dirt_count(&self) -> LockerResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM Dirt", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get every dirt entry matching the filter, in insertion order
    pub fn select_dirt(&self, filter: &FilterSet) -> LockerResult<Vec<DirtRecord>> {
        let (sql, params) = match filter.predicate() {
            Some(predicate) => (
                format!(
                    "SELECT {} FROM Dirt WHERE {} ORDER BY rowid ASC",
                    DIRT_COLUMNS, predicate.clause
                ),
                predicate.params,
            ),
            None => (
                format!("SELECT {} FROM Dirt ORDER BY rowid ASC", DIRT_COLUMNS),
                Vec::new(),
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(params.iter()), map_dirt)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn find_dirt(&self, indexation_id: &str) -> LockerResult<Option<DirtRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM Dirt WHERE indexation_id = ?1", DIRT_COLUMNS),
                params![indexation_id],
                map_dirt,
            )
            .optional()?;
        Ok(record)
    }

    pub fn user(&self, user_id: &str) -> LockerResult<Option<UserRecord>> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id, username, total_dirt_count, indexation_sequence
                 FROM DiscordUser WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        total_dirt_count: row.get(2)?,
                        indexation_sequence: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn attachment(&self, attachment_id: i64) -> LockerResult<Option<Attachment>> {
        let attachment = self
            .conn
            .query_row(
                "SELECT attachment_id, content_type, attachment_url, size
                 FROM Attachment WHERE attachment_id = ?1",
                params![attachment_id],
                |row| {
                    Ok(Attachment {
                        attachment_id: row.get(0)?,
                        content_type: row.get(1)?,
                        attachment_url: row.get(2)?,
                        size: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(attachment)
    }

    /// Check whether an attachment URL is already registered
    pub fn attachment_url_exists(&self, url: &str) -> LockerResult<bool> {
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM Attachment WHERE attachment_url = ?1)",
            params![url],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Record a new dirt entry.
    ///
    /// Upserts the user, reserves the next indexation id, inserts the
    /// attachment and the dirt row, and bumps the user's counter. All of it
    /// commits together or not at all.
    pub fn record_entry(&mut self, entry: &NewDirt) -> LockerResult<DirtRecord> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO DiscordUser (user_id, username) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET username = excluded.username",
            params![entry.user_id, entry.username],
        )?;

        let sequence: i64 = tx.query_row(
            "UPDATE DiscordUser SET indexation_sequence = indexation_sequence + 1
             WHERE user_id = ?1 RETURNING indexation_sequence",
            params![entry.user_id],
            |row| row.get(0),
        )?;
        let indexation_id = format!("{}-{}", entry.user_id, sequence);

        tx.execute(
            "INSERT INTO Attachment (content_type, attachment_url, size) VALUES (?1, ?2, ?3)",
            params![entry.content_type, entry.attachment_url, entry.size],
        )
        .map_err(|e| match e.sqlite_error_code() {
            // attachment_url is the only constraint an insert here can break
            Some(ErrorCode::ConstraintViolation) => {
                LockerError::DuplicateAttachment(entry.attachment_url.clone())
            }
            _ => LockerError::from(e),
        })?;
        let attachment_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO Dirt (indexation_id, user_id, attachment_id, username, notes, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                indexation_id,
                entry.user_id,
                attachment_id,
                entry.username,
                entry.notes,
                Utc::now().timestamp(),
            ],
        )?;

        tx.execute(
            "UPDATE DiscordUser SET total_dirt_count = total_dirt_count + 1 WHERE user_id = ?1",
            params![entry.user_id],
        )?;

        tx.commit()?;

        info!(%indexation_id, attachment_id, "✅ Recorded dirt entry");

        Ok(DirtRecord {
            indexation_id,
            user_id: entry.user_id.clone(),
            attachment_id,
            username: entry.username.clone(),
            notes: entry.notes.clone(),
        })
    }

    /// Delete a dirt entry with its attachment and stored content.
    ///
    /// When it was the user's last entry the user row and the stored avatar
    /// go too. Returns `None` if no entry has this indexation id.
    pub fn delete_entry(&mut self, indexation_id: &str) -> LockerResult<Option<DeletedEntry>> {
        let tx = self.conn.transaction()?;

        let found: Option<(i64, String)> = tx
            .query_row(
                "SELECT attachment_id, user_id FROM Dirt WHERE indexation_id = ?1",
                params![indexation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((attachment_id, user_id)) = found else {
            return Ok(None);
        };

        tx.execute(
            "DELETE FROM AttachmentStorage WHERE content_id = ?1",
            params![attachment_id],
        )?;
        tx.execute(
            "DELETE FROM Attachment WHERE attachment_id = ?1",
            params![attachment_id],
        )?;
        tx.execute(
            "DELETE FROM Dirt WHERE indexation_id = ?1",
            params![indexation_id],
        )?;
        tx.execute(
            "UPDATE DiscordUser SET total_dirt_count = MAX(total_dirt_count - 1, 0)
             WHERE user_id = ?1",
            params![user_id],
        )?;

        let user_removed = remaining_for_user(&tx, &user_id)? == 0;
        if user_removed {
            tx.execute(
                "DELETE FROM AvatarStorage WHERE content_id = ?1",
                params![user_id],
            )?;
            tx.execute(
                "DELETE FROM DiscordUser WHERE user_id = ?1",
                params![user_id],
            )?;
        }

        tx.commit()?;

        info!(indexation_id, attachment_id, user_removed, "🗑️  Deleted dirt entry");

        Ok(Some(DeletedEntry {
            indexation_id: indexation_id.to_string(),
            attachment_id,
            user_id,
            user_removed,
        }))
    }

    pub fn stored_attachment(&self, attachment_id: i64) -> LockerResult<Option<Vec<u8>>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM AttachmentStorage WHERE content_id = ?1",
                params![attachment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn store_attachment(&self, attachment_id: i64, content: &[u8]) -> LockerResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO AttachmentStorage (content_id, content) VALUES (?1, ?2)",
            params![attachment_id, content],
        )?;
        Ok(())
    }

    pub fn stored_avatar(&self, user_id: &str) -> LockerResult<Option<Vec<u8>>> {
        let content = self
            .conn
            .query_row(
                "SELECT content FROM AvatarStorage WHERE content_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    pub fn store_avatar(&self, user_id: &str, content: &[u8]) -> LockerResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO AvatarStorage (content_id, content) VALUES (?1, ?2)",
            params![user_id, content],
        )?;
        Ok(())
    }
}

fn map_dirt(row: &rusqlite::Row<'_>) -> rusqlite::Result<DirtRecord> {
    Ok(DirtRecord {
        indexation_id: row.get(0)?,
        user_id: row.get(1)?,
        attachment_id: row.get(2)?,
        username: row.get(3)?,
        notes: row.get(4)?,
    })
}

fn remaining_for_user(tx: &Transaction<'_>, user_id: &str) -> rusqlite::Result<i64> {
    tx.query_row(
        "SELECT COUNT(*) FROM Dirt WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
