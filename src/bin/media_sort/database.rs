//! `SQLite` fingerprint index for `mediasort`.
//!
//! Remembers the content fingerprint of every placed file
//! so that later runs can recognize the same content under a different name.

#![allow(clippy::cast_possible_wrap)]

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use media_sort::fingerprint::ContentFingerprint;

/// Default database filename.
const DATABASE_FILENAME: &str = "fingerprints.db";

/// Fingerprints of placed files.
pub struct FingerprintIndex {
    connection: Connection,
}

/// A previously placed file with the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    pub full_path: PathBuf,
}

impl FingerprintIndex {
    /// Get the database path.
    ///
    /// Uses the platform-specific local data directory:
    /// - Windows: `%LOCALAPPDATA%\media-sort\fingerprints.db`
    /// - macOS: `~/Library/Application Support/media-sort/fingerprints.db`
    /// - Linux: `~/.local/share/media-sort/fingerprints.db`
    pub fn path() -> PathBuf {
        media_sort::config::data_dir().join(DATABASE_FILENAME)
    }

    /// Open or create the database at the default path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_default() -> Result<Self> {
        let path = Self::path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }

        let connection =
            Connection::open(&path).with_context(|| format!("Failed to open database: {}", path.display()))?;

        connection
            .busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        let index = Self { connection };
        index.initialize()?;

        Ok(index)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    #[cfg(test)]
    fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let index = Self { connection };
        index.initialize()?;

        Ok(index)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<()> {
        self.connection
            .execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS placed_files (
                    id INTEGER PRIMARY KEY,
                    full_path TEXT NOT NULL UNIQUE,
                    fingerprint TEXT NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    placed_time INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_placed_fingerprint ON placed_files(fingerprint, size_bytes);

                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )
            .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Insert or update the fingerprint for a placed file.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub fn upsert(&self, path: &Path, fingerprint: &ContentFingerprint, size_bytes: u64) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        self.connection
            .execute(
                r"
                INSERT INTO placed_files (full_path, fingerprint, chunk_count, size_bytes, placed_time)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(full_path) DO UPDATE SET
                    fingerprint = excluded.fingerprint,
                    chunk_count = excluded.chunk_count,
                    size_bytes = excluded.size_bytes,
                    placed_time = excluded.placed_time
                ",
                params![
                    path.to_string_lossy(),
                    fingerprint.to_hex(),
                    fingerprint.chunk_count() as i64,
                    size_bytes as i64,
                    now,
                ],
            )
            .context("Failed to insert fingerprint")?;

        Ok(())
    }

    /// Find a placed file with the same fingerprint and size that still exists on disk.
    ///
    /// Entries whose file has disappeared are removed.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub fn find_existing(&self, fingerprint: &ContentFingerprint, size_bytes: u64) -> Result<Option<IndexedFile>> {
        loop {
            let Some(found) = self.find(fingerprint, size_bytes)? else {
                return Ok(None);
            };
            if found.full_path.is_file() {
                return Ok(Some(found));
            }
            self.remove(&found.full_path)?;
        }
    }

    /// Find any entry with the same fingerprint and size.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub fn find(&self, fingerprint: &ContentFingerprint, size_bytes: u64) -> Result<Option<IndexedFile>> {
        self.connection
            .query_row(
                "SELECT full_path FROM placed_files WHERE fingerprint = ?1 AND size_bytes = ?2 ORDER BY id LIMIT 1",
                params![fingerprint.to_hex(), size_bytes as i64],
                |row| {
                    Ok(IndexedFile {
                        full_path: PathBuf::from(row.get::<_, String>(0)?),
                    })
                },
            )
            .optional()
            .context("Failed to query fingerprint")
    }

    /// Remove the entry for a path.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub fn remove(&self, path: &Path) -> Result<bool> {
        let removed = self
            .connection
            .execute(
                "DELETE FROM placed_files WHERE full_path = ?1",
                params![path.to_string_lossy()],
            )
            .context("Failed to remove fingerprint")?;
        Ok(removed > 0)
    }

    /// Number of indexed files.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM placed_files", [], |row| row.get(0))
            .context("Failed to count fingerprints")?;
        Ok(count as u64)
    }
}
