use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use media_sort::resolver::SearchAttempt;

use crate::config::Config;
use crate::stats::RunStats;

/// Simple file logger for organize runs with buffered writes
pub struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    /// Create a new file logger, writing to ~/logs/media-sort/organize_<timestamp>.log
    pub(crate) fn new() -> Result<Self> {
        let log_dir = media_sort::config::LOG_DIR
            .clone()
            .context("Failed to get home directory")?;

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        }

        let log_path = log_dir.join(format!("organize_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")));
        Self::with_path(&log_path)
    }

    /// Create a logger appending to the given file.
    pub(crate) fn with_path(log_path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log when starting the program
    pub(crate) fn log_init(&mut self, config: &Config) {
        let _ = writeln!(self.writer, "[{}] INIT \"{}\"", Self::timestamp(), config.input.display());
        let _ = writeln!(self.writer, "  output: {}", config.output.display());
        let _ = writeln!(self.writer, "  extensions: {:?}", config.extensions);
        let _ = writeln!(self.writer, "  language: {}", config.language);
        let _ = writeln!(self.writer, "  sentinel: {}", config.sentinel);
        let _ = writeln!(self.writer, "  similarity_threshold: {}", config.similarity_threshold);
        let _ = writeln!(self.writer, "  query_interval: {:?}", config.query_interval);
        let _ = writeln!(self.writer, "  auth_interval: {:?}", config.auth_interval);
        let _ = writeln!(self.writer, "  workers: {}", config.workers);
        let _ = writeln!(self.writer, "  recurse: {}", config.recurse);
        let _ = writeln!(self.writer, "  dedupe: {}", config.dedupe);
        let _ = writeln!(self.writer, "  dryrun: {}", config.dryrun);
        let _ = writeln!(self.writer, "  verbose: {}", config.verbose);
        let _ = self.writer.flush();
    }

    /// Log a file moved to its primary destination
    pub(crate) fn log_move(&mut self, source: &Path, destination: &Path, file_index: &str) {
        let _ = writeln!(
            self.writer,
            "[{}] MOVE      {} \"{}\" -> \"{}\"",
            Self::timestamp(),
            file_index,
            source.display(),
            destination.display()
        );
        let _ = self.writer.flush();
    }

    /// Log a file diverted to the duplicates directory
    pub(crate) fn log_duplicate(&mut self, source: &Path, destination: &Path, file_index: &str, reason: &str) {
        let _ = writeln!(
            self.writer,
            "[{}] DUPLICATE {} \"{}\" -> \"{}\" | {}",
            Self::timestamp(),
            file_index,
            source.display(),
            destination.display(),
            reason
        );
        let _ = self.writer.flush();
    }

    /// Log a skipped file
    pub(crate) fn log_skip(&mut self, source: &Path, file_index: &str, reason: &str) {
        let _ = writeln!(
            self.writer,
            "[{}] SKIP      {} \"{}\" | {}",
            Self::timestamp(),
            file_index,
            source.display(),
            reason
        );
        let _ = self.writer.flush();
    }

    /// Log a failed file with its intended destination
    pub(crate) fn log_error(&mut self, source: &Path, destination: Option<&Path>, file_index: &str, error: &str) {
        let destination = destination.map_or_else(String::new, |path| format!(" -> \"{}\"", path.display()));
        let _ = writeln!(
            self.writer,
            "[{}] ERROR     {} \"{}\"{} | {}",
            Self::timestamp(),
            file_index,
            source.display(),
            destination,
            error
        );
        let _ = self.writer.flush();
    }

    /// Log failed lookups for a title
    pub(crate) fn log_search_failure(&mut self, title: &str, attempts: &[SearchAttempt]) {
        let _ = writeln!(
            self.writer,
            "[{}] SEARCH-FAILURE \"{}\"",
            Self::timestamp(),
            title
        );
        for attempt in attempts {
            let _ = writeln!(self.writer, "  {attempt}");
        }
        let _ = self.writer.flush();
    }

    /// Log final statistics
    pub(crate) fn log_stats(&mut self, stats: &RunStats) {
        let _ = writeln!(self.writer, "[{}] STATISTICS", Self::timestamp());
        let _ = writeln!(self.writer, "  Files placed:      {}", stats.files_placed);
        let _ = writeln!(self.writer, "  Files duplicated:  {}", stats.total_duplicates());
        if stats.total_duplicates() > 0 {
            let _ = writeln!(self.writer, "    - Name collision: {}", stats.files_duplicate_name);
            let _ = writeln!(self.writer, "    - Same content:   {}", stats.files_duplicate_content);
        }
        let _ = writeln!(self.writer, "  Files skipped:     {}", stats.files_skipped);
        let _ = writeln!(self.writer, "  Files failed:      {}", stats.files_failed);
        let _ = writeln!(self.writer, "  Unresolved titles: {}", stats.files_unresolved);
        let _ = writeln!(self.writer, "  Metadata lookups:  {}", stats.lookups);
        let _ = writeln!(self.writer, "  Lookups reused:    {}", stats.lookups_reused);
        let _ = writeln!(self.writer, "  Lookup failures:   {}", stats.lookup_failures);
        let _ = writeln!(
            self.writer,
            "  Total size moved:  {}",
            media_sort::format_size(stats.total_size)
        );
        let _ = writeln!(
            self.writer,
            "  Total time: {}",
            media_sort::format_duration(stats.total_duration)
        );
        let _ = writeln!(self.writer, "[{}] END", Self::timestamp());
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use media_sort::resolver::AttemptOutcome;
    use tempfile::tempdir;

    #[test]
    fn test_records_are_written() {
        let dir = tempdir().expect("tempdir");
        let log_path = dir.path().join("organize.log");
        let mut logger = FileLogger::with_path(&log_path).expect("logger");

        logger.log_move(Path::new("/in/a.mkv"), Path::new("/out/a.mkv"), "[1/3]");
        logger.log_duplicate(Path::new("/in/b.mkv"), Path::new("/out/duplicated/b.mkv"), "[2/3]", "name collision");
        logger.log_error(Path::new("/in/c.mkv"), Some(Path::new("/out/c.mkv")), "[3/3]", "permission denied");
        logger.log_search_failure(
            "Some Title",
            &[SearchAttempt {
                query: "Some Title".to_string(),
                outcome: AttemptOutcome::Failed("timeout".to_string()),
            }],
        );
        logger.log_stats(&RunStats::default());

        let content = fs::read_to_string(&log_path).expect("read log");
        assert!(content.contains("MOVE      [1/3] \"/in/a.mkv\" -> \"/out/a.mkv\""));
        assert!(content.contains("DUPLICATE [2/3]"));
        assert!(content.contains("ERROR     [3/3] \"/in/c.mkv\" -> \"/out/c.mkv\" | permission denied"));
        assert!(content.contains("SEARCH-FAILURE \"Some Title\""));
        assert!(content.contains("\"Some Title\": timeout"));
        assert!(content.contains("STATISTICS"));
        assert!(content.trim_end().ends_with("END"));
    }
}
