//! Destination layout, collision handling and moves.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::resolver::{MetadataMatch, UNKNOWN_TITLE};
use crate::title::{CanonicalTitle, sanitize_name};

pub const DOCUMENTS_DIR: &str = "documents";
pub const SUBTITLES_DIR: &str = "subtitles";
pub const DUPLICATED_DIR: &str = "duplicated";

/// Directory name where pruning of emptied source directories stops.
pub const DEFAULT_SENTINEL: &str = "Animations";

const DOCUMENT_EXTENSIONS: &[&str] = &["doc", "docx", "txt", "pdf"];
const SUBTITLE_ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z"];

/// Snapshot of a source file taken at scan time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    /// File name in NFC form.
    pub name: String,
    /// Lowercase extension without the dot.
    pub extension: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// How a file is filed, decided by its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Media,
    Document,
    SubtitleArchive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    Primary,
    /// The primary destination was taken so the file goes to the duplicates directory.
    DivertedDuplicate,
}

/// Where a file should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementDecision {
    pub directory: PathBuf,
    pub file_name: String,
    pub outcome: PlacementOutcome,
}

/// Computes destinations under an output root and moves files there.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    root: PathBuf,
    sentinel: String,
    boundary: Option<PathBuf>,
    dry_run: bool,
}

impl RawFile {
    /// Read file name, extension, size and modification time.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).with_context(|| format!("Failed to read metadata: {}", path.display()))?;
        if !metadata.is_file() {
            anyhow::bail!("Not a file: {}", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
            name: crate::get_normalized_file_name(path)?,
            extension: crate::path_to_file_extension_string(path),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }

    #[must_use]
    pub fn category(&self) -> FileCategory {
        FileCategory::from_extension(&self.extension)
    }
}

impl FileCategory {
    #[must_use]
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.to_lowercase();
        if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
            Self::Document
        } else if SUBTITLE_ARCHIVE_EXTENSIONS.contains(&extension.as_str()) {
            Self::SubtitleArchive
        } else {
            Self::Media
        }
    }
}

impl PlacementDecision {
    #[must_use]
    pub fn destination(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.outcome == PlacementOutcome::DivertedDuplicate
    }
}

impl fmt::Display for PlacementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::DivertedDuplicate => write!(f, "duplicate"),
        }
    }
}

impl PlacementEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            boundary: None,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Never prune this directory or anything outside it.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<PathBuf>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Compute decisions without touching the filesystem.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory a file belongs in when nothing is in the way.
    ///
    /// `root/<year>/<quarter>/<title>/<resolution>` for media,
    /// fixed directories for documents and subtitle archives.
    #[must_use]
    pub fn primary_directory(&self, file: &RawFile, title: &CanonicalTitle, matched: &MetadataMatch) -> PathBuf {
        match file.category() {
            FileCategory::Document => self.root.join(DOCUMENTS_DIR),
            FileCategory::SubtitleArchive => self.root.join(SUBTITLES_DIR),
            FileCategory::Media => {
                let display_title = sanitize_name(&matched.title);
                let display_title = if display_title.is_empty() {
                    UNKNOWN_TITLE.to_string()
                } else {
                    display_title
                };
                let resolution = sanitize_name(&title.resolution);
                let resolution = if resolution.is_empty() {
                    crate::title::UNKNOWN_RESOLUTION.to_string()
                } else {
                    resolution
                };
                self.root
                    .join(matched.year_label())
                    .join(matched.quarter_label())
                    .join(display_title)
                    .join(resolution)
            }
        }
    }

    /// Decide where a file goes.
    ///
    /// A taken primary destination diverts the file to the duplicates directory,
    /// with a ` (n)` counter if the name is taken there too.
    #[must_use]
    pub fn place(&self, file: &RawFile, title: &CanonicalTitle, matched: &MetadataMatch) -> PlacementDecision {
        let directory = self.primary_directory(file, title, matched);
        let destination = directory.join(&file.name);
        if !destination.exists() || destination == file.path {
            return PlacementDecision {
                directory,
                file_name: file.name.clone(),
                outcome: PlacementOutcome::Primary,
            };
        }

        self.divert(file)
    }

    /// Send a file to the duplicates directory under a name that is not taken.
    #[must_use]
    pub fn divert(&self, file: &RawFile) -> PlacementDecision {
        let directory = self.root.join(DUPLICATED_DIR);
        let file_name = crate::path_to_filename_string(&crate::get_unique_path(&directory, &file.name));
        PlacementDecision {
            directory,
            file_name,
            outcome: PlacementOutcome::DivertedDuplicate,
        }
    }

    /// Move the file to its decided destination and prune emptied source directories.
    ///
    /// Returns the final path. On failure the source file stays where it was.
    pub fn execute(&self, file: &RawFile, decision: &PlacementDecision) -> Result<PathBuf> {
        let destination = decision.destination();
        if self.dry_run || destination == file.path {
            return Ok(destination);
        }
        if destination.exists() {
            anyhow::bail!("Destination already exists: {}", destination.display());
        }

        fs::create_dir_all(&decision.directory)
            .with_context(|| format!("Failed to create directory: {}", decision.directory.display()))?;

        move_file(&file.path, &destination).with_context(|| {
            format!(
                "Failed to move {} -> {}",
                file.path.display(),
                destination.display()
            )
        })?;

        if let Some(parent) = file.path.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(destination)
    }

    /// Remove empty directories walking up from `start`.
    ///
    /// Stops at the sentinel directory, the boundary, the output root or its ancestors,
    /// and at the first directory that is not empty. Returns the removed directories.
    pub fn prune_empty_dirs(&self, start: &Path) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        if self.dry_run {
            return removed;
        }

        let mut current = start.to_path_buf();
        while !self.is_prune_stop(&current) && crate::is_directory_empty(&current) {
            if fs::remove_dir(&current).is_err() {
                break;
            }
            removed.push(current.clone());
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        removed
    }

    fn is_prune_stop(&self, dir: &Path) -> bool {
        if dir.file_name().is_none_or(|name| name.to_string_lossy() == self.sentinel) {
            return true;
        }
        if self.root.starts_with(dir) {
            return true;
        }
        self.boundary
            .as_ref()
            .is_some_and(|boundary| dir == boundary || !dir.starts_with(boundary))
    }
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(source, destination, || fs::remove_file(source))
        }
        Err(error) => Err(error),
    }
}

/// Copy to the destination, then remove the source with `remove_source`.
///
/// Leaves exactly one copy on failure: the destination copy is deleted
/// when either the copy or the source removal fails.
fn copy_then_remove(
    source: &Path,
    destination: &Path,
    remove_source: impl FnOnce() -> io::Result<()>,
) -> io::Result<()> {
    if let Err(copy_error) = fs::copy(source, destination) {
        let _ = fs::remove_file(destination);
        return Err(copy_error);
    }
    if let Err(remove_error) = remove_source() {
        let _ = fs::remove_file(destination);
        return Err(io::Error::new(
            remove_error.kind(),
            format!(
                "Copied across devices but failed to remove source {}, copy discarded: {remove_error}",
                source.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use crate::date::Quarter;
    use crate::title::normalize;

    fn create_file(path: &Path, content: &[u8]) -> RawFile {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, content).expect("write file");
        RawFile::from_path(path).expect("raw file")
    }

    fn found_match(title: &str, year: i32, quarter: Quarter) -> MetadataMatch {
        MetadataMatch {
            title: title.to_string(),
            year: Some(year),
            quarter: Some(quarter),
            found: true,
        }
    }

    #[test]
    fn test_primary_destination_layout() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let name = "[Group] Example Show - 05 (1080p) [ABCD1234].mkv";
        let file = create_file(&input.path().join(name), b"video");
        let engine = PlacementEngine::new(output.path());

        let decision = engine.place(&file, &normalize(name), &found_match("Example Show", 2021, Quarter::Second));
        assert_eq!(decision.outcome, PlacementOutcome::Primary);
        assert_eq!(
            decision.destination(),
            output.path().join("2021/2_quarter/Example Show/1080p").join(name)
        );
    }

    #[test]
    fn test_unknown_layout() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let file = create_file(&input.path().join("Unknown Noise Word.mkv"), b"video");
        let engine = PlacementEngine::new(output.path());

        let decision = engine.place(&file, &normalize(&file.name), &MetadataMatch::not_found());
        assert_eq!(
            decision.directory,
            output.path().join("Unknown Year/Unknown Quarter/Unknown/Unknown")
        );
    }

    #[test]
    fn test_display_title_is_sanitized() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let file = create_file(&input.path().join("show.mkv"), b"video");
        let engine = PlacementEngine::new(output.path());

        let decision = engine.place(&file, &normalize(&file.name), &found_match("Re:Zero / Part?", 2016, Quarter::Second));
        assert_eq!(decision.directory, output.path().join("2016/2_quarter/Re Zero Part/Unknown"));

        let blank = found_match("  ", 2016, Quarter::Second);
        let decision = engine.place(&file, &normalize(&file.name), &blank);
        assert_eq!(decision.directory, output.path().join("2016/2_quarter/Unknown/Unknown"));
    }

    #[test]
    fn test_documents_and_subtitles() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let engine = PlacementEngine::new(output.path());
        let matched = found_match("Show", 2020, Quarter::First);

        let document = create_file(&input.path().join("notes.PDF"), b"pdf");
        let decision = engine.place(&document, &normalize(&document.name), &matched);
        assert_eq!(decision.directory, output.path().join(DOCUMENTS_DIR));

        let archive = create_file(&input.path().join("subs.7z"), b"7z");
        let decision = engine.place(&archive, &normalize(&archive.name), &matched);
        assert_eq!(decision.directory, output.path().join(SUBTITLES_DIR));
    }

    #[test]
    fn test_collision_diverts_to_duplicated() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
        let matched = found_match("Show", 2020, Quarter::First);

        let first = create_file(&input.path().join("a/show.mkv"), b"first");
        let second = create_file(&input.path().join("b/show.mkv"), b"second");
        let third = create_file(&input.path().join("c/show.mkv"), b"third");

        let decision = engine.place(&first, &normalize(&first.name), &matched);
        let primary = engine.execute(&first, &decision).expect("first move");

        let decision = engine.place(&second, &normalize(&second.name), &matched);
        assert!(decision.is_duplicate());
        let duplicate = engine.execute(&second, &decision).expect("second move");
        assert_eq!(duplicate, output.path().join(DUPLICATED_DIR).join("show.mkv"));

        let decision = engine.place(&third, &normalize(&third.name), &matched);
        let third_path = engine.execute(&third, &decision).expect("third move");
        assert_eq!(third_path, output.path().join(DUPLICATED_DIR).join("show (1).mkv"));

        assert_eq!(fs::read(primary).expect("read"), b"first");
        assert_eq!(fs::read(duplicate).expect("read"), b"second");
        assert_eq!(fs::read(third_path).expect("read"), b"third");
    }

    #[test]
    fn test_execute_prunes_up_to_sentinel() {
        let base = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let nested = base.path().join("Animations/Season/Disc");
        let file = create_file(&nested.join("show.mkv"), b"video");
        let engine = PlacementEngine::new(output.path());

        let decision = engine.place(&file, &normalize(&file.name), &MetadataMatch::not_found());
        engine.execute(&file, &decision).expect("move");

        assert!(!nested.exists());
        assert!(!base.path().join("Animations/Season").exists());
        assert!(base.path().join("Animations").exists());
    }

    #[test]
    fn test_prune_stops_at_non_empty_and_boundary() {
        let base = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let keep = base.path().join("keep");
        let empty = keep.join("empty/deeper");
        fs::create_dir_all(&empty).expect("create dirs");
        fs::write(keep.join("other.txt"), b"x").expect("write");

        let engine = PlacementEngine::new(output.path()).with_boundary(base.path());
        let removed = engine.prune_empty_dirs(&empty);
        assert_eq!(removed, vec![empty.clone(), keep.join("empty")]);
        assert!(keep.exists());

        let lonely = base.path().join("lonely");
        fs::create_dir_all(&lonely).expect("create dir");
        engine.prune_empty_dirs(&lonely);
        assert!(!lonely.exists());
        assert!(base.path().exists());
    }

    #[test]
    fn test_prune_never_removes_output_root() {
        let base = tempdir().expect("tempdir");
        let output = base.path().join("organized");
        fs::create_dir_all(&output).expect("create dir");
        let engine = PlacementEngine::new(&output);
        assert!(engine.prune_empty_dirs(&output).is_empty());
        assert!(output.exists());
    }

    #[test]
    fn test_dry_run_leaves_files_in_place() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let file = create_file(&input.path().join("dir/show.mkv"), b"video");
        let engine = PlacementEngine::new(output.path()).with_dry_run(true);

        let decision = engine.place(&file, &normalize(&file.name), &MetadataMatch::not_found());
        let destination = engine.execute(&file, &decision).expect("dry run");
        assert_eq!(destination, decision.destination());
        assert!(file.path.exists());
        assert!(!destination.exists());
        assert!(input.path().join("dir").exists());
    }

    #[test]
    fn test_execute_failure_keeps_source() {
        let input = tempdir().expect("tempdir");
        let output = tempdir().expect("tempdir");
        let file = create_file(&input.path().join("show.mkv"), b"video");
        let engine = PlacementEngine::new(output.path());

        // A regular file where the destination directory should be created.
        fs::write(output.path().join("blocked"), b"x").expect("write");
        let decision = PlacementDecision {
            directory: output.path().join("blocked/inner"),
            file_name: file.name.clone(),
            outcome: PlacementOutcome::Primary,
        };
        assert!(engine.execute(&file, &decision).is_err());
        assert!(file.path.exists());
    }

    #[test]
    fn test_raw_file_snapshot() {
        let dir = tempdir().expect("tempdir");
        let file = create_file(&dir.path().join("Movie.MKV"), b"12345");
        assert_eq!(file.name, "Movie.MKV");
        assert_eq!(file.extension, "mkv");
        assert_eq!(file.size, 5);
        assert!(file.modified.is_some());
        assert_eq!(file.category(), FileCategory::Media);
        assert!(RawFile::from_path(dir.path()).is_err());
    }

    #[test]
    fn test_copy_then_remove_moves_content() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("source.mkv");
        let destination = dir.path().join("destination.mkv");
        fs::write(&source, b"content").expect("write");

        copy_then_remove(&source, &destination, || fs::remove_file(&source)).expect("move");

        assert!(!source.exists());
        assert_eq!(fs::read(&destination).expect("read"), b"content");
    }

    #[test]
    fn test_copy_then_remove_keeps_single_copy_when_source_removal_fails() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("source.mkv");
        let destination = dir.path().join("destination.mkv");
        fs::write(&source, b"content").expect("write");

        let error = copy_then_remove(&source, &destination, || {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        })
        .expect_err("source removal should fail");

        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);
        assert!(error.to_string().contains("failed to remove source"));
        assert!(source.is_file());
        assert!(!destination.exists());
    }
}
