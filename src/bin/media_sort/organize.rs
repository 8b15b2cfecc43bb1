use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use walkdir::WalkDir;

use media_sort::fingerprint::{ContentFingerprint, Fingerprinter};
use media_sort::placement::{FileCategory, PlacementDecision, PlacementEngine, RawFile};
use media_sort::provider::{MetadataProvider, RateLimiter};
use media_sort::resolver::{MetadataMatch, MetadataResolver, ResolverState};
use media_sort::{print_bold, print_error, print_warning, title};

use crate::MediaSortArgs;
use crate::config::Config;
use crate::database::FingerprintIndex;
use crate::logger::FileLogger;
use crate::stats::RunStats;
use crate::tmdb::TmdbClient;

const PROGRESS_BAR_CHARS: &str = "=>-";
const PROGRESS_BAR_TEMPLATE: &str = "[{elapsed_precise}] {bar:80.magenta/blue} {pos}/{len} {percent}%";

/// Organizes media files into the output layout.
pub struct MediaSort {
    config: Config,
    logger: RefCell<FileLogger>,
}

/// Reasons why a file was left alone
#[derive(Debug)]
pub enum SkipReason {
    /// File already sits at its destination
    AlreadyInPlace,
}

/// Why a file went to the duplicates directory
#[derive(Debug)]
pub enum DuplicateReason {
    /// Another file already has the primary destination name
    NameCollision,
    /// A previously placed file has the same content
    SameContent { existing: PathBuf },
}

/// Result of processing a single file
#[derive(Debug)]
pub enum ProcessResult {
    Placed { destination: PathBuf },
    Duplicate { destination: PathBuf, reason: DuplicateReason },
    Skipped(SkipReason),
    Failed { error: String },
}

/// Per-run collaborators shared by every file.
struct RunContext<'a, P> {
    resolver: &'a MetadataResolver<P>,
    engine: &'a PlacementEngine,
    index: Option<&'a FingerprintIndex>,
    fingerprints: &'a HashMap<PathBuf, ContentFingerprint>,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInPlace => write!(f, "already in place"),
        }
    }
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameCollision => write!(f, "name collision"),
            Self::SameContent { existing } => write!(f, "same content as \"{}\"", existing.display()),
        }
    }
}

impl MediaSort {
    /// Create a new organizer from command line arguments.
    pub fn new(args: MediaSortArgs) -> Result<Self> {
        let config = Config::from_args(args)?;
        let logger = RefCell::new(FileLogger::new()?);
        Ok(Self { config, logger })
    }

    /// Run the organize process.
    pub fn run(&self) -> Result<()> {
        let files = self.gather_files()?;
        if files.is_empty() {
            println!("No files to organize found");
            return Ok(());
        }

        if self.config.verbose {
            println!("Found {} file(s) to organize", files.len());
        }

        let api_key = self.config.api_key.as_deref().context(
            "TMDB API key is not set: use --api-key, the TMDB_API_KEY environment variable or api_key in the config file",
        )?;

        // Set up Ctrl+C handler for graceful abort
        let abort_flag = Arc::new(AtomicBool::new(false));
        let abort_flag_handler = Arc::clone(&abort_flag);

        ctrlc::set_handler(move || {
            if abort_flag_handler.load(Ordering::SeqCst) {
                // Second Ctrl+C - force exit
                std::process::exit(130);
            }
            println!("\n{}", "Received Ctrl+C, finishing current file...".yellow().bold());
            abort_flag_handler.store(true, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl+C handler")?;

        let client = TmdbClient::new(
            api_key,
            &self.config.language,
            RateLimiter::new(self.config.auth_interval, self.config.query_interval),
        )?;
        client.authenticate()?;
        let resolver = MetadataResolver::new(client).with_threshold(self.config.similarity_threshold);

        let engine = PlacementEngine::new(&self.config.output)
            .with_sentinel(&self.config.sentinel)
            .with_boundary(self.scan_root())
            .with_dry_run(self.config.dryrun);

        let index = if self.config.dedupe {
            Some(FingerprintIndex::open_default()?)
        } else {
            None
        };
        let fingerprints = if self.config.dedupe {
            self.compute_fingerprints(&files, &abort_flag)
        } else {
            HashMap::new()
        };

        let context = RunContext {
            resolver: &resolver,
            engine: &engine,
            index: index.as_ref(),
            fingerprints: &fingerprints,
        };
        let (stats, aborted) = self.process_files(&files, &context, &abort_flag);

        if aborted {
            println!("\n{}", "Aborted by user".bold().red());
        }

        stats.print_summary(self.config.dryrun);

        Ok(())
    }

    /// Directory that was scanned. Emptied directories are only pruned inside it.
    fn scan_root(&self) -> PathBuf {
        if self.config.input.is_file() {
            self.config
                .input
                .parent()
                .map_or_else(|| self.config.input.clone(), Path::to_path_buf)
        } else {
            self.config.input.clone()
        }
    }

    /// Gather files with a configured extension, skipping hidden entries and the output root.
    fn gather_files(&self) -> Result<Vec<RawFile>> {
        let path = &self.config.input;

        if path.is_file() {
            return Ok(vec![RawFile::from_path(path)?]);
        }

        if !path.is_dir() {
            anyhow::bail!("Input path '{}' does not exist or is not accessible", path.display());
        }

        let max_depth = if self.config.recurse { usize::MAX } else { 1 };
        let output = &self.config.output;

        let mut files: Vec<RawFile> = WalkDir::new(path)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || (!media_sort::is_hidden(entry) && !entry.path().starts_with(output))
            })
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let extension = media_sort::path_to_file_extension_string(entry.path());
                self.config.extensions.contains(&extension)
            })
            .filter_map(|entry| match RawFile::from_path(entry.path()) {
                Ok(file) => Some(file),
                Err(error) => {
                    print_warning!("Skipping {}: {error}", entry.path().display());
                    None
                }
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Fingerprint every file before moving anything.
    ///
    /// Files that fail are processed later without duplicate detection.
    fn compute_fingerprints(&self, files: &[RawFile], abort_flag: &AtomicBool) -> HashMap<PathBuf, ContentFingerprint> {
        let fingerprinter = Fingerprinter::new().with_workers(self.config.workers);
        let progress_bar = ProgressBar::new(files.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
            progress_bar.set_style(style.progress_chars(PROGRESS_BAR_CHARS));
        }

        let mut fingerprints = HashMap::with_capacity(files.len());
        for file in files.iter().progress_with(progress_bar) {
            if abort_flag.load(Ordering::SeqCst) {
                break;
            }
            match fingerprinter.fingerprint(&file.path, Some(abort_flag)) {
                Ok(fingerprint) => {
                    fingerprints.insert(file.path.clone(), fingerprint);
                }
                Err(error) => {
                    print_warning!("Fingerprint failed, continuing without duplicate detection: {error:#}");
                }
            }
        }
        fingerprints
    }

    /// Process files one by one.
    fn process_files<P: MetadataProvider>(
        &self,
        files: &[RawFile],
        context: &RunContext<'_, P>,
        abort_flag: &AtomicBool,
    ) -> (RunStats, bool) {
        let mut stats = RunStats::default();
        let mut state = ResolverState::new();
        let total = files.len();
        let num_digits = total.to_string().chars().count();
        let mut aborted = false;

        self.logger.borrow_mut().log_init(&self.config);

        for (index, file) in files.iter().enumerate() {
            // Check abort flag before starting a new file
            if abort_flag.load(Ordering::SeqCst) {
                aborted = true;
                break;
            }

            let file_index = format!("[{:>width$}/{}]", index + 1, total, width = num_digits);
            if !self.config.verbose {
                print!("\rProcessing: {file_index}");
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }

            let start = Instant::now();
            let (result, intended) = self.process_single_file(file, context, &mut state, &mut stats);
            let duration = start.elapsed();

            if !self.config.verbose {
                // Clear the progress line before printing meaningful output
                print!("\r");
            }
            self.report(file, &file_index, &result, intended.as_deref());
            stats.add_result(&result, file.size, duration);
        }

        if !self.config.verbose {
            println!();
        }
        self.logger.borrow_mut().log_stats(&stats);
        (stats, aborted)
    }

    /// Resolve, place and move a single file.
    ///
    /// Returns the result and the intended destination for error reporting.
    fn process_single_file<P: MetadataProvider>(
        &self,
        file: &RawFile,
        context: &RunContext<'_, P>,
        state: &mut ResolverState,
        stats: &mut RunStats,
    ) -> (ProcessResult, Option<PathBuf>) {
        let fingerprint = context.fingerprints.get(&file.path);

        if let Some(existing) = Self::find_same_content(file, context, fingerprint) {
            let decision = context.engine.divert(file);
            let reason = DuplicateReason::SameContent { existing };
            return self.execute(file, &decision, context, fingerprint, Some(reason));
        }

        let canonical = title::normalize(&file.name);
        let matched = if file.category() == FileCategory::Media {
            let resolution = context.resolver.resolve(&canonical.title, state);
            stats.add_resolution(&resolution);
            if !resolution.matched.found || resolution.attempts.iter().any(|attempt| attempt.is_failure()) {
                self.logger
                    .borrow_mut()
                    .log_search_failure(&canonical.title, &resolution.attempts);
            }
            if self.config.verbose {
                let source = if resolution.memoized { " (reused)" } else { "" };
                println!("{} -> {}{source}", canonical, resolution.matched);
            }
            resolution.matched
        } else {
            MetadataMatch::not_found()
        };

        let decision = context.engine.place(file, &canonical, &matched);
        if decision.destination() == file.path {
            return (ProcessResult::Skipped(SkipReason::AlreadyInPlace), None);
        }
        let reason = decision.is_duplicate().then_some(DuplicateReason::NameCollision);
        self.execute(file, &decision, context, fingerprint, reason)
    }

    /// Look up an already placed file with identical content.
    fn find_same_content<P>(
        file: &RawFile,
        context: &RunContext<'_, P>,
        fingerprint: Option<&ContentFingerprint>,
    ) -> Option<PathBuf> {
        let (index, fingerprint) = (context.index?, fingerprint?);
        match index.find_existing(fingerprint, file.size) {
            Ok(Some(existing)) if existing.full_path != file.path => Some(existing.full_path),
            Ok(_) => None,
            Err(error) => {
                print_warning!("Fingerprint lookup failed for {}: {error:#}", file.path.display());
                None
            }
        }
    }

    fn execute<P>(
        &self,
        file: &RawFile,
        decision: &PlacementDecision,
        context: &RunContext<'_, P>,
        fingerprint: Option<&ContentFingerprint>,
        duplicate: Option<DuplicateReason>,
    ) -> (ProcessResult, Option<PathBuf>) {
        let intended = decision.destination();
        match context.engine.execute(file, decision) {
            Ok(destination) => {
                if !self.config.dryrun
                    && let (Some(index), Some(fingerprint)) = (context.index, fingerprint)
                    && let Err(error) = index.upsert(&destination, fingerprint, file.size)
                {
                    print_warning!("Failed to store fingerprint: {error:#}");
                }
                let result = match duplicate {
                    Some(reason) => ProcessResult::Duplicate { destination, reason },
                    None => ProcessResult::Placed { destination },
                };
                (result, Some(intended))
            }
            Err(error) => (
                ProcessResult::Failed {
                    error: format!("{error:#}"),
                },
                Some(intended),
            ),
        }
    }

    /// Print and log the outcome of one file.
    fn report(&self, file: &RawFile, file_index: &str, result: &ProcessResult, intended: Option<&Path>) {
        let output = &self.config.output;
        let prefix = if self.config.dryrun { "[DRYRUN] " } else { "" };
        match result {
            ProcessResult::Placed { destination } => {
                println!(
                    "{prefix}{} {}",
                    file.name,
                    format!("-> {}", media_sort::get_relative_path_or_filename(destination, output)).green()
                );
                self.logger.borrow_mut().log_move(&file.path, destination, file_index);
            }
            ProcessResult::Duplicate { destination, reason } => {
                println!(
                    "{prefix}{} {}",
                    file.name,
                    format!(
                        "-> {} ({reason})",
                        media_sort::get_relative_path_or_filename(destination, output)
                    )
                    .yellow()
                );
                self.logger
                    .borrow_mut()
                    .log_duplicate(&file.path, destination, file_index, &reason.to_string());
            }
            ProcessResult::Skipped(reason) => {
                if self.config.verbose {
                    print_bold!("Skipped {}: {reason}", file.name);
                }
                self.logger
                    .borrow_mut()
                    .log_skip(&file.path, file_index, &reason.to_string());
            }
            ProcessResult::Failed { error } => {
                print_error!("{}: {error}", file.path.display());
                self.logger
                    .borrow_mut()
                    .log_error(&file.path, intended, file_index, error);
            }
        }
    }
}
