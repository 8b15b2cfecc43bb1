//! End-to-end organize flow through the library API.
//!
//! Files are created in temporary directories, normalized, resolved against an
//! in-process provider and moved by the placement engine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::tempdir;

use media_sort::fingerprint::Fingerprinter;
use media_sort::placement::{PlacementEngine, PlacementOutcome, RawFile};
use media_sort::provider::{Candidate, MetadataProvider};
use media_sort::resolver::{MetadataResolver, ResolverState};
use media_sort::title::normalize;

/// Provider answering from a fixed table and recording every query.
#[derive(Default)]
struct TableProvider {
    entries: HashMap<String, Vec<Candidate>>,
    queries: RefCell<Vec<String>>,
}

impl TableProvider {
    fn with_entry(mut self, query: &str, title: &str, date: Option<&str>) -> Self {
        self.entries
            .entry(query.to_string())
            .or_default()
            .push(Candidate::new(title, date));
        self
    }

    fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }
}

impl MetadataProvider for TableProvider {
    fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        self.queries.borrow_mut().push(query.to_string());
        Ok(self.entries.get(query).cloned().unwrap_or_default())
    }
}

fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).expect("create dir");
    let path = dir.join(name);
    fs::write(&path, content).expect("write file");
    path
}

/// Run one file through normalize, resolve, place and execute.
fn organize_file<P: MetadataProvider>(
    path: &Path,
    resolver: &MetadataResolver<P>,
    state: &mut ResolverState,
    engine: &PlacementEngine,
) -> (PathBuf, PlacementOutcome) {
    let file = RawFile::from_path(path).expect("raw file");
    let title = normalize(&file.name);
    let resolution = resolver.resolve(&title.title, state);
    let decision = engine.place(&file, &title, &resolution.matched);
    let destination = engine.execute(&file, &decision).expect("execute");
    (destination, decision.outcome)
}

#[test]
fn organizes_media_into_year_quarter_title_resolution() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let source = create_file(
        &input.path().join("Animations").join("new"),
        "[Group] Example Show - 05 (1080p) [ABCD1234].mkv",
        b"episode five",
    );

    let provider = TableProvider::default().with_entry("Example Show", "Example Show", Some("2021-04-10"));
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
    let mut state = ResolverState::new();

    let (destination, outcome) = organize_file(&source, &resolver, &mut state, &engine);

    let expected = output
        .path()
        .join("2021")
        .join("2_quarter")
        .join("Example Show")
        .join("1080p")
        .join("[Group] Example Show - 05 (1080p) [ABCD1234].mkv");
    assert_eq!(destination, expected);
    assert_eq!(outcome, PlacementOutcome::Primary);
    assert!(expected.is_file());
    assert!(!source.exists());

    // Emptied source directory is pruned up to the sentinel
    assert!(!input.path().join("Animations").join("new").exists());
    assert!(input.path().join("Animations").is_dir());
}

#[test]
fn unresolved_titles_go_under_unknown_directories() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let source = create_file(input.path(), "Obscure Thing.mp4", b"data");

    let provider = TableProvider::default();
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
    let mut state = ResolverState::new();

    let (destination, _) = organize_file(&source, &resolver, &mut state, &engine);

    assert_eq!(
        destination,
        output
            .path()
            .join("Unknown Year")
            .join("Unknown Quarter")
            .join("Unknown")
            .join("Unknown")
            .join("Obscure Thing.mp4")
    );
    assert!(destination.is_file());
    assert_eq!(provider.queries(), vec!["Obscure Thing", "Obscure"]);
}

#[test]
fn progressive_search_drops_trailing_words() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let source = create_file(input.path(), "Example Show Extra Words 720p.mkv", b"data");

    let provider = TableProvider::default().with_entry("Example Show", "Example Show", Some("2019-11-01"));
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
    let mut state = ResolverState::new();

    let (destination, _) = organize_file(&source, &resolver, &mut state, &engine);

    assert_eq!(
        provider.queries(),
        vec!["Example Show Extra Words", "Example Show Extra", "Example Show"]
    );
    assert!(destination.starts_with(output.path().join("2019").join("4_quarter").join("Example Show").join("720p")));
}

#[test]
fn similar_consecutive_titles_share_one_lookup() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let first = create_file(input.path(), "[Group] Example Show - 01 (1080p).mkv", b"one");
    let second = create_file(input.path(), "[Group] Example Show - 02 (1080p).mkv", b"two");

    let provider = TableProvider::default().with_entry("Example Show", "Example Show", Some("2021-04-10"));
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
    let mut state = ResolverState::new();

    let (first_destination, _) = organize_file(&first, &resolver, &mut state, &engine);
    let (second_destination, _) = organize_file(&second, &resolver, &mut state, &engine);

    assert_eq!(provider.queries(), vec!["Example Show"]);
    assert_eq!(first_destination.parent(), second_destination.parent());
}

#[test]
fn name_collisions_are_diverted_with_counter() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let provider = TableProvider::default().with_entry("Example Show", "Example Show", Some("2021-04-10"));
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());
    let mut state = ResolverState::new();

    let name = "Example Show 1080p.mkv";
    let mut outcomes = Vec::new();
    for batch in ["a", "b", "c"] {
        let source = create_file(&input.path().join(batch), name, batch.as_bytes());
        outcomes.push(organize_file(&source, &resolver, &mut state, &engine));
    }

    let duplicated = output.path().join("duplicated");
    assert_eq!(outcomes[0].1, PlacementOutcome::Primary);
    assert_eq!(outcomes[1], (duplicated.join(name), PlacementOutcome::DivertedDuplicate));
    assert_eq!(
        outcomes[2],
        (duplicated.join("Example Show 1080p (1).mkv"), PlacementOutcome::DivertedDuplicate)
    );
    assert_eq!(fs::read(&outcomes[2].0).expect("read"), b"c");
}

#[test]
fn documents_and_archives_use_fixed_directories() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let manual = create_file(input.path(), "Manual.PDF", b"pdf");
    let subs = create_file(input.path(), "Example Show subs.zip", b"zip");

    let provider = TableProvider::default();
    let engine = PlacementEngine::new(output.path()).with_boundary(input.path());

    for path in [&manual, &subs] {
        let file = RawFile::from_path(path).expect("raw file");
        let title = normalize(&file.name);
        let decision = engine.place(&file, &title, &media_sort::resolver::MetadataMatch::not_found());
        engine.execute(&file, &decision).expect("execute");
    }

    assert!(output.path().join("documents").join("Manual.PDF").is_file());
    assert!(output.path().join("subtitles").join("Example Show subs.zip").is_file());
    assert!(provider.queries().is_empty());
}

#[test]
fn dry_run_leaves_files_in_place() {
    let input = tempdir().expect("tempdir");
    let output = tempdir().expect("tempdir");
    let source = create_file(&input.path().join("nested"), "Example Show 1080p.mkv", b"data");

    let provider = TableProvider::default().with_entry("Example Show", "Example Show", Some("2021-04-10"));
    let resolver = MetadataResolver::new(&provider);
    let engine = PlacementEngine::new(output.path())
        .with_boundary(input.path())
        .with_dry_run(true);
    let mut state = ResolverState::new();

    let (destination, _) = organize_file(&source, &resolver, &mut state, &engine);

    assert!(destination.starts_with(output.path()));
    assert!(!destination.exists());
    assert!(source.is_file());
    assert!(input.path().join("nested").is_dir());
}

#[test]
fn fingerprint_follows_content_not_path() {
    let dir = tempdir().expect("tempdir");
    let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let first = create_file(dir.path(), "first.mkv", &content);
    let second = create_file(&dir.path().join("elsewhere"), "renamed copy.mkv", &content);
    let different = create_file(dir.path(), "different.mkv", b"something else");

    let fingerprinter = Fingerprinter::new().with_chunk_size(4096).with_workers(3);
    let first_fingerprint = fingerprinter.fingerprint(&first, None).expect("fingerprint");
    let second_fingerprint = fingerprinter.fingerprint(&second, None).expect("fingerprint");
    let different_fingerprint = fingerprinter.fingerprint(&different, None).expect("fingerprint");

    assert_eq!(first_fingerprint, second_fingerprint);
    assert_ne!(first_fingerprint, different_fingerprint);
    assert_eq!(
        first_fingerprint,
        fingerprinter.fingerprint_sequential(&first, None).expect("fingerprint")
    );
}
