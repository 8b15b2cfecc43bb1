//! Title to metadata resolution.
//!
//! Searches the provider with progressively shorter queries
//! and remembers the last result so that consecutive files of the same show
//! only cost one lookup.

use std::fmt;

use difference::{Changeset, Difference};

use crate::date::{Quarter, ReleaseDate, UNKNOWN_QUARTER, UNKNOWN_YEAR};
use crate::provider::{Candidate, MetadataProvider};

/// Similarity ratio at or above which two titles are treated as the same title.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Display title for unresolved files.
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Resolved metadata for a title. `found == false` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMatch {
    pub title: String,
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
    pub found: bool,
}

/// Remembers the most recent resolution for one run.
#[derive(Debug, Default)]
pub struct ResolverState {
    previous: Option<(String, MetadataMatch)>,
}

/// Progressive search steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchState {
    /// Next query to send.
    Searching(String),
    /// Provider returned hits for `query`.
    Found { query: String, candidates: Vec<Candidate> },
    /// Every shortening of the title failed.
    Exhausted,
}

/// What a single query produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Hits(usize),
    NoHits,
    /// Transport failure, recovered by shortening the query.
    Failed(String),
}

/// One query sent during a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAttempt {
    pub query: String,
    pub outcome: AttemptOutcome,
}

/// Result of resolving one title.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub matched: MetadataMatch,
    pub attempts: Vec<SearchAttempt>,
    /// True when the remembered previous match was reused without querying.
    pub memoized: bool,
}

/// Resolves normalized titles through a [`MetadataProvider`].
pub struct MetadataResolver<P> {
    provider: P,
    threshold: f64,
}

impl MetadataMatch {
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            year: None,
            quarter: None,
            found: false,
        }
    }

    /// Build a match from provider hits.
    ///
    /// Uses the first non-blank title and the first parseable release date,
    /// which may come from different candidates.
    #[must_use]
    pub fn from_candidates(query: &str, candidates: &[Candidate]) -> Self {
        let title = candidates
            .iter()
            .map(|candidate| candidate.title.trim())
            .find(|title| !title.is_empty())
            .unwrap_or(query)
            .to_string();

        let date = candidates
            .iter()
            .filter_map(|candidate| candidate.release_date.as_deref())
            .find_map(ReleaseDate::parse);

        Self {
            title,
            year: date.map(|date| date.year),
            quarter: date.map(|date| date.quarter()),
            found: true,
        }
    }

    /// Year directory name.
    #[must_use]
    pub fn year_label(&self) -> String {
        self.year.map_or_else(|| UNKNOWN_YEAR.to_string(), |year| year.to_string())
    }

    /// Quarter directory name.
    #[must_use]
    pub fn quarter_label(&self) -> String {
        self.quarter
            .map_or_else(|| UNKNOWN_QUARTER.to_string(), |quarter| quarter.to_string())
    }
}

impl fmt::Display for MetadataMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.title, self.year_label(), self.quarter_label())
    }
}

impl ResolverState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn previous(&self) -> Option<(&str, &MetadataMatch)> {
        self.previous
            .as_ref()
            .map(|(title, matched)| (title.as_str(), matched))
    }

    fn remember(&mut self, title: &str, matched: &MetadataMatch) {
        self.previous = Some((title.to_string(), matched.clone()));
    }
}

impl SearchState {
    /// Initial state for a title. An empty title has nothing to search.
    #[must_use]
    pub fn start(title: &str) -> Self {
        let title = title.trim();
        if title.is_empty() {
            Self::Exhausted
        } else {
            Self::Searching(title.to_string())
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Searching(_))
    }

    /// Advance by one query. Terminal states are returned unchanged.
    pub fn step<P: MetadataProvider + ?Sized>(self, provider: &P, attempts: &mut Vec<SearchAttempt>) -> Self {
        let query = match self {
            Self::Searching(query) => query,
            terminal => return terminal,
        };

        let outcome = match provider.search(&query) {
            Ok(candidates) if !candidates.is_empty() => {
                attempts.push(SearchAttempt {
                    query: query.clone(),
                    outcome: AttemptOutcome::Hits(candidates.len()),
                });
                return Self::Found { query, candidates };
            }
            Ok(_) => AttemptOutcome::NoHits,
            Err(error) => AttemptOutcome::Failed(format!("{error:#}")),
        };

        let shorter = drop_last_word(&query);
        attempts.push(SearchAttempt { query, outcome });
        Self::start(&shorter)
    }
}

impl SearchAttempt {
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed(_))
    }
}

impl fmt::Display for SearchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Hits(count) => write!(f, "\"{}\": {count} result(s)", self.query),
            AttemptOutcome::NoHits => write!(f, "\"{}\": no results", self.query),
            AttemptOutcome::Failed(error) => write!(f, "\"{}\": {error}", self.query),
        }
    }
}

impl<P: MetadataProvider> MetadataResolver<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Set the similarity threshold, clamped to 0..=1.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Resolve a normalized title.
    ///
    /// Reuses the previous match when the title is similar enough to the previous one,
    /// otherwise runs a progressive search and remembers its result.
    pub fn resolve(&self, title: &str, state: &mut ResolverState) -> Resolution {
        if let Some((previous_title, previous_match)) = state.previous()
            && similarity(title, previous_title) >= self.threshold
        {
            return Resolution {
                matched: previous_match.clone(),
                attempts: Vec::new(),
                memoized: true,
            };
        }

        let mut attempts = Vec::new();
        let mut search = SearchState::start(title);
        while !search.is_terminal() {
            search = search.step(&self.provider, &mut attempts);
        }

        let matched = match search {
            SearchState::Found { query, candidates } => MetadataMatch::from_candidates(&query, &candidates),
            SearchState::Exhausted | SearchState::Searching(_) => MetadataMatch::not_found(),
        };

        state.remember(title, &matched);
        Resolution {
            matched,
            attempts,
            memoized: false,
        }
    }
}

/// Similarity ratio of two strings in 0..=1.
///
/// `2 * matched / (len_a + len_b)` over a character diff. Two empty strings are identical.
///
/// ```rust
/// use media_sort::resolver::similarity;
///
/// assert!((similarity("abcd", "abcd") - 1.0).abs() < f64::EPSILON);
/// assert!((similarity("abcd", "wxyz")).abs() < f64::EPSILON);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 1.0;
    }
    let changeset = Changeset::new(a, b, "");
    let matched: usize = changeset
        .diffs
        .iter()
        .map(|diff| match diff {
            Difference::Same(text) => text.chars().count(),
            Difference::Add(_) | Difference::Rem(_) => 0,
        })
        .sum();

    (2 * matched) as f64 / total as f64
}

/// Drop the last whitespace-delimited word.
fn drop_last_word(query: &str) -> String {
    query
        .trim_end()
        .rsplit_once(char::is_whitespace)
        .map(|(head, _)| head.trim_end().to_string())
        .unwrap_or_default()
}
