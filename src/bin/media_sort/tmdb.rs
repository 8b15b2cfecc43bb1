//! TMDB API client.
//!
//! Implements the metadata provider with blocking HTTP requests.
//! TV search is tried first, then movie search.
//!
//! Documentation:
//! <https://developer.themoviedb.org/reference/search-tv>

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::Deserialize;

use media_sort::provider::{Candidate, MetadataProvider, RateLimiter, RequestKind};

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Searchable TMDB collections in lookup order.
const SEARCH_KINDS: &[&str] = &["tv", "movie"];

/// TMDB client with request rate limiting.
#[derive(Debug)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
    limiter: RateLimiter,
}

/// Response from the `/search/{kind}` endpoints.
#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// One search result. TV results use `name` and `first_air_date`, movies `title` and `release_date`.
#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
}

impl From<SearchResult> for Candidate {
    fn from(result: SearchResult) -> Self {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Self {
            title: non_blank(result.name).or_else(|| non_blank(result.title)).unwrap_or_default(),
            release_date: non_blank(result.first_air_date).or_else(|| non_blank(result.release_date)),
        }
    }
}

impl TmdbClient {
    /// Create a new TMDB client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: &str, language: &str, limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: TMDB_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            language: language.to_string(),
            limiter,
        })
    }

    /// Check that the API key is accepted.
    ///
    /// # Errors
    /// Returns an error if the request fails or the key is rejected.
    pub fn authenticate(&self) -> Result<()> {
        self.limiter.wait(RequestKind::Authenticate);
        let response = self
            .client
            .get(self.build_url("authentication"))
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .context("Failed to send authentication request")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            bail!("Authentication failed: invalid TMDB API key")
        } else {
            let body = response.text().unwrap_or_default();
            bail!("Authentication failed: HTTP {status} - {body}")
        }
    }

    /// Search one collection.
    fn search_kind(&self, kind: &str, query: &str) -> Result<Vec<Candidate>> {
        self.limiter.wait(RequestKind::Query);
        let response = self
            .client
            .get(self.build_url(&format!("search/{kind}")))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("query", query),
            ])
            .send()
            .with_context(|| format!("Failed to send {kind} search request"))?
            .error_for_status()
            .with_context(|| format!("TMDB {kind} search failed"))?;

        let body: SearchResponse = response
            .json()
            .with_context(|| format!("Failed to parse {kind} search response"))?;

        Ok(candidates_from(body))
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url.trim_end_matches('/'))
    }
}

impl MetadataProvider for TmdbClient {
    fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        for kind in SEARCH_KINDS {
            let candidates = self.search_kind(kind, query)?;
            if !candidates.is_empty() {
                return Ok(candidates);
            }
        }
        Ok(Vec::new())
    }
}

fn candidates_from(response: SearchResponse) -> Vec<Candidate> {
    response.results.into_iter().map(Candidate::from).collect()
}
