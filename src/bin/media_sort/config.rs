//! Configuration for `mediasort`.
//!
//! Handles reading configuration from CLI arguments and the user config file.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use itertools::Itertools;
use serde::Deserialize;

use media_sort::placement::DEFAULT_SENTINEL;
use media_sort::provider::{DEFAULT_AUTH_INTERVAL, DEFAULT_QUERY_INTERVAL};
use media_sort::resolver::DEFAULT_SIMILARITY_THRESHOLD;

use crate::MediaSortArgs;

/// Environment variable checked for the TMDB API key.
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

const DEFAULT_LANGUAGE: &str = "ko";

/// Extensions picked up when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "wmv", "mov", "m4v", "ts", "webm", "flv", "mpg", "srt", "ass", "smi", "doc", "docx", "txt",
    "pdf", "zip", "rar", "7z",
];

/// Config from the user config file.
#[derive(Debug, Default, Deserialize)]
pub struct MediaSortConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    auth_interval_secs: Option<u64>,
    #[serde(default)]
    dedupe: bool,
    #[serde(default)]
    dryrun: bool,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    input: Option<PathBuf>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    query_interval_secs: Option<u64>,
    #[serde(default)]
    recurse: bool,
    #[serde(default)]
    sentinel: Option<String>,
    #[serde(default)]
    similarity_threshold: Option<f64>,
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    workers: Option<usize>,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    mediasort: MediaSortConfig,
}

/// Final config created from CLI arguments and user config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) api_key: Option<String>,
    pub(crate) auth_interval: Duration,
    pub(crate) dedupe: bool,
    pub(crate) dryrun: bool,
    pub(crate) extensions: Vec<String>,
    pub(crate) input: PathBuf,
    pub(crate) language: String,
    pub(crate) output: PathBuf,
    pub(crate) query_interval: Duration,
    pub(crate) recurse: bool,
    pub(crate) sentinel: String,
    pub(crate) similarity_threshold: f64,
    pub(crate) verbose: bool,
    pub(crate) workers: usize,
}

impl MediaSortConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub(crate) fn get_user_config() -> Result<Self> {
        let Some(path) = media_sort::config::CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.mediasort)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }
}

impl Config {
    /// Create config from given command line args and user config file.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or parsed,
    /// or if the resulting values are invalid.
    pub fn from_args(args: MediaSortArgs) -> Result<Self> {
        let user_config = MediaSortConfig::get_user_config()?;
        let env_api_key = std::env::var(API_KEY_ENV).ok();
        Self::from_parts(args, user_config, env_api_key)
    }

    /// Merge CLI args, user config and the API key environment variable.
    /// CLI values win over the environment, which wins over the config file.
    fn from_parts(args: MediaSortArgs, user_config: MediaSortConfig, env_api_key: Option<String>) -> Result<Self> {
        let input_arg = args.path.or(user_config.input);
        let input = media_sort::resolve_input_path(input_arg.as_deref())?;
        let output = media_sort::resolve_output_path(args.output.or(user_config.output).as_deref(), &input)?;

        let similarity_threshold = args
            .threshold
            .or(user_config.similarity_threshold)
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !(0.0..=1.0).contains(&similarity_threshold) {
            anyhow::bail!("Similarity threshold must be between 0 and 1, got {similarity_threshold}");
        }

        let mut extensions: Vec<String> = args
            .extension
            .into_iter()
            .chain(user_config.extensions)
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .unique()
            .collect();

        if extensions.is_empty() {
            extensions = DEFAULT_EXTENSIONS.iter().map(|&s| s.to_string()).collect();
        }

        let api_key = args
            .api_key
            .or(env_api_key)
            .or(user_config.api_key)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        let workers = args
            .workers
            .or(user_config.workers)
            .unwrap_or_else(num_cpus::get_physical)
            .max(1);

        Ok(Self {
            api_key,
            auth_interval: user_config
                .auth_interval_secs
                .map_or(DEFAULT_AUTH_INTERVAL, Duration::from_secs),
            dedupe: args.dedupe || user_config.dedupe,
            dryrun: args.print || user_config.dryrun,
            extensions,
            input,
            language: user_config.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            output,
            query_interval: user_config
                .query_interval_secs
                .map_or(DEFAULT_QUERY_INTERVAL, Duration::from_secs),
            recurse: args.recurse || user_config.recurse,
            sentinel: args
                .sentinel
                .or(user_config.sentinel)
                .unwrap_or_else(|| DEFAULT_SENTINEL.to_string()),
            similarity_threshold,
            verbose: args.verbose || user_config.verbose,
            workers,
        })
    }
}
