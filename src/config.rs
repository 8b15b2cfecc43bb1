//! Well-known locations for the user config file, run logs and local data.

use std::path::PathBuf;
use std::sync::LazyLock;

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/media-sort.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Directory for run logs: `$HOME/logs/media-sort`
pub static LOG_DIR: LazyLock<Option<PathBuf>> =
    LazyLock::new(|| dirs::home_dir().map(|home| home.join("logs").join(PROJECT_NAME)));

/// Platform local data directory for persistent state.
///
/// - Linux: `~/.local/share/media-sort`
/// - macOS: `~/Library/Application Support/media-sort`
/// - Windows: `%LOCALAPPDATA%\media-sort`
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_NAME)
}
