mod config;
mod database;
mod logger;
mod organize;
mod stats;
mod tmdb;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::organize::MediaSort;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Organize media files into a year / quarter / title / resolution layout"
)]
pub(crate) struct MediaSortArgs {
    /// Optional input directory or file
    #[arg(value_hint = clap::ValueHint::AnyPath)]
    path: Option<PathBuf>,

    /// Output root directory. Defaults to "organized" inside the input directory
    #[arg(short, long, name = "OUTPUT", value_hint = clap::ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// TMDB API key
    #[arg(short = 'k', long, name = "API_KEY")]
    api_key: Option<String>,

    /// Divert files whose content was already placed to the duplicates directory
    #[arg(short, long)]
    dedupe: bool,

    /// Only include files with these extensions
    #[arg(short, long, num_args = 1, action = clap::ArgAction::Append, name = "EXTENSION")]
    extension: Vec<String>,

    /// Print planned moves without moving anything
    #[arg(short, long)]
    print: bool,

    /// Recurse into subdirectories
    #[arg(short, long)]
    recurse: bool,

    /// Directory name where removal of emptied source directories stops
    #[arg(short, long, name = "SENTINEL")]
    sentinel: Option<String>,

    /// Title similarity (0-1) at which the previous lookup is reused
    #[arg(short, long, name = "THRESHOLD")]
    threshold: Option<f64>,

    /// Number of fingerprint worker threads per file
    #[arg(short, long, name = "WORKERS")]
    workers: Option<usize>,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = MediaSortArgs::parse();
    if let Some(ref shell) = args.completion {
        media_sort::generate_shell_completion(*shell, MediaSortArgs::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        MediaSort::new(args)?.run()
    }
}
