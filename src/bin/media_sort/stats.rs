use std::time::Duration;

use colored::Colorize;

use media_sort::resolver::Resolution;

use crate::organize::{DuplicateReason, ProcessResult};

/// Statistics for one organize run
#[derive(Debug, Default)]
pub struct RunStats {
    pub(crate) files_placed: usize,
    pub(crate) files_duplicate_name: usize,
    pub(crate) files_duplicate_content: usize,
    pub(crate) files_skipped: usize,
    pub(crate) files_failed: usize,
    pub(crate) files_unresolved: usize,
    pub(crate) lookups: usize,
    pub(crate) lookup_failures: usize,
    pub(crate) lookups_reused: usize,
    pub(crate) total_size: u64,
    pub(crate) total_duration: Duration,
}

impl RunStats {
    pub(crate) fn add_result(&mut self, result: &ProcessResult, size: u64, duration: Duration) {
        self.total_duration += duration;
        match result {
            ProcessResult::Placed { .. } => {
                self.files_placed += 1;
                self.total_size += size;
            }
            ProcessResult::Duplicate { reason, .. } => {
                match reason {
                    DuplicateReason::NameCollision => self.files_duplicate_name += 1,
                    DuplicateReason::SameContent { .. } => self.files_duplicate_content += 1,
                }
                self.total_size += size;
            }
            ProcessResult::Skipped(_) => self.files_skipped += 1,
            ProcessResult::Failed { .. } => self.files_failed += 1,
        }
    }

    pub(crate) fn add_resolution(&mut self, resolution: &Resolution) {
        if resolution.memoized {
            self.lookups_reused += 1;
        }
        self.lookups += resolution.attempts.len();
        self.lookup_failures += resolution.attempts.iter().filter(|attempt| attempt.is_failure()).count();
        if !resolution.matched.found {
            self.files_unresolved += 1;
        }
    }

    pub(crate) const fn total_duplicates(&self) -> usize {
        self.files_duplicate_name + self.files_duplicate_content
    }

    pub(crate) const fn total_processed(&self) -> usize {
        self.files_placed + self.total_duplicates() + self.files_skipped + self.files_failed
    }

    pub(crate) fn print_summary(&self, dryrun: bool) {
        let header = if dryrun { "\n--- Organize Summary (dryrun) ---" } else { "\n--- Organize Summary ---" };
        println!("{}", header.bold().magenta());
        println!("Files placed:           {}", self.files_placed);
        println!("Files duplicated:       {}", self.total_duplicates());
        if self.total_duplicates() > 0 {
            println!("  - Name collision:     {}", self.files_duplicate_name);
            println!("  - Same content:       {}", self.files_duplicate_content);
        }
        println!("Files skipped:          {}", self.files_skipped);
        println!(
            "Files failed:           {}",
            if self.files_failed > 0 {
                self.files_failed.to_string().red()
            } else {
                "0".normal()
            }
        );
        println!(
            "Unresolved titles:      {}",
            if self.files_unresolved > 0 {
                self.files_unresolved.to_string().yellow()
            } else {
                "0".normal()
            }
        );
        println!();
        println!("Metadata lookups:       {}", self.lookups);
        println!("Lookups reused:         {}", self.lookups_reused);
        if self.lookup_failures > 0 {
            println!("Lookup failures:        {}", self.lookup_failures.to_string().red());
        }
        println!("Total size moved:       {}", media_sort::format_size(self.total_size));
        println!(
            "Total time:             {}",
            media_sort::format_duration(self.total_duration)
        );
    }
}
