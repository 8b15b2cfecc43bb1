//! Filename normalization.
//!
//! Turns a raw release filename into a searchable title
//! and extracts the resolution tag from the original name.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Resolution label used when the filename does not contain one.
pub const UNKNOWN_RESOLUTION: &str = "Unknown";

/// Upper bound for the rule loop. Every pass only removes text so this is never reached in practice.
const MAX_PASSES: usize = 8;

static RE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([[:alnum:]]{1,5})$").expect("Failed to create regex pattern for file extension")
});

static RE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._]").expect("Failed to create regex pattern for separators"));

static RE_BRACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\([^()]*\)|\{[^{}]*\}|\[[^\[\]]*\]|<[^<>]*>|『[^『』]*』|「[^「」]*」|【[^【】]*】|（[^（）]*）")
        .expect("Failed to create regex pattern for brackets")
});

static RE_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\bS\d+E\d+|\bS\d+\b|\bEP\d+|\b\d{1,2}x\d+\b|\bPart\s*\d+|\bSeason\s*\d+|\d+기|\d+화|第\d+[話话集]).*",
    )
    .expect("Failed to create regex pattern for episode markers")
});

static RE_RESOLUTION_CODEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:\d{3,4}p|\d{3,4}x\d{3,4}|[hx]\s*\.?\s*26[45]|HEVC|AVC)\b")
        .expect("Failed to create regex pattern for resolution and codec")
});

static RE_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:RAW|FLAC|WEB-DL|WEB|BluRay|BDRip|DVDRip|DVD|HDRip|HDTV)\b.*")
        .expect("Failed to create regex pattern for release source")
});

static RE_MISC_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:AAC|AC3|Chap|SP|XviD|NCOP|NCED|OP|ext|10bit|8bit)\b")
        .expect("Failed to create regex pattern for misc tags")
});

static RE_EPISODE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)-\s?\d+(?:v\d+|\.\d+)?.*").expect("Failed to create regex pattern for episode suffix")
});

static RE_INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\\/:*!?"<>|\x00-\x1F]"#).expect("Failed to create regex pattern for invalid characters")
});

static RE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Failed to create regex pattern for whitespace"));

static RE_TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\d{1,2}$").expect("Failed to create regex pattern for trailing number"));

static RE_DIMENSIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{3,4})[xX](\d{3,4})").expect("Failed to create regex pattern for dimensions")
});

static RE_PROGRESSIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{3,4})[pP]").expect("Failed to create regex pattern for resolution"));

/// Noise-removal rules in application order.
static NOISE_RULES: LazyLock<[&'static Regex; 6]> = LazyLock::new(|| {
    [
        &*RE_BRACKETS,
        &*RE_EPISODE,
        &*RE_RESOLUTION_CODEC,
        &*RE_SOURCE,
        &*RE_MISC_TAGS,
        &*RE_EPISODE_SUFFIX,
    ]
});

/// Normalized search title and the resolution tag of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalTitle {
    pub title: String,
    pub resolution: String,
}

impl CanonicalTitle {
    /// True when nothing searchable remained after normalization.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_empty()
    }
}

impl fmt::Display for CanonicalTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.title, self.resolution)
    }
}

/// Normalize a raw filename into a canonical title.
///
/// ```rust
/// use media_sort::title::normalize;
///
/// let canonical = normalize("[Group] Example Show - 05 (1080p) [ABCD1234].mkv");
/// assert_eq!(canonical.title, "Example Show");
/// assert_eq!(canonical.resolution, "1080p");
/// ```
#[must_use]
pub fn normalize(filename: &str) -> CanonicalTitle {
    CanonicalTitle {
        title: normalize_title(filename),
        resolution: extract_resolution(filename),
    }
}

/// Normalize only the title part of a filename.
#[must_use]
pub fn normalize_title(filename: &str) -> String {
    let base = strip_extension(filename);
    let mut name = RE_SEPARATORS.replace_all(base, " ").into_owned();
    for _ in 0..MAX_PASSES {
        let next = sanitize_name(&remove_noise(&name));
        if next == name {
            break;
        }
        name = next;
    }
    name
}

/// Extract the resolution label from the original filename.
///
/// `WxH` reports the height, otherwise a bare `1080p` style token is used.
///
/// ```rust
/// use media_sort::title::extract_resolution;
///
/// assert_eq!(extract_resolution("Show 1920x1080.mkv"), "1080p");
/// assert_eq!(extract_resolution("Show [720p].mkv"), "720p");
/// assert_eq!(extract_resolution("Show.mkv"), "Unknown");
/// ```
#[must_use]
pub fn extract_resolution(filename: &str) -> String {
    if let Some(captures) = RE_DIMENSIONS.captures(filename) {
        return format!("{}p", &captures[2]);
    }
    RE_PROGRESSIVE
        .captures(filename)
        .map_or_else(|| UNKNOWN_RESOLUTION.to_string(), |captures| format!("{}p", &captures[1]))
}

/// Make a string safe to use as a single file or directory name.
///
/// Replaces invalid characters with spaces, collapses whitespace,
/// drops standalone dashes and a trailing one or two digit number,
/// and trims trailing dots.
///
/// ```rust
/// use media_sort::title::sanitize_name;
///
/// assert_eq!(sanitize_name("Re:Zero  -  Starting Life"), "Re Zero Starting Life");
/// assert_eq!(sanitize_name("Spider-Man"), "Spider-Man");
/// ```
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let name = RE_INVALID_CHARS.replace_all(name, " ");
    let name = RE_WHITESPACE.replace_all(&name, " ");
    let name = remove_standalone_dashes(&name);
    let name = RE_TRAILING_NUMBER.replace(&name, "");
    name.trim().trim_end_matches('.').trim_end().to_string()
}

/// Remove a trailing extension if it looks like a real one.
///
/// The extension must contain a letter so that `Vol.2` style names keep their number.
fn strip_extension(filename: &str) -> &str {
    RE_EXTENSION.captures(filename).map_or(filename, |captures| {
        let extension = &captures[1];
        if extension.chars().any(char::is_alphabetic) {
            &filename[..filename.len() - extension.len() - 1]
        } else {
            filename
        }
    })
}

fn remove_noise(name: &str) -> String {
    NOISE_RULES
        .iter()
        .fold(name.to_string(), |current, rule| rule.replace_all(&current, " ").into_owned())
}

/// Drop dashes that do not join two words.
fn remove_standalone_dashes(name: &str) -> String {
    name.split(' ')
        .filter_map(|token| {
            let trimmed = token.trim_end_matches('-');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_release() {
        let canonical = normalize("[Group] Example Show - 05 (1080p) [ABCD1234].mkv");
        assert_eq!(canonical.title, "Example Show");
        assert_eq!(canonical.resolution, "1080p");
    }

    #[test]
    fn test_dotted_release_with_season_marker() {
        let canonical = normalize("Mr.Robot.S01E01.720p.WEB-DL.x264.mkv");
        assert_eq!(canonical.title, "Mr Robot");
        assert_eq!(canonical.resolution, "720p");
    }

    #[test]
    fn test_underscores_and_source_token() {
        assert_eq!(normalize_title("Cowboy_Bebop_BluRay_1080p_FLAC.mkv"), "Cowboy Bebop");
    }

    #[test]
    fn test_codec_tokens_removed() {
        assert_eq!(normalize_title("Some Movie 1920x1080 HEVC.mp4"), "Some Movie");
        assert_eq!(normalize_title("Some Movie H.264 AAC.mp4"), "Some Movie");
    }

    #[test]
    fn test_episode_suffix_variants() {
        assert_eq!(normalize_title("Show - 12v2.mkv"), "Show");
        assert_eq!(normalize_title("Show - 12.5.mkv"), "Show");
        assert_eq!(normalize_title("Show -12.mkv"), "Show");
    }

    #[test]
    fn test_korean_and_cjk_markers() {
        assert_eq!(normalize_title("진격의 거인 3기 12화.mp4"), "진격의 거인");
        assert_eq!(normalize_title("【字幕组】作品名 第01話.mp4"), "作品名");
        assert_eq!(normalize_title("「Group」Title『Extra』.mkv"), "Title");
    }

    #[test]
    fn test_season_and_part_markers() {
        assert_eq!(normalize_title("Show Season 2 Episode 3.mkv"), "Show");
        assert_eq!(normalize_title("Show Part 2.mkv"), "Show");
        assert_eq!(normalize_title("Show 2x05.mkv"), "Show");
    }

    #[test]
    fn test_extension_only_stripped_once() {
        assert_eq!(normalize_title("archive.tar.gz"), "archive tar");
        assert_eq!(strip_extension("Mr. Robot"), "Mr. Robot");
        assert_eq!(strip_extension("Volume.2"), "Volume.2");
        assert_eq!(strip_extension("show.mkv"), "show");
    }

    #[test]
    fn test_words_containing_tokens_are_kept() {
        assert_eq!(normalize_title("Webster Opera.mkv"), "Webster Opera");
        assert_eq!(normalize_title("Spider-Man.mkv"), "Spider-Man");
        assert_eq!(normalize_title("Ed Edd n Eddy - 03.mkv"), "Ed Edd n Eddy");
        assert_eq!(normalize_title("Red Ed.mkv"), "Red Ed");
    }

    #[test]
    fn test_output_has_no_invalid_characters() {
        let title = normalize_title("What/If: Why? <Really> *Now*|Here.mkv");
        assert!(!title.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|']));
        assert_eq!(title, "What If Why Now Here");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in [
            "[Group] Example Show - 05 (1080p) [ABCD1234].mkv",
            "Mr.Robot.S01E01.720p.WEB-DL.x264.mkv",
            "Movie 3 12.mkv",
            "진격의 거인 3기 12화.mp4",
            "Plain Title",
        ] {
            let once = normalize_title(name);
            assert_eq!(normalize_title(&once), once, "not idempotent for {name}");
        }
    }

    #[test]
    fn test_everything_is_noise() {
        assert_eq!(normalize_title("[Group] S01E01 [1080p].mkv"), "");
        assert!(normalize("[Group] S01E01.mkv").is_empty());
    }

    #[test]
    fn test_extract_resolution() {
        assert_eq!(extract_resolution("Show 1280x720.mkv"), "720p");
        assert_eq!(extract_resolution("Show 1080P.mkv"), "1080p");
        assert_eq!(extract_resolution("Show (2160p) 1920X1080.mkv"), "1080p");
        assert_eq!(extract_resolution("Show.mkv"), UNKNOWN_RESOLUTION);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Title   with   spaces  "), "Title with spaces");
        assert_eq!(sanitize_name("Title - "), "Title");
        assert_eq!(sanitize_name("Title- Subtitle"), "Title Subtitle");
        assert_eq!(sanitize_name("Title 07"), "Title");
        assert_eq!(sanitize_name("Title 2024"), "Title 2024");
        assert_eq!(sanitize_name("24"), "24");
        assert_eq!(sanitize_name("Title..."), "Title");
        assert_eq!(sanitize_name("Tab\tSeparated\nName"), "Tab Separated Name");
        assert_eq!(sanitize_name(""), "");
    }
}
