//! Chunked MD4 content fingerprint (ED2K style).
//!
//! Files are split into fixed-size chunks, each chunk is digested,
//! and multi-chunk files digest the concatenated chunk digests in file order.
//! Chunks can be digested in parallel on a bounded per-file thread pool.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use md4::{Digest, Md4};
use rayon::prelude::*;

/// ED2K chunk size in bytes.
pub const ED2K_CHUNK_SIZE: u64 = 9_728_000;

/// Fingerprint of a zero-byte file: the MD4 digest of no data.
pub const EMPTY_FINGERPRINT_HEX: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

const EMPTY_DIGEST: [u8; 16] = [
    0x31, 0xd6, 0xcf, 0xe0, 0xd1, 0x6a, 0xe9, 0x31, 0xb7, 0x3c, 0x59, 0xd7, 0xe0, 0xc0, 0x89, 0xc0,
];

type ChunkDigest = [u8; 16];

/// 16-byte content digest and the number of chunks it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    digest: ChunkDigest,
    chunk_count: u64,
}

/// Computes content fingerprints with a configurable chunk size and worker count.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    chunk_size: u64,
    workers: usize,
}

impl ContentFingerprint {
    /// Fingerprint of an empty file.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            digest: EMPTY_DIGEST,
            chunk_count: 0,
        }
    }

    #[must_use]
    pub const fn new(digest: [u8; 16], chunk_count: u64) -> Self {
        Self { digest, chunk_count }
    }

    #[must_use]
    pub const fn digest(&self) -> &[u8; 16] {
        &self.digest
    }

    #[must_use]
    pub const fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        crate::to_hex(&self.digest)
    }

    /// Parse a fingerprint from its 32 character hex form.
    pub fn from_hex(hex: &str, chunk_count: u64) -> Result<Self> {
        if hex.len() != 32 || !hex.is_ascii() {
            anyhow::bail!("Invalid fingerprint: '{hex}'");
        }
        let mut digest = [0_u8; 16];
        for (index, byte) in digest.iter_mut().enumerate() {
            let pair = &hex[index * 2..index * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).with_context(|| format!("Invalid fingerprint: '{hex}'"))?;
        }
        Ok(Self { digest, chunk_count })
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self {
            chunk_size: ED2K_CHUNK_SIZE,
            workers: num_cpus::get_physical().max(1),
        }
    }
}

impl Fingerprinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different chunk size. Zero is treated as one byte.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        self
    }

    /// Maximum number of worker threads per file. Zero is treated as one.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 { 1 } else { workers };
        self
    }

    /// Number of chunks for a file of the given size.
    /// An exact multiple of the chunk size has no trailing empty chunk.
    #[must_use]
    pub const fn chunk_count(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.chunk_size)
    }

    /// Fingerprint a file, in parallel when it spans more than one chunk.
    ///
    /// The optional cancel flag is checked before every chunk read.
    pub fn fingerprint(&self, path: &Path, cancel: Option<&AtomicBool>) -> Result<ContentFingerprint> {
        let file_size = file_size(path)?;
        if file_size == 0 {
            return Ok(ContentFingerprint::empty());
        }
        if self.workers <= 1 || self.chunk_count(file_size) <= 1 {
            self.fingerprint_sequential(path, cancel)
        } else {
            self.fingerprint_parallel(path, cancel)
        }
    }

    /// Fingerprint a file by reading it once from start to end.
    pub fn fingerprint_sequential(&self, path: &Path, cancel: Option<&AtomicBool>) -> Result<ContentFingerprint> {
        let file_size = file_size(path)?;
        let chunk_count = self.chunk_count(file_size);
        if chunk_count == 0 {
            return Ok(ContentFingerprint::empty());
        }

        let mut file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let digests = self.digest_chunks(&mut file, path, 0..chunk_count, file_size, cancel)?;
        Ok(ContentFingerprint::new(combine(&digests), chunk_count))
    }

    /// Fingerprint a file with one worker per contiguous range of chunks.
    ///
    /// Every worker opens its own file handle. The result is identical to
    /// [`Self::fingerprint_sequential`].
    pub fn fingerprint_parallel(&self, path: &Path, cancel: Option<&AtomicBool>) -> Result<ContentFingerprint> {
        let file_size = file_size(path)?;
        let chunk_count = self.chunk_count(file_size);
        if chunk_count == 0 {
            return Ok(ContentFingerprint::empty());
        }

        let num_threads = usize::try_from(chunk_count).map_or(self.workers, |count| self.workers.min(count));
        let ranges = chunk_ranges(chunk_count, num_threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .context("Failed to create fingerprint thread pool")?;

        let results: Vec<Result<Vec<ChunkDigest>>> = pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    let mut file =
                        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
                    self.digest_chunks(&mut file, path, range.clone(), file_size, cancel)
                })
                .collect()
        });

        let mut slots: Vec<Option<ChunkDigest>> = vec![None; usize::try_from(chunk_count)?];
        for (range, result) in ranges.iter().zip(results) {
            let digests = result?;
            for (index, digest) in range.clone().zip(digests) {
                slots[usize::try_from(index)?] = Some(digest);
            }
        }

        let digests = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.with_context(|| format!("Missing digest for chunk {index}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(ContentFingerprint::new(combine(&digests), chunk_count))
    }

    /// Digest the chunks in `range`, starting with a seek to the first one.
    fn digest_chunks(
        &self,
        file: &mut File,
        path: &Path,
        range: Range<u64>,
        file_size: u64,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<ChunkDigest>> {
        let start_offset = range.start * self.chunk_size;
        file.seek(SeekFrom::Start(start_offset))
            .with_context(|| format!("Failed to seek to offset {start_offset}: {}", path.display()))?;

        let mut buffer = vec![0_u8; usize::try_from(self.chunk_size)?];
        let mut digests = Vec::with_capacity(usize::try_from(range.end - range.start)?);
        for index in range {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                anyhow::bail!("Fingerprint cancelled: {}", path.display());
            }
            let offset = index * self.chunk_size;
            let length = usize::try_from(self.chunk_size.min(file_size - offset))?;
            file.read_exact(&mut buffer[..length])
                .with_context(|| format!("Short read in chunk {index}: {}", path.display()))?;
            digests.push(md4_digest(&buffer[..length]));
        }
        Ok(digests)
    }
}

/// Split `chunk_count` chunks into `workers` contiguous ranges covering every chunk.
///
/// The remainder is spread over the first ranges so sizes differ by at most one.
///
/// ```rust
/// use media_sort::fingerprint::chunk_ranges;
///
/// assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..5, 5..7]);
/// assert_eq!(chunk_ranges(2, 4), vec![0..1, 1..2]);
/// ```
#[must_use]
pub fn chunk_ranges(chunk_count: u64, workers: usize) -> Vec<Range<u64>> {
    let workers = (workers.max(1) as u64).min(chunk_count);
    if workers == 0 {
        return Vec::new();
    }
    let base = chunk_count / workers;
    let remainder = chunk_count % workers;

    let mut ranges = Vec::with_capacity(workers as usize);
    let mut start = 0;
    for worker in 0..workers {
        let length = base + u64::from(worker < remainder);
        ranges.push(start..start + length);
        start += length;
    }
    ranges
}

fn md4_digest(data: &[u8]) -> ChunkDigest {
    let mut hasher = Md4::new();
    hasher.update(data);
    let mut digest = [0_u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Single chunk: its own digest. More: digest of the concatenated chunk digests.
fn combine(digests: &[ChunkDigest]) -> ChunkDigest {
    match digests {
        [] => EMPTY_DIGEST,
        [single] => *single,
        _ => {
            let mut hasher = Md4::new();
            for digest in digests {
                hasher.update(digest);
            }
            let mut combined = [0_u8; 16];
            combined.copy_from_slice(&hasher.finalize());
            combined
        }
    }
}

fn file_size(path: &Path) -> Result<u64> {
    let metadata = path
        .metadata()
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("Not a file: {}", path.display());
    }
    Ok(metadata.len())
}
