//! Per-chunk payload compression.
//!
//! Chunks are compressed with zstd before encryption, signalled in-band by
//! the `compressed` flag on the data frame. Each chunk is its own zstd
//! frame, so the receiver can decompress without any out-of-band size
//! information. Files whose suffix marks them as already compressed
//! (media, archives, compressed document formats) skip compression
//! entirely.

use std::path::Path;

use thiserror::Error;

/// Minimum chunk size to attempt compression.
pub const MIN_COMPRESS_SIZE: usize = 64;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Suffixes that are already compressed and not worth recompressing.
const NON_COMPRESSIBLE_EXTENSIONS: [&str; 18] = [
    "jpg", "jpeg", "png", "gif", "mp3", "mp4", "avi", "zip", "gz", "bz2", "rar", "7z", "lz4",
    "pdf", "mpg", "mpeg", "ogg", "flac",
];

/// Errors from compression operations.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// zstd compression failed.
    #[error("compression failed: {0}")]
    CompressionFailed(String),

    /// zstd decompression failed.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Decompressed size exceeds the safety limit.
    #[error("decompressed size exceeded limit: {size} > {limit}")]
    SizeExceeded {
        /// Actual decompressed size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },
}

/// Whether a file is worth compressing, judged by its suffix.
pub fn is_compressible(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return true,
    };
    !NON_COMPRESSIBLE_EXTENSIONS.contains(&ext.as_str())
}

/// Result of a compression attempt.
#[derive(Debug, Clone)]
pub enum CompressResult {
    /// Data was compressed and the compressed form is smaller.
    Compressed(Vec<u8>),
    /// Data kept raw (below threshold or compression did not help).
    Uncompressed(Vec<u8>),
}

impl CompressResult {
    /// The payload bytes to transmit.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            CompressResult::Compressed(data) | CompressResult::Uncompressed(data) => data,
        }
    }

    /// Whether the payload is a zstd frame.
    pub fn is_compressed(&self) -> bool {
        matches!(self, CompressResult::Compressed(_))
    }
}

/// Chunk compressor with a decompression size cap.
#[derive(Debug, Clone)]
pub struct Compressor {
    level: i32,
    max_decompressed_size: usize,
}

impl Compressor {
    /// Create a compressor with the given decompression cap.
    pub fn new(max_decompressed_size: usize) -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            max_decompressed_size,
        }
    }

    /// Override the zstd level (clamped to 1..=22).
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level.clamp(1, 22);
        self
    }

    /// Compress a chunk, keeping the raw bytes when compression does not
    /// actually save space.
    pub fn compress(&self, data: &[u8]) -> Result<CompressResult, CompressionError> {
        if data.len() < MIN_COMPRESS_SIZE {
            return Ok(CompressResult::Uncompressed(data.to_vec()));
        }

        let compressed = zstd::encode_all(data, self.level)
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?;

        if compressed.len() >= data.len() {
            return Ok(CompressResult::Uncompressed(data.to_vec()));
        }

        Ok(CompressResult::Compressed(compressed))
    }

    /// Decompress a chunk, enforcing the size cap.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        use std::io::Read;

        let decoder = zstd::Decoder::new(data)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;

        let mut output = Vec::new();
        decoder
            .take(self.max_decompressed_size as u64 + 1)
            .read_to_end(&mut output)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?;

        if output.len() > self.max_decompressed_size {
            return Err(CompressionError::SizeExceeded {
                size: output.len(),
                limit: self.max_decompressed_size,
            });
        }

        Ok(output)
    }
}
