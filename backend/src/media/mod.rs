//! Range media streamer.
//!
//! Serves partial content for large media files in response to HTTP `Range`
//! requests. Every request works on its own [`MediaFile`] value opened
//! fresh from disk — no state is shared between concurrent clients.
//!
//! Every range, open-ended (`bytes=<start>-`) or explicit, is answered with
//! at most a bounded window of bytes, so one response never materializes an
//! entire video in memory. Clients follow the `Content-Range` header and
//! re-request the remainder.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};

/// An inclusive byte range within a file of known size.
///
/// Invariant: `start <= end < size` for the size it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// Derive a range from a `Range: bytes=<start>-<end?>` header.
    ///
    /// An empty start means 0; an absent end means a window of `window`
    /// bytes from `start`. The end is clamped to the last byte of the file
    /// and to the window, whether it was requested or defaulted, so no
    /// single response buffers more than `window` bytes. Anything
    /// unparsable is rejected rather than guessed at.
    pub fn from_header(header: &str, size: u64, window: u64) -> Result<Self> {
        if size == 0 {
            return Err(Error::RangeNotSatisfiable("file is empty".to_string()));
        }

        let ranges = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(|| malformed(header))?;
        if ranges.contains(',') {
            return Err(Error::RangeNotSatisfiable(
                "multiple ranges are not supported".to_string(),
            ));
        }

        let (start_raw, end_raw) = ranges.split_once('-').ok_or_else(|| malformed(header))?;

        let start = match start_raw.trim() {
            "" => 0,
            raw => raw.parse::<u64>().map_err(|_| malformed(header))?,
        };
        let end = match end_raw.trim() {
            "" => start.saturating_add(window.max(1) - 1),
            raw => raw.parse::<u64>().map_err(|_| malformed(header))?,
        };
        let end = end
            .min(size - 1)
            .min(start.saturating_add(window.max(1) - 1));

        if start >= size {
            return Err(Error::RangeNotSatisfiable(format!(
                "range start {} is beyond the file size {}",
                start, size
            )));
        }
        if start > end {
            return Err(Error::RangeNotSatisfiable(format!(
                "range {}-{} is inverted",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    /// Number of bytes the range covers.
    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a file of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

fn malformed(header: &str) -> Error {
    Error::RangeNotSatisfiable(format!("malformed range header: {}", header))
}

/// A media file resolved for one request: path, size and content type.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    pub content_type: &'static str,
}

impl MediaFile {
    /// Resolve `name` inside the media directory and stat it.
    ///
    /// Names carrying path separators or parent references are rejected
    /// before touching the filesystem.
    pub async fn open(dir: &Path, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(Error::InvalidRequest(format!("invalid media name: {}", name)));
        }

        let path = dir.join(name);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|_| Error::FileNotFound(name.to_string()))?;
        if !metadata.is_file() {
            return Err(Error::FileNotFound(name.to_string()));
        }

        Ok(Self {
            path,
            size: metadata.len(),
            content_type: content_type_for(name),
        })
    }

    /// Read exactly the bytes the range covers.
    pub async fn read_range(&self, range: &RangeSpec) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&self.path)
            .await
            .map_err(|_| Error::FileNotFound(self.path.display().to_string()))?;
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| Error::Internal(format!("seek failed: {}", e)))?;

        let mut buf = vec![0u8; range.byte_len() as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| Error::Internal(format!("read failed: {}", e)))?;
        Ok(buf)
    }
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "mp4" => "video/mp4",
        Some(ext) if ext == "webm" => "video/webm",
        Some(ext) if ext == "mp3" => "audio/mpeg",
        Some(ext) if ext == "wav" => "audio/wav",
        Some(ext) if ext == "ogg" => "audio/ogg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
