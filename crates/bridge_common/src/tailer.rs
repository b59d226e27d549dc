//! Incremental reader for a growing, possibly rotated log file.
//!
//! Each poll stats the file, compares its identity and size against the
//! stored cursor and reads only the bytes appended since the last poll.
//! A trailing fragment without a newline is held back while the file is
//! still growing and delivered once a poll sees the size unchanged.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Distinguishes one instance of the log file from a replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    device: u64,
    inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: meta.dev(),
            inode: meta.ino(),
        }
    }

    #[cfg(not(unix))]
    pub fn of(meta: &Metadata) -> Self {
        // No inode; creation time changes when the file is recreated
        let created = meta
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            device: created,
            inode: 0,
        }
    }
}

/// Read cursor into the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogPosition {
    pub offset: u64,
    pub identity: Option<FileIdentity>,
}

#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    position: LogPosition,
    /// File size at the poll that last held back an unterminated fragment
    held_at_size: Option<u64>,
    /// The last delivered line had no newline yet
    fragment_delivered: bool,
}

impl LogTailer {
    /// Tail `path` from its beginning
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_position(path, LogPosition::default())
    }

    /// Resume tailing from a saved cursor
    pub fn from_position(path: impl Into<PathBuf>, position: LogPosition) -> Self {
        Self {
            path: path.into(),
            position,
            held_at_size: None,
            fragment_delivered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> LogPosition {
        self.position
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Lines appended since the previous poll.
    ///
    /// Returns an empty list when the file is missing or cannot be read
    /// right now; the cursor is left untouched in that case.
    pub fn poll(&mut self) -> Vec<String> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot stat log {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let identity = FileIdentity::of(&meta);
        let size = meta.len();
        let mut offset = self.position.offset;

        let replaced = self.position.identity.is_some_and(|known| known != identity);
        if replaced || size < offset {
            if self.position.identity.is_some() {
                info!(
                    "Log {} rotated or truncated (size {} < offset {} or new file), rereading from start",
                    self.path.display(),
                    size,
                    offset
                );
            }
            offset = 0;
            self.held_at_size = None;
            self.fragment_delivered = false;
        }

        if size == offset {
            self.held_at_size = None;
            self.position = LogPosition {
                offset,
                identity: Some(identity),
            };
            return Vec::new();
        }

        let bytes = match read_range(&self.path, offset, size) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read log {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        // The newline closing an already delivered fragment is not a new line
        let start = usize::from(self.fragment_delivered && bytes.first() == Some(&b'\n'));
        self.fragment_delivered = false;

        // Hold an unterminated fragment back until the file stops growing
        let complete = bytes.iter().rposition(|&b| b == b'\n').map_or(0, |idx| idx + 1);
        let consumed = if complete == bytes.len() || self.held_at_size == Some(size) {
            self.held_at_size = None;
            self.fragment_delivered = complete < bytes.len();
            bytes.len()
        } else {
            debug!("Log {} has an unterminated line, waiting", self.path.display());
            self.held_at_size = Some(size);
            complete
        };

        self.position = LogPosition {
            offset: offset + consumed as u64,
            identity: Some(identity),
        };

        split_lines(&bytes[start.min(consumed)..consumed])
    }
}

/// Read `[start, end)` from the file. The end is the size seen at stat
/// time so bytes written mid-read are left for the next poll.
fn read_range(path: &Path, start: u64, end: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;

    let mut bytes = Vec::with_capacity((end - start) as usize);
    file.take(end - start).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Split bytes into lines with trailing whitespace removed. A final
/// newline does not start an extra empty line. Invalid UTF-8 is replaced rather than rejected.
fn split_lines(bytes: &[u8]) -> Vec<String> {
    if bytes.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\n')
        .unwrap_or(&text)
        .split('\n')
        .map(|line| line.trim_end().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path().join("comfyui.log"));
        assert!(tailer.poll().is_empty());
        assert_eq!(tailer.position(), LogPosition::default());
    }

    #[test]
    fn test_reads_only_new_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "one\ntwo\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll(), vec!["one", "two"]);
        assert!(tailer.poll().is_empty());

        append(&path, "three\n");
        assert_eq!(tailer.poll(), vec!["three"]);
        assert_eq!(tailer.position().offset, 14);
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "done\nhalf");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll(), vec!["done"]);

        append(&path, "-written\n");
        assert_eq!(tailer.poll(), vec!["half-written"]);
    }

    #[test]
    fn test_unterminated_last_line_delivered_once_idle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "done\nKilled: last line without newline");

        let mut tailer = LogTailer::new(&path);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.extend(tailer.poll());
        }
        assert_eq!(seen, vec!["done", "Killed: last line without newline"]);
        assert_eq!(tailer.position().offset, fs::metadata(&path).unwrap().len());

        // A late newline finishes that line without adding an empty one
        append(&path, "\nRestarting\n");
        assert_eq!(tailer.poll(), vec!["Restarting"]);
    }

    #[test]
    fn test_growing_fragment_is_not_split() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "Loading");

        let mut tailer = LogTailer::new(&path);
        assert!(tailer.poll().is_empty());
        append(&path, " model");
        assert!(tailer.poll().is_empty());
        append(&path, " weights\n");
        assert_eq!(tailer.poll(), vec!["Loading model weights"]);
    }

    #[test]
    fn test_truncation_resets_cursor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "a long first line\nanother long line\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll().len(), 2);

        fs::write(&path, "fresh\n").unwrap();
        assert_eq!(tailer.poll(), vec!["fresh"]);
        assert_eq!(tailer.position().offset, 6);
    }

    #[test]
    fn test_trailing_whitespace_and_crlf_stripped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "windows line\r\nspaces   \n\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll(), vec!["windows line", "spaces", ""]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        fs::write(&path, b"bad \xff byte\n").unwrap();

        let mut tailer = LogTailer::new(&path);
        let lines = tailer.poll();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bad "));
    }

    #[test]
    fn test_resume_from_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "old\nnew\n");

        let mut first = LogTailer::new(&path);
        first.poll();
        append(&path, "newer\n");

        let mut resumed = LogTailer::from_position(&path, first.position());
        assert_eq!(resumed.poll(), vec!["newer"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_file_is_read_from_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comfyui.log");
        append(&path, "short\n");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.poll(), vec!["short"]);

        // Rotate: move the old file away and create a bigger new one
        fs::rename(&path, dir.path().join("comfyui.log.1")).unwrap();
        append(&path, "rotated line one\nrotated line two\n");

        assert_eq!(tailer.poll(), vec!["rotated line one", "rotated line two"]);
    }
}
