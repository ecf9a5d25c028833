use crate::domain::{ParsedLines, is_log_file, parse_log_lines};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Clone, Debug, PartialEq)]
pub enum TailRead {
    /// Bytes in `[from, to)` were read and parsed.
    Appended {
        from: u64,
        to: u64,
        lines: ParsedLines,
    },
    /// Nothing new, or only the start of a line that is still being written.
    Unchanged,
    /// The file is shorter than the recorded offset. The offset has been
    /// moved back to the current size and nothing was parsed.
    Truncated { previous: u64, size: u64 },
}

/// Last-read byte offset per log file. Files never seen before start at 0.
#[derive(Clone, Debug, Default)]
pub struct TailState {
    offsets: HashMap<PathBuf, u64>,
}

impl TailState {
    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.offsets.get(path).copied()
    }

    pub fn seed(&mut self, path: PathBuf, offset: u64) {
        self.offsets.insert(path, offset);
    }

    pub fn forget(&mut self, path: &Path) {
        self.offsets.remove(path);
    }

    /// Records the current size of every log file under `root`, so only
    /// content appended from now on is reported. Returns how many files were
    /// seeded.
    pub fn seed_existing(&mut self, root: &Path) -> usize {
        let mut seeded = 0usize;
        for entry in WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() || !is_log_file(entry.path()) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => {
                    self.seed(entry.path().to_path_buf(), meta.len());
                    seeded += 1;
                }
                Err(error) => {
                    tracing::warn!(path = %entry.path().display(), %error, "failed to stat log file");
                }
            }
        }
        tracing::debug!(files = seeded, "seeded tail offsets");
        seeded
    }

    /// Reads the complete lines appended to `path` since the last call. A
    /// trailing line without its `\n` stays unread until the writer finishes it.
    pub fn read_new(&mut self, path: &Path) -> io::Result<TailRead> {
        let size = fs::metadata(path)?.len();
        let previous = self.offset(path).unwrap_or(0);

        if size < previous {
            tracing::warn!(path = %path.display(), previous, size, "log file shrank, resetting offset");
            self.seed(path.to_path_buf(), size);
            return Ok(TailRead::Truncated { previous, size });
        }
        if size == previous {
            return Ok(TailRead::Unchanged);
        }

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(previous))?;
        let mut buf = Vec::new();
        file.take(size - previous).read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|byte| *byte == b'\n') else {
            tracing::debug!(path = %path.display(), bytes = buf.len(), "waiting for line to complete");
            return Ok(TailRead::Unchanged);
        };
        buf.truncate(last_newline + 1);

        let to = previous + buf.len() as u64;
        self.seed(path.to_path_buf(), to);
        tracing::debug!(path = %path.display(), offset = to, bytes = buf.len(), "read appended lines");

        let lines = parse_log_lines(&String::from_utf8_lossy(&buf));
        Ok(TailRead::Appended {
            from: previous,
            to,
            lines,
        })
    }
}
