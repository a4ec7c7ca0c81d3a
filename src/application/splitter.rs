use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::error::MigrationError;
use crate::domain::ports::StatementSink;
use crate::infrastructure::fs::part_file_name;

// ─── FileSplitter ────────────────────────────────────────────────────────────

/// Writes statements into `export_part_<n>.sql` files under one directory,
/// sealing the current file once it holds at least `max_bytes`.
///
/// The next file is only opened by the next write, so a run never leaves an
/// empty trailing part. When a file rolls over inside a taxonomy block, the
/// block's marker is repeated as the first line of the new file.
pub struct FileSplitter {
    dir: PathBuf,
    max_bytes: u64,
    current: Option<BufWriter<File>>,
    current_path: PathBuf,
    current_bytes: u64,
    part: usize,
    total: u64,
    files: Vec<PathBuf>,
    active_marker: Option<String>,
}

impl FileSplitter {
    /// Create `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, MigrationError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| MigrationError::fs(&dir, e))?;
        Ok(Self {
            dir,
            max_bytes: max_bytes.max(1),
            current: None,
            current_path: PathBuf::new(),
            current_bytes: 0,
            part: 0,
            total: 0,
            files: Vec::new(),
            active_marker: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the next part if none is open. Returns `true` when the active
    /// marker was written as a continuation preamble.
    fn ensure_open(&mut self) -> Result<bool, MigrationError> {
        if self.current.is_some() {
            return Ok(false);
        }
        self.part += 1;
        let path = self.dir.join(part_file_name(self.part));
        let file = File::create(&path).map_err(|e| MigrationError::fs(&path, e))?;
        debug!("Opened {}", path.display());
        self.current = Some(BufWriter::new(file));
        self.current_path = path.clone();
        self.current_bytes = 0;
        self.files.push(path);

        if self.part > 1 {
            if let Some(marker) = self.active_marker.clone() {
                self.write_raw(&marker)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn write_raw(&mut self, text: &str) -> Result<(), MigrationError> {
        if let Some(w) = self.current.as_mut() {
            w.write_all(text.as_bytes())
                .map_err(|e| MigrationError::fs(&self.current_path, e))?;
            self.current_bytes += text.len() as u64;
            self.total += text.len() as u64;
        }
        Ok(())
    }

    fn seal(&mut self) -> Result<(), MigrationError> {
        if let Some(mut w) = self.current.take() {
            w.flush()
                .map_err(|e| MigrationError::fs(&self.current_path, e))?;
            debug!(
                "Sealed {} at {} bytes",
                self.current_path.display(),
                self.current_bytes
            );
        }
        Ok(())
    }
}

impl StatementSink for FileSplitter {
    fn write_unit(&mut self, text: &str) -> Result<(), MigrationError> {
        self.ensure_open()?;
        self.write_raw(text)?;
        if self.current_bytes >= self.max_bytes {
            self.seal()?;
        }
        Ok(())
    }

    fn write_marker(&mut self, marker: &str) -> Result<(), MigrationError> {
        self.active_marker = Some(marker.to_string());
        if !self.ensure_open()? {
            self.write_raw(marker)?;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.total
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>, MigrationError> {
        self.seal()?;
        Ok(self.files.clone())
    }
}

// ─── StreamSink ──────────────────────────────────────────────────────────────

/// Single unsplit stream, used by the direct output method.
pub struct StreamSink<W: Write + Send> {
    out: W,
    total: u64,
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, total: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl StreamSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> StatementSink for StreamSink<W> {
    fn write_unit(&mut self, text: &str) -> Result<(), MigrationError> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| MigrationError::fs("<stream>", e))?;
        self.total += text.len() as u64;
        Ok(())
    }

    fn write_marker(&mut self, marker: &str) -> Result<(), MigrationError> {
        self.write_unit(marker)
    }

    fn bytes_written(&self) -> u64 {
        self.total
    }

    fn finish(&mut self) -> Result<Vec<PathBuf>, MigrationError> {
        self.out
            .flush()
            .map_err(|e| MigrationError::fs("<stream>", e))?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::taxonomy::{decode, TaxonomyBlock};

    fn stmt(i: usize) -> String {
        format!("INSERT INTO t (id) VALUES ('{:04}');\n", i)
    }

    #[test]
    fn rolls_over_after_threshold_without_splitting_statements() {
        let dir = tempfile::tempdir().unwrap();
        let len = stmt(0).len() as u64;
        let mut sink = FileSplitter::new(dir.path().join("products"), len * 3 + 1).unwrap();
        for i in 0..10 {
            sink.write_statement(&stmt(i)).unwrap();
        }
        let files = sink.finish().unwrap();

        assert_eq!(files.len(), 3);
        assert!(files[0].ends_with("export_part_1.sql"));
        assert!(files[2].ends_with("export_part_3.sql"));
        for f in &files {
            let text = fs::read_to_string(f).unwrap();
            assert!(text.len() as u64 <= len * 4);
            assert!(text.lines().all(|l| l.ends_with(';')));
        }
        let all: usize = files
            .iter()
            .map(|f| fs::read_to_string(f).unwrap().lines().count())
            .sum();
        assert_eq!(all, 10);
        assert_eq!(sink.bytes_written(), len * 10);
    }

    #[test]
    fn exact_threshold_opens_no_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let len = stmt(0).len() as u64;
        let mut sink = FileSplitter::new(dir.path(), len).unwrap();
        sink.write_statement(&stmt(1)).unwrap();
        let files = sink.finish().unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn rolled_file_repeats_active_marker() {
        let dir = tempfile::tempdir().unwrap();
        let len = stmt(0).len() as u64;
        let mut sink = FileSplitter::new(dir.path(), len * 2).unwrap();
        sink.write_header("-- header\n\n").unwrap();
        sink.write_marker(&TaxonomyBlock::ProductTags.marker()).unwrap();
        for i in 0..4 {
            sink.write_statement(&stmt(i)).unwrap();
        }
        let files = sink.finish().unwrap();
        assert!(files.len() >= 2);

        let last = fs::read_to_string(files.last().unwrap()).unwrap();
        assert!(last.starts_with("-- BEGIN PRODUCT TAGS\n"));
        let decoded = decode(&last);
        assert_eq!(decoded.segments[0].block, TaxonomyBlock::ProductTags);
        assert!(decoded.preamble.is_empty());
    }

    #[test]
    fn marker_opening_a_new_file_is_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let len = stmt(0).len() as u64;
        let mut sink = FileSplitter::new(dir.path(), len).unwrap();
        sink.write_marker(&TaxonomyBlock::ProductCategories.marker()).unwrap();
        sink.write_statement(&stmt(1)).unwrap();
        sink.write_marker(&TaxonomyBlock::ProductTags.marker()).unwrap();
        sink.write_statement(&stmt(2)).unwrap();
        let files = sink.finish().unwrap();

        let second = fs::read_to_string(&files[1]).unwrap();
        assert_eq!(second.matches("-- BEGIN").count(), 1);
        assert!(second.starts_with("-- BEGIN PRODUCT TAGS\n"));
    }

    #[test]
    fn unwritable_directory_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("users");
        fs::write(&blocker, "not a dir").unwrap();
        match FileSplitter::new(&blocker, 100) {
            Err(MigrationError::Filesystem { path, .. }) => assert_eq!(path, blocker),
            _ => panic!("expected filesystem error"),
        }
    }

    #[test]
    fn stream_sink_never_splits() {
        let mut sink = StreamSink::new(Vec::new());
        for i in 0..3 {
            sink.write_statement(&stmt(i)).unwrap();
        }
        assert!(sink.finish().unwrap().is_empty());
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 3);
    }
}
