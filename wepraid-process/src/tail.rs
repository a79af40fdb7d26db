//! Append-only log tailing
//!
//! A supervised process writes its stdout/stderr into regular files while
//! the supervisor reads them through separate handles on the same paths.
//! One writer, one reader per file. `OutputLog` keeps the read cursor
//! between calls, so each drain only sees what was appended since the last
//! one.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read side of an append-only log file that another process is writing.
#[derive(Debug)]
pub struct OutputLog {
    path: PathBuf,
    file: File,
    /// Bytes of an incomplete trailing line, kept until its newline arrives
    pending: Vec<u8>,
}

impl OutputLog {
    /// Open a read cursor on `path`. The file must already exist; the
    /// writer may still hold it open and keep growing it.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            file: File::open(path)?,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the complete lines appended since the last call.
    ///
    /// Never blocks: reads up to the file's current end and stops. A
    /// partial trailing line (no newline yet) is held back and returned by
    /// a later call once the writer finishes it. Line endings are stripped;
    /// invalid UTF-8 is replaced rather than rejected.
    pub fn drain_lines(&mut self) -> io::Result<Vec<String>> {
        let mut chunk = Vec::new();
        self.file.read_to_end(&mut chunk)?;
        if chunk.is_empty() && self.pending.is_empty() {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop(); // the newline itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn log_fixture() -> (tempfile::TempDir, PathBuf, File, OutputLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stdout.log");
        let writer = File::create(&path).unwrap();
        let log = OutputLog::open(&path).unwrap();
        (dir, path, writer, log)
    }

    #[test]
    fn test_empty_log_yields_nothing() {
        let (_dir, _path, _writer, mut log) = log_fixture();
        assert!(log.drain_lines().unwrap().is_empty());
        assert!(log.drain_lines().unwrap().is_empty());
    }

    #[test]
    fn test_incremental_reads() {
        let (_dir, _path, mut writer, mut log) = log_fixture();

        writer.write_all(b"first line\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(log.drain_lines().unwrap(), vec!["first line"]);

        writer.write_all(b"second\nthird\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(log.drain_lines().unwrap(), vec!["second", "third"]);

        // nothing new appended
        assert!(log.drain_lines().unwrap().is_empty());
    }

    #[test]
    fn test_partial_line_held_back() {
        let (_dir, _path, mut writer, mut log) = log_fixture();

        writer.write_all(b"Read 120 packets").unwrap();
        writer.flush().unwrap();
        assert!(log.drain_lines().unwrap().is_empty());

        writer.write_all(b" (got 40 ARP requests)\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            log.drain_lines().unwrap(),
            vec!["Read 120 packets (got 40 ARP requests)"]
        );
    }

    #[test]
    fn test_crlf_stripped() {
        let (_dir, _path, mut writer, mut log) = log_fixture();
        writer.write_all(b"Association successful :-)\r\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(log.drain_lines().unwrap(), vec!["Association successful :-)"]);
    }

    #[test]
    fn test_reader_survives_writer_reopen() {
        let (_dir, path, mut writer, mut log) = log_fixture();
        writer.write_all(b"one\n").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut writer = OpenOptions::new().append(true).open(&path).unwrap();
        writer.write_all(b"two\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(log.drain_lines().unwrap(), vec!["one", "two"]);
    }
}
