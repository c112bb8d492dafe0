//! Append-only detection log (CSV).
//!
//! Single writer (the session loop), any number of readers. A row is
//! serialized in memory and written with one `write_all` on an append-mode
//! handle; readers ignore a trailing line without its terminator, so a row
//! still being written is never observed.

mod record;

pub use record::{parse_timestamp, DetectionRecord, LOG_COLUMNS};

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{MoodError, Result};

/// Writer handle for the detection log.
#[derive(Debug)]
pub struct DetectionLog {
    path: PathBuf,
    file: File,
    appended: u64,
}

impl DetectionLog {
    /// Open (creating if needed) the log at `path`. A new or empty file gets the header row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                MoodError::Log(format!("create log directory {}: {}", parent.display(), err))
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| MoodError::Log(format!("open {}: {}", path.display(), err)))?;

        let meta = file
            .metadata()
            .map_err(|err| MoodError::Log(format!("stat {}: {}", path.display(), err)))?;
        // Devices and pipes get rows only; header and tail repair apply to regular files.
        if meta.is_file() && meta.len() == 0 {
            let header = encode_row(&LOG_COLUMNS)?;
            file.write_all(&header)
                .and_then(|_| file.flush())
                .map_err(|err| MoodError::Log(format!("write header: {}", err)))?;
            log::info!("created detection log {}", path.display());
        } else if meta.is_file() && !ends_with_newline(&path)? {
            log::warn!(
                "detection log {} ends in a partial row; terminating it before appending",
                path.display()
            );
            file.write_all(b"\n")
                .and_then(|_| file.sync_data())
                .map_err(|err| MoodError::Log(format!("terminate partial row: {}", err)))?;
        }

        Ok(Self {
            path,
            file,
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Durably append one record.
    pub fn append(&mut self, record: &DetectionRecord) -> Result<()> {
        let row = encode_row(&record.to_row())?;
        self.file
            .write_all(&row)
            .and_then(|_| self.file.sync_data())
            .map_err(|err| {
                MoodError::Log(format!("append to {}: {}", self.path.display(), err))
            })?;
        self.appended += 1;
        log::debug!(
            "logged {} ({}) from {}",
            record.label(),
            record
                .confidence
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".into()),
            record.source
        );
        Ok(())
    }
}

fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)
        .map_err(|err| MoodError::Log(format!("open {}: {}", path.display(), err)))?;
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|err| MoodError::Log(format!("read tail of {}: {}", path.display(), err)))?;
    Ok(last[0] == b'\n')
}

fn encode_row<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|err| MoodError::Log(format!("encode row: {}", err)))
}

/// Read every complete record. A missing log reads as empty.
///
/// Malformed rows are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<DetectionRecord>> {
    let raw = match File::open(path) {
        Ok(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|err| MoodError::Log(format!("read {}: {}", path.display(), err)))?;
            buf
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(MoodError::Log(format!("open {}: {}", path.display(), err))),
    };

    let complete = match raw.iter().rposition(|&b| b == b'\n') {
        Some(last_newline) => &raw[..=last_newline],
        None => return Ok(Vec::new()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(complete);

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let parsed = row
            .map_err(MoodError::from)
            .and_then(|row| DetectionRecord::from_row(&row));
        match parsed {
            Ok(record) => records.push(record),
            Err(err) => log::warn!(
                "skipping malformed row {} in {}: {}",
                line + 2,
                path.display(),
                err
            ),
        }
    }
    Ok(records)
}

/// Records whose UTC timestamp falls on `day`.
pub fn read_day(path: &Path, day: NaiveDate) -> Result<Vec<DetectionRecord>> {
    Ok(read_records(path)?
        .into_iter()
        .filter(|record| record.timestamp.date_naive() == day)
        .collect())
}

/// The `limit` most recent records, newest first.
pub fn recent(path: &Path, limit: usize) -> Result<Vec<DetectionRecord>> {
    let mut records = read_records(path)?;
    // Reverse first so equal timestamps keep later appends ahead of earlier ones.
    records.reverse();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records.truncate(limit);
    Ok(records)
}
