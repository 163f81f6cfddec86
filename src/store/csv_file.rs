use crate::error::TrackerError;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::warn;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A CSV file addressed by header name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl Table {
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(move |record| TableRow {
            headers: &self.headers,
            record,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    headers: &'a [String],
    record: &'a StringRecord,
}

impl<'a> TableRow<'a> {
    /// Cell under `column`, or `""` when the column or the cell is missing.
    pub fn get(&self, column: &str) -> &'a str {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|idx| self.record.get(idx))
            .unwrap_or("")
    }
}

/// Read a whole CSV file, `None` when it does not exist. Rows the CSV parser
/// rejects are skipped; short or long rows are kept as-is.
pub fn read_table(path: &Path) -> Result<Option<Table>, TrackerError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let headers = match reader.headers() {
        Ok(headers) => headers.iter().map(|h| h.trim().to_string()).collect(),
        Err(e) if e.is_io_error() => return Err(e.into()),
        Err(e) => {
            warn!("Unreadable header in {}: {}", path.display(), e);
            return Ok(Some(Table::default()));
        }
    };

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => warn!("Skipping malformed row in {}: {}", path.display(), e),
        }
    }

    Ok(Some(Table { headers, rows }))
}

/// Replace `path` with a header plus `rows`. The content is written to a
/// sibling `.tmp` file first and renamed over the target, so readers see
/// either the old file or the new one. A failed write removes the `.tmp`
/// file and leaves the target untouched.
pub fn write_atomic<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<(), TrackerError> {
    ensure_parent(path)?;
    let tmp = temp_path(path);

    let result = write_temp(&tmp, headers, rows)
        .and_then(|()| fs::rename(&tmp, path).map_err(TrackerError::from));
    if result.is_err() {
        fs::remove_file(&tmp).ok();
    }
    result
}

fn write_temp<T: Serialize>(
    tmp: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<(), TrackerError> {
    let file = File::create(tmp)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| TrackerError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Append `rows` to `path`, writing `headers` first when the file is new or
/// empty. A last line left without its newline by an interrupted append is
/// terminated before the new rows go in.
pub fn append_rows<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<(), TrackerError> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let len = file.metadata()?.len();
    let needs_header = len == 0;

    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            warn!("{} ends mid-line, terminating it", path.display());
            file.write_all(b"\n")?;
        }
    }

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer.write_record(headers)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<(), TrackerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
