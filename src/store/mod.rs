//! Flat-file stores shared by the scraper, the alert pass, the report and the
//! dashboard. No locking: whole-file replacements go through a temp file and a
//! rename, the history log is append-only with a single writer.

mod csv_file;
mod file_store;
#[cfg(test)]
pub(crate) mod test_support;

pub use csv_file::{append_rows, read_table, write_atomic, Table, TableRow};
pub use file_store::FileStore;

/// Outcome of reading a store file. A missing file is a normal state, kept
/// apart from I/O failures which surface as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset<T> {
    Absent,
    Rows(Vec<T>),
}

impl<T> Dataset<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Dataset::Absent)
    }

    /// True when the file is missing or holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    pub fn rows(&self) -> &[T] {
        match self {
            Dataset::Absent => &[],
            Dataset::Rows(rows) => rows,
        }
    }

    pub fn into_rows(self) -> Vec<T> {
        match self {
            Dataset::Absent => Vec::new(),
            Dataset::Rows(rows) => rows,
        }
    }

    pub fn map<U, F>(self, f: F) -> Dataset<U>
    where
        F: FnOnce(Vec<T>) -> Vec<U>,
    {
        match self {
            Dataset::Absent => Dataset::Absent,
            Dataset::Rows(rows) => Dataset::Rows(f(rows)),
        }
    }
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Dataset::Absent
    }
}
