//! Streaming CSV reader for replay commands
//!
//! Yields one `Result<Command, String>` per CSV row. Delegates format
//! concerns to the csv_format module.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual row errors are yielded as Err variants, prefixed with the
//!   line number, so the caller can log and skip them

use crate::io::csv_format::{convert_command_record, Command, CommandRecord};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::path::Path;

/// Iterator over the commands in a CSV file
///
/// Reads one row at a time; memory use does not grow with the file.
#[derive(Debug)]
pub struct CommandReader {
    reader: csv::Reader<File>,
    line_num: usize,
}

impl CommandReader {
    /// Open a CSV file for iteration
    ///
    /// The CSV reader trims whitespace from all fields and allows rows to
    /// omit the trailing `notes` column.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV file
    ///
    /// # Returns
    ///
    /// * `Ok(CommandReader)` if file opened successfully
    /// * `Err(String)` if file could not be opened
    pub fn new(path: &Path) -> Result<Self, String> {
        let file = File::open(path)
            .map_err(|e| format!("Failed to open file '{}': {}", path.display(), e))?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
        })
    }
}

impl Iterator for CommandReader {
    type Item = Result<Command, String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CommandRecord>();
        let row = deserializer.next()?;
        self.line_num += 1;
        // header is line 1
        let line = self.line_num + 1;

        Some(match row {
            Ok(record) => convert_command_record(record).map_err(|e| format!("Line {line}: {e}")),
            Err(e) => Err(format!("Line {line}: CSV parse error: {e}")),
        })
    }
}
