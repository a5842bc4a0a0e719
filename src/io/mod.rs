//! I/O module
//!
//! Handles CSV parsing and output for the replay driver.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, balance output)
//! - `command_reader` - Streaming CSV reader with iterator interface

pub mod command_reader;
pub mod csv_format;

pub use command_reader::CommandReader;
pub use csv_format::{convert_command_record, write_balances_csv, Command, CommandRecord};
