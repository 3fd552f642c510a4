//! CSV roster import and delivery report export.

pub mod report_writer;
pub mod roster_reader;
