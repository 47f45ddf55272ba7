//! TSL `.ang` text format: header grammar and data-row parsing.
//!
//! Both layers work on in-memory text so the hierarchical reader can reuse
//! the grammar on a stored `OriginalFile` header.
//!
//! ```ignore
//! let parsed = ebsd_conv::ang::parse_header(text)?;
//! let data = &text[ebsd_conv::ang::header_end(text)..];
//! let block = ebsd_conv::ang::parse_rows(data, &wanted)?;
//! ```

pub mod data;
pub mod export;
pub mod grammar;

pub use export::dataset_to_ang;
pub use data::{available_columns, column_name, parse_rows, write_rows, DataBlock, COLUMN_NAMES};
pub use grammar::{header_end, parse_header, split_header_line, write_header, ParsedHeader};
