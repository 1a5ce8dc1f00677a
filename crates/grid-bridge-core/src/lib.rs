//! # grid-bridge-core
//!
//! Addressing and value encoding shared by the grid scripting bridge.
//!
//! - [`CellAddress`], [`CellRange`], [`SheetRange`] - spreadsheet addressing with
//!   bijective base-26 column letters and column-major enumeration
//! - [`WriteTarget`] - write anchors that size themselves from the data
//! - [`Scalar`], [`CellInput`], [`Table`] - values and their wire encoding
//!
//! ## Example
//!
//! ```rust
//! use grid_bridge_core::{CellRange, encode_column, decode_column};
//!
//! assert_eq!(encode_column(27).unwrap(), "AA");
//! assert_eq!(decode_column("AZ").unwrap(), 52);
//!
//! let cells: Vec<String> = CellRange::parse("A1:B2")
//!     .unwrap()
//!     .cells()
//!     .map(|c| c.to_string())
//!     .collect();
//! assert_eq!(cells, ["A1", "A2", "B1", "B2"]);
//! ```

pub mod address;
pub mod error;
pub mod value;

pub use address::{
    decode_column, encode_column, Anchor, CellAddress, CellRange, DataShape, SheetRange,
    WriteTarget,
};
pub use error::{Error, Result};
pub use value::{
    decode_range_to_table, encode_list, encode_literal, encode_single, escape_text,
    format_number, CellInput, Column, ColumnMajor, DecodedTable, Scalar, Table, Value,
};

/// Sigil marking a value as a live formula rather than literal data
pub const FORMULA_SIGIL: char = '=';

/// Separator between the two corners of a range
pub const RANGE_SEPARATOR: char = ':';

/// Separator between a sheet index and a range
pub const SHEET_SEPARATOR: char = '!';

/// Decimal places used when writing numbers to the grid
pub const NUMBER_DECIMALS: usize = 12;
