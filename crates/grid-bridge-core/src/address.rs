//! Cell address and range types
//!
//! Columns and rows are 1-based throughout: `A1` is `(col 1, row 1)`. Column
//! letters form a bijective base-26 numeral system with digits `A`..`Z` standing
//! for 1..26 and no zero digit, so `Z` is 26 and `AA` is 27.

use std::fmt;
use std::str::FromStr;

use lazy_regex::{regex_captures, regex_is_match};

use crate::error::{Error, Result};
use crate::{RANGE_SEPARATOR, SHEET_SEPARATOR};

/// Convert column letters to a 1-based index (A = 1, Z = 26, AA = 27).
///
/// Letters are case-insensitive.
pub fn decode_column(letters: &str) -> Result<u32> {
    if letters.is_empty() {
        return Err(Error::address("empty column letters"));
    }

    let mut total: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(Error::address(format!("invalid column letter '{c}'")));
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        total = total
            .checked_mul(26)
            .and_then(|t| t.checked_add(digit))
            .ok_or_else(|| Error::address(format!("column '{letters}' is too large")))?;
    }

    Ok(total)
}

/// Convert a 1-based column index to letters (1 = A, 26 = Z, 27 = AA).
///
/// # Examples
/// ```
/// use grid_bridge_core::encode_column;
///
/// assert_eq!(encode_column(26).unwrap(), "Z");
/// assert_eq!(encode_column(52).unwrap(), "AZ");
/// assert_eq!(encode_column(53).unwrap(), "BA");
/// ```
pub fn encode_column(index: u32) -> Result<String> {
    if index == 0 {
        return Err(Error::address("column index must be >= 1"));
    }

    let mut digits = Vec::new();
    let mut n = index;
    while n > 0 {
        let rem = (n - 1) % 26;
        digits.push((rem as u8 + b'A') as char);
        n = (n - 1) / 26;
    }

    Ok(digits.iter().rev().collect())
}

/// A single cell location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    /// Column index (1-based, A = 1)
    pub col: u32,
    /// Row index (1-based)
    pub row: u32,
}

impl CellAddress {
    /// Create a new address from a 1-based column and row
    pub fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }

    /// Parse a cell address from A1-style notation
    ///
    /// # Examples
    /// ```
    /// use grid_bridge_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("AA10").unwrap();
    /// assert_eq!(addr.col, 27);
    /// assert_eq!(addr.row, 10);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some((_, letters, digits)) = regex_captures!(r"^([A-Za-z]+)([0-9]+)$", s) else {
            return Err(Error::address(format!("expected column letters and row number in '{s}'")));
        };

        let col = decode_column(letters)?;
        let row: u32 = digits
            .parse()
            .map_err(|_| Error::address(format!("invalid row number in '{s}'")))?;

        if row == 0 {
            return Err(Error::address(format!("row number must be >= 1 in '{s}'")));
        }

        Ok(Self { col, row })
    }

    /// Column letters of this address
    pub fn column_letters(&self) -> String {
        encode_column(self.col).unwrap_or_default()
    }

    /// Format as A1-style string
    pub fn to_a1_string(&self) -> String {
        format!("{}{}", self.column_letters(), self.row)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular block of cells (e.g., "A1:B10")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Top-left corner
    pub start: CellAddress,
    /// Bottom-right corner
    pub end: CellAddress,
}

impl CellRange {
    /// Create a new range; corners are normalized so `start` is top-left
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.col.min(b.col), a.row.min(b.row)),
            end: CellAddress::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    /// Create a single-cell range
    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Parse a range from A1:B10 notation; a lone address is a one-cell range
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        match s.split_once(RANGE_SEPARATOR) {
            Some((first, second)) => {
                let start = CellAddress::parse(first)?;
                let end = CellAddress::parse(second)?;
                Ok(Self::new(start, end))
            }
            None => Ok(Self::single(CellAddress::parse(s)?)),
        }
    }

    /// Check if a cell is within this range
    pub fn contains(&self, addr: &CellAddress) -> bool {
        addr.row >= self.start.row
            && addr.row <= self.end.row
            && addr.col >= self.start.col
            && addr.col <= self.end.col
    }

    /// Number of rows in the range
    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    /// Number of columns in the range
    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    /// Total number of cells in the range
    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    /// Iterate over all cell addresses, column by column.
    ///
    /// Every consumer that reshapes read results relies on this order: all rows
    /// of the first column, then all rows of the next.
    pub fn cells(&self) -> CellRangeIterator {
        CellRangeIterator {
            range: *self,
            col: self.start.col,
            row: self.start.row,
            remaining: self.cell_count(),
        }
    }

    /// Format as `A1:B10`, or `A1` for a single cell
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            self.to_wire_string()
        }
    }

    /// Format as `A1:B10`, always with both corners
    pub fn to_wire_string(&self) -> String {
        format!("{}{RANGE_SEPARATOR}{}", self.start, self.end)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Column-major iterator over cells in a range
pub struct CellRangeIterator {
    range: CellRange,
    col: u32,
    row: u32,
    remaining: u64,
}

impl Iterator for CellRangeIterator {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let addr = CellAddress::new(self.col, self.row);
        self.remaining -= 1;

        if self.row >= self.range.end.row {
            self.row = self.range.start.row;
            self.col = self.col.wrapping_add(1);
        } else {
            self.row += 1;
        }

        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CellRangeIterator {}

/// Split an optional `<sheet>!` prefix off a reference.
fn split_sheet(s: &str) -> Result<(Option<usize>, &str)> {
    match s.split_once(SHEET_SEPARATOR) {
        Some((sheet, rest)) => {
            let sheet = sheet
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::InvalidRange(format!("invalid sheet index in '{s}'")))?;
            Ok((Some(sheet), rest.trim()))
        }
        None => Ok((None, s.trim())),
    }
}

/// A range scoped to a sheet (e.g., "1!A1:B2")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetRange {
    /// 0-based sheet index
    pub sheet: usize,
    /// Cells within the sheet
    pub range: CellRange,
}

impl SheetRange {
    pub fn new(sheet: usize, range: CellRange) -> Self {
        Self { sheet, range }
    }

    /// Parse `[<sheet>!]<Col><Row>[:<Col><Row>]`, defaulting to sheet 0
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_with_default(s, 0)
    }

    /// Parse a sheet-scoped range, using `default_sheet` when no prefix is given
    pub fn parse_with_default(s: &str, default_sheet: usize) -> Result<Self> {
        let (sheet, rest) = split_sheet(s)?;
        Ok(Self {
            sheet: sheet.unwrap_or(default_sheet),
            range: CellRange::parse(rest)?,
        })
    }

    /// Key under which a cell of this sheet is cached, e.g. `0!A1`
    pub fn cache_key(&self, addr: &CellAddress) -> String {
        format!("{}{SHEET_SEPARATOR}{addr}", self.sheet)
    }

    /// Cache keys for every cell, column-major
    pub fn cache_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.range.cells().map(move |addr| self.cache_key(&addr))
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SHEET_SEPARATOR}{}",
            self.sheet,
            self.range.to_wire_string()
        )
    }
}

/// Where a write lands before its size is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Bare column letters, e.g. `C`
    Column(u32),
    /// Bare row number, e.g. `5`
    Row(u32),
    /// A single cell with no second corner, e.g. `C5`
    Cell(CellAddress),
    /// An explicit two-corner range
    Range(CellRange),
}

/// Extent of the data being written, used to size an anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    Single,
    List(usize),
    Table { width: usize, height: usize },
}

/// Parsed target of a write call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTarget {
    /// Explicit sheet index, if the reference carried one
    pub sheet: Option<usize>,
    pub anchor: Anchor,
}

impl WriteTarget {
    /// Parse a write reference: a range, a cell, a bare column or a bare row
    pub fn parse(s: &str) -> Result<Self> {
        let (sheet, rest) = split_sheet(s)?;

        let anchor = if rest.contains(RANGE_SEPARATOR) {
            Anchor::Range(CellRange::parse(rest)?)
        } else if regex_is_match!(r"^[A-Za-z]+$", rest) {
            Anchor::Column(decode_column(rest)?)
        } else if regex_is_match!(r"^[0-9]+$", rest) {
            let row: u32 = rest
                .parse()
                .map_err(|_| Error::address(format!("invalid row number in '{rest}'")))?;
            if row == 0 {
                return Err(Error::address(format!("row number must be >= 1 in '{rest}'")));
            }
            Anchor::Row(row)
        } else {
            Anchor::Cell(CellAddress::parse(rest)?)
        };

        Ok(Self { sheet, anchor })
    }

    /// Compute the range the data will occupy.
    ///
    /// Explicit ranges are taken as given. Other anchors grow from their
    /// top-left cell: lists run down a column (or across a row for a bare row
    /// anchor), tables extend right by their width and down by their height.
    pub fn resolve(&self, shape: DataShape) -> Result<CellRange> {
        let origin = match self.anchor {
            Anchor::Range(range) => return Ok(range),
            Anchor::Column(col) => CellAddress::new(col, 1),
            Anchor::Row(row) => CellAddress::new(1, row),
            Anchor::Cell(addr) => addr,
        };

        let (width, height) = match shape {
            DataShape::Single => (1, 1),
            DataShape::List(0) => {
                return Err(Error::InvalidValue("cannot write an empty list".into()))
            }
            DataShape::List(len) if matches!(self.anchor, Anchor::Row(_)) => (len, 1),
            DataShape::List(len) => (1, len),
            DataShape::Table { width, height } if width == 0 || height == 0 => {
                return Err(Error::InvalidValue("cannot write an empty table".into()))
            }
            DataShape::Table { width, height } => (width, height),
        };

        let end = CellAddress::new(extend(origin.col, width)?, extend(origin.row, height)?);
        Ok(CellRange::new(origin, end))
    }
}

/// `start + len - 1` with overflow reported as a range error
fn extend(start: u32, len: usize) -> Result<u32> {
    u32::try_from(len - 1)
        .ok()
        .and_then(|offset| start.checked_add(offset))
        .ok_or_else(|| Error::InvalidRange(format!("{len} cells from index {start} overflows")))
}
