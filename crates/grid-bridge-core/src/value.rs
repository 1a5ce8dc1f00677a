//! Cell values and their wire encoding
//!
//! Values travel to the host as text the grid evaluates. Numbers are written
//! with a fixed number of decimals, text is quoted, and formulas pass through
//! untouched. Whether a string is a formula is decided once, when a
//! [`CellInput`] is built, never by the encoder.

use std::fmt;

use crate::address::DataShape;
use crate::error::{Error, Result};
use crate::{FORMULA_SIGIL, NUMBER_DECIMALS};

/// A plain cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    /// Empty cell (no value)
    #[default]
    Empty,
    /// Boolean value (TRUE/FALSE)
    Bool(bool),
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
}

impl Scalar {
    /// Create a new text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        Scalar::Text(s.into())
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Empty)
    }

    /// Try to get the value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<i32> for Scalar {
    fn from(n: i32) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Empty => Ok(()),
            Scalar::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A value headed for the grid: literal data or a live formula
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// Data the grid stores as-is
    Literal(Scalar),
    /// Formula body, without the leading sigil
    Formula(String),
}

impl CellInput {
    /// Create a formula input; a leading `=` is accepted and dropped
    pub fn formula<S: AsRef<str>>(text: S) -> Self {
        let text = text.as_ref();
        CellInput::Formula(text.strip_prefix(FORMULA_SIGIL).unwrap_or(text).to_string())
    }

    /// Classify text typed by a user: a leading `=` makes it a formula.
    ///
    /// This is the only place the sigil is sniffed.
    pub fn from_user_text<S: Into<String>>(text: S) -> Self {
        let text = text.into();
        match text.strip_prefix(FORMULA_SIGIL) {
            Some(body) => CellInput::Formula(body.to_string()),
            None => CellInput::Literal(Scalar::Text(text)),
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellInput::Formula(_))
    }
}

impl From<Scalar> for CellInput {
    fn from(s: Scalar) -> Self {
        CellInput::Literal(s)
    }
}

impl From<f64> for CellInput {
    fn from(n: f64) -> Self {
        CellInput::Literal(Scalar::Number(n))
    }
}

impl From<bool> for CellInput {
    fn from(b: bool) -> Self {
        CellInput::Literal(Scalar::Bool(b))
    }
}

impl From<&str> for CellInput {
    fn from(s: &str) -> Self {
        CellInput::Literal(Scalar::text(s))
    }
}

/// A named column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: Option<String>,
    pub values: Vec<CellInput>,
}

impl Column {
    pub fn new<S: Into<String>>(name: S, values: Vec<CellInput>) -> Self {
        Self {
            name: Some(name.into()),
            values,
        }
    }

    pub fn unnamed(values: Vec<CellInput>) -> Self {
        Self { name: None, values }
    }
}

/// A table written column by column
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    /// Whether each column is prefixed by its header name on the wire
    pub include_headers: bool,
}

/// Flattened, column-major form of a table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMajor {
    /// Encoded values, one column after another
    pub values: Vec<String>,
    /// Entries per column, header included
    pub column_len: usize,
    pub column_count: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>, include_headers: bool) -> Self {
        Self {
            columns,
            include_headers,
        }
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows on the wire, header included
    pub fn height(&self) -> usize {
        let data = self.columns.first().map_or(0, |c| c.values.len());
        data + usize::from(self.include_headers)
    }

    /// Flatten into column-major wire values.
    ///
    /// All columns must have the same number of values.
    pub fn to_columns(&self) -> Result<ColumnMajor> {
        let Some(first) = self.columns.first() else {
            return Err(Error::InvalidValue("table has no columns".into()));
        };
        let expected = first.values.len();

        let mut values = Vec::with_capacity(self.width() * self.height());
        for (index, column) in self.columns.iter().enumerate() {
            if column.values.len() != expected {
                return Err(Error::RaggedTable {
                    column: column.name.clone().unwrap_or_else(|| index.to_string()),
                    expected,
                    actual: column.values.len(),
                });
            }

            if self.include_headers {
                values.push(escape_text(column.name.as_deref().unwrap_or_default()));
            }
            for input in &column.values {
                values.push(encode_element(input)?);
            }
        }

        Ok(ColumnMajor {
            values,
            column_len: self.height(),
            column_count: self.width(),
        })
    }
}

/// Data a script asks to write
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(CellInput),
    List(Vec<CellInput>),
    Table(Table),
}

impl Value {
    /// Extent of the data, for sizing write anchors
    pub fn shape(&self) -> DataShape {
        match self {
            Value::Scalar(_) => DataShape::Single,
            Value::List(items) => DataShape::List(items.len()),
            Value::Table(table) => DataShape::Table {
                width: table.width(),
                height: table.height(),
            },
        }
    }
}

/// Format a number with fixed decimals, never in scientific notation.
///
/// # Examples
/// ```
/// use grid_bridge_core::format_number;
///
/// assert_eq!(format_number(3.14159265358979).unwrap(), "3.141592653590");
/// assert_eq!(format_number(2.0).unwrap(), "2.000000000000");
/// ```
pub fn format_number(n: f64) -> Result<String> {
    if !n.is_finite() {
        return Err(Error::InvalidValue(format!("{n} has no cell representation")));
    }
    // -0.0 prints with a sign
    let n = if n == 0.0 { 0.0 } else { n };
    Ok(format!("{n:.prec$}", prec = NUMBER_DECIMALS))
}

/// Quote text as a string literal, doubling embedded quotes.
///
/// Control characters are kept; the JSON layer escapes them on the wire.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Encode a literal scalar as cell text
pub fn encode_literal(scalar: &Scalar) -> Result<String> {
    match scalar {
        Scalar::Empty => Ok(escape_text("")),
        Scalar::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Scalar::Number(n) => format_number(*n),
        Scalar::Text(s) => Ok(escape_text(s)),
    }
}

/// Encode a value for a single-value write; the host evaluates it as a formula.
pub fn encode_single(input: &CellInput) -> Result<String> {
    let body = match input {
        CellInput::Literal(scalar) => encode_literal(scalar)?,
        CellInput::Formula(text) => text.clone(),
    };
    Ok(format!("{FORMULA_SIGIL}{body}"))
}

/// Encode list elements as literal data.
///
/// Formula elements are sent as their body, without the sigil.
pub fn encode_list(inputs: &[CellInput]) -> Result<Vec<String>> {
    inputs.iter().map(encode_element).collect()
}

fn encode_element(input: &CellInput) -> Result<String> {
    match input {
        CellInput::Literal(scalar) => encode_literal(scalar),
        CellInput::Formula(text) => Ok(text.clone()),
    }
}

/// A table read back from the grid, row by row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedTable {
    /// First row, when the read was told to expect headers
    pub header: Option<Vec<Scalar>>,
    pub rows: Vec<Vec<Scalar>>,
}

impl DecodedTable {
    /// Number of columns
    pub fn width(&self) -> usize {
        self.header
            .as_ref()
            .map(Vec::len)
            .or_else(|| self.rows.first().map(Vec::len))
            .unwrap_or(0)
    }

    /// Number of body rows
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Values of one column, top to bottom, header excluded
    pub fn column(&self, index: usize) -> Vec<Scalar> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).cloned())
            .collect()
    }
}

/// Rebuild a table from column-major read results.
///
/// `values` holds `rows` entries per column; the result is transposed into
/// rows of columns. With `header`, the first row is split off.
pub fn decode_range_to_table(values: Vec<Scalar>, rows: usize, header: bool) -> Result<DecodedTable> {
    if rows == 0 {
        return Err(Error::InvalidValue("a table needs at least one row".into()));
    }
    if values.len() % rows != 0 {
        return Err(Error::InvalidValue(format!(
            "{} values do not fill columns of {rows}",
            values.len()
        )));
    }

    let columns: Vec<&[Scalar]> = values.chunks(rows).collect();
    let mut table_rows: Vec<Vec<Scalar>> = (0..rows)
        .map(|r| columns.iter().map(|col| col[r].clone()).collect())
        .collect();

    let header = if header {
        Some(table_rows.remove(0))
    } else {
        None
    };

    Ok(DecodedTable {
        header,
        rows: table_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_number_rounds() {
        assert_eq!(format_number(3.14159265358979).unwrap(), "3.141592653590");
        assert_eq!(format_number(1.0).unwrap(), "1.000000000000");
        assert_eq!(format_number(-2.5).unwrap(), "-2.500000000000");
        assert_eq!(format_number(-0.0).unwrap(), "0.000000000000");
        assert_eq!(
            format_number(1e20).unwrap(),
            "100000000000000000000.000000000000"
        );
        assert_eq!(format_number(1e-13).unwrap(), "0.000000000000");
    }

    #[test]
    fn test_format_number_rejects_non_finite() {
        assert!(format_number(f64::NAN).is_err());
        assert!(format_number(f64::INFINITY).is_err());
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("hi"), "\"hi\"");
        assert_eq!(escape_text(""), "\"\"");
        assert_eq!(escape_text("say \"x\""), "\"say \"\"x\"\"\"");
    }

    #[test]
    fn test_encode_single() {
        assert_eq!(encode_single(&3.0.into()).unwrap(), "=3.000000000000");
        assert_eq!(encode_single(&"hi".into()).unwrap(), "=\"hi\"");
        assert_eq!(
            encode_single(&CellInput::formula("=SUM(A1:A3)")).unwrap(),
            "=SUM(A1:A3)"
        );
        assert_eq!(encode_single(&true.into()).unwrap(), "=TRUE");
    }

    #[test]
    fn test_encode_list() {
        let items = vec![
            CellInput::from("hi"),
            CellInput::from(2.0),
            CellInput::formula("A1*2"),
        ];
        assert_eq!(
            encode_list(&items).unwrap(),
            vec!["\"hi\"", "2.000000000000", "A1*2"]
        );
    }

    #[test]
    fn test_from_user_text() {
        assert_eq!(
            CellInput::from_user_text("=A1+1"),
            CellInput::Formula("A1+1".into())
        );
        assert_eq!(
            CellInput::from_user_text("plain"),
            CellInput::Literal(Scalar::text("plain"))
        );
        // A literal built directly is never sniffed
        assert!(!CellInput::from("=A1").is_formula());
    }

    fn sample_table(include_headers: bool) -> Table {
        Table::new(
            vec![
                Column::new("x", vec![1.0.into(), 2.0.into(), 3.0.into()]),
                Column::new("y", vec!["a".into(), "b".into(), "c".into()]),
            ],
            include_headers,
        )
    }

    #[test]
    fn test_table_to_columns_with_headers() {
        let flat = sample_table(true).to_columns().unwrap();
        assert_eq!(flat.column_len, 4);
        assert_eq!(flat.column_count, 2);
        assert_eq!(
            flat.values,
            vec![
                "\"x\"",
                "1.000000000000",
                "2.000000000000",
                "3.000000000000",
                "\"y\"",
                "\"a\"",
                "\"b\"",
                "\"c\"",
            ]
        );
    }

    #[test]
    fn test_table_to_columns_without_headers() {
        let flat = sample_table(false).to_columns().unwrap();
        assert_eq!(flat.column_len, 3);
        assert_eq!(flat.values.len(), 6);
        assert_eq!(flat.values[3], "\"a\"");
    }

    #[test]
    fn test_ragged_table_rejected() {
        let table = Table::new(
            vec![
                Column::new("x", vec![1.0.into()]),
                Column::new("y", vec![1.0.into(), 2.0.into()]),
            ],
            false,
        );
        match table.to_columns() {
            Err(Error::RaggedTable {
                column,
                expected,
                actual,
            }) => {
                assert_eq!(column, "y");
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_value_shape() {
        assert_eq!(Value::Scalar(1.0.into()).shape(), DataShape::Single);
        assert_eq!(
            Value::List(vec!["a".into(), "b".into()]).shape(),
            DataShape::List(2)
        );
        assert_eq!(
            Value::Table(sample_table(true)).shape(),
            DataShape::Table {
                width: 2,
                height: 4
            }
        );
    }

    #[test]
    fn test_decode_range_to_table() {
        // A1:B3 read column-major: A1 A2 A3 B1 B2 B3
        let values = vec![
            Scalar::text("x"),
            Scalar::Number(1.0),
            Scalar::Number(2.0),
            Scalar::text("y"),
            Scalar::text("a"),
            Scalar::text("b"),
        ];
        let table = decode_range_to_table(values, 3, true).unwrap();
        assert_eq!(
            table.header,
            Some(vec![Scalar::text("x"), Scalar::text("y")])
        );
        assert_eq!(table.height(), 2);
        assert_eq!(table.width(), 2);
        assert_eq!(table.rows[0], vec![Scalar::Number(1.0), Scalar::text("a")]);
        assert_eq!(table.column(1), vec![Scalar::text("a"), Scalar::text("b")]);
    }

    #[test]
    fn test_decode_range_to_table_errors() {
        assert!(decode_range_to_table(vec![Scalar::Empty; 3], 0, false).is_err());
        assert!(decode_range_to_table(vec![Scalar::Empty; 5], 2, false).is_err());
    }
}
