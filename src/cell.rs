//! Tagged values, rows and result sets (§3 "Cell" / "Column" / "Row" / "Rows", §4.2).

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, NaiveDateTime, DateTime, Utc};
use uuid::Uuid;

/// A column's declared SQL type (§6 "Column types").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    SmallInt,
    Int,
    BigInt,
    Float,
    Numeric,
    Boolean,
    Text,
    Enum,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
}

impl CellType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            CellType::SmallInt | CellType::Int | CellType::BigInt | CellType::Float | CellType::Numeric
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(self, CellType::SmallInt | CellType::Int | CellType::BigInt)
    }

    /// PostgreSQL wire OID for this type (§4.15).
    pub fn pg_oid(self) -> u32 {
        match self {
            CellType::SmallInt => 21,
            CellType::Int => 23,
            CellType::BigInt => 20,
            CellType::Float => 701,
            CellType::Numeric => 1700,
            CellType::Boolean => 16,
            CellType::Text | CellType::Enum => 25,
            CellType::Date => 1082,
            CellType::Time => 1083,
            CellType::Timestamp => 1114,
            CellType::TimestampTz => 1184,
            CellType::Interval => 1186,
            CellType::Uuid => 2950,
        }
    }
}

/// A postgres-style calendar interval: months + days + microseconds, kept
/// as three independent components rather than normalized to a duration
/// since `1 month` has no fixed number of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl Interval {
    pub const ZERO: Interval = Interval { months: 0, days: 0, micros: 0 };

    /// Total order used for comparisons: approximate months as 30 days,
    /// days as 24h, matching the common convention for interval ordering.
    fn total_micros(self) -> i128 {
        const DAY_MICROS: i128 = 86_400_000_000;
        const MONTH_MICROS: i128 = 30 * DAY_MICROS;
        self.months as i128 * MONTH_MICROS + self.days as i128 * DAY_MICROS + self.micros as i128
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mons {} days {} us", self.months, self.days, self.micros)
    }
}

/// The typed payload of a non-null cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Numeric(f64),
    Boolean(bool),
    Text(String),
    /// An enum value: the variant name plus its ordinal within the enum
    /// type's declared value list (used for ordering, §3 "Enum type").
    Enum { value: String, ordinal: u32 },
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(Interval),
    Uuid(Uuid),
}

/// A single tagged value (§3 "Cell").
///
/// Invariant: if `is_null`, `value` is ignored by every consumer — it is
/// kept as `None` rather than a don't-care payload so there is no way to
/// read stale data out of a null cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub ty: CellType,
    pub value: Option<CellValue>,
}

impl Cell {
    pub fn null(ty: CellType) -> Self {
        Cell { ty, value: None }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn int(v: i32) -> Self {
        Cell { ty: CellType::Int, value: Some(CellValue::Int(v)) }
    }

    pub fn bigint(v: i64) -> Self {
        Cell { ty: CellType::BigInt, value: Some(CellValue::BigInt(v)) }
    }

    pub fn float(v: f64) -> Self {
        Cell { ty: CellType::Float, value: Some(CellValue::Float(v)) }
    }

    pub fn text(v: impl Into<String>) -> Self {
        Cell { ty: CellType::Text, value: Some(CellValue::Text(v.into())) }
    }

    pub fn boolean(v: bool) -> Self {
        Cell { ty: CellType::Boolean, value: Some(CellValue::Boolean(v)) }
    }

    /// Best-effort numeric view, promoting any numeric-typed non-null cell
    /// to `f64`. Returns `None` for null or non-numeric cells.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.value {
            None => None,
            Some(CellValue::SmallInt(v)) => Some(*v as f64),
            Some(CellValue::Int(v)) => Some(*v as f64),
            Some(CellValue::BigInt(v)) => Some(*v as f64),
            Some(CellValue::Float(v)) => Some(*v),
            Some(CellValue::Numeric(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(CellValue::Text(s)) => Some(s.as_str()),
            Some(CellValue::Enum { value, .. }) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            Some(CellValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Deep-copy: for `Cell`, a `Clone` already deep-copies owned text, so
    /// this exists to mirror the reference's `cell_copy(dst, src)` call
    /// shape at call sites that want to read like the original.
    pub fn copy_from(&mut self, src: &Cell) {
        *self = src.clone();
    }
}

/// Three-way compare with int↔float promotion; `text` by byte order;
/// returns `None` ("error sentinel") for non-null cells of incompatible
/// kinds (e.g. comparing a boolean to text) — §3 "Index" / §4.2.
pub fn cell_compare(a: &Cell, b: &Cell) -> Option<Ordering> {
    match (&a.value, &b.value) {
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(Ordering::Less),
        (Some(_), None) => Some(Ordering::Greater),
        (Some(av), Some(bv)) => compare_values(av, bv),
    }
}

fn compare_values(a: &CellValue, b: &CellValue) -> Option<Ordering> {
    use CellValue::*;
    match (a, b) {
        (Text(x), Text(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (Boolean(x), Boolean(y)) => Some(x.cmp(y)),
        (Date(x), Date(y)) => Some(x.cmp(y)),
        (Time(x), Time(y)) => Some(x.cmp(y)),
        (Timestamp(x), Timestamp(y)) => Some(x.cmp(y)),
        (TimestampTz(x), TimestampTz(y)) => Some(x.cmp(y)),
        (Interval(x), Interval(y)) => Some(x.total_micros().cmp(&y.total_micros())),
        (Uuid(x), Uuid(y)) => Some(x.cmp(y)),
        (Enum { ordinal: x, .. }, Enum { ordinal: y, .. }) => Some(x.cmp(y)),
        // numeric promotion: any pair of numeric-kind values compares as f64
        _ => {
            let (Some(x), Some(y)) = (numeric_of(a), numeric_of(b)) else { return None };
            x.partial_cmp(&y)
        }
    }
}

fn numeric_of(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::SmallInt(v) => Some(*v as f64),
        CellValue::Int(v) => Some(*v as f64),
        CellValue::BigInt(v) => Some(*v as f64),
        CellValue::Float(v) => Some(*v),
        CellValue::Numeric(v) => Some(*v),
        _ => None,
    }
}

pub fn cell_equal(a: &Cell, b: &Cell) -> bool {
    cell_compare(a, b) == Some(Ordering::Equal)
}

/// Column metadata (§3 "Column").
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: CellType,
    pub enum_type_name: Option<String>,
    pub default: Option<Cell>,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    /// `SERIAL`/`BIGSERIAL` columns are backed by a catalog sequence of the
    /// same name as `{table}_{column}_seq` (§SPEC_FULL.md B.1).
    pub sequence_name: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: CellType) -> Self {
        Column {
            name: name.into(),
            ty,
            enum_type_name: None,
            default: None,
            not_null: false,
            unique: false,
            primary_key: false,
            sequence_name: None,
        }
    }
}

/// An ordered sequence of cells; cell `i` corresponds to column `i` of the
/// owning table (§3 "Row").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Row { cells }
    }

    /// Pad with nulls/defaults up to `schema.len()` (INSERT §4.14).
    pub fn pad_to(&mut self, schema: &[Column]) {
        while self.cells.len() < schema.len() {
            let col = &schema[self.cells.len()];
            let cell = col.default.clone().unwrap_or_else(|| Cell::null(col.ty));
            self.cells.push(cell);
        }
    }
}

pub fn row_equal(a: &Row, b: &Row) -> bool {
    a.cells.len() == b.cells.len() && a.cells.iter().zip(b.cells.iter()).all(|(x, y)| cell_equal(x, y))
}

/// An ordered result set (§3 "Rows (result set)").
///
/// `arena_owned_text` records whether the text inside each `Cell` was
/// allocated fresh for this result (so a caller could, in principle, take
/// ownership and free it independently of the table it came from) versus
/// being a clone of table-owned storage. In Rust every `String` is already
/// independently owned by `Clone`, so this flag has no destructor
/// implications; it is kept purely as a provenance marker because §3
/// specifies it as part of the result-set's public shape, and the wire
/// layer reads it to decide whether a result may be streamed directly or
/// must be copied into the result-text arena first.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub rows: Vec<Row>,
    pub columns: Vec<Column>,
    pub arena_owned_text: bool,
    /// `INSERT 0 n` / `UPDATE n` / `DELETE n`-style wire tag (§6). `None`
    /// for a plain `SELECT`, where the wire layer derives `"SELECT n"`
    /// from `rows.len()` instead.
    pub command_tag: Option<String>,
}

impl Rows {
    pub fn new(columns: Vec<Column>) -> Self {
        Rows { rows: Vec::new(), columns, arena_owned_text: true, command_tag: None }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_float_promotion_compares_equal() {
        let a = Cell::int(5);
        let b = Cell::float(5.0);
        assert!(cell_equal(&a, &b));
    }

    #[test]
    fn nulls_compare_equal() {
        let a = Cell::null(CellType::Int);
        let b = Cell::null(CellType::Int);
        assert!(cell_equal(&a, &b));
    }

    #[test]
    fn null_sorts_before_value() {
        let a = Cell::null(CellType::Int);
        let b = Cell::int(1);
        assert_eq!(cell_compare(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn text_compares_by_byte_order() {
        let a = Cell::text("apple");
        let b = Cell::text("banana");
        assert_eq!(cell_compare(&a, &b), Some(Ordering::Less));
    }

    #[test]
    fn mixed_incomparable_types_return_none() {
        let a = Cell::boolean(true);
        let b = Cell::text("true");
        assert_eq!(cell_compare(&a, &b), None);
    }

    #[test]
    fn row_padding_uses_defaults_then_nulls() {
        let mut cols = vec![Column::new("a", CellType::Int), Column::new("b", CellType::Text)];
        cols[1].default = Some(Cell::text("x"));
        let mut row = Row::new(vec![Cell::int(1)]);
        row.pad_to(&cols);
        assert_eq!(row.cells.len(), 2);
        assert_eq!(row.cells[1].as_str(), Some("x"));
    }
}
