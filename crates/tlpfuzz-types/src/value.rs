//! Typed SQL values and result sets.

#![allow(clippy::match_same_arms)]

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Largest magnitude at which every integer is exactly representable as `f64`.
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// A typed SQL value as returned by a statement executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Bytes),
    /// Days since Unix epoch.
    Date(i32),
    /// Microseconds within the day.
    Time(i64),
    /// Microseconds since Unix epoch.
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value; `None` for NULL and non-numeric types.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(v) => Some(i64::from(*v)),
            Value::Real(v) if v.fract() == 0.0 && v.abs() < EXACT_F64_INT => Some(*v as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Canonical text used to compare results across rewrites.
    ///
    /// Integral reals and integers share one form, `-0.0` folds to zero and
    /// other reals are rounded to 12 significant digits.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "N".to_string(),
            Value::Boolean(v) => format!("b:{v}"),
            Value::Integer(v) => format!("n:{v}"),
            Value::Real(v) => format!("n:{}", canonical_real(*v)),
            Value::Text(s) => format!("t:{s}"),
            Value::Bytes(b) => format!("x:{}", hex(b)),
            Value::Date(d) => format!("d:{d}"),
            Value::Time(t) => format!("tm:{t}"),
            Value::Timestamp(ts) => format!("ts:{ts}"),
        }
    }
}

fn canonical_real(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }
    if v.fract() == 0.0 && v.abs() < EXACT_F64_INT {
        return format!("{}", v as i64);
    }
    format!("{v:.11e}")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bytes(b) => write!(f, "x'{}'", hex(b)),
            Value::Date(d) => write!(f, "DATE({d})"),
            Value::Time(t) => write!(f, "TIME({t})"),
            Value::Timestamp(ts) => write!(f, "TIMESTAMP({ts})"),
        }
    }
}

pub type Row = Vec<Value>;

/// Rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Canonical text of each row, in result order.
    pub fn canonical_rows(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(Value::canonical)
                    .collect::<Vec<_>>()
                    .join("\u{1f}")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_zero_folds_to_zero() {
        assert_eq!(Value::Real(-0.0).canonical(), Value::Real(0.0).canonical());
        assert_eq!(Value::Real(0.0).canonical(), Value::Integer(0).canonical());
    }

    #[test]
    fn integral_reals_match_integers() {
        assert_eq!(Value::Real(42.0).canonical(), Value::Integer(42).canonical());
        assert_ne!(Value::Real(42.5).canonical(), Value::Integer(42).canonical());
    }

    #[test]
    fn reals_round_away_float_noise() {
        assert_eq!(
            Value::Real(0.1 + 0.2).canonical(),
            Value::Real(0.3).canonical()
        );
    }

    #[test]
    fn null_is_distinct_from_text_null() {
        assert_ne!(
            Value::Null.canonical(),
            Value::Text("NULL".into()).canonical()
        );
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Real(4.0).as_i64(), Some(4));
        assert_eq!(Value::Real(4.5).as_i64(), None);
        assert_eq!(Value::Null.as_f64(), None);
        assert_eq!(Value::Text(" 7 ".into()).as_i64(), Some(7));
    }

    #[test]
    fn canonical_rows_join_columns() {
        let rs = ResultSet::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Integer(1), Value::Null]],
        );
        assert_eq!(rs.canonical_rows(), vec!["n:1\u{1f}N".to_string()]);
        assert_eq!(rs.scalar(), Some(&Value::Integer(1)));
    }

    proptest::proptest! {
        #[test]
        fn exact_integers_share_canonical_form(v in -(1i64 << 52)..(1i64 << 52)) {
            proptest::prop_assert_eq!(
                Value::Integer(v).canonical(),
                Value::Real(v as f64).canonical()
            );
        }
    }

    #[test]
    fn result_set_serializes() {
        let rs = ResultSet::new(vec!["c0".into()], vec![vec![Value::Text("x".into())]]);
        let json = serde_json::to_string(&rs).unwrap();
        let back: ResultSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rs);
    }
}
