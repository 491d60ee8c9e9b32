//! Order-insensitive result comparison over canonical row text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tlpfuzz_types::ResultSet;

/// How the combined partitions relate to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareMode {
    /// Same rows with the same multiplicities.
    Multiset,
    /// Same rows once duplicates are dropped on both sides.
    Set,
}

/// Concatenates the rows of `parts`, keeping the first non-empty column list.
pub fn concat_results<'a, I>(parts: I) -> ResultSet
where
    I: IntoIterator<Item = &'a ResultSet>,
{
    let mut combined = ResultSet::empty();
    for part in parts {
        if combined.columns.is_empty() {
            combined.columns.clone_from(&part.columns);
        }
        combined.rows.extend(part.rows.iter().cloned());
    }
    combined
}

fn row_counts(result: &ResultSet, mode: CompareMode) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in result.canonical_rows() {
        let count = counts.entry(row).or_insert(0);
        if mode == CompareMode::Multiset || *count == 0 {
            *count += 1;
        }
    }
    counts
}

/// Compares two result sets ignoring row order.
///
/// Column names are not compared; the rewrites produce the same projection
/// but engines are free to name derived columns differently.
pub fn compare_results(
    left: &ResultSet,
    right: &ResultSet,
    mode: CompareMode,
    left_name: &str,
    right_name: &str,
) -> Result<(), ResultMismatch> {
    let left_width = left.rows.first().map(Vec::len);
    let right_width = right.rows.first().map(Vec::len);
    if let (Some(l), Some(r)) = (left_width, right_width) {
        if l != r {
            return Err(ResultMismatch::ColumnCountMismatch {
                left: l,
                right: r,
                left_name: left_name.to_string(),
                right_name: right_name.to_string(),
            });
        }
    }

    let left_counts = row_counts(left, mode);
    let right_counts = row_counts(right, mode);
    let left_total: usize = left_counts.values().sum();
    let right_total: usize = right_counts.values().sum();
    if left_total != right_total {
        return Err(ResultMismatch::RowCountMismatch {
            left: left_total,
            right: right_total,
            left_name: left_name.to_string(),
            right_name: right_name.to_string(),
        });
    }

    if left_counts != right_counts {
        let surplus = |a: &BTreeMap<String, usize>, b: &BTreeMap<String, usize>| {
            a.iter()
                .filter(|(row, n)| b.get(*row).copied().unwrap_or(0) < **n)
                .map(|(row, _)| row.clone())
                .collect::<Vec<_>>()
        };
        return Err(ResultMismatch::RowMismatch {
            left_only: surplus(&left_counts, &right_counts),
            right_only: surplus(&right_counts, &left_counts),
            left_name: left_name.to_string(),
            right_name: right_name.to_string(),
        });
    }
    Ok(())
}

/// Description of how two result sets differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultMismatch {
    ColumnCountMismatch {
        left: usize,
        right: usize,
        left_name: String,
        right_name: String,
    },

    RowCountMismatch {
        left: usize,
        right: usize,
        left_name: String,
        right_name: String,
    },

    /// Same number of rows but different contents. Rows are canonical text.
    RowMismatch {
        left_only: Vec<String>,
        right_only: Vec<String>,
        left_name: String,
        right_name: String,
    },
}

fn preview(rows: &[String]) -> String {
    const SHOWN: usize = 5;
    let mut out = rows
        .iter()
        .take(SHOWN)
        .map(|r| format!("[{}]", r.replace('\u{1f}', ", ")))
        .collect::<Vec<_>>()
        .join(" ");
    if rows.len() > SHOWN {
        out.push_str(&format!(" (+{} more)", rows.len() - SHOWN));
    }
    out
}

impl fmt::Display for ResultMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultMismatch::ColumnCountMismatch {
                left,
                right,
                left_name,
                right_name,
            } => write!(
                f,
                "Column count mismatch: {left_name}={left}, {right_name}={right}"
            ),
            ResultMismatch::RowCountMismatch {
                left,
                right,
                left_name,
                right_name,
            } => write!(
                f,
                "Row count mismatch: {left_name}={left}, {right_name}={right}"
            ),
            ResultMismatch::RowMismatch {
                left_only,
                right_only,
                left_name,
                right_name,
            } => write!(
                f,
                "Row mismatch: only in {left_name}: {}; only in {right_name}: {}",
                preview(left_only),
                preview(right_only)
            ),
        }
    }
}

impl std::error::Error for ResultMismatch {}

#[cfg(test)]
mod tests {
    use tlpfuzz_types::Value;

    use super::*;

    fn ints(values: &[Option<i64>]) -> ResultSet {
        ResultSet::new(
            vec!["c0".into()],
            values
                .iter()
                .map(|v| vec![v.map_or(Value::Null, Value::Integer)])
                .collect(),
        )
    }

    #[test]
    fn row_order_is_ignored() {
        let a = ints(&[Some(1), Some(6), None]);
        let b = ints(&[None, Some(6), Some(1)]);
        assert!(compare_results(&a, &b, CompareMode::Multiset, "a", "b").is_ok());
    }

    #[test]
    fn multiset_counts_duplicates() {
        let a = ints(&[Some(1), Some(1)]);
        let b = ints(&[Some(1)]);
        let err = compare_results(&a, &b, CompareMode::Multiset, "a", "b").unwrap_err();
        assert!(matches!(
            err,
            ResultMismatch::RowCountMismatch { left: 2, right: 1, .. }
        ));
        assert!(compare_results(&a, &b, CompareMode::Set, "a", "b").is_ok());
    }

    #[test]
    fn differing_rows_are_listed() {
        let a = ints(&[Some(1), Some(2)]);
        let b = ints(&[Some(1), Some(3)]);
        let err = compare_results(&a, &b, CompareMode::Set, "baseline", "union").unwrap_err();
        match &err {
            ResultMismatch::RowMismatch {
                left_only,
                right_only,
                ..
            } => {
                assert_eq!(left_only, &vec!["n:2".to_string()]);
                assert_eq!(right_only, &vec!["n:3".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("only in baseline: [n:2]"));
    }

    #[test]
    fn integral_reals_equal_integers() {
        let a = ints(&[Some(2)]);
        let b = ResultSet::new(vec!["x".into()], vec![vec![Value::Real(2.0)]]);
        assert!(compare_results(&a, &b, CompareMode::Multiset, "a", "b").is_ok());
    }

    #[test]
    fn width_mismatch_is_reported_first() {
        let a = ints(&[Some(1)]);
        let b = ResultSet::new(
            vec!["c0".into(), "c1".into()],
            vec![vec![Value::Integer(1), Value::Null]],
        );
        let err = compare_results(&a, &b, CompareMode::Multiset, "a", "b").unwrap_err();
        assert!(matches!(err, ResultMismatch::ColumnCountMismatch { .. }));
    }

    #[test]
    fn concatenation_keeps_every_row() {
        let parts = [ints(&[Some(6)]), ints(&[Some(1)]), ints(&[None])];
        let combined = concat_results(&parts);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined.columns, vec!["c0".to_string()]);
    }
}
