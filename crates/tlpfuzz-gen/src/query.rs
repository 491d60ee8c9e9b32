//! Clause-level SELECT rendering.
//!
//! Expressions are already-rendered SQL text; this module only arranges
//! clauses, which is all the partitioning oracles need to vary.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use tlpfuzz_types::GeneratorNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Natural,
    NaturalLeft,
    NaturalRight,
    NaturalFull,
}

impl JoinKind {
    pub const ALL: [JoinKind; 9] = [
        JoinKind::Inner,
        JoinKind::Left,
        JoinKind::Right,
        JoinKind::Full,
        JoinKind::Cross,
        JoinKind::Natural,
        JoinKind::NaturalLeft,
        JoinKind::NaturalRight,
        JoinKind::NaturalFull,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Natural => "NATURAL JOIN",
            JoinKind::NaturalLeft => "NATURAL LEFT JOIN",
            JoinKind::NaturalRight => "NATURAL RIGHT JOIN",
            JoinKind::NaturalFull => "NATURAL FULL JOIN",
        }
    }

    pub const fn node(self) -> GeneratorNode {
        match self {
            JoinKind::Inner => GeneratorNode::InnerJoin,
            JoinKind::Left => GeneratorNode::LeftJoin,
            JoinKind::Right => GeneratorNode::RightJoin,
            JoinKind::Full => GeneratorNode::FullJoin,
            JoinKind::Cross => GeneratorNode::CrossJoin,
            JoinKind::Natural => GeneratorNode::NaturalJoin,
            JoinKind::NaturalLeft => GeneratorNode::LeftNaturalJoin,
            JoinKind::NaturalRight => GeneratorNode::RightNaturalJoin,
            JoinKind::NaturalFull => GeneratorNode::FullNaturalJoin,
        }
    }

    pub const fn is_natural(self) -> bool {
        matches!(
            self,
            JoinKind::Natural | JoinKind::NaturalLeft | JoinKind::NaturalRight | JoinKind::NaturalFull
        )
    }

    /// NATURAL combined with an outer modifier; not every dialect accepts it.
    pub const fn is_natural_outer(self) -> bool {
        matches!(
            self,
            JoinKind::NaturalLeft | JoinKind::NaturalRight | JoinKind::NaturalFull
        )
    }

    pub const fn takes_condition(self) -> bool {
        !self.is_natural() && !matches!(self, JoinKind::Cross)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: Option<String>,
}

impl Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.keyword(), self.table)?;
        if let (true, Some(on)) = (self.kind.takes_condition(), &self.on) {
            write!(f, " ON {on}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub distinct: bool,
    pub fetch: Vec<String>,
    pub from: Vec<String>,
    pub joins: Vec<Join>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
    pub order_by: Vec<String>,
}

impl SelectQuery {
    pub fn new(fetch: Vec<String>, from: Vec<String>) -> Self {
        Self {
            fetch,
            from,
            ..Self::default()
        }
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_joins(mut self, joins: Vec<Join>) -> Self {
        self.joins = joins;
        self
    }

    pub fn with_where(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    pub fn with_group_by(mut self, exprs: Vec<String>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn with_having(mut self, predicate: impl Into<String>) -> Self {
        self.having = Some(predicate.into());
        self
    }

    pub fn with_order_by(mut self, exprs: Vec<String>) -> Self {
        self.order_by = exprs;
        self
    }

    /// The FROM clause including joins, without the keyword.
    pub fn from_clause(&self) -> String {
        let mut out = self.from.join(", ");
        for join in &self.joins {
            out.push(' ');
            out.push_str(&join.to_string());
        }
        out
    }

    pub fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.fetch.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.fetch.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.from_clause());
        if let Some(predicate) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if let Some(predicate) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(predicate);
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        sql
    }
}

impl Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}
