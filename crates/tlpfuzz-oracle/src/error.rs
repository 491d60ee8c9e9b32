use crate::report::BugReport;

/// Errors a [`crate::StatementExecutor`] reports for one statement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The statement did not parse.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The statement parsed but does not bind (unknown table, bad types).
    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    /// The statement ran past its budget.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The executor itself failed, independent of the statement.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// The engine's message, without the classification prefix.
    pub fn message(&self) -> String {
        match self {
            ExecutionError::Syntax(m)
            | ExecutionError::Semantic(m)
            | ExecutionError::Runtime(m)
            | ExecutionError::Unsupported(m)
            | ExecutionError::Internal(m) => m.clone(),
            ExecutionError::Timeout(ms) => format!("timeout after {ms}ms"),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_))
    }
}

/// Why an oracle check did not pass.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Equivalent queries disagreed.
    #[error("{}", .0.message)]
    Mismatch(Box<BugReport>),

    /// A statement failed with an error outside the allow-list.
    #[error("`{query}` failed: {source}")]
    Execution {
        query: String,
        #[source]
        source: ExecutionError,
    },
}

impl OracleError {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, OracleError::Mismatch(_))
    }

    pub fn bug(&self) -> Option<&BugReport> {
        match self {
            OracleError::Mismatch(report) => Some(report),
            OracleError::Execution { .. } => None,
        }
    }
}
