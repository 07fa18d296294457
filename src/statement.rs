//! Types shared by the statement router: the request shape accepted by
//! `Client::execute`, and the result it produces.

use crate::binder::Params;
use crate::classify::StatementType;
use crate::transport::QueryResult;

/// A single statement to route: a free-form `Command` string against a
/// `Database`, with optional `RetentionPolicy` and bound `Params`.
#[derive(Debug, Clone)]
pub struct Statement {
    /// The target database. Must be non-empty.
    pub database: String,
    /// Optional retention policy, applied to both query and insert paths.
    pub retention_policy: Option<String>,
    /// The statement text. Must be non-empty.
    pub command: String,
    /// Parameters available for binding (insert path) or passed through
    /// unchanged to the server (query/command path; the server does its own
    /// parameter binding there).
    pub params: Params,
}

impl Statement {
    /// Build a statement with no bound parameters.
    pub fn new(database: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: None,
            command: command.into(),
            params: Params::new(),
        }
    }

    /// Attach a retention policy.
    pub fn with_retention_policy(mut self, rp: impl Into<String>) -> Self {
        self.retention_policy = Some(rp.into());
        self
    }

    /// Attach bound parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

/// The outcome of routing a [`Statement`] through `Client::execute`.
#[derive(Debug, Clone, Default)]
pub struct ExecuteResult {
    /// How the statement was classified.
    pub statement_type: Option<StatementType>,
    /// `1` for a `Command`, `0` for a `Query`, `len(points)` for an
    /// `Insert`.
    pub affected_rows: usize,
    /// Populated only for the query-like path.
    pub query_result: Option<QueryResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_builder_sets_fields() {
        let stmt = Statement::new("db0", "SELECT * FROM m")
            .with_retention_policy("rp0")
            .with_params(Params::new());
        assert_eq!(stmt.database, "db0");
        assert_eq!(stmt.retention_policy.as_deref(), Some("rp0"));
        assert_eq!(stmt.command, "SELECT * FROM m");
    }

    #[test]
    fn execute_result_default_has_no_statement_type() {
        let result = ExecuteResult::default();
        assert!(result.statement_type.is_none());
        assert_eq!(result.affected_rows, 0);
    }
}
