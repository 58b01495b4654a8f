//! Database client contract.
//!
//! Statements are written with named `:placeholder` parameters and bound from a
//! [`Params`] map. Every client answers with a [`ResultCursor`] of [`Row`]s whose
//! cells are stored [`Value`]s keyed by column label.
//!
//! The contract is synchronous: each call blocks until the round trip is done.
//! Clients are used from one caller at a time, so they take `&self` and keep
//! any per-connection state behind interior mutability.

#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::{QuarryError, Result};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::VecDeque;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// Named statement parameters, in binding order.
pub type Params = IndexMap<String, Value>;

/// One result row: column label to stored value, in select-list order.
pub type Row = IndexMap<String, Value>;

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<K, V, I>(cells: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// SQL flavour spoken by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Backtick-quoted identifiers, `SQL_CALC_FOUND_ROWS` / `FOUND_ROWS()`.
    #[default]
    MySql,
    /// Double-quoted identifiers; no found-rows support.
    Postgres,
}

impl Dialect {
    /// Quote a column identifier for INSERT / UPDATE lists.
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{ident}`"),
            Dialect::Postgres => double_quote(ident),
        }
    }

    /// Identifier as written in SELECT lists, labels, conditions, joins and
    /// table references.
    ///
    /// MySQL keeps names bare. PostgreSQL folds unquoted names to lower case,
    /// so `customerId` and the `t1_customerId` label are double-quoted.
    #[must_use]
    pub fn ident(self, ident: &str) -> String {
        match self {
            Dialect::MySql => ident.to_owned(),
            Dialect::Postgres => double_quote(ident),
        }
    }

    #[must_use]
    pub fn supports_found_rows(self) -> bool {
        matches!(self, Dialect::MySql)
    }
}

fn double_quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Rows returned by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCursor {
    rows: VecDeque<Row>,
}

impl ResultCursor {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Take the next row, if any.
    pub fn fetch_one(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    /// Take every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }

    /// First cell of the next row.
    pub fn fetch_scalar(&mut self) -> Option<Value> {
        self.fetch_one()
            .and_then(|row| row.into_iter().next().map(|(_, v)| v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A synchronous database connection.
pub trait DbClient {
    /// Run a parameterized statement.
    fn execute(&self, sql: &str, params: &Params) -> Result<ResultCursor>;

    /// Run a statement without parameters (DDL, transaction control).
    fn exec(&self, sql: &str) -> Result<()>;

    /// Key generated by the last INSERT on this connection.
    fn last_insert_id(&self) -> Result<i64>;

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn begin(&self) -> Result<()> {
        self.exec("BEGIN")
    }

    fn commit(&self) -> Result<()> {
        self.exec("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.exec("ROLLBACK")
    }
}

impl dyn DbClient + '_ {
    /// Pair `sql` with this client for later execution.
    pub fn prepare(&self, sql: impl Into<String>) -> Statement<'_> {
        Statement {
            client: self,
            sql: sql.into(),
        }
    }
}

/// A statement bound to the client that will run it.
pub struct Statement<'c> {
    client: &'c dyn DbClient,
    sql: String,
}

impl Statement<'_> {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn execute(&self, params: &Params) -> Result<ResultCursor> {
        log::debug!("Executing statement: {}", self.sql);
        self.client.execute(&self.sql, params)
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement").field("sql", &self.sql).finish()
    }
}

/// Run `f` between `begin` and `commit`, rolling back when it fails.
///
/// The error from `f` is returned unchanged; a failing rollback is only logged.
pub fn transaction<T, E, F>(client: &dyn DbClient, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&dyn DbClient) -> std::result::Result<T, E>,
    E: From<QuarryError>,
{
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::transaction_span().entered();

    client.begin()?;
    match f(client) {
        Ok(value) => {
            client.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = client.rollback() {
                log::warn!("Rollback failed after error: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecuteError;
    use crate::mock::MockClient;

    #[test]
    fn test_cursor_fetching() {
        let mut cursor = ResultCursor::new(vec![
            row([("n", 1i64), ("m", 2i64)]),
            row([("n", 3i64), ("m", 4i64)]),
        ]);
        assert_eq!(cursor.fetch_scalar(), Some(Value::Int(1)));
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.fetch_all().len(), 1);
        assert!(cursor.fetch_one().is_none());
    }

    #[test]
    fn test_dialect_quoting() {
        assert_eq!(Dialect::MySql.quote("isDeleted"), "`isDeleted`");
        assert_eq!(Dialect::Postgres.quote("isDeleted"), "\"isDeleted\"");
        assert_eq!(Dialect::MySql.ident("t1_customerId"), "t1_customerId");
        assert_eq!(Dialect::Postgres.ident("t1_customerId"), "\"t1_customerId\"");
        assert_eq!(Dialect::Postgres.ident("odd\"name"), "\"odd\"\"name\"");
        assert!(!Dialect::Postgres.supports_found_rows());
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let mock = MockClient::new();
        let out: Result<i32> = transaction(&mock, |c| {
            c.exec("UPDATE a SET b = 1")?;
            Ok(7)
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(mock.statements(), ["BEGIN", "UPDATE a SET b = 1", "COMMIT"]);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mock = MockClient::new();
        mock.push_error(ExecuteError::new(Some("23000"), "duplicate"));
        let out: Result<()> = transaction(&mock, |c| c.exec("INSERT INTO a VALUES (1)"));
        assert!(matches!(out, Err(QuarryError::Execute(_))));
        assert_eq!(
            mock.statements(),
            ["BEGIN", "INSERT INTO a VALUES (1)", "ROLLBACK"]
        );
    }

    #[test]
    fn test_prepare_runs_through_client() {
        let mock = MockClient::new();
        mock.push_rows(vec![row([("x", 1i64)])]);
        let client: &dyn DbClient = &mock;
        let mut params = Params::new();
        params.insert("id_1".into(), Value::Int(5));
        let mut cursor = client
            .prepare("SELECT x FROM t WHERE id = :id_1")
            .execute(&params)
            .unwrap();
        assert_eq!(cursor.fetch_scalar(), Some(Value::Int(1)));
        assert_eq!(mock.executed()[0].params, params);
    }
}
