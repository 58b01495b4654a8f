//! Scripted in-memory [`DbClient`] for tests.
//!
//! `execute` and `exec` take their answer from a queue of scripted outcomes; an
//! exhausted queue answers with an empty result. Transaction control is recorded
//! but never consumes a scripted outcome.

use crate::db::{DbClient, Dialect, Params, ResultCursor, Row};
use crate::error::{ExecuteError, QuarryError, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// A statement seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub params: Params,
}

#[derive(Debug, Default)]
pub struct MockClient {
    dialect: Dialect,
    outcomes: RefCell<VecDeque<std::result::Result<Vec<Row>, ExecuteError>>>,
    insert_ids: RefCell<VecDeque<i64>>,
    next_insert_id: Cell<i64>,
    log: RefCell<Vec<Executed>>,
}

impl MockClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Answer the next statement with `rows`.
    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.outcomes.borrow_mut().push_back(Ok(rows));
        self
    }

    /// Fail the next statement with `error`.
    pub fn push_error(&self, error: ExecuteError) -> &Self {
        self.outcomes.borrow_mut().push_back(Err(error));
        self
    }

    /// Answer the next `last_insert_id` with `id`. Unscripted calls count up from 1.
    pub fn push_insert_id(&self, id: i64) -> &Self {
        self.insert_ids.borrow_mut().push_back(id);
        self
    }

    /// Every statement seen so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<Executed> {
        self.log.borrow().clone()
    }

    /// SQL text of every statement seen so far.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.log.borrow().iter().map(|e| e.sql.clone()).collect()
    }

    /// Outcomes still waiting to be consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outcomes.borrow().len()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, sql: &str, params: &Params) {
        self.log.borrow_mut().push(Executed {
            sql: sql.to_owned(),
            params: params.clone(),
        });
    }

    fn next_outcome(&self) -> Result<Vec<Row>> {
        match self.outcomes.borrow_mut().pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(err)) => Err(QuarryError::Execute(err)),
            None => Ok(Vec::new()),
        }
    }
}

impl DbClient for MockClient {
    fn execute(&self, sql: &str, params: &Params) -> Result<ResultCursor> {
        self.record(sql, params);
        self.next_outcome().map(ResultCursor::new)
    }

    fn exec(&self, sql: &str) -> Result<()> {
        self.record(sql, &Params::new());
        self.next_outcome().map(|_| ())
    }

    fn last_insert_id(&self) -> Result<i64> {
        if let Some(id) = self.insert_ids.borrow_mut().pop_front() {
            return Ok(id);
        }
        let id = self.next_insert_id.get() + 1;
        self.next_insert_id.set(id);
        Ok(id)
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn begin(&self) -> Result<()> {
        self.record("BEGIN", &Params::new());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.record("COMMIT", &Params::new());
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK", &Params::new());
        Ok(())
    }
}
