//! Query builder.
//!
//! A [`QueryBuilder`] accumulates everything one SELECT needs: the selected
//! fields of the base entity, joins, conditions, sort, paging, flags and the
//! field the results are indexed by. It performs no I/O; a
//! [`Repository`](crate::Repository) compiles and runs it, once.
//!
//! # Example
//!
//! ```
//! use quarry::{Condition, Direction, EntityMetadata, FieldType, QueryBuilder, QueryFlag, Sort};
//!
//! let metadata = EntityMetadata::builder("app::Order", "order")
//!     .field("id", FieldType::Int)
//!     .field("status", FieldType::Plain)
//!     .build()?;
//!
//! let query = QueryBuilder::new(&metadata)
//!     .add_condition(Condition::eq("status", "paid"))
//!     .add_sort(Sort::simple("id", Direction::Desc))
//!     .set_page(2, 10)
//!     .set_flag(QueryFlag::CalcRows);
//!
//! assert_eq!(query.offset(), Some(10));
//! assert_eq!(query.limit(), Some(10));
//! # Ok::<(), quarry::QuarryError>(())
//! ```

pub mod filter;

pub use filter::{Action, Condition, FieldPath, FilterExpression, Operand};

use crate::db::Dialect;
use crate::metadata::EntityMetadata;
use std::fmt;

/// Alias given to the base table unless another is chosen.
pub const DEFAULT_ALIAS: &str = "t1";

/// Execution flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFlag {
    /// Count all matching rows for a later `get_found_rows`.
    CalcRows,
    /// Lock the selected rows.
    ForUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sort {
    /// A field of the base entity.
    Simple { field: String, direction: Direction },
    /// Raw SQL in which `{prefix}` is replaced by the base alias.
    ///
    /// The expression is inserted verbatim; never build it from untrusted input.
    Expression { expression: String, direction: Direction },
}

impl Sort {
    pub fn simple(field: impl Into<String>, direction: Direction) -> Self {
        Sort::Simple {
            field: field.into(),
            direction,
        }
    }

    pub fn expression(expression: impl Into<String>, direction: Direction) -> Self {
        Sort::Expression {
            expression: expression.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    table: String,
    alias: String,
    fields: Vec<String>,
    joins: Vec<Join>,
    conditions: Vec<Condition>,
    sort: Vec<Sort>,
    limit: Option<u64>,
    offset: Option<u64>,
    index: Option<String>,
    flags: Vec<QueryFlag>,
}

impl QueryBuilder {
    /// Select every field of `metadata` from its table under alias `t1`.
    #[must_use]
    pub fn new(metadata: &EntityMetadata) -> Self {
        Self {
            table: metadata.table_name().to_owned(),
            alias: DEFAULT_ALIAS.to_owned(),
            fields: metadata.fields().keys().cloned().collect(),
            joins: Vec::new(),
            conditions: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
            index: None,
            flags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Restrict the selection to `fields`, keeping declaration order.
    #[must_use]
    pub fn select_only(mut self, fields: &[&str]) -> Self {
        self.fields.retain(|f| fields.contains(&f.as_str()));
        self
    }

    #[must_use]
    pub fn add_condition(mut self, condition: impl Into<Condition>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    #[must_use]
    pub fn add_conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    /// Replace the sort list.
    #[must_use]
    pub fn set_sort(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn add_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub fn set_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn set_offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    /// 1-based paging: `offset = (page - 1) * per_page`, `limit = per_page`.
    /// Page 0 is treated as page 1; an offset past `u64::MAX` saturates.
    #[must_use]
    pub fn set_page(mut self, page: u64, per_page: u64) -> Self {
        self.offset = Some(page.saturating_sub(1).saturating_mul(per_page));
        self.limit = Some(per_page);
        self
    }

    /// Key results by this field's stored value instead of by position.
    #[must_use]
    pub fn set_index(mut self, field: Option<&str>) -> Self {
        self.index = field.map(str::to_owned);
        self
    }

    #[must_use]
    pub fn set_flag(mut self, flag: QueryFlag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    #[must_use]
    pub fn add_join(
        mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: impl Into<String>,
        kind: JoinKind,
    ) -> Self {
        self.push_join(Join {
            table: table.into(),
            alias: alias.into(),
            on: on.into(),
            kind,
        });
        self
    }

    pub(crate) fn push_join(&mut self, join: Join) {
        self.joins.push(join);
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn selected_fields(&self) -> &[String] {
        &self.fields
    }

    /// `{alias}.{field} as {alias}_{field}` for every selected field, with
    /// the column and label written as `dialect` identifiers.
    #[must_use]
    pub fn selection_items(&self, dialect: Dialect) -> Vec<String> {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "{a}.{} as {}",
                    dialect.ident(f),
                    dialect.ident(&format!("{}_{f}", self.alias)),
                    a = self.alias
                )
            })
            .collect()
    }

    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn sort(&self) -> &[Sort] {
        &self.sort
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    #[must_use]
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    #[must_use]
    pub fn has_flag(&self, flag: QueryFlag) -> bool {
        self.flags.contains(&flag)
    }
}
