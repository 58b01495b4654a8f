//! Declarative filter conditions.

use crate::error::{QuarryError, Result};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison applied by a [`FilterExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Eq,
    NotEq,
    Gt,
    Lt,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Action {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Action::Eq => "=",
            Action::NotEq => "<>",
            Action::Gt => ">",
            Action::Lt => "<",
            Action::In => "IN",
            Action::NotIn => "NOT IN",
            Action::IsNull => "IS NULL",
            Action::IsNotNull => "IS NOT NULL",
        }
    }

    #[must_use]
    pub fn takes_list(self) -> bool {
        matches!(self, Action::In | Action::NotIn)
    }

    #[must_use]
    pub fn is_null_check(self) -> bool {
        matches!(self, Action::IsNull | Action::IsNotNull)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Action {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        match normalized.as_str() {
            "=" => Ok(Action::Eq),
            "<>" | "!=" => Ok(Action::NotEq),
            ">" => Ok(Action::Gt),
            "<" => Ok(Action::Lt),
            "IN" => Ok(Action::In),
            "NOT IN" => Ok(Action::NotIn),
            "IS NULL" => Ok(Action::IsNull),
            "IS NOT NULL" => Ok(Action::IsNotNull),
            _ => Err(QuarryError::configuration(format!(
                "Unknown filter action `{s}`"
            ))),
        }
    }
}

/// Column a condition targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    /// A field of the queried entity, or a relation name on its own.
    Field(String),
    /// `[relation, target_field]`: a field of a related entity.
    Relation { relation: String, field: String },
    /// `[alias, column]` of a join the caller added by hand.
    Aliased { alias: String, field: String },
}

impl FieldPath {
    pub fn relation(relation: impl Into<String>, field: impl Into<String>) -> Self {
        FieldPath::Relation {
            relation: relation.into(),
            field: field.into(),
        }
    }

    pub fn aliased(alias: impl Into<String>, field: impl Into<String>) -> Self {
        FieldPath::Aliased {
            alias: alias.into(),
            field: field.into(),
        }
    }

    /// First path element: the field or relation name looked up in metadata.
    #[must_use]
    pub fn head(&self) -> &str {
        match self {
            FieldPath::Field(name) => name,
            FieldPath::Relation { relation, .. } => relation,
            FieldPath::Aliased { alias, .. } => alias,
        }
    }
}

/// `"name"` is a plain field; `"customer.name"` a relation path.
impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        match path.split_once('.') {
            Some((relation, field)) => FieldPath::relation(relation, field),
            None => FieldPath::Field(path.to_owned()),
        }
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        FieldPath::from(path.as_str())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Field(name) => f.write_str(name),
            FieldPath::Relation { relation, field } => write!(f, "{relation}.{field}"),
            FieldPath::Aliased { alias, field } => write!(f, "[{alias}, {field}]"),
        }
    }
}

/// Right-hand side of a [`FilterExpression`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Scalar(Value),
    List(Vec<Value>),
}

/// `param1 ACTION param2`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    action: Action,
    field: FieldPath,
    operand: Operand,
}

impl FilterExpression {
    /// Build an expression, checking the operand shape against the action.
    pub fn new(action: Action, field: impl Into<FieldPath>, operand: Operand) -> Result<Self> {
        let field = field.into();
        match (&operand, action) {
            (Operand::None, a) if a.is_null_check() => {}
            (Operand::List(items), a) if a.takes_list() => {
                if items.is_empty() {
                    return Err(QuarryError::configuration(format!(
                        "`{field} {action}` needs at least one value"
                    )));
                }
            }
            (Operand::Scalar(_), a) if !a.takes_list() && !a.is_null_check() => {}
            _ => {
                return Err(QuarryError::configuration(format!(
                    "operand {operand:?} does not fit action {action} on `{field}`"
                )))
            }
        }
        Ok(Self {
            action,
            field,
            operand,
        })
    }

    /// Like [`FilterExpression::new`] with the action given as SQL text (`"NOT IN"`).
    pub fn parse(action: &str, field: impl Into<FieldPath>, operand: Operand) -> Result<Self> {
        Self::new(action.parse()?, field, operand)
    }

    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::scalar(Action::Eq, field, value)
    }

    pub fn not_eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::scalar(Action::NotEq, field, value)
    }

    pub fn gt(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::scalar(Action::Gt, field, value)
    }

    pub fn lt(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self::scalar(Action::Lt, field, value)
    }

    pub fn is_null(field: impl Into<FieldPath>) -> Self {
        Self {
            action: Action::IsNull,
            field: field.into(),
            operand: Operand::None,
        }
    }

    pub fn is_not_null(field: impl Into<FieldPath>) -> Self {
        Self {
            action: Action::IsNotNull,
            field: field.into(),
            operand: Operand::None,
        }
    }

    fn scalar(action: Action, field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Self {
            action,
            field: field.into(),
            operand: Operand::Scalar(value.into()),
        }
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    #[must_use]
    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// One entry of a query's WHERE list.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `field = value`
    Eq(FieldPath, Value),
    /// `field IN (values...)`
    In(FieldPath, Vec<Value>),
    /// `field IS NULL`
    Null(FieldPath),
    Filter(FilterExpression),
}

impl Condition {
    pub fn eq(field: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        Condition::Eq(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<FieldPath>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn null(field: impl Into<FieldPath>) -> Self {
        Condition::Null(field.into())
    }

    #[must_use]
    pub fn field(&self) -> &FieldPath {
        match self {
            Condition::Eq(field, _) | Condition::In(field, _) | Condition::Null(field) => field,
            Condition::Filter(expr) => expr.field(),
        }
    }

    /// Normalize to `(action, field, operand)`.
    #[must_use]
    pub fn parts(&self) -> (Action, &FieldPath, Operand) {
        match self {
            Condition::Eq(field, value) => (Action::Eq, field, Operand::Scalar(value.clone())),
            Condition::In(field, values) => (Action::In, field, Operand::List(values.clone())),
            Condition::Null(field) => (Action::IsNull, field, Operand::None),
            Condition::Filter(expr) => (expr.action, &expr.field, expr.operand.clone()),
        }
    }
}

impl From<FilterExpression> for Condition {
    fn from(expr: FilterExpression) -> Self {
        Condition::Filter(expr)
    }
}
