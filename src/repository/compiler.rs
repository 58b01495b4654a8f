//! Turns a [`QueryBuilder`] into SELECT text and bound parameters.
//!
//! Each condition gets the 1-based ordinal `n` of its position in the builder,
//! so two filters on the same field never share a placeholder: scalars bind
//! `:{field}_{n}`, lists bind `:{field}_{n}_{k}` per element, null checks bind
//! nothing. A condition whose path starts with a relation name appends a LEFT
//! join aliased `t{joins + 2}` and is scoped to that alias.

use super::inflect::singularize;
use crate::db::{Dialect, Params};
use crate::error::{QuarryError, Result};
use crate::metadata::{EntityMetadata, MetadataRegistry, Relation};
use crate::query::{Condition, FieldPath, Join, JoinKind, Operand, QueryBuilder, QueryFlag, Sort};

/// SELECT statement ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Params,
}

/// Where a condition's column lives and how its placeholders are named.
struct Target {
    prefix: String,
    column: String,
    placeholder: String,
}

pub struct ConditionCompiler<'a> {
    metadata: &'a EntityMetadata,
    registry: &'a MetadataRegistry,
    dialect: Dialect,
}

impl<'a> ConditionCompiler<'a> {
    #[must_use]
    pub fn new(metadata: &'a EntityMetadata, registry: &'a MetadataRegistry, dialect: Dialect) -> Self {
        Self {
            metadata,
            registry,
            dialect,
        }
    }

    /// Compile `query`, appending any relation joins to it.
    pub fn compile(&self, query: &mut QueryBuilder) -> Result<CompiledQuery> {
        let mut params = Params::new();
        let mut compiled_conditions = Vec::with_capacity(query.conditions().len());

        let conditions = query.conditions().to_vec();
        for (idx, condition) in conditions.iter().enumerate() {
            let fragment = self.compile_condition(query, condition, idx + 1, &mut params)?;
            compiled_conditions.push(fragment);
        }

        let compiled_sort = query
            .sort()
            .iter()
            .map(|sort| self.compile_sort(query.alias(), sort))
            .collect::<Result<Vec<_>>>()?;

        let mut sql = String::from("SELECT");
        if query.has_flag(QueryFlag::CalcRows) {
            if !self.dialect.supports_found_rows() {
                return Err(QuarryError::configuration(format!(
                    "found-rows counting is not available for {:?}",
                    self.dialect
                )));
            }
            sql.push_str(" SQL_CALC_FOUND_ROWS");
        }
        sql.push(' ');
        sql.push_str(&query.selection_items(self.dialect).join(", "));
        sql.push_str(&format!(
            "\nFROM {} {}",
            self.dialect.ident(query.table()),
            query.alias()
        ));
        for join in query.joins() {
            sql.push_str(&format!(
                "\n{} JOIN {} {} ON {}",
                join.kind, join.table, join.alias, join.on
            ));
        }
        if !compiled_conditions.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&compiled_conditions.join(" AND "));
        }
        if !compiled_sort.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&compiled_sort.join(", "));
        }
        if let Some(limit) = query.limit() {
            sql.push_str(&format!("\nLIMIT {limit}"));
        }
        if let Some(offset) = query.offset() {
            sql.push_str(&format!("\nOFFSET {offset}"));
        }
        if query.has_flag(QueryFlag::ForUpdate) {
            sql.push_str("\nFOR UPDATE");
        }

        Ok(CompiledQuery { sql, params })
    }

    fn compile_condition(
        &self,
        query: &mut QueryBuilder,
        condition: &Condition,
        ordinal: usize,
        params: &mut Params,
    ) -> Result<String> {
        let (action, path, operand) = condition.parts();
        let target = self.resolve(query, path)?;
        let column = format!("{}.{}", target.prefix, self.dialect.ident(&target.column));
        let base = format!("{}_{ordinal}", target.placeholder);

        match (action, operand) {
            (a, Operand::None) if a.is_null_check() => Ok(format!("{column} {a}")),
            (a, Operand::List(values)) if a.takes_list() => {
                if values.is_empty() {
                    return Err(QuarryError::configuration(format!(
                        "empty value list for `{path} {a}`"
                    )));
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for (k, value) in values.into_iter().enumerate() {
                    let name = format!("{base}_{k}");
                    placeholders.push(format!(":{name}"));
                    params.insert(name, value);
                }
                Ok(format!("{column} {a} ({})", placeholders.join(", ")))
            }
            (a, Operand::Scalar(value)) if !a.takes_list() && !a.is_null_check() => {
                let placeholder = format!(":{base}");
                params.insert(base, value);
                Ok(format!("{column} {a} {placeholder}"))
            }
            (a, operand) => Err(QuarryError::configuration(format!(
                "operand {operand:?} does not fit action {a} on `{path}`"
            ))),
        }
    }

    fn resolve(&self, query: &mut QueryBuilder, path: &FieldPath) -> Result<Target> {
        let main = query.alias().to_owned();
        match path {
            FieldPath::Aliased { alias, field } => Ok(Target {
                prefix: alias.clone(),
                column: field.clone(),
                placeholder: format!("{alias}{field}"),
            }),
            FieldPath::Field(name) => match self.metadata.relation(name) {
                None => Ok(Target {
                    prefix: main,
                    column: name.clone(),
                    placeholder: name.clone(),
                }),
                Some(Relation::ManyToOne { .. }) => Err(QuarryError::configuration(format!(
                    "filter on many-to-one relation `{name}` must name a target field (`{name}.field`)"
                ))),
                Some(relation @ Relation::ManyToMany { .. }) => {
                    let prefix = self.join_relation(query, name, relation)?;
                    let column = singularize(name);
                    Ok(Target {
                        prefix,
                        placeholder: column.clone(),
                        column,
                    })
                }
            },
            FieldPath::Relation { relation: name, field } => match self.metadata.relation(name) {
                None => Err(QuarryError::configuration(format!(
                    "`{name}` is not a relation of {}",
                    self.metadata.entity()
                ))),
                Some(relation @ Relation::ManyToOne { .. }) => {
                    let prefix = self.join_relation(query, name, relation)?;
                    Ok(Target {
                        prefix,
                        column: field.clone(),
                        placeholder: field.clone(),
                    })
                }
                Some(Relation::ManyToMany { .. }) => Err(QuarryError::configuration(format!(
                    "many-to-many relation `{name}` takes no target field"
                ))),
            },
        }
    }

    /// Append the join for `relation` and return its alias.
    fn join_relation(&self, query: &mut QueryBuilder, name: &str, relation: &Relation) -> Result<String> {
        let main = query.alias().to_owned();
        let alias = format!("t{}", query.joins().len() + 2);
        let table = self.registry.table_name_of(relation.target_entity())?;
        let on = match relation {
            Relation::ManyToOne {
                foreign_key_field, ..
            } => format!(
                "{main}.{} = {alias}.{}",
                self.dialect.ident(foreign_key_field),
                self.dialect.ident("id")
            ),
            Relation::ManyToMany { .. } => format!(
                "{main}.{} = {alias}.{}",
                self.dialect.ident("id"),
                self.dialect.ident(&format!("{}Id", self.metadata.table_name()))
            ),
        };
        log::trace!("Joining relation {name} as {alias}: {on}");
        query.push_join(Join {
            table: self.dialect.ident(&table),
            alias: alias.clone(),
            on,
            kind: JoinKind::Left,
        });
        Ok(alias)
    }

    fn compile_sort(&self, alias: &str, sort: &Sort) -> Result<String> {
        match sort {
            Sort::Simple { field, direction } => {
                if !self.metadata.has_field(field) {
                    return Err(QuarryError::configuration(format!(
                        "cannot sort {} by unknown field `{field}`",
                        self.metadata.entity()
                    )));
                }
                Ok(format!(
                    "{alias}.{} {}",
                    self.dialect.ident(field),
                    direction.as_sql()
                ))
            }
            Sort::Expression {
                expression,
                direction,
            } => Ok(format!(
                "{} {}",
                expression.replace("{prefix}", alias),
                direction.as_sql()
            )),
        }
    }
}
