//! Migration tracking table

use crate::db::Dialect;
use sea_query::{ColumnDef, Expr, MysqlQueryBuilder, PostgresQueryBuilder, Table, TableCreateStatement};

/// Table definition for the tracking table named `table`.
///
/// One row per applied migration: auto-increment `id`, unique `name`,
/// `description` and the `created` timestamp.
pub fn create_state_table(table: &str) -> TableCreateStatement {
    Table::create()
        .table(table.to_string())
        .if_not_exists()
        .col(
            ColumnDef::new("id")
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new("name")
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new("description").string_len(250).not_null())
        .col(
            ColumnDef::new("created")
                .timestamp()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

/// `CREATE TABLE IF NOT EXISTS` statement for `dialect`.
#[must_use]
pub fn create_state_table_sql(table: &str, dialect: Dialect) -> String {
    let statement = create_state_table(table);
    match dialect {
        Dialect::MySql => statement.build(MysqlQueryBuilder),
        Dialect::Postgres => statement.build(PostgresQueryBuilder),
    }
}

pub(crate) fn select_applied_sql(table: &str) -> String {
    format!("SELECT name\nFROM {table}")
}

pub(crate) fn insert_applied_sql(table: &str) -> String {
    format!("INSERT INTO {table}\n    (name, description)\nVALUES\n    (:name, :description)")
}

pub(crate) fn delete_applied_sql(table: &str) -> String {
    format!("DELETE FROM {table} WHERE name = :name")
}
