//! Migration lifecycle over SQL files on disk and a scripted client.

use pretty_assertions::assert_eq;
use quarry::db::row;
use quarry::error::MYSQL_TABLE_NOT_FOUND;
use quarry::migration::{MigrationManager, SqlDirectorySource, StaticSource, SqlMigration};
use quarry::{ExecuteError, MigrationError, MockClient, QuarryConfig};
use std::fs;
use std::path::Path;
use std::rc::Rc;

fn write_migration(dir: &Path, name: &str, table: &str) {
    fs::write(
        dir.join(format!("Migration{name}.sql")),
        format!(
            "-- description: create {table}\n\
             -- +up\n\
             CREATE TABLE {table} (id INT NOT NULL);\n\
             -- +down\n\
             DROP TABLE {table};\n"
        ),
    )
    .unwrap();
}

#[test]
fn first_run_bootstraps_then_up_down_up() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "0001", "users");
    write_migration(dir.path(), "0002", "posts");

    let client = Rc::new(MockClient::new());
    client.push_error(ExecuteError::new(Some(MYSQL_TABLE_NOT_FOUND), "Table 'app.migrations' doesn't exist"));
    let manager = MigrationManager::new(client.clone(), vec![Box::new(SqlDirectorySource::new(dir.path()))]);

    let mut migrations = manager.get_migrations_info().unwrap();
    assert_eq!(migrations.keys().collect::<Vec<_>>(), ["0001", "0002"]);
    assert!(migrations.values().all(|m| !m.migrated));
    assert_eq!(migrations["0001"].description, "create users");
    assert!(migrations["0001"].checksum.is_some());
    assert!(client.statements()[1].starts_with("CREATE TABLE IF NOT EXISTS `migrations`"));

    manager.up(&mut migrations, "0001").unwrap();
    let err = manager.up(&mut migrations, "0001").unwrap_err();
    assert!(matches!(err, MigrationError::AlreadyApplied(ref name) if name == "0001"));

    manager.down(&mut migrations, "0001").unwrap();
    assert!(!migrations["0001"].migrated);
    manager.up(&mut migrations, "0001").unwrap();
    assert!(migrations["0001"].migrated);

    let statements = client.statements();
    assert!(statements.contains(&"DROP TABLE users;".to_string()));
    assert!(statements.contains(&"DELETE FROM migrations WHERE name = :name".to_string()));
}

#[test]
fn tracked_rows_mark_migrations_applied() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "1", "a");
    write_migration(dir.path(), "2", "b");
    write_migration(dir.path(), "10", "c");

    let client = Rc::new(MockClient::new());
    client.push_rows(vec![row([("name", "1")]), row([("name", "2")])]);
    let manager = MigrationManager::new(client.clone(), vec![Box::new(SqlDirectorySource::new(dir.path()))]);

    let mut migrations = manager.get_migrations_info().unwrap();
    let applied = manager.up_all(&mut migrations).unwrap();
    assert_eq!(applied, ["10"]);
    assert!(manager.down(&mut migrations, "404").unwrap_err().is_not_found());
}

#[test]
fn config_drives_sources_and_table() {
    let root = tempfile::tempdir().unwrap();
    let first = root.path().join("core");
    let second = root.path().join("billing");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    write_migration(&first, "0001", "users");
    write_migration(&second, "0002", "invoices");

    let mut config = QuarryConfig::default();
    config.migrations.dirs = vec![first, second];
    config.migrations.table = "schema_migrations".into();

    let client = Rc::new(MockClient::new());
    let manager = MigrationManager::from_config(client.clone(), &config);
    let migrations = manager.get_migrations_info().unwrap();

    assert_eq!(migrations.len(), 2);
    assert!(migrations["0002"].source_location.ends_with("Migration0002.sql"));
    assert_eq!(client.statements(), ["SELECT name\nFROM schema_migrations"]);
}

#[test]
fn file_and_code_sources_may_not_share_names() {
    let dir = tempfile::tempdir().unwrap();
    write_migration(dir.path(), "0001", "users");

    let client = Rc::new(MockClient::new());
    let in_code = StaticSource::new("app").with("0001", SqlMigration::new("other", "SELECT 1", "SELECT 1"));
    let manager = MigrationManager::new(
        client.clone(),
        vec![Box::new(SqlDirectorySource::new(dir.path())), Box::new(in_code)],
    );

    assert!(matches!(
        manager.get_migrations_info(),
        Err(MigrationError::DuplicateMigration { .. })
    ));
    assert!(client.statements().is_empty());
}
