// Two connections on one database file: bounded retry gives up while the
// other side holds the write lock, and succeeds once it is released
use scanmgr_sql::{SqlConfig, SqlEngine, SqlError, SqliteBackend};
use tempfile::TempDir;

fn open(dir: &TempDir) -> SqlEngine<SqliteBackend> {
    let config = SqlConfig {
        database: dir.path().join("tasks.db").to_string_lossy().into_owned(),
        ..SqlConfig::default()
    };
    SqlEngine::open(&config).unwrap()
}

#[test]
fn test_giveup_while_locked() {
    let dir = TempDir::new().unwrap();
    let holder = open(&dir);
    let other = open(&dir);

    holder
        .sql("CREATE TABLE results (id INTEGER PRIMARY KEY, host TEXT);", &[])
        .unwrap();

    holder.begin_exclusive().unwrap();
    holder
        .sql("INSERT INTO results (host) VALUES ('10.0.0.1');", &[])
        .unwrap();

    assert!(matches!(
        other.sql_giveup("INSERT INTO results (host) VALUES ('10.0.0.2');", &[]),
        Err(SqlError::GaveUp)
    ));
    assert!(!other.begin_exclusive_giveup().unwrap());
    assert!(other.counters().busy_retries > 0);

    holder.commit().unwrap();

    other
        .sql_giveup("INSERT INTO results (host) VALUES ('10.0.0.2');", &[])
        .unwrap();
    assert!(other.begin_exclusive_giveup().unwrap());
    other.commit().unwrap();

    assert_eq!(
        holder
            .query_int("SELECT count(*) FROM results;", &[])
            .unwrap(),
        2
    );
}

#[test]
fn test_schema_change_from_other_connection() {
    let dir = TempDir::new().unwrap();
    let first = open(&dir);
    let second = open(&dir);

    first
        .sql("CREATE TABLE hosts (id INTEGER PRIMARY KEY, name TEXT);", &[])
        .unwrap();
    first
        .sql("INSERT INTO hosts (name) VALUES ('alpha');", &[])
        .unwrap();
    assert_eq!(
        second.query_int("SELECT count(*) FROM hosts;", &[]).unwrap(),
        1
    );

    second
        .sql("ALTER TABLE hosts ADD COLUMN comment TEXT;", &[])
        .unwrap();

    let mut rows = first
        .iterator("SELECT * FROM hosts;", &[])
        .unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.column_count().unwrap(), 3);
    rows.cleanup();
}
