#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_search_library_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS saved_searches (
    search_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    snapshot TEXT NOT NULL,
    email_alerts INTEGER NOT NULL DEFAULT 0,
    created_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS search_history (
    entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
    search_text TEXT,
    filters TEXT NOT NULL,
    results_count INTEGER NOT NULL DEFAULT 0,
    created_at_unix INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_history_time
    ON search_history (created_at_unix DESC);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_search_history_time;
DROP TABLE IF EXISTS search_history;
DROP TABLE IF EXISTS saved_searches;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_app_state",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS app_state (
    state_key TEXT PRIMARY KEY,
    state_value TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS app_state;
"#,
};

const MIGRATIONS: [SqliteMigration; 2] = [MIGRATION_0001, MIGRATION_0002];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
