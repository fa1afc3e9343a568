//! Embedded schema migrations

use rusqlite::{params, Connection};
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_schema",
        sql: include_str!("../../migrations/001_schema.sql"),
    },
    Migration {
        version: 2,
        name: "002_point_adjustments",
        sql: include_str!("../../migrations/002_point_adjustments.sql"),
    },
];

pub struct Migrator {
    migrations: &'static [Migration],
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }

    /// Apply every migration newer than the recorded schema version
    pub fn run(&self, conn: &mut Connection) -> rusqlite::Result<usize> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version    INTEGER PRIMARY KEY,
                name       TEXT    NOT NULL,
                applied_at TEXT    NOT NULL
            )",
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;

        let mut applied = 0;
        for migration in self.migrations.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![
                    migration.version,
                    migration.name,
                    chrono::Utc::now().to_rfc3339()
                ],
            )?;
            tx.commit()?;
            info!("Applied migration {}", migration.name);
            applied += 1;
        }

        Ok(applied)
    }
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}
