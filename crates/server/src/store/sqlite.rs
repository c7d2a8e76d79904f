// SQLite-backed watch state storage.
//
// One row per (user_id, video_id). Intervals are a JSON array of
// `{start, end}` pairs so a whole state is written in a single statement.
// Writes are compare-and-set on `revision`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use watchtrack_common::types::{Interval, WatchKey, WatchState};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE watch_states (
    user_id         TEXT NOT NULL,
    video_id        TEXT NOT NULL,
    intervals       TEXT NOT NULL DEFAULT '[]',
    last_position   REAL NOT NULL DEFAULT 0,
    total_duration  REAL NOT NULL,
    revision        INTEGER NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (user_id, video_id)
);
"#;

const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX watch_states_user_updated_idx
    ON watch_states (user_id, updated_at);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL), (2, MIGRATION_V2_SQL)];

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    RevisionMismatch,
}

#[derive(Debug)]
pub struct WatchDb {
    conn: Connection,
}

impl WatchDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create progress db parent directory `{}`", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open progress db at `{}`", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory progress db")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
        .context("failed to configure sqlite pragmas for progress db")?;
        conn.busy_timeout(BUSY_TIMEOUT).context("failed to set sqlite busy timeout")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }

    pub fn ping(&self) -> Result<()> {
        self.conn
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("progress db health check failed")?;
        Ok(())
    }

    pub fn load(&self, key: &WatchKey) -> Result<Option<WatchState>> {
        let row = self
            .conn
            .query_row(
                "SELECT intervals, last_position, total_duration, revision, created_at, updated_at \
                 FROM watch_states \
                 WHERE user_id = ?1 AND video_id = ?2",
                params![key.user_id, key.video_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("failed to query watch state for `{key}`"))?;

        let Some((intervals_raw, last_position, total_duration, revision, created_raw, updated_raw)) =
            row
        else {
            return Ok(None);
        };

        let intervals = serde_json::from_str::<Vec<Interval>>(&intervals_raw)
            .with_context(|| format!("invalid intervals json in watch state for `{key}`"))?;
        let created_at = created_raw.parse::<DateTime<Utc>>().with_context(|| {
            format!("invalid created_at timestamp `{created_raw}` in watch state for `{key}`")
        })?;
        let updated_at = updated_raw.parse::<DateTime<Utc>>().with_context(|| {
            format!("invalid updated_at timestamp `{updated_raw}` in watch state for `{key}`")
        })?;

        Ok(Some(WatchState {
            user_id: key.user_id.clone(),
            video_id: key.video_id.clone(),
            intervals,
            last_position,
            total_duration,
            revision,
            created_at,
            updated_at,
        }))
    }

    /// Insert when `expected_revision` is `None`, otherwise update only if the
    /// stored revision still equals it.
    pub fn save(&self, state: &WatchState, expected_revision: Option<i64>) -> Result<WriteOutcome> {
        let intervals = serde_json::to_string(&state.intervals)
            .context("failed to encode watch intervals as json")?;

        let changed = match expected_revision {
            None => self
                .conn
                .execute(
                    "INSERT INTO watch_states \
                     (user_id, video_id, intervals, last_position, total_duration, revision, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT (user_id, video_id) DO NOTHING",
                    params![
                        state.user_id,
                        state.video_id,
                        intervals,
                        state.last_position,
                        state.total_duration,
                        state.revision,
                        state.created_at.to_rfc3339(),
                        state.updated_at.to_rfc3339(),
                    ],
                )
                .context("failed to insert watch state")?,
            Some(expected) => self
                .conn
                .execute(
                    "UPDATE watch_states \
                     SET intervals = ?1, last_position = ?2, total_duration = ?3, revision = ?4, updated_at = ?5 \
                     WHERE user_id = ?6 AND video_id = ?7 AND revision = ?8",
                    params![
                        intervals,
                        state.last_position,
                        state.total_duration,
                        state.revision,
                        state.updated_at.to_rfc3339(),
                        state.user_id,
                        state.video_id,
                        expected,
                    ],
                )
                .context("failed to update watch state")?,
        };

        Ok(if changed == 1 { WriteOutcome::Written } else { WriteOutcome::RevisionMismatch })
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply progress db migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}
