//! Persistence Gateway.
//!
//! A process-wide, lazily-initialized handle to the relational store.
//! Grounded on `freeq-server::db::Db`: a single connection wrapped for
//! shared access, an `init()` that creates tables `IF NOT EXISTS`, and
//! typed row structs rather than loose maps.
//!
//! Unlike an IRC server accessed from a single connection-handling task per
//! client, this gateway is shared across many concurrent Axum handlers and
//! two background workers, so the connection is held behind a
//! `parking_lot::Mutex`. SQLite only supports one writer at a time
//! regardless, so a single mutex-guarded connection is not a simplification
//! of semantics, only of API surface; WAL mode still lets any other process
//! read concurrently.
//!
//! Startup is panic-free by contract: if the store cannot be opened,
//! `Gateway::open_file` returns `Err` and the caller (the binary's `main`)
//! can log and exit or retry, rather than panicking mid-boot.

pub mod arguments;
pub mod ballots;
pub mod credentials;
pub mod likes;
pub mod models;
pub mod mountains;
pub mod review;
pub mod sessions;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("row not found")]
    NotFound,
    #[error("constraint violated: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// The shared persistence handle. Not `Clone`; callers hold it behind an
/// `Arc` instead, which is how the application's shared state exposes it.
pub struct Gateway {
    conn: Mutex<Connection>,
}

impl Gateway {
    pub fn open_file(path: &str) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let gw = Self {
            conn: Mutex::new(conn),
        };
        gw.init_schema()?;
        Ok(gw)
    }

    pub fn open_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let gw = Self {
            conn: Mutex::new(conn),
        };
        gw.init_schema()?;
        Ok(gw)
    }

    fn init_schema(&self) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS credentials (
                did                   TEXT PRIMARY KEY,
                handle                TEXT NOT NULL,
                email                 TEXT NOT NULL UNIQUE,
                pds_hostname          TEXT NOT NULL,
                pw_ciphertext         BLOB NOT NULL,
                pw_nonce              BLOB NOT NULL,
                pseudonym_template_id INTEGER
            );

            CREATE TABLE IF NOT EXISTS sessions (
                session_token    TEXT PRIMARY KEY,
                did              TEXT NOT NULL REFERENCES credentials(did),
                user_json        TEXT NOT NULL,
                expires_at       TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                access_token     TEXT NOT NULL,
                refresh_token    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_did ON sessions(did);

            CREATE TABLE IF NOT EXISTS pending_logins (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL,
                token      TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pending_registrations (
                email      TEXT PRIMARY KEY,
                token      TEXT NOT NULL UNIQUE,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mountain_templates (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                name     TEXT NOT NULL,
                fullname TEXT NOT NULL,
                canton   TEXT NOT NULL,
                height   REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ballots (
                uri              TEXT PRIMARY KEY,
                rkey             TEXT NOT NULL,
                did              TEXT NOT NULL,
                cid              TEXT NOT NULL,
                title            TEXT,
                description      TEXT,
                vote_date        TEXT,
                created_at       TEXT NOT NULL,
                deleted          INTEGER NOT NULL DEFAULT 0,
                like_count       INTEGER NOT NULL DEFAULT 0,
                reply_count      INTEGER NOT NULL DEFAULT 0,
                bookmark_count   INTEGER NOT NULL DEFAULT 0,
                record_json      TEXT,
                bsky_post_uri    TEXT,
                bsky_post_cid    TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_ballots_crosspost
                ON ballots(did, deleted, bsky_post_uri);

            CREATE TABLE IF NOT EXISTS arguments (
                uri             TEXT PRIMARY KEY,
                ballot_uri      TEXT NOT NULL REFERENCES ballots(uri),
                ballot_rkey     TEXT NOT NULL,
                did             TEXT NOT NULL,
                cid             TEXT NOT NULL,
                title           TEXT,
                body            TEXT,
                type            TEXT NOT NULL CHECK(type IN ('PRO','CONTRA')),
                review_status   TEXT NOT NULL DEFAULT 'preliminary'
                                 CHECK(review_status IN ('preliminary','approved','rejected')),
                original_uri    TEXT,
                governance_uri  TEXT,
                bsky_post_uri   TEXT,
                bsky_post_cid   TEXT,
                deleted         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                indexed_at      TEXT,
                like_count      INTEGER NOT NULL DEFAULT 0,
                comment_count   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_arguments_ballot ON arguments(ballot_uri);
            CREATE INDEX IF NOT EXISTS idx_arguments_crosspost
                ON arguments(deleted, bsky_post_uri);
            CREATE INDEX IF NOT EXISTS idx_arguments_review
                ON arguments(review_status, deleted);

            CREATE TABLE IF NOT EXISTS likes (
                uri           TEXT PRIMARY KEY,
                did           TEXT NOT NULL,
                subject_uri   TEXT NOT NULL,
                subject_cid   TEXT NOT NULL,
                bsky_like_uri TEXT,
                deleted       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_likes_subject ON likes(did, subject_uri);

            CREATE TABLE IF NOT EXISTS review_invitations (
                uri          TEXT PRIMARY KEY,
                argument_uri TEXT NOT NULL REFERENCES arguments(uri),
                invitee_did  TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                deleted      INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_review_invitations_argument
                ON review_invitations(argument_uri, deleted);

            CREATE TABLE IF NOT EXISTS review_responses (
                uri            TEXT PRIMARY KEY,
                argument_uri   TEXT NOT NULL REFERENCES arguments(uri),
                reviewer_did   TEXT NOT NULL,
                criteria_json  TEXT NOT NULL,
                vote           TEXT NOT NULL CHECK(vote IN ('APPROVE','REJECT')),
                justification  TEXT,
                created_at     TEXT NOT NULL,
                deleted        INTEGER NOT NULL DEFAULT 0
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_review_responses_unique
                ON review_responses(argument_uri, reviewer_did) WHERE NOT deleted;
            ",
        )?;
        Ok(())
    }

    /// Executes `SELECT 1`. Used at startup and by the `/healthz` endpoint.
    pub fn health_ping(&self) -> DbResult<()> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

pub(crate) fn to_rfc3339(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_pings() {
        let gw = Gateway::open_memory().unwrap();
        gw.health_ping().unwrap();
    }
}
