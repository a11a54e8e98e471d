use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode};
use tokio::sync::Mutex;

use super::{MarkOutcome, NotificationStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS notified_posts (
    post_id     INTEGER PRIMARY KEY,
    notified_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS subscribers (
    email     TEXT PRIMARY KEY,
    confirmed INTEGER NOT NULL DEFAULT 0
);
";

/// SQLite-backed notification records and subscriber list. The primary key
/// on `notified_posts.post_id` carries the insert-or-detect-duplicate
/// contract the gate relies on.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening notification db at {path}"))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory notification db")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("applying notification db schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Subscriber management lives outside this service; this helper exists
    /// for operators and tests.
    pub async fn add_subscriber(&self, email: &str, confirmed: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO subscribers (email, confirmed) VALUES (?1, ?2)",
            (email, confirmed as i64),
        )
        .context("inserting subscriber")?;
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn mark_notified(&self, post_id: u64) -> Result<MarkOutcome> {
        let conn = self.conn.lock().await;
        match conn.execute(
            "INSERT INTO notified_posts (post_id) VALUES (?1)",
            [post_id as i64],
        ) {
            Ok(_) => Ok(MarkOutcome::Fresh),
            Err(err) if is_unique_violation(&err) => Ok(MarkOutcome::AlreadyNotified),
            Err(err) => Err(err).context("inserting notification record"),
        }
    }

    async fn confirmed_subscribers(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT email FROM subscribers WHERE confirmed = 1 ORDER BY email")
            .context("preparing subscriber query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("querying subscribers")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("reading subscriber rows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_mark_is_detected_as_duplicate() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.mark_notified(42).await.unwrap(), MarkOutcome::Fresh);
        assert_eq!(
            store.mark_notified(42).await.unwrap(),
            MarkOutcome::AlreadyNotified
        );
        assert_eq!(store.mark_notified(43).await.unwrap(), MarkOutcome::Fresh);
    }

    #[tokio::test]
    async fn only_confirmed_subscribers_are_listed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_subscriber("a@example.org", true).await.unwrap();
        store.add_subscriber("b@example.org", false).await.unwrap();
        store.add_subscriber("c@example.org", true).await.unwrap();

        let subs = store.confirmed_subscribers().await.unwrap();
        assert_eq!(subs, vec!["a@example.org", "c@example.org"]);
    }
}
