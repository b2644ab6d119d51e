//! Read-only access to good/bad feedback counters (spec.md §4's
//! FeedbackReader, §2: "the core only *reads* feedback via a defined
//! interface"). Nothing in this crate writes `feedback` rows; the table is
//! created by [`crate::store::SqliteChapterStore`] but populated by
//! `POST /feedback/{vid}`, which lives outside this crate's scope.

use async_trait::async_trait;

use crate::error::ChapterStoreError;
use crate::model::Feedback;

#[async_trait]
pub trait FeedbackReader: Send + Sync {
    /// Current good/bad counters for `vid`. Absence of any row reads as
    /// `{good: 0, bad: 0}`.
    async fn read(&self, vid: &str) -> Result<Feedback, ChapterStoreError>;
}

/// sqlx-backed reader over the `feedback` table.
pub struct SqliteFeedbackReader {
    pool: sqlx::SqlitePool,
}

impl SqliteFeedbackReader {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedbackReader for SqliteFeedbackReader {
    async fn read(&self, vid: &str) -> Result<Feedback, ChapterStoreError> {
        let row = sqlx::query_as::<_, (i64, i64)>("SELECT good, bad FROM feedback WHERE vid = ?")
            .bind(vid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChapterStoreError::Db(e.to_string()))?;

        Ok(match row {
            Some((good, bad)) => Feedback {
                good: good as u32,
                bad: bad as u32,
            },
            None => Feedback::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_row_reads_as_zero() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect(&url).await.unwrap();
        sqlx::query(
            "CREATE TABLE feedback (vid TEXT PRIMARY KEY, good INTEGER NOT NULL DEFAULT 0, bad INTEGER NOT NULL DEFAULT 0, create_ts INTEGER NOT NULL DEFAULT 0, update_ts INTEGER NOT NULL DEFAULT 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let reader = SqliteFeedbackReader::new(pool);
        assert_eq!(reader.read("unknown").await.unwrap(), Feedback::default());
    }

    #[tokio::test]
    async fn existing_row_is_read_verbatim() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect(&url).await.unwrap();
        sqlx::query(
            "CREATE TABLE feedback (vid TEXT PRIMARY KEY, good INTEGER NOT NULL DEFAULT 0, bad INTEGER NOT NULL DEFAULT 0, create_ts INTEGER NOT NULL DEFAULT 0, update_ts INTEGER NOT NULL DEFAULT 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO feedback (vid, good, bad, create_ts, update_ts) VALUES ('v', 7, 3, 0, 0)")
            .execute(&pool)
            .await
            .unwrap();

        let reader = SqliteFeedbackReader::new(pool);
        assert_eq!(reader.read("v").await.unwrap(), Feedback { good: 7, bad: 3 });
    }
}
