//! Durable per-video chapter storage (spec.md §4.2), grounded in
//! `querymt::session::store::SessionStore` for the trait shape and
//! `querymt::session::sqlite::SqliteSessionStore` for the sqlx migration and
//! transaction style.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ChapterStoreError;
use crate::model::{Chapter, Slicer, Style};

/// Durable, per-video collection of [`Chapter`]s. The source of truth: any
/// race between this and [`crate::registry::JobRegistry`] resolves in favor
/// of what's here.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Chapters for `vid`, ordered by `start` ascending.
    async fn find_by_vid(&self, vid: &str, limit: Option<u32>) -> Result<Vec<Chapter>, ChapterStoreError>;

    /// Atomically replaces every chapter for `vid` (delete then insert).
    async fn replace(&self, vid: &str, chapters: Vec<Chapter>) -> Result<(), ChapterStoreError>;

    async fn delete_by_vid(&self, vid: &str) -> Result<(), ChapterStoreError>;
}

/// Lock-guarded map, suitable for tests and single-process demos.
#[derive(Default)]
pub struct InMemoryChapterStore {
    by_vid: Arc<Mutex<HashMap<String, Vec<Chapter>>>>,
}

impl InMemoryChapterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChapterStore for InMemoryChapterStore {
    async fn find_by_vid(&self, vid: &str, limit: Option<u32>) -> Result<Vec<Chapter>, ChapterStoreError> {
        let by_vid = self.by_vid.lock().await;
        let mut chapters = by_vid.get(vid).cloned().unwrap_or_default();
        chapters.sort_by_key(|c| c.start);
        if let Some(limit) = limit {
            chapters.truncate(limit as usize);
        }
        Ok(chapters)
    }

    async fn replace(&self, vid: &str, mut chapters: Vec<Chapter>) -> Result<(), ChapterStoreError> {
        chapters.sort_by_key(|c| c.start);
        self.by_vid.lock().await.insert(vid.to_string(), chapters);
        Ok(())
    }

    async fn delete_by_vid(&self, vid: &str) -> Result<(), ChapterStoreError> {
        self.by_vid.lock().await.remove(vid);
        Ok(())
    }
}

/// SQLite-backed implementation using the schema in `SPEC_FULL.md` §C.
pub struct SqliteChapterStore {
    pool: SqlitePool,
}

impl SqliteChapterStore {
    pub async fn new(database_url: &str) -> Result<Self, ChapterStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| ChapterStoreError::Db(format!("failed to connect to sqlite: {e}")))?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), ChapterStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chapter (
                cid TEXT NOT NULL PRIMARY KEY,
                vid TEXT NOT NULL DEFAULT '',
                trigger TEXT NOT NULL DEFAULT '',
                slicer TEXT NOT NULL DEFAULT '',
                style TEXT NOT NULL DEFAULT '',
                start INTEGER NOT NULL DEFAULT 0,
                lang TEXT NOT NULL DEFAULT '',
                chapter TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                refined INTEGER NOT NULL DEFAULT 0,
                create_ts INTEGER NOT NULL DEFAULT 0,
                update_ts INTEGER NOT NULL DEFAULT 0
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| ChapterStoreError::Db(format!("failed to create chapter table: {e}")))?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS idx_chapter_vid ON chapter (vid);",
            "CREATE INDEX IF NOT EXISTS idx_chapter_trigger ON chapter (trigger);",
            "CREATE INDEX IF NOT EXISTS idx_chapter_create_ts ON chapter (create_ts);",
            "CREATE INDEX IF NOT EXISTS idx_chapter_update_ts ON chapter (update_ts);",
        ] {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| ChapterStoreError::Db(format!("failed to create index: {e}")))?;
        }

        // The feedback table is owned by this crate's schema even though
        // only FeedbackReader ever queries it (SPEC_FULL.md §C).
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                vid TEXT NOT NULL PRIMARY KEY,
                good INTEGER NOT NULL DEFAULT 0,
                bad INTEGER NOT NULL DEFAULT 0,
                create_ts INTEGER NOT NULL DEFAULT 0,
                update_ts INTEGER NOT NULL DEFAULT 0
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| ChapterStoreError::Db(format!("failed to create feedback table: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ChapterStore for SqliteChapterStore {
    async fn find_by_vid(&self, vid: &str, limit: Option<u32>) -> Result<Vec<Chapter>, ChapterStoreError> {
        let rows = sqlx::query(
            "SELECT cid, vid, trigger, slicer, style, start, lang, chapter, summary, refined \
             FROM chapter WHERE vid = ? ORDER BY start ASC LIMIT ?",
        )
        .bind(vid)
        .bind(limit.unwrap_or(u32::MAX) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChapterStoreError::Db(e.to_string()))?;

        rows.into_iter().map(row_to_chapter).collect()
    }

    async fn replace(&self, vid: &str, chapters: Vec<Chapter>) -> Result<(), ChapterStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ChapterStoreError::Db(e.to_string()))?;

        sqlx::query("DELETE FROM chapter WHERE vid = ?")
            .bind(vid)
            .execute(&mut *tx)
            .await
            .map_err(|e| ChapterStoreError::Db(format!("failed to delete existing chapters: {e}")))?;

        let now = Utc::now().timestamp();
        for chapter in &chapters {
            sqlx::query(
                "INSERT INTO chapter \
                 (cid, vid, trigger, slicer, style, start, lang, chapter, summary, refined, create_ts, update_ts) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chapter.cid)
            .bind(&chapter.vid)
            .bind(&chapter.trigger)
            .bind(slicer_str(chapter.slicer))
            .bind(style_str(chapter.style))
            .bind(chapter.start)
            .bind(&chapter.lang)
            .bind(&chapter.chapter)
            .bind(&chapter.summary)
            .bind(chapter.refined as i64)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| ChapterStoreError::Db(format!("failed to insert chapter: {e}")))?;
        }

        tx.commit().await.map_err(|e| ChapterStoreError::Db(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_vid(&self, vid: &str) -> Result<(), ChapterStoreError> {
        sqlx::query("DELETE FROM chapter WHERE vid = ?")
            .bind(vid)
            .execute(&self.pool)
            .await
            .map_err(|e| ChapterStoreError::Db(e.to_string()))?;
        Ok(())
    }
}

fn slicer_str(slicer: Slicer) -> &'static str {
    match slicer {
        Slicer::Youtube => "youtube",
        Slicer::Llm => "llm",
    }
}

fn style_str(style: Style) -> &'static str {
    match style {
        Style::Text => "text",
        Style::Markdown => "markdown",
    }
}

fn row_to_chapter(row: sqlx::sqlite::SqliteRow) -> Result<Chapter, ChapterStoreError> {
    let slicer = match row.try_get::<String, _>("slicer").map_err(|e| ChapterStoreError::Db(e.to_string()))?.as_str() {
        "youtube" => Slicer::Youtube,
        "llm" => Slicer::Llm,
        other => return Err(ChapterStoreError::Codec(format!("unknown slicer {other:?}"))),
    };
    let style = match row.try_get::<String, _>("style").map_err(|e| ChapterStoreError::Db(e.to_string()))?.as_str() {
        "text" => Style::Text,
        "markdown" => Style::Markdown,
        other => return Err(ChapterStoreError::Codec(format!("unknown style {other:?}"))),
    };

    Ok(Chapter {
        cid: row.try_get("cid").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        vid: row.try_get("vid").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        trigger: row.try_get("trigger").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        slicer,
        style,
        start: row.try_get("start").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        lang: row.try_get("lang").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        chapter: row.try_get("chapter").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        summary: row.try_get("summary").map_err(|e| ChapterStoreError::Db(e.to_string()))?,
        refined: row.try_get::<i64, _>("refined").map_err(|e| ChapterStoreError::Db(e.to_string()))? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(vid: &str, start: i64) -> Chapter {
        let mut c = Chapter::new(vid, "trigger1", Slicer::Llm);
        c.start = start;
        c.chapter = format!("chapter at {start}");
        c
    }

    #[tokio::test]
    async fn in_memory_store_orders_by_start() {
        let store = InMemoryChapterStore::new();
        store
            .replace("vid1", vec![chapter("vid1", 30), chapter("vid1", 10), chapter("vid1", 20)])
            .await
            .unwrap();

        let found = store.find_by_vid("vid1", None).await.unwrap();
        let starts: Vec<i64> = found.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn replace_is_a_full_overwrite() {
        let store = InMemoryChapterStore::new();
        store.replace("vid1", vec![chapter("vid1", 0)]).await.unwrap();
        store.replace("vid1", vec![chapter("vid1", 5), chapter("vid1", 15)]).await.unwrap();

        let found = store.find_by_vid("vid1", None).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn delete_by_vid_clears_everything() {
        let store = InMemoryChapterStore::new();
        store.replace("vid1", vec![chapter("vid1", 0)]).await.unwrap();
        store.delete_by_vid("vid1").await.unwrap();
        assert!(store.find_by_vid("vid1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_a_chapter() {
        let db_file = tempfile::NamedTempFile::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", db_file.path().display());
        let store = SqliteChapterStore::new(&url).await.unwrap();
        let mut c = chapter("vidx", 42);
        c.style = Style::Text;
        c.slicer = Slicer::Youtube;
        c.summary = "a summary".to_string();
        c.refined = 3;
        store.replace("vidx", vec![c.clone()]).await.unwrap();

        let found = store.find_by_vid("vidx", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chapter, c.chapter);
        assert_eq!(found[0].style, Style::Text);
        assert_eq!(found[0].slicer, Slicer::Youtube);
        assert_eq!(found[0].refined, 3);
    }
}
