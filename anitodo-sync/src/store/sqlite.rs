//! SQLite-backed store

use super::{validate_page, Store};
use crate::models::{Entry, HistoryItem, HistoryPage, WatchRecord, WeekdayBucket};
use anitodo_common::db::{AniInfoRow, CollectRow, WatchHistoryRow};
use anitodo_common::{time, Error, Result};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

const ENTRY_COLUMNS: &str =
    "id, title, platform, update_count, update_info, image_url, detail_url, update_time";

/// Store over the tables created by `anitodo_common::db::init_database`
///
/// All markers are written under one user id (empty by default).
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    user_id: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_user(pool, "")
    }

    pub fn with_user(pool: SqlitePool, user_id: impl Into<String>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn newest_by_title(&self, title: &str) -> Result<Option<AniInfoRow>> {
        let row = sqlx::query_as::<_, AniInfoRow>(&format!(
            "SELECT {} FROM ani_info WHERE title = ? ORDER BY update_time DESC, id DESC LIMIT 1",
            ENTRY_COLUMNS
        ))
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

impl From<AniInfoRow> for Entry {
    fn from(row: AniInfoRow) -> Self {
        Entry {
            id: Some(row.id),
            title: row.title,
            platform: row.platform,
            update_label: row.update_info,
            update_sequence: row.update_count.parse().ok(),
            detail_url: row.detail_url,
            image_url: row.image_url,
            update_timestamp: row.update_time,
        }
    }
}

impl From<WatchHistoryRow> for WatchRecord {
    fn from(row: WatchHistoryRow) -> Self {
        Self {
            ani_item_id: row.ani_item_id,
            watched_time: row.watched_time,
        }
    }
}

#[derive(FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    info: AniInfoRow,
    watched_time: Option<i64>,
}

#[async_trait]
impl Store for SqliteStore {
    async fn query_today_updates(&self) -> Result<WeekdayBucket> {
        let rows = sqlx::query_as::<_, AniInfoRow>(&format!(
            "SELECT {} FROM ani_info WHERE update_time >= ? ORDER BY update_time DESC, id DESC",
            ENTRY_COLUMNS
        ))
        .bind(time::start_of_today_millis())
        .fetch_all(&self.pool)
        .await?;

        let mut bucket = WeekdayBucket::new();
        bucket.insert(
            time::today_weekday_label().to_string(),
            rows.into_iter().map(Entry::from).collect(),
        );
        Ok(bucket)
    }

    async fn save_entries(&self, data: &WeekdayBucket) -> Result<()> {
        let now = time::now_millis();
        let mut tx = self.pool.begin().await?;
        let mut saved = 0usize;

        for entry in data.values().flatten() {
            let title = entry.title.trim();
            if title.is_empty() {
                continue;
            }
            let update_count = entry
                .update_sequence
                .map(|n| n.to_string())
                .unwrap_or_default();
            // 0 means the source did not report a time
            let update_time = if entry.update_timestamp > 0 {
                entry.update_timestamp
            } else {
                now
            };

            sqlx::query(
                r#"
                INSERT INTO ani_info
                    (title, platform, update_count, update_info, image_url, detail_url, update_time)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(title, platform, update_count) DO UPDATE SET
                    update_info = excluded.update_info,
                    image_url = excluded.image_url,
                    detail_url = excluded.detail_url,
                    update_time = excluded.update_time
                "#,
            )
            .bind(title)
            .bind(&entry.platform)
            .bind(update_count)
            .bind(&entry.update_label)
            .bind(&entry.image_url)
            .bind(&entry.detail_url)
            .bind(update_time)
            .execute(&mut *tx)
            .await?;
            saved += 1;
        }

        tx.commit().await?;
        debug!(saved, "Saved entries");
        Ok(())
    }

    async fn query_watched(&self) -> Result<Vec<WatchRecord>> {
        let rows: Vec<WatchHistoryRow> = sqlx::query_as(
            r#"
            SELECT h.ani_item_id, h.watched_time
            FROM ani_watch_history h
            JOIN ani_info i ON i.id = h.ani_item_id
            WHERE h.user_id = ? AND i.update_time >= ?
            ORDER BY h.watched_time DESC
            "#,
        )
        .bind(&self.user_id)
        .bind(time::start_of_today_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WatchRecord::from).collect())
    }

    async fn mark_watched(&self, ani_id: i64) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM ani_info WHERE id = ?)")
            .bind(ani_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(Error::NotFound(format!("ani_info id {}", ani_id)));
        }

        sqlx::query(
            r#"
            INSERT INTO ani_watch_history (user_id, ani_item_id, watched_time)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, ani_item_id) DO UPDATE SET
                watched_time = excluded.watched_time
            "#,
        )
        .bind(&self.user_id)
        .bind(ani_id)
        .bind(time::now_millis())
        .execute(&self.pool)
        .await?;

        debug!(ani_id, "Watch recorded");
        Ok(())
    }

    async fn query_favorite_updates(&self) -> Result<Vec<Entry>> {
        let follows = sqlx::query_as::<_, CollectRow>(
            r#"
            SELECT ani_item_id, ani_title, collect_time
            FROM ani_collect
            WHERE user_id = ?
            ORDER BY collect_time DESC, id DESC
            "#,
        )
        .bind(&self.user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(follows.len());
        for follow in follows {
            match self.newest_by_title(&follow.ani_title).await? {
                Some(row) => entries.push(Entry::from(row)),
                // Followed title with no stored episode left
                None => entries.push(Entry {
                    id: Some(follow.ani_item_id),
                    update_timestamp: follow.collect_time,
                    ..Entry::new(follow.ani_title, "")
                }),
            }
        }
        Ok(entries)
    }

    async fn collect(&self, ani_id: i64, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("cannot follow an empty title".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO ani_collect (user_id, ani_item_id, ani_title, collect_time)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, ani_title) DO UPDATE SET
                ani_item_id = excluded.ani_item_id,
                collect_time = excluded.collect_time
            "#,
        )
        .bind(&self.user_id)
        .bind(ani_id)
        .bind(title)
        .bind(time::now_millis())
        .execute(&self.pool)
        .await?;

        debug!(ani_id, title, "Title followed");
        Ok(())
    }

    async fn uncollect(&self, ani_id: i64, title: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM ani_collect WHERE user_id = ? AND ani_title = ?")
            .bind(&self.user_id)
            .bind(title.trim())
            .execute(&self.pool)
            .await?;

        debug!(ani_id, title, removed = result.rows_affected(), "Title unfollowed");
        Ok(())
    }

    async fn query_history(&self, page: u32, page_size: u32) -> Result<HistoryPage> {
        validate_page(page, page_size)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ani_info")
            .fetch_one(&self.pool)
            .await?;

        let offset = i64::from(page - 1) * i64::from(page_size);
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT i.id, i.title, i.platform, i.update_count, i.update_info,
                   i.image_url, i.detail_url, i.update_time, h.watched_time
            FROM ani_info i
            LEFT JOIN ani_watch_history h
                ON h.ani_item_id = i.id AND h.user_id = ?
            ORDER BY i.update_time DESC, i.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&self.user_id)
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| HistoryItem {
                is_watched: row.watched_time.is_some(),
                watched_time: row.watched_time,
                entry: Entry::from(row.info),
            })
            .collect();

        Ok(HistoryPage {
            total: u64::try_from(total).unwrap_or(0),
            items,
            page,
            page_size,
        })
    }
}
