//! SQLite persistence for the crawl: visited URLs and discovered resources.
//!
//! The store is written incrementally while the crawl runs so an interrupted
//! scan can be resumed with `--resume`. Resource identity is a SHA-256
//! signature over method, page and parameter names, which keeps re-discovered
//! targets from piling up across runs.

use std::path::Path;

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use url::Url;

use crate::error::ScanError;
use crate::models::{FileField, Resource};

pub struct CrawlStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    method: String,
    url: String,
    post_params: String,
    file_params: String,
    referer: Option<String>,
    status: u16,
}

/// Stable identity of a target: same method, page and parameter names mean
/// the same attack surface, whatever the values were.
pub fn resource_signature(resource: &Resource) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource.method.as_bytes());
    hasher.update(resource.page().as_bytes());
    for (name, _) in &resource.get_params {
        hasher.update(b"g:");
        hasher.update(name.as_bytes());
    }
    for (name, _) in &resource.post_params {
        hasher.update(b"p:");
        hasher.update(name.as_bytes());
    }
    for (name, _) in &resource.file_params {
        hasher.update(b"f:");
        hasher.update(name.as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl CrawlStore {
    pub async fn open(path: &Path) -> Result<Self, ScanError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = CrawlStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), ScanError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS visited (
                url TEXT PRIMARY KEY
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS resources (
                signature   TEXT PRIMARY KEY,
                method      TEXT NOT NULL,
                url         TEXT NOT NULL,
                post_params TEXT NOT NULL,
                file_params TEXT NOT NULL,
                referer     TEXT,
                status      INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        // stores written before the status column existed
        let _ = sqlx::query("ALTER TABLE resources ADD COLUMN status INTEGER NOT NULL DEFAULT 0")
            .execute(&self.pool)
            .await;
        Ok(())
    }

    pub async fn mark_visited(&self, url: &str) -> Result<(), ScanError> {
        sqlx::query("INSERT OR IGNORE INTO visited (url) VALUES (?1)")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn visited(&self) -> Result<Vec<String>, ScanError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT url FROM visited")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(u,)| u).collect())
    }

    pub async fn save_resource(&self, resource: &Resource) -> Result<(), ScanError> {
        let post = serde_json::to_string(&resource.post_params)
            .map_err(|e| ScanError::Parse(e.to_string()))?;
        let files = serde_json::to_string(&resource.file_params)
            .map_err(|e| ScanError::Parse(e.to_string()))?;
        sqlx::query(
            "INSERT OR IGNORE INTO resources
                (signature, method, url, post_params, file_params, referer, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(resource_signature(resource))
        .bind(&resource.method)
        .bind(resource.url.as_str())
        .bind(post)
        .bind(files)
        .bind(&resource.referer)
        .bind(resource.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn resources(&self) -> Result<Vec<Resource>, ScanError> {
        let rows: Vec<ResourceRow> = sqlx::query_as(
            "SELECT method, url, post_params, file_params, referer, status FROM resources",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let url = Url::parse(&row.url).map_err(|e| ScanError::Parse(e.to_string()))?;
            let post: Vec<(String, String)> = serde_json::from_str(&row.post_params)
                .map_err(|e| ScanError::Parse(e.to_string()))?;
            let files: Vec<(String, FileField)> = serde_json::from_str(&row.file_params)
                .map_err(|e| ScanError::Parse(e.to_string()))?;
            let mut resource = if row.method == "GET" {
                Resource::get(url, row.referer)
            } else {
                let mut r = Resource::form(url, post, files, row.referer);
                r.method = row.method;
                r
            };
            resource.status = row.status;
            out.push(resource);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn memory_store() -> CrawlStore {
        CrawlStore::open(&PathBuf::from(":memory:")).await.unwrap()
    }

    #[tokio::test]
    async fn visited_urls_round_trip_and_dedup() {
        let store = memory_store().await;
        store.mark_visited("http://a/1").await.unwrap();
        store.mark_visited("http://a/1").await.unwrap();
        store.mark_visited("http://a/2").await.unwrap();
        let mut got = store.visited().await.unwrap();
        got.sort();
        assert_eq!(got, vec!["http://a/1", "http://a/2"]);
    }

    #[tokio::test]
    async fn same_signature_is_stored_once() {
        let store = memory_store().await;
        let a = Resource::get(Url::parse("http://a/p?x=1").unwrap(), None);
        let b = Resource::get(Url::parse("http://a/p?x=other").unwrap(), None);
        assert_eq!(resource_signature(&a), resource_signature(&b));
        store.save_resource(&a).await.unwrap();
        store.save_resource(&b).await.unwrap();
        assert_eq!(store.resources().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn post_resource_round_trips_fields() {
        let store = memory_store().await;
        let r = Resource::form(
            Url::parse("http://a/form.php").unwrap(),
            vec![("name".to_string(), "bob".to_string())],
            vec![("up".to_string(), FileField::placeholder())],
            Some("http://a/".to_string()),
        );
        store.save_resource(&r).await.unwrap();
        let got = store.resources().await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].method, "POST");
        assert_eq!(got[0].post_params, r.post_params);
        assert_eq!(got[0].file_params[0].0, "up");
        assert_eq!(got[0].referer.as_deref(), Some("http://a/"));
    }

    #[tokio::test]
    async fn response_status_survives_reload() {
        let store = memory_store().await;
        let mut r = Resource::get(Url::parse("http://a/private/").unwrap(), None);
        r.status = 401;
        store.save_resource(&r).await.unwrap();
        let got = store.resources().await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].status, 401);
    }

    #[test]
    fn signature_distinguishes_parameter_names() {
        let a = Resource::get(Url::parse("http://a/p?x=1").unwrap(), None);
        let b = Resource::get(Url::parse("http://a/p?y=1").unwrap(), None);
        assert_ne!(resource_signature(&a), resource_signature(&b));
    }
}
