//! Persistence layer: the `Store` trait plus a `SqliteStore` implementation and
//! an `InMemoryStore` used both as the read-only-filesystem fallback and as a
//! test double, mirroring the lineage's `RecapDao` trait / mock-implementation
//! split.

pub mod models;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

pub use models::{
    Article, BiasDistribution, BiasRating, Blindspot, Cluster, ClusterCandidate,
    ClusterMemberSnapshot, ClusterStats, Factuality, normalize_headline,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    Decode(String),
}

/// Persistence operations the pipeline drives, per §4.1. Every multi-row
/// mutation is transactional: either all rows change or none do.
#[async_trait]
pub trait Store: Send + Sync {
    /// Articles fetched within `max_age_hours` that have not yet been assigned
    /// to a cluster, oldest `pub_date` first, capped at `limit`.
    async fn select_unclustered(
        &self,
        max_age_hours: i64,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError>;

    /// Writes back the embedding and entity set computed by the Enricher.
    /// Articles for which enrichment failed are simply absent from `articles`
    /// and are left untouched.
    async fn persist_enrichment(&self, articles: &[Article]) -> Result<(), StoreError>;

    /// Clusters created within `max_age_hours`, reconstructed as
    /// [`ClusterCandidate`]s (centroid recomputed from current members) so the
    /// online clusterer can match new articles against them.
    async fn load_recent_clusters(
        &self,
        max_age_hours: i64,
    ) -> Result<Vec<ClusterCandidate>, StoreError>;

    async fn load_cluster_articles(&self, cluster_id: Uuid) -> Result<Vec<Article>, StoreError>;

    /// Clusters newest-`created_at`-first, capped at `limit`, for the
    /// cluster-read endpoint (§6). Unlike [`Store::load_recent_clusters`] this
    /// has no time window and returns the persisted [`Cluster`] records
    /// themselves rather than clustering candidates.
    async fn list_clusters(&self, limit: i64) -> Result<Vec<Cluster>, StoreError>;

    /// Persists newly labeled clusters and assigns `article_ids` to each.
    async fn commit_clusters(&self, clusters: &[(Cluster, Vec<Uuid>)]) -> Result<(), StoreError>;

    /// Replaces `old_cluster_id` with `new_clusters`, reassigning member
    /// articles per `assignment`. If `old_cluster_id` no longer exists (it was
    /// concurrently removed), the call is a silent no-op returning `false`.
    async fn split_cluster(
        &self,
        old_cluster_id: Uuid,
        new_clusters: &[(Cluster, Vec<Uuid>)],
    ) -> Result<bool, StoreError>;

    /// Inserts new articles and updates existing ones (matched by `id`).
    /// `image_url` is preserved on conflict if the incoming value is `None`;
    /// `fetched_at` and `headline` are always overwritten.
    async fn upsert_articles(&self, articles: &[Article]) -> Result<(), StoreError>;
}

fn bias_to_str(b: BiasRating) -> &'static str {
    match b {
        BiasRating::FarLeft => "far-left",
        BiasRating::Left => "left",
        BiasRating::CenterLeft => "center-left",
        BiasRating::Center => "center",
        BiasRating::CenterRight => "center-right",
        BiasRating::Right => "right",
        BiasRating::FarRight => "far-right",
    }
}

fn bias_from_str(s: &str) -> Result<BiasRating, StoreError> {
    match s {
        "far-left" => Ok(BiasRating::FarLeft),
        "left" => Ok(BiasRating::Left),
        "center-left" => Ok(BiasRating::CenterLeft),
        "center" => Ok(BiasRating::Center),
        "center-right" => Ok(BiasRating::CenterRight),
        "right" => Ok(BiasRating::Right),
        "far-right" => Ok(BiasRating::FarRight),
        other => Err(StoreError::Decode(format!("unknown bias_rating {other}"))),
    }
}

fn factuality_to_str(f: Factuality) -> &'static str {
    match f {
        Factuality::VeryHigh => "very-high",
        Factuality::High => "high",
        Factuality::Mixed => "mixed",
        Factuality::Low => "low",
    }
}

fn factuality_from_str(s: &str) -> Result<Factuality, StoreError> {
    match s {
        "very-high" => Ok(Factuality::VeryHigh),
        "high" => Ok(Factuality::High),
        "mixed" => Ok(Factuality::Mixed),
        "low" => Ok(Factuality::Low),
        other => Err(StoreError::Decode(format!("unknown factuality {other}"))),
    }
}

fn blindspot_to_str(b: Blindspot) -> &'static str {
    match b {
        Blindspot::Left => "left",
        Blindspot::Right => "right",
        Blindspot::None => "none",
    }
}

fn blindspot_from_str(s: &str) -> Result<Blindspot, StoreError> {
    match s {
        "left" => Ok(Blindspot::Left),
        "right" => Ok(Blindspot::Right),
        "none" => Ok(Blindspot::None),
        other => Err(StoreError::Decode(format!("unknown blindspot {other}"))),
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Decodes a stored embedding, discarding it if its dimensionality doesn't
/// match the deployment-wide `D` (§7: "dimension mismatch (corruption):
/// embedding length != D -> treat article's embedding as missing; do not
/// crash").
fn decode_embedding_checked(bytes: &[u8]) -> Option<Vec<f32>> {
    let vector = decode_embedding(bytes);
    (vector.len() == crate::pipeline::embedding::EMBEDDING_DIM).then_some(vector)
}

/// `sqlx`-backed store over a local SQLite file (or an in-process SQLite
/// database when `:memory:` is requested), created on first use.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS news_articles (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                source_name TEXT NOT NULL,
                bias_rating TEXT NOT NULL,
                factuality TEXT NOT NULL,
                headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT,
                pub_date TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                cluster_id TEXT REFERENCES news_clusters(id),
                embedding BLOB,
                entities TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_cluster_id ON news_articles(cluster_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_pub_date ON news_articles(pub_date)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS news_clusters (
                id TEXT PRIMARY KEY,
                headline TEXT NOT NULL,
                summary TEXT NOT NULL,
                category TEXT NOT NULL,
                main_image_url TEXT,
                created_at TEXT NOT NULL,
                total_sources INTEGER NOT NULL,
                left_count INTEGER NOT NULL,
                center_count INTEGER NOT NULL,
                right_count INTEGER NOT NULL,
                left_pct REAL NOT NULL,
                right_pct REAL NOT NULL,
                center_pct REAL NOT NULL,
                blindspot TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_clusters_created_at ON news_clusters(created_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_article(row: &sqlx::sqlite::SqliteRow) -> Result<Article, StoreError> {
        let id: String = row.try_get("id")?;
        let cluster_id: Option<String> = row.try_get("cluster_id")?;
        let entities: Option<String> = row.try_get("entities")?;
        let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
        Ok(Article {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?,
            source_id: row.try_get("source_id")?,
            source_name: row.try_get("source_name")?,
            bias_rating: bias_from_str(row.try_get("bias_rating")?)?,
            factuality: factuality_from_str(row.try_get("factuality")?)?,
            headline: row.try_get("headline")?,
            summary: row.try_get("summary")?,
            url: row.try_get("url")?,
            image_url: row.try_get("image_url")?,
            pub_date: row.try_get("pub_date")?,
            fetched_at: row.try_get("fetched_at")?,
            cluster_id: cluster_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            embedding: embedding.and_then(|b| decode_embedding_checked(&b)),
            entities: entities
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
        })
    }

    fn row_to_cluster(row: &sqlx::sqlite::SqliteRow) -> Result<Cluster, StoreError> {
        let id: String = row.try_get("id")?;
        Ok(Cluster {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?,
            headline: row.try_get("headline")?,
            summary: row.try_get("summary")?,
            category: row.try_get("category")?,
            main_image_url: row.try_get("main_image_url")?,
            created_at: row.try_get("created_at")?,
            stats: ClusterStats {
                total_sources: u32::try_from(row.try_get::<i64, _>("total_sources")?)
                    .map_err(|e| StoreError::Decode(e.to_string()))?,
                bias_distribution: BiasDistribution {
                    left: u32::try_from(row.try_get::<i64, _>("left_count")?)
                        .map_err(|e| StoreError::Decode(e.to_string()))?,
                    center: u32::try_from(row.try_get::<i64, _>("center_count")?)
                        .map_err(|e| StoreError::Decode(e.to_string()))?,
                    right: u32::try_from(row.try_get::<i64, _>("right_count")?)
                        .map_err(|e| StoreError::Decode(e.to_string()))?,
                },
                left_pct: row.try_get("left_pct")?,
                right_pct: row.try_get("right_pct")?,
                center_pct: row.try_get("center_pct")?,
                blindspot: blindspot_from_str(row.try_get("blindspot")?)?,
            },
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn select_unclustered(
        &self,
        max_age_hours: i64,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
        let rows = sqlx::query(
            r"
            SELECT * FROM news_articles
            WHERE cluster_id IS NULL AND pub_date > ?
            ORDER BY pub_date ASC
            LIMIT ?
            ",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_article).collect()
    }

    async fn persist_enrichment(&self, articles: &[Article]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for article in articles {
            let entities_json = article
                .entities
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            let embedding_blob = article.embedding.as_deref().map(encode_embedding);
            sqlx::query(
                "UPDATE news_articles SET embedding = ?, entities = ? WHERE id = ?",
            )
            .bind(embedding_blob)
            .bind(entities_json)
            .bind(article.id.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_recent_clusters(
        &self,
        max_age_hours: i64,
    ) -> Result<Vec<ClusterCandidate>, StoreError> {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
        let cluster_rows = sqlx::query(
            "SELECT id, created_at FROM news_clusters WHERE created_at >= ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(cluster_rows.len());
        for row in &cluster_rows {
            let id: String = row.try_get("id")?;
            let cluster_id = Uuid::parse_str(&id).map_err(|e| StoreError::Decode(e.to_string()))?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            let members = self.load_cluster_articles(cluster_id).await?;
            let embedded: Vec<&Vec<f32>> = members.iter().filter_map(|a| a.embedding.as_ref()).collect();
            if embedded.is_empty() {
                continue;
            }
            let dim = embedded[0].len();
            let mut centroid = vec![0.0_f32; dim];
            for emb in &embedded {
                for (c, v) in centroid.iter_mut().zip(emb.iter()) {
                    *c += v;
                }
            }
            let n = embedded.len() as f32;
            for c in &mut centroid {
                *c /= n;
            }
            crate::util::cosine::normalize(&mut centroid);
            let latest_time = members.iter().map(|a| a.pub_date).max().unwrap_or(created_at);
            let member_snapshots = members
                .iter()
                .filter_map(crate::store::ClusterMemberSnapshot::from_article)
                .collect();
            candidates.push(ClusterCandidate {
                cluster_id: Some(cluster_id),
                centroid,
                member_ids: members.iter().map(|a| a.id).collect(),
                members: member_snapshots,
                latest_time,
                created_at,
            });
        }
        Ok(candidates)
    }

    async fn load_cluster_articles(&self, cluster_id: Uuid) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query("SELECT * FROM news_articles WHERE cluster_id = ?")
            .bind(cluster_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_article).collect()
    }

    async fn list_clusters(&self, limit: i64) -> Result<Vec<Cluster>, StoreError> {
        let rows = sqlx::query("SELECT * FROM news_clusters ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_cluster).collect()
    }

    async fn commit_clusters(&self, clusters: &[(Cluster, Vec<Uuid>)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (cluster, article_ids) in clusters {
            insert_cluster(&mut tx, cluster).await?;
            for article_id in article_ids {
                sqlx::query("UPDATE news_articles SET cluster_id = ? WHERE id = ?")
                    .bind(cluster.id.to_string())
                    .bind(article_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn split_cluster(
        &self,
        old_cluster_id: Uuid,
        new_clusters: &[(Cluster, Vec<Uuid>)],
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM news_clusters WHERE id = ?")
                .bind(old_cluster_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("DELETE FROM news_clusters WHERE id = ?")
            .bind(old_cluster_id.to_string())
            .execute(&mut *tx)
            .await?;
        for (cluster, article_ids) in new_clusters {
            insert_cluster(&mut tx, cluster).await?;
            for article_id in article_ids {
                sqlx::query("UPDATE news_articles SET cluster_id = ? WHERE id = ?")
                    .bind(cluster.id.to_string())
                    .bind(article_id.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn upsert_articles(&self, articles: &[Article]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for article in articles {
            let existing_image: Option<(Option<String>,)> =
                sqlx::query_as("SELECT image_url FROM news_articles WHERE id = ?")
                    .bind(article.id.to_string())
                    .fetch_optional(&mut *tx)
                    .await?;
            let image_url = match (&article.image_url, existing_image) {
                (Some(new), _) => Some(new.clone()),
                (None, Some((preserved,))) => preserved,
                (None, None) => None,
            };
            sqlx::query(
                r"
                INSERT INTO news_articles
                    (id, source_id, source_name, bias_rating, factuality, headline, summary,
                     url, image_url, pub_date, fetched_at, cluster_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    headline = excluded.headline,
                    summary = excluded.summary,
                    image_url = excluded.image_url,
                    fetched_at = excluded.fetched_at
                ",
            )
            .bind(article.id.to_string())
            .bind(&article.source_id)
            .bind(&article.source_name)
            .bind(bias_to_str(article.bias_rating))
            .bind(factuality_to_str(article.factuality))
            .bind(&article.headline)
            .bind(&article.summary)
            .bind(&article.url)
            .bind(image_url)
            .bind(article.pub_date)
            .bind(article.fetched_at)
            .bind(article.cluster_id.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

async fn insert_cluster(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cluster: &Cluster,
) -> Result<(), StoreError> {
    sqlx::query(
        r"
        INSERT INTO news_clusters
            (id, headline, summary, category, main_image_url, created_at,
             total_sources, left_count, center_count, right_count,
             left_pct, right_pct, center_pct, blindspot)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            headline = excluded.headline,
            summary = excluded.summary,
            category = excluded.category,
            main_image_url = excluded.main_image_url,
            total_sources = excluded.total_sources,
            left_count = excluded.left_count,
            center_count = excluded.center_count,
            right_count = excluded.right_count,
            left_pct = excluded.left_pct,
            right_pct = excluded.right_pct,
            center_pct = excluded.center_pct,
            blindspot = excluded.blindspot
        ",
    )
    .bind(cluster.id.to_string())
    .bind(&cluster.headline)
    .bind(&cluster.summary)
    .bind(&cluster.category)
    .bind(&cluster.main_image_url)
    .bind(cluster.created_at)
    .bind(i64::from(cluster.stats.total_sources))
    .bind(i64::from(cluster.stats.bias_distribution.left))
    .bind(i64::from(cluster.stats.bias_distribution.center))
    .bind(i64::from(cluster.stats.bias_distribution.right))
    .bind(cluster.stats.left_pct)
    .bind(cluster.stats.right_pct)
    .bind(cluster.stats.center_pct)
    .bind(blindspot_to_str(cluster.stats.blindspot))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// In-process store guarded by a single mutex, used when the configured
/// `DB_PATH` turns out to be unwritable (§4.10) and as the test double for
/// every pipeline-component test.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    articles: HashMap<Uuid, Article>,
    clusters: HashMap<Uuid, Cluster>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seeding helper: inserts or replaces an article directly.
    pub fn seed_article(&self, article: Article) {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        state.articles.insert(article.id, article);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn select_unclustered(
        &self,
        max_age_hours: i64,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
        let state = self.inner.lock().expect("store mutex poisoned");
        let mut matching: Vec<Article> = state
            .articles
            .values()
            .filter(|a| a.cluster_id.is_none() && a.pub_date > cutoff)
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.pub_date);
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn persist_enrichment(&self, articles: &[Article]) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        for article in articles {
            if let Some(existing) = state.articles.get_mut(&article.id) {
                existing.embedding = article.embedding.clone();
                existing.entities = article.entities.clone();
            }
        }
        Ok(())
    }

    async fn load_recent_clusters(
        &self,
        max_age_hours: i64,
    ) -> Result<Vec<ClusterCandidate>, StoreError> {
        let cutoff = Utc::now() - ChronoDuration::hours(max_age_hours);
        let state = self.inner.lock().expect("store mutex poisoned");
        let mut candidates = Vec::new();
        for cluster in state.clusters.values().filter(|c| c.created_at >= cutoff) {
            let members: Vec<&Article> = state
                .articles
                .values()
                .filter(|a| a.cluster_id == Some(cluster.id))
                .collect();
            let embedded: Vec<&Vec<f32>> = members.iter().filter_map(|a| a.embedding.as_ref()).collect();
            if embedded.is_empty() {
                continue;
            }
            let dim = embedded[0].len();
            let mut centroid = vec![0.0_f32; dim];
            for emb in &embedded {
                for (c, v) in centroid.iter_mut().zip(emb.iter()) {
                    *c += v;
                }
            }
            let n = embedded.len() as f32;
            for c in &mut centroid {
                *c /= n;
            }
            crate::util::cosine::normalize(&mut centroid);
            let latest_time = members.iter().map(|a| a.pub_date).max().unwrap_or(cluster.created_at);
            let member_snapshots = members
                .iter()
                .filter_map(|a| crate::store::ClusterMemberSnapshot::from_article(a))
                .collect();
            candidates.push(ClusterCandidate {
                cluster_id: Some(cluster.id),
                centroid,
                member_ids: members.iter().map(|a| a.id).collect(),
                members: member_snapshots,
                latest_time,
                created_at: cluster.created_at,
            });
        }
        Ok(candidates)
    }

    async fn load_cluster_articles(&self, cluster_id: Uuid) -> Result<Vec<Article>, StoreError> {
        let state = self.inner.lock().expect("store mutex poisoned");
        Ok(state
            .articles
            .values()
            .filter(|a| a.cluster_id == Some(cluster_id))
            .cloned()
            .collect())
    }

    async fn list_clusters(&self, limit: i64) -> Result<Vec<Cluster>, StoreError> {
        let state = self.inner.lock().expect("store mutex poisoned");
        let mut clusters: Vec<Cluster> = state.clusters.values().cloned().collect();
        clusters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        clusters.truncate(limit.max(0) as usize);
        Ok(clusters)
    }

    async fn commit_clusters(&self, clusters: &[(Cluster, Vec<Uuid>)]) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        for (cluster, article_ids) in clusters {
            state.clusters.insert(cluster.id, cluster.clone());
            for article_id in article_ids {
                if let Some(article) = state.articles.get_mut(article_id) {
                    article.cluster_id = Some(cluster.id);
                }
            }
        }
        Ok(())
    }

    async fn split_cluster(
        &self,
        old_cluster_id: Uuid,
        new_clusters: &[(Cluster, Vec<Uuid>)],
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        if !state.clusters.contains_key(&old_cluster_id) {
            return Ok(false);
        }
        state.clusters.remove(&old_cluster_id);
        for (cluster, article_ids) in new_clusters {
            state.clusters.insert(cluster.id, cluster.clone());
            for article_id in article_ids {
                if let Some(article) = state.articles.get_mut(article_id) {
                    article.cluster_id = Some(cluster.id);
                }
            }
        }
        Ok(true)
    }

    async fn upsert_articles(&self, articles: &[Article]) -> Result<(), StoreError> {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        for incoming in articles {
            match state.articles.get_mut(&incoming.id) {
                Some(existing) => {
                    existing.headline = incoming.headline.clone();
                    existing.summary = incoming.summary.clone();
                    existing.fetched_at = incoming.fetched_at;
                    if incoming.image_url.is_some() {
                        existing.image_url = incoming.image_url.clone();
                    }
                }
                None => {
                    state.articles.insert(incoming.id, incoming.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(headline: &str, hours_ago: i64) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: headline.into(),
            summary: "summary".into(),
            url: "https://example.com/a".into(),
            image_url: None,
            pub_date: Utc::now() - Duration::hours(hours_ago),
            fetched_at: Utc::now() - Duration::hours(hours_ago),
            cluster_id: None,
            embedding: None,
            entities: None,
        }
    }

    #[tokio::test]
    async fn select_unclustered_excludes_old_and_clustered() {
        let store = InMemoryStore::new();
        let fresh = article("fresh", 1);
        let stale = article("stale", 200);
        let mut clustered = article("clustered", 1);
        clustered.cluster_id = Some(Uuid::new_v4());
        store.seed_article(fresh.clone());
        store.seed_article(stale);
        store.seed_article(clustered);

        let result = store.select_unclustered(72, 50).await.expect("query ok");

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, fresh.id);
    }

    #[tokio::test]
    async fn upsert_preserves_image_url_when_incoming_is_none() {
        let store = InMemoryStore::new();
        let mut original = article("headline", 1);
        original.image_url = Some("https://example.com/img.jpg".into());
        store.seed_article(original.clone());

        let mut update = original.clone();
        update.headline = "updated headline".into();
        update.image_url = None;
        store.upsert_articles(&[update]).await.expect("upsert ok");

        let reloaded = store
            .select_unclustered(72, 50)
            .await
            .expect("query ok")
            .into_iter()
            .next()
            .expect("article present");
        assert_eq!(reloaded.headline, "updated headline");
        assert_eq!(
            reloaded.image_url.as_deref(),
            Some("https://example.com/img.jpg")
        );
    }

    #[tokio::test]
    async fn split_cluster_is_noop_when_old_cluster_already_gone() {
        let store = InMemoryStore::new();
        let replacement = Cluster {
            id: Uuid::new_v4(),
            headline: "h".into(),
            summary: "s".into(),
            category: "Politics".into(),
            main_image_url: None,
            created_at: Utc::now(),
            stats: ClusterStats {
                total_sources: 1,
                bias_distribution: BiasDistribution { left: 1, center: 0, right: 0 },
                left_pct: 100.0,
                right_pct: 0.0,
                center_pct: 0.0,
                blindspot: Blindspot::None,
            },
        };

        let applied = store
            .split_cluster(Uuid::new_v4(), &[(replacement, vec![])])
            .await
            .expect("split call ok");

        assert!(!applied);
    }

    #[test]
    fn decode_embedding_checked_rejects_wrong_dimension() {
        let short = encode_embedding(&[1.0, 2.0, 3.0]);
        assert!(decode_embedding_checked(&short).is_none());

        let full = encode_embedding(&vec![0.0_f32; crate::pipeline::embedding::EMBEDDING_DIM]);
        assert!(decode_embedding_checked(&full).is_some());
    }
}
