use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Editorial bias rating of a source, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BiasRating {
    FarLeft,
    Left,
    CenterLeft,
    Center,
    CenterRight,
    Right,
    FarRight,
}

impl BiasRating {
    /// True for any rating whose name contains "Left" (checked before "Right";
    /// see the §9 note on the Center-Left/Center-Right asymmetry).
    #[must_use]
    pub fn is_left_leaning(self) -> bool {
        matches!(self, Self::FarLeft | Self::Left | Self::CenterLeft)
    }

    #[must_use]
    pub fn is_right_leaning(self) -> bool {
        matches!(self, Self::FarRight | Self::Right | Self::CenterRight)
    }
}

/// Source factual-reporting grade, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Factuality {
    VeryHigh,
    High,
    Mixed,
    Low,
}

/// A single ingested news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub source_id: String,
    pub source_name: String,
    pub bias_rating: BiasRating,
    pub factuality: Factuality,
    pub headline: String,
    pub summary: String,
    pub url: String,
    pub image_url: Option<String>,
    pub pub_date: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub cluster_id: Option<Uuid>,
    pub embedding: Option<Vec<f32>>,
    pub entities: Option<HashSet<String>>,
}

/// Left/center/right composition of a cluster's member articles, per §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasDistribution {
    pub left: u32,
    pub center: u32,
    pub right: u32,
}

/// Which side of the spectrum, if any, a cluster is under-covered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Blindspot {
    Left,
    Right,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub total_sources: u32,
    pub bias_distribution: BiasDistribution,
    pub left_pct: f64,
    pub right_pct: f64,
    pub center_pct: f64,
    pub blindspot: Blindspot,
}

/// A set of articles the Labeler and StatsComputer have agreed describe the
/// same story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub headline: String,
    pub summary: String,
    pub category: String,
    pub main_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stats: ClusterStats,
}

/// Case/whitespace-normalized headline used for the clusterer's duplicate
/// check (§4.5 step 1b: "case-insensitive, trimmed").
#[must_use]
pub fn normalize_headline(headline: &str) -> String {
    headline.trim().to_lowercase()
}

/// Just enough of a member article for the clusterer's per-member duplicate
/// check: its embedding (for the cosine comparison) and normalized headline
/// (for the exact-match comparison).
#[derive(Debug, Clone)]
pub struct ClusterMemberSnapshot {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub normalized_headline: String,
}

impl ClusterMemberSnapshot {
    #[must_use]
    pub fn from_article(article: &Article) -> Option<Self> {
        Some(Self {
            id: article.id,
            embedding: article.embedding.clone()?,
            normalized_headline: normalize_headline(&article.headline),
        })
    }
}

/// Centroid and membership kept in memory by the clusterer and refiner while
/// a pipeline run is in flight; not itself persisted (§4.5, §4.9).
#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub cluster_id: Option<Uuid>,
    pub centroid: Vec<f32>,
    pub member_ids: Vec<Uuid>,
    pub members: Vec<ClusterMemberSnapshot>,
    /// Most recent member `pub_date`, compared against each incoming
    /// article's own time for the §4.5 time-window check. Distinct from
    /// `created_at`, which never changes after the cluster is seeded.
    pub latest_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ClusterCandidate {
    /// Seeds a brand-new candidate from the article that didn't match any
    /// existing cluster. `created_at` is the pipeline's processing time,
    /// not the article's `pub_date`.
    #[must_use]
    pub fn new(seed: &Article, created_at: DateTime<Utc>) -> Self {
        let embedding = seed.embedding.clone().unwrap_or_default();
        let snapshot = ClusterMemberSnapshot {
            id: seed.id,
            embedding: embedding.clone(),
            normalized_headline: normalize_headline(&seed.headline),
        };
        Self {
            cluster_id: None,
            centroid: embedding,
            member_ids: vec![seed.id],
            members: vec![snapshot],
            latest_time: seed.pub_date,
            created_at,
        }
    }
}
