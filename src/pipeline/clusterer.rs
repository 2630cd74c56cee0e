//! Online clustering (§4.5): a single forward pass over articles in ascending
//! `pub_date` order, matching each one against clusters created within the
//! last 48 hours. This is a bespoke single-pass algorithm, not the
//! lineage's batch `util::kmeans::KMeans` — that module only supplied a
//! structural reminder of how centroid math is laid out in Rust, nothing
//! else carries over.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::pipeline::embedding::similarity;
use crate::store::{Article, ClusterCandidate, ClusterMemberSnapshot, normalize_headline};
use crate::util::cosine::weighted_combine;

pub const TIME_WINDOW_HOURS: i64 = 48;
pub const CLUSTERING_THRESHOLD: f32 = 0.55;
pub const DUPLICATE_THRESHOLD: f32 = 0.90;
const CENTROID_OLD_WEIGHT: f32 = 0.8;
const CENTROID_NEW_WEIGHT: f32 = 0.2;

/// Outcome of folding one article into the working set of candidates.
pub enum Assignment {
    /// The article is a near-duplicate of an existing cluster; the
    /// centroid is left unchanged and the article is simply added as a
    /// member of that cluster.
    Duplicate { candidate_index: usize },
    /// The article joined an existing cluster and updated its centroid.
    Joined { candidate_index: usize },
    /// The article seeded a brand-new cluster candidate.
    Seeded { candidate_index: usize },
}

pub struct Clusterer;

impl Clusterer {
    /// Folds `articles` (already enriched, already sorted ascending by
    /// `pub_date`) into `candidates`, mutating `candidates` in place and
    /// returning the per-article assignment decisions in the same order.
    ///
    /// `now` is the pipeline's processing time, stamped onto any
    /// brand-new candidate's `created_at`; it plays no part in the §4.5
    /// time-window check, which compares each article's own `pub_date`
    /// against the *candidate's* `latest_time`.
    pub fn cluster(
        candidates: &mut Vec<ClusterCandidate>,
        articles: &[Article],
        now: DateTime<Utc>,
    ) -> Vec<Assignment> {
        let mut assignments = Vec::with_capacity(articles.len());
        let window = ChronoDuration::hours(TIME_WINDOW_HOURS);

        for article in articles {
            let Some(embedding) = article.embedding.as_ref() else {
                continue;
            };
            let normalized_headline = normalize_headline(&article.headline);

            // Step 1: scan clusters in insertion order. The first one
            // within the time window whose headline or per-member
            // embedding looks like a duplicate wins outright; no further
            // clusters are considered and the centroid is left untouched.
            let mut duplicate_index = None;
            let mut best: Option<(usize, f32)> = None;
            for (index, candidate) in candidates.iter().enumerate() {
                if !within_window(article.pub_date, candidate.latest_time, window) {
                    continue;
                }
                let is_duplicate = candidate.members.iter().any(|member| {
                    member.normalized_headline == normalized_headline
                        || similarity(embedding, &member.embedding) >= DUPLICATE_THRESHOLD
                });
                if is_duplicate {
                    duplicate_index = Some(index);
                    break;
                }

                let sim = similarity(embedding, &candidate.centroid);
                let is_better = match best {
                    None => true,
                    Some((best_index, best_sim)) => {
                        match sim.partial_cmp(&best_sim).unwrap_or(std::cmp::Ordering::Equal) {
                            std::cmp::Ordering::Greater => true,
                            std::cmp::Ordering::Equal => {
                                candidate.created_at < candidates[best_index].created_at
                            }
                            std::cmp::Ordering::Less => false,
                        }
                    }
                };
                if is_better {
                    best = Some((index, sim));
                }
            }

            if let Some(index) = duplicate_index {
                push_member(&mut candidates[index], article, embedding, normalized_headline);
                assignments.push(Assignment::Duplicate { candidate_index: index });
                continue;
            }

            match best {
                Some((index, sim)) if sim >= CLUSTERING_THRESHOLD => {
                    let updated = weighted_combine(
                        &candidates[index].centroid,
                        CENTROID_OLD_WEIGHT,
                        embedding,
                        CENTROID_NEW_WEIGHT,
                    );
                    candidates[index].centroid = updated;
                    push_member(&mut candidates[index], article, embedding, normalized_headline);
                    assignments.push(Assignment::Joined { candidate_index: index });
                }
                _ => {
                    candidates.push(ClusterCandidate::new(article, now));
                    assignments.push(Assignment::Seeded { candidate_index: candidates.len() - 1 });
                }
            }
        }

        assignments
    }
}

/// True when `t` falls within `window` of `latest_time` in either
/// direction, per §4.5's `|t − C.latestTime| > TIME_WINDOW` check.
fn within_window(t: DateTime<Utc>, latest_time: DateTime<Utc>, window: ChronoDuration) -> bool {
    let diff = t - latest_time;
    diff <= window && diff >= -window
}

fn push_member(
    candidate: &mut ClusterCandidate,
    article: &Article,
    embedding: &[f32],
    normalized_headline: String,
) {
    candidate.member_ids.push(article.id);
    candidate.members.push(ClusterMemberSnapshot {
        id: article.id,
        embedding: embedding.to_vec(),
        normalized_headline,
    });
    if article.pub_date > candidate.latest_time {
        candidate.latest_time = article.pub_date;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BiasRating, Factuality};
    use chrono::Duration;
    use uuid::Uuid;

    fn article_with_embedding(pub_date: DateTime<Utc>, embedding: Vec<f32>) -> Article {
        article_with_headline(pub_date, embedding, "headline")
    }

    fn article_with_headline(pub_date: DateTime<Utc>, embedding: Vec<f32>, headline: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: headline.into(),
            summary: "summary".into(),
            url: "https://example.com".into(),
            image_url: None,
            pub_date,
            fetched_at: pub_date,
            cluster_id: None,
            embedding: Some(embedding),
            entities: None,
        }
    }

    fn unit(x: f32, y: f32) -> Vec<f32> {
        let mut v = vec![x, y];
        crate::util::cosine::normalize(&mut v);
        v
    }

    #[test]
    fn cold_start_creates_single_cluster_for_similar_pair() {
        let now = Utc::now();
        let mut candidates = Vec::new();
        let a1 = article_with_headline(now - Duration::hours(2), unit(1.0, 0.0), "first headline");
        let a2 = article_with_headline(now - Duration::hours(1), unit(0.78, 0.63), "second headline");

        let assignments = Clusterer::cluster(&mut candidates, &[a1, a2], now);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].member_ids.len(), 2);
        assert!(matches!(assignments[0], Assignment::Seeded { .. }));
        assert!(matches!(assignments[1], Assignment::Joined { .. }));
    }

    #[test]
    fn time_window_boundary_splits_into_separate_clusters() {
        let now = Utc::now();
        let mut candidates = Vec::new();
        let a1 = article_with_embedding(now - Duration::hours(49), unit(1.0, 0.0));
        let a2 = article_with_embedding(now, unit(1.0, 0.0));

        Clusterer::cluster(&mut candidates, &[a1], now - Duration::hours(49));
        let assignments = Clusterer::cluster(&mut candidates, &[a2], now);

        assert_eq!(candidates.len(), 2);
        assert!(matches!(assignments[0], Assignment::Seeded { .. }));
    }

    #[test]
    fn duplicate_suppression_leaves_centroid_unchanged() {
        let now = Utc::now();
        let mut candidates = Vec::new();
        let a1 = article_with_embedding(now - Duration::hours(2), unit(1.0, 0.0));
        let original_centroid = unit(1.0, 0.0);
        let a2 = article_with_embedding(now - Duration::hours(1), original_centroid.clone());

        Clusterer::cluster(&mut candidates, &[a1], now);
        let centroid_before = candidates[0].centroid.clone();
        let assignments = Clusterer::cluster(&mut candidates, &[a2], now);

        assert!(matches!(assignments[0], Assignment::Duplicate { .. }));
        assert_eq!(candidates[0].centroid, centroid_before);
        assert_eq!(candidates[0].member_ids.len(), 2);
    }
}
