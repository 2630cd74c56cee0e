//! Coherence refinement (§4.9): periodically re-examines recently created
//! clusters and splits any whose members have drifted apart, running
//! sequentially across clusters so a split for one cluster can never race
//! a split for another.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::pipeline::clusterer::Clusterer;
use crate::pipeline::embedding::similarity;
use crate::pipeline::labeler::Labeler;
use crate::pipeline::stats::StatsComputer;
use crate::store::{Article, Cluster, ClusterCandidate, Store};
use crate::util::cosine::normalize;

const REFINE_WINDOW_HOURS: i64 = 24;
const MIN_MEMBERS_TO_CONSIDER: usize = 4;
const COHERENCE_THRESHOLD: f32 = 0.60;
const MIN_SUBCLUSTERS_TO_SPLIT: usize = 2;

pub struct CoherenceRefiner {
    store: Arc<dyn Store>,
    labeler: Arc<Labeler>,
    metrics: Arc<Metrics>,
}

impl CoherenceRefiner {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, labeler: Arc<Labeler>, metrics: Arc<Metrics>) -> Self {
        Self { store, labeler, metrics }
    }

    /// Walks every cluster created within the last 24 hours, sequentially.
    pub async fn refine_all(&self) -> Result<usize, crate::store::StoreError> {
        let candidates = self.store.load_recent_clusters(REFINE_WINDOW_HOURS).await?;
        let mut splits = 0;
        for candidate in candidates {
            let Some(cluster_id) = candidate.cluster_id else { continue };
            self.metrics.refiner_checks_total.inc();
            if self.refine_one(cluster_id).await? {
                splits += 1;
            }
        }
        Ok(splits)
    }

    async fn refine_one(&self, cluster_id: Uuid) -> Result<bool, crate::store::StoreError> {
        let members = self.store.load_cluster_articles(cluster_id).await?;
        if members.len() < MIN_MEMBERS_TO_CONSIDER {
            return Ok(false);
        }

        let average = average_similarity_to_centroid(&members);
        if average >= COHERENCE_THRESHOLD {
            return Ok(false);
        }

        let mut sorted_members = members.clone();
        sorted_members.sort_by_key(|a| a.pub_date);
        let mut candidates: Vec<ClusterCandidate> = Vec::new();
        Clusterer::cluster(&mut candidates, &sorted_members, Utc::now());

        if candidates.len() < MIN_SUBCLUSTERS_TO_SPLIT {
            return Ok(false);
        }

        let member_by_id: std::collections::HashMap<Uuid, Article> =
            sorted_members.into_iter().map(|a| (a.id, a)).collect();

        let subcluster_members: Vec<Vec<Article>> = candidates
            .iter()
            .map(|candidate| {
                candidate
                    .member_ids
                    .iter()
                    .filter_map(|id| member_by_id.get(id).cloned())
                    .collect()
            })
            .collect();

        let labels = self.labeler.label_many(subcluster_members.clone()).await;

        let mut new_clusters = Vec::with_capacity(candidates.len());
        for (members, label) in subcluster_members.iter().zip(labels.iter()) {
            let stats = StatsComputer::compute(members);
            let cluster = Cluster {
                id: Uuid::new_v4(),
                headline: label.headline.clone(),
                summary: label.summary.clone(),
                category: label.category.clone(),
                main_image_url: StatsComputer::main_image_url(members),
                created_at: Utc::now(),
                stats,
            };
            let member_ids = members.iter().map(|a| a.id).collect();
            new_clusters.push((cluster, member_ids));
        }

        let applied = self.store.split_cluster(cluster_id, &new_clusters).await?;
        if applied {
            self.metrics.clusters_split_total.inc();
            info!(cluster_id = %cluster_id, subclusters = new_clusters.len(), "split incoherent cluster");
        }
        Ok(applied)
    }
}

/// §4.9 steps 1-2: sum the members' embeddings (unnormalized), L2-normalize
/// once to get the centroid, then average each member's similarity to it.
fn average_similarity_to_centroid(members: &[Article]) -> f32 {
    let embeddings: Vec<&Vec<f32>> = members.iter().filter_map(|a| a.embedding.as_ref()).collect();
    if embeddings.is_empty() {
        return 1.0;
    }

    let dim = embeddings[0].len();
    let mut centroid = vec![0.0_f32; dim];
    for embedding in &embeddings {
        for (sum, value) in centroid.iter_mut().zip(embedding.iter()) {
            *sum += value;
        }
    }
    normalize(&mut centroid);

    let total: f32 = embeddings.iter().map(|embedding| similarity(embedding, &centroid)).sum();
    total / embeddings.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LabelerClient;
    use crate::store::{BiasRating, Factuality, InMemoryStore};
    use prometheus::Registry;
    use std::time::Duration;

    fn article(embedding: Vec<f32>) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: "headline".into(),
            summary: "summary".into(),
            url: "https://example.com".into(),
            image_url: None,
            pub_date: Utc::now(),
            fetched_at: Utc::now(),
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
    fn average_similarity_to_centroid_of_canceling_directions_is_low() {
        let members = vec![
            article(unit(1.0, 0.0)),
            article(unit(0.0, 1.0)),
            article(unit(-1.0, 0.0)),
            article(unit(0.0, -1.0)),
        ];
        let average = average_similarity_to_centroid(&members);
        assert!(average < COHERENCE_THRESHOLD);
    }

    #[tokio::test]
    async fn refine_one_is_noop_for_small_clusters() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(Metrics::new(Arc::new(Registry::new())).expect("metrics"));
        let client = Arc::new(LabelerClient::new(
            "http://127.0.0.1:1".into(),
            None,
            Duration::from_millis(10),
            0,
            1,
            1,
        ));
        let labeler = Arc::new(Labeler::new(client, Arc::clone(&metrics)));
        let refiner = CoherenceRefiner::new(store, labeler, metrics);

        let applied = refiner.refine_one(Uuid::new_v4()).await.expect("refine ok");
        assert!(!applied);
    }
}
