//! Pipeline orchestration (§4.8): the seven-step run that ties the Store,
//! Enricher, Clusterer, Labeler, StatsComputer, and CoherenceRefiner
//! together. A `tokio::sync::Mutex` enforces the single-logical-worker
//! model from §5 — only one run executes per process at a time, mirroring
//! the lineage's `PipelineOrchestrator` (itself built from a `Stage` trait
//! per phase, assembled by `PipelineBuilder` and driven by a
//! `StageExecutor`), though here the seven steps are fixed by the
//! specification rather than pluggable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::observability::metrics::Metrics;
use crate::pipeline::clusterer::{Assignment, Clusterer};
use crate::pipeline::enricher::Enricher;
use crate::pipeline::labeler::Labeler;
use crate::pipeline::refiner::CoherenceRefiner;
use crate::pipeline::stats::StatsComputer;
use crate::store::{Article, Cluster, ClusterCandidate, Store, StoreError};

const MIN_ARTICLES_TO_RUN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Fewer than two unclustered articles were available; the run went
    /// straight to the coherence refiner.
    SkippedInsufficientArticles,
    Completed,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub articles_considered: usize,
    pub articles_enriched: usize,
    pub clusters_touched: usize,
    pub clusters_split: usize,
}

pub struct PipelineCoordinator {
    store: Arc<dyn Store>,
    enricher: Arc<Enricher>,
    labeler: Arc<Labeler>,
    refiner: Arc<CoherenceRefiner>,
    metrics: Arc<Metrics>,
    max_age_hours: i64,
    batch_limit: i64,
    run_lock: Mutex<()>,
}

impl PipelineCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        enricher: Arc<Enricher>,
        labeler: Arc<Labeler>,
        refiner: Arc<CoherenceRefiner>,
        metrics: Arc<Metrics>,
        max_age_hours: i64,
        batch_limit: i64,
    ) -> Self {
        Self {
            store,
            enricher,
            labeler,
            refiner,
            metrics,
            max_age_hours,
            batch_limit,
            run_lock: Mutex::new(()),
        }
    }

    /// Runs one full pipeline pass. Blocks if another run is already in
    /// flight rather than running concurrently with it.
    pub async fn run(&self) -> Result<RunReport, StoreError> {
        let _guard = self.run_lock.lock().await;
        self.metrics.pipeline_runs_total.inc();

        // Step 1: select unclustered articles.
        let candidates = self
            .store
            .select_unclustered(self.max_age_hours, self.batch_limit)
            .await?;
        let articles_considered = candidates.len();

        // Step 2: fewer than two articles isn't enough to form a cluster;
        // skip straight to the refiner.
        if articles_considered < MIN_ARTICLES_TO_RUN {
            self.metrics.pipeline_runs_skipped_total.inc();
            self.run_refiner_best_effort().await;
            return Ok(RunReport {
                outcome: RunOutcome::SkippedInsufficientArticles,
                articles_considered,
                articles_enriched: 0,
                clusters_touched: 0,
                clusters_split: 0,
            });
        }

        // Step 3: enrich (embed + extract entities). A store error here
        // aborts the run before anything is persisted.
        let enriched = self.enricher.enrich(candidates).await;

        // Step 4: persist enrichment results transactionally.
        if let Err(error) = self.store.persist_enrichment(&enriched).await {
            self.metrics.pipeline_run_failures_total.inc();
            warn!(error = %error, "aborting run: failed to persist enrichment");
            return Err(error);
        }

        // Step 5: online-cluster the enriched articles against recent
        // cluster candidates.
        let mut candidates = self.store.load_recent_clusters(self.max_age_hours).await?;
        let mut sorted = enriched.clone();
        sorted.sort_by_key(|a| a.pub_date);
        let assignments = Clusterer::cluster(&mut candidates, &sorted, Utc::now());

        // Step 6: label and compute stats, but only for candidates this
        // run's articles actually touched (seeded, joined, or duplicated
        // into) — an untouched cluster's label and stats haven't changed.
        let fresh: HashMap<Uuid, Article> = sorted.into_iter().map(|a| (a.id, a)).collect();
        let touched_indices: HashSet<usize> = assignments
            .iter()
            .map(|assignment| match assignment {
                Assignment::Duplicate { candidate_index }
                | Assignment::Joined { candidate_index }
                | Assignment::Seeded { candidate_index } => *candidate_index,
            })
            .collect();

        let mut touched_candidates = Vec::with_capacity(touched_indices.len());
        let mut touched_members = Vec::with_capacity(touched_indices.len());
        for index in touched_indices {
            let candidate = candidates[index].clone();
            let members = self.resolve_members(&candidate, &fresh).await?;
            touched_candidates.push(candidate);
            touched_members.push(members);
        }

        let labels = self.labeler.label_many(touched_members.clone()).await;
        let mut commits = Vec::with_capacity(touched_candidates.len());
        for ((candidate, members), label) in
            touched_candidates.iter().zip(touched_members.iter()).zip(labels.iter())
        {
            let cluster_id = candidate.cluster_id.unwrap_or_else(Uuid::new_v4);
            let stats = StatsComputer::compute(members);
            let cluster = Cluster {
                id: cluster_id,
                headline: label.headline.clone(),
                summary: label.summary.clone(),
                category: label.category.clone(),
                main_image_url: StatsComputer::main_image_url(members),
                created_at: candidate.created_at,
                stats,
            };
            let member_ids = members.iter().map(|a| a.id).collect();
            commits.push((cluster, member_ids));
        }
        let clusters_touched = commits.len();

        // Step 7: commit clusters transactionally. A failure here aborts
        // without touching the refiner.
        if let Err(error) = self.store.commit_clusters(&commits).await {
            self.metrics.pipeline_run_failures_total.inc();
            warn!(error = %error, "aborting run: failed to commit clusters");
            return Err(error);
        }
        for (cluster, _) in &commits {
            self.metrics.clusters_created_total.inc();
            info!(cluster_id = %cluster.id, "cluster committed");
        }

        let clusters_split = self.run_refiner_best_effort().await;

        Ok(RunReport {
            outcome: RunOutcome::Completed,
            articles_considered,
            articles_enriched: enriched.len(),
            clusters_touched,
            clusters_split,
        })
    }

    async fn run_refiner_best_effort(&self) -> usize {
        match self.refiner.refine_all().await {
            Ok(splits) => splits,
            Err(error) => {
                warn!(error = %error, "coherence refiner pass failed");
                0
            }
        }
    }

    /// Resolves every member of `candidate` to a full `Article`: this run's
    /// freshly enriched articles come from `fresh`, while members carried
    /// over from a pre-existing cluster are re-read from the store (they
    /// aren't present in this run's enriched batch at all).
    async fn resolve_members(
        &self,
        candidate: &ClusterCandidate,
        fresh: &HashMap<Uuid, Article>,
    ) -> Result<Vec<Article>, StoreError> {
        let mut persisted = HashMap::new();
        if let Some(cluster_id) = candidate.cluster_id {
            for article in self.store.load_cluster_articles(cluster_id).await? {
                persisted.insert(article.id, article);
            }
        }

        Ok(candidate
            .member_ids
            .iter()
            .filter_map(|id| fresh.get(id).or_else(|| persisted.get(id)).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LabelerClient;
    use crate::pipeline::embedding::test_support::FakeEmbedder;
    use crate::pipeline::entities::NullEntityExtractor;
    use crate::store::{BiasRating, Factuality, InMemoryStore};
    use prometheus::Registry;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn article(id: Uuid, headline: &str, summary: &str, pub_date: chrono::DateTime<Utc>) -> Article {
        Article {
            id,
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: headline.into(),
            summary: summary.into(),
            url: format!("https://example.com/{id}"),
            image_url: None,
            pub_date,
            fetched_at: pub_date,
            cluster_id: None,
            embedding: None,
            entities: None,
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(Arc::new(Registry::new())).expect("metrics build"))
    }

    async fn labeler(base_url: String) -> Arc<Labeler> {
        let client = Arc::new(LabelerClient::new(
            base_url,
            None,
            StdDuration::from_secs(5),
            0,
            1,
            1,
        ));
        Arc::new(Labeler::new(client, metrics()))
    }

    /// End-to-end run of the duplicate-suppression scenario from the
    /// literal test scenarios: two articles whose headlines are identical
    /// once case/space-normalized merge into one cluster regardless of
    /// their embeddings, and the run commits one labeled, two-member
    /// cluster.
    #[tokio::test]
    async fn run_clusters_and_commits_two_similar_articles_into_one_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/label"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "headline": "Parliament passes bill X",
                "summary": "Lawmakers approved the bill.",
                "category": "Politics"
            })))
            .mount(&server)
            .await;

        let in_memory = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let a1 = article(
            Uuid::new_v4(),
            "Parliament passes bill X",
            "The bill passed after debate.",
            now - chrono::Duration::hours(2),
        );
        let a2 = article(
            Uuid::new_v4(),
            "  Parliament Passes Bill X  ",
            "A second report on the same vote.",
            now - chrono::Duration::hours(1),
        );
        in_memory.seed_article(a1.clone());
        in_memory.seed_article(a2.clone());
        let store: Arc<dyn Store> = in_memory;

        let metrics = metrics();
        let enricher = Arc::new(Enricher::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(NullEntityExtractor),
            Arc::clone(&metrics),
        ));
        let labeler = labeler(server.uri()).await;
        let refiner = Arc::new(CoherenceRefiner::new(
            Arc::clone(&store),
            Arc::clone(&labeler),
            Arc::clone(&metrics),
        ));
        let coordinator =
            PipelineCoordinator::new(store.clone(), enricher, labeler, refiner, metrics, 72, 50);

        let report = coordinator.run().await.expect("pipeline run succeeds");

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.articles_considered, 2);
        assert_eq!(report.articles_enriched, 2);
        assert_eq!(report.clusters_touched, 1);

        let clusters = store.list_clusters(20).await.expect("list clusters ok");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].headline, "Parliament passes bill X");
        assert_eq!(clusters[0].stats.total_sources, 2);

        let members = store
            .load_cluster_articles(clusters[0].id)
            .await
            .expect("load members ok");
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|m| m.cluster_id == Some(clusters[0].id)));
    }

    /// Fewer than two unclustered articles: the run skips clustering
    /// entirely and reports zero touched clusters, per §4.8 step 1.
    #[tokio::test]
    async fn run_skips_when_fewer_than_two_unclustered_articles() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let metrics = metrics();
        let enricher = Arc::new(Enricher::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(NullEntityExtractor),
            Arc::clone(&metrics),
        ));
        let labeler = labeler("http://127.0.0.1:1".to_string()).await;
        let refiner = Arc::new(CoherenceRefiner::new(
            Arc::clone(&store),
            Arc::clone(&labeler),
            Arc::clone(&metrics),
        ));
        let coordinator =
            PipelineCoordinator::new(store, enricher, labeler, refiner, metrics, 72, 50);

        let report = coordinator.run().await.expect("pipeline run succeeds");

        assert_eq!(report.outcome, RunOutcome::SkippedInsufficientArticles);
        assert_eq!(report.clusters_touched, 0);
    }
}
