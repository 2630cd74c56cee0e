//! Article enrichment (§4.4): for each unclustered article, produce an
//! embedding and an entity set, fusing them into a single vector used by
//! the clusterer.

use std::sync::Arc;

use tracing::warn;

use crate::observability::metrics::Metrics;
use crate::pipeline::embedding::Embedder;
use crate::pipeline::entities::EntityExtractor;
use crate::store::Article;
use crate::util::cosine::weighted_combine;

const TEXT_WEIGHT: f32 = 0.7;
const ENTITY_WEIGHT: f32 = 0.3;

pub struct Enricher {
    embedder: Arc<dyn Embedder>,
    entity_extractor: Arc<dyn EntityExtractor>,
    metrics: Arc<Metrics>,
}

impl Enricher {
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        entity_extractor: Arc<dyn EntityExtractor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { embedder, entity_extractor, metrics }
    }

    /// Enriches `articles` sequentially (§5: enrichment runs with no
    /// internal parallelism). Articles whose embedding call fails are
    /// dropped from the returned list and left unmodified in the store.
    pub async fn enrich(&self, articles: Vec<Article>) -> Vec<Article> {
        let mut enriched = Vec::with_capacity(articles.len());
        for article in articles {
            match self.enrich_one(article).await {
                Some(article) => {
                    self.metrics.articles_enriched_total.inc();
                    enriched.push(article);
                }
                None => self.metrics.articles_skipped_total.inc(),
            }
        }
        enriched
    }

    async fn enrich_one(&self, mut article: Article) -> Option<Article> {
        let text = format!("{}. {}", article.headline, article.summary);
        let embedder = Arc::clone(&self.embedder);
        let text_for_embedding = text.clone();
        let text_embedding = tokio::task::spawn_blocking(move || embedder.embed(&text_for_embedding))
            .await
            .ok()?;
        let v_text = match text_embedding {
            Ok(vector) => vector,
            Err(error) => {
                warn!(article_id = %article.id, error = %error, "skipping article: embedding failed");
                return None;
            }
        };

        let entities = if self.entity_extractor.is_disabled() {
            Vec::new()
        } else {
            let extractor = Arc::clone(&self.entity_extractor);
            let text_for_entities = text;
            tokio::task::spawn_blocking(move || extractor.extract(&text_for_entities))
                .await
                .unwrap_or_default()
        };

        let fused = if !entities.is_empty() {
            let entity_text = entities.join(" ");
            let embedder = Arc::clone(&self.embedder);
            let v_ent = tokio::task::spawn_blocking(move || embedder.embed(&entity_text))
                .await
                .ok()
                .and_then(Result::ok);
            match v_ent {
                Some(v_ent) => weighted_combine(&v_text, TEXT_WEIGHT, &v_ent, ENTITY_WEIGHT),
                None => v_text,
            }
        } else {
            v_text
        };

        article.embedding = Some(fused);
        article.entities = if entities.is_empty() {
            None
        } else {
            Some(entities.into_iter().collect())
        };
        Some(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::Metrics;
    use crate::pipeline::embedding::test_support::FakeEmbedder;
    use crate::pipeline::entities::NullEntityExtractor;
    use crate::store::{BiasRating, Factuality};
    use chrono::Utc;
    use prometheus::Registry;
    use uuid::Uuid;

    fn article(headline: &str) -> Article {
        Article {
            id: Uuid::new_v4(),
            source_id: "src".into(),
            source_name: "Source".into(),
            bias_rating: BiasRating::Center,
            factuality: Factuality::High,
            headline: headline.into(),
            summary: "summary text".into(),
            url: "https://example.com".into(),
            image_url: None,
            pub_date: Utc::now(),
            fetched_at: Utc::now(),
            cluster_id: None,
            embedding: None,
            entities: None,
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(Arc::new(Registry::new())).expect("metrics build"))
    }

    #[tokio::test]
    async fn enrich_attaches_embedding_without_entities_when_extractor_disabled() {
        let enricher = Enricher::new(
            Arc::new(FakeEmbedder::default()),
            Arc::new(NullEntityExtractor),
            metrics(),
        );

        let result = enricher.enrich(vec![article("headline one")]).await;

        assert_eq!(result.len(), 1);
        assert!(result[0].embedding.is_some());
        assert!(result[0].entities.is_none());
    }

    #[tokio::test]
    async fn enrich_drops_article_when_embedding_fails() {
        let embedder = Arc::new(FakeEmbedder::default());
        let failing = article("bad headline text");
        embedder.fail_on(&format!("{}. {}", failing.headline, failing.summary));
        let enricher = Enricher::new(embedder, Arc::new(NullEntityExtractor), metrics());

        let result = enricher.enrich(vec![failing]).await;

        assert!(result.is_empty());
    }
}
