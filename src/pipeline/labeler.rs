//! Cluster labeling (§4.6): builds a prompt from a cluster's member
//! headlines and dispatches it to the external generative model, falling
//! back to a heuristic label when the call fails or its response doesn't
//! validate. Clusters are labeled in batches of five in flight at once, a
//! semaphore-gated fan-out mirroring the lineage's
//! `dispatch::clustering` batch dispatcher.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::clients::LabelerClient;
use crate::observability::metrics::Metrics;
use crate::store::Article;

const MAX_CONCURRENT_LABEL_CALLS: usize = 5;
const TOP_TOKEN_COUNT: usize = 10;
const PROMPT_HEADLINE_COUNT: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "this", "that", "these", "those", "it", "he", "she",
    "they", "news", "report", "breaking", "today", "live", "update", "updates", "latest",
];

#[derive(Debug, Clone, PartialEq)]
pub struct LabelResult {
    pub headline: String,
    pub summary: String,
    pub category: String,
}

pub struct Labeler {
    client: Arc<LabelerClient>,
    metrics: Arc<Metrics>,
}

impl Labeler {
    #[must_use]
    pub fn new(client: Arc<LabelerClient>, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }

    /// Labels every cluster in `clusters`, at most five calls in flight at
    /// once, preserving input order in the returned vector.
    pub async fn label_many(&self, clusters: Vec<Vec<Article>>) -> Vec<LabelResult> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_LABEL_CALLS));
        let tasks = clusters.into_iter().map(|members| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.label_cluster(&members).await
            }
        });
        join_all(tasks).await
    }

    pub async fn label_cluster(&self, members: &[Article]) -> LabelResult {
        let headlines: Vec<&str> = members.iter().map(|a| a.headline.as_str()).collect();
        let token_sources: Vec<String> = members
            .iter()
            .map(|a| format!("{} {}", a.headline, a.summary))
            .collect();
        let tokens = top_tokens(&token_sources, TOP_TOKEN_COUNT);
        let prompt = build_prompt(&headlines, &tokens);

        self.metrics.labeler_calls_total.inc();
        let started = Instant::now();
        let response = self.client.label(&prompt).await;
        self.metrics
            .labeler_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        match response {
            Ok(response) => LabelResult {
                headline: response.headline,
                summary: response.summary,
                category: response.category,
            },
            Err(error) => {
                warn!(error = %error, "labeler call failed, falling back to heuristic label");
                self.metrics.labeler_fallbacks_total.inc();
                fallback_label(members)
            }
        }
    }
}

const MIN_TOKEN_LENGTH: usize = 4;

/// Tokenizes `sources` into lowercase words on non-word boundaries, strips
/// stopwords and words of length <= 3, and returns the `n` most frequent
/// remaining tokens, most frequent first; ties break by first occurrence
/// order.
fn top_tokens<S: AsRef<str>>(sources: &[S], n: usize) -> Vec<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for source in sources {
        for raw in source.as_ref().split_whitespace() {
            let token: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.chars().count() <= MIN_TOKEN_LENGTH - 1 || stopwords.contains(token.as_str()) {
                continue;
            }
            match counts.iter_mut().find(|(existing, _)| *existing == token) {
                Some((_, count)) => *count += 1,
                None => counts.push((token, 1)),
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().take(n).map(|(token, _)| token).collect()
}

fn build_prompt(headlines: &[&str], tokens: &[String]) -> String {
    let sample: Vec<&&str> = headlines.iter().take(PROMPT_HEADLINE_COUNT).collect();
    format!(
        "You are labeling a cluster of news articles covering the same story.\n\
         Frequent terms: {}\n\
         Sample headlines:\n{}\n\
         Respond with a JSON object containing \"headline\", \"summary\", and \"category\".",
        tokens.join(", "),
        sample
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{}. {}", i + 1, h))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// §4.6 step 5's fallback: first member's headline and summary verbatim,
/// category always `"General"` (the generative model is the only source of
/// a real category; a missing response doesn't get to guess one).
fn fallback_label(members: &[Article]) -> LabelResult {
    let headline = members
        .first()
        .map(|a| a.headline.clone())
        .unwrap_or_else(|| "Untitled cluster".to_string());
    let summary = members
        .first()
        .map(|a| a.summary.clone())
        .unwrap_or_default();
    LabelResult { headline, summary, category: "General".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_tokens_drops_stopwords_and_short_words_and_ranks_by_frequency() {
        let headlines = vec![
            "Parliament passes the new bill",
            "The new bill faces opposition in Parliament",
        ];
        let tokens = top_tokens(&headlines, 3);
        assert_eq!(tokens[0], "parliament");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"new".to_string()));
    }

    #[test]
    fn build_prompt_includes_only_first_five_headlines() {
        let headlines: Vec<&str> = vec!["h1", "h2", "h3", "h4", "h5", "h6"];
        let prompt = build_prompt(&headlines, &["term".to_string()]);
        assert!(prompt.contains("h5"));
        assert!(!prompt.contains("h6"));
    }

    #[test]
    fn fallback_label_falls_back_to_first_headline_and_general_category() {
        let members = vec![];
        let label = fallback_label(&members);
        assert_eq!(label.headline, "Untitled cluster");
        assert_eq!(label.category, "General");
    }
}
