// Fuse backend results into one ranked candidate list.
//
// Order of operations per pass:
//   1. query every backend concurrently, each under its own timeout
//   2. normalize tagged matches into UrlCandidate
//   3. dedup by normalized URL (lens first, then stronger method, then score)
//   4. exact tier kept whole; partial and related tiers adaptively thresholded,
//      related pages capped at top-N after thresholding
//   5. shape to the target count, never dropping an exact match
//   6. order by method rank, pages before bare image files, then score

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, warn};

use bookleak_common::{Confidence, SearchMethod, SearchSource, UrlCandidate};

use super::threshold::{adaptive_filter, sort_by_score, tier_confidence, SearchTuning};
use super::{BackendError, BackendMatch, SearchBackend, SearchImage};

/// How one backend's query went.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOutcome {
    Matched(usize),
    NoMatches,
    NotConfigured(String),
    Failed(BackendError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendReport {
    pub backend: &'static str,
    pub outcome: BackendOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchReport {
    pub candidates: Vec<UrlCandidate>,
    pub backends: Vec<BackendReport>,
}

impl SearchReport {
    /// True when no backend was able to run at all.
    pub fn provider_not_configured(&self) -> bool {
        self.backends
            .iter()
            .all(|b| matches!(b.outcome, BackendOutcome::NotConfigured(_)))
    }

    /// True when every configured backend failed outright.
    pub fn all_failed(&self) -> bool {
        let mut configured = self
            .backends
            .iter()
            .filter(|b| !matches!(b.outcome, BackendOutcome::NotConfigured(_)))
            .peekable();
        configured.peek().is_some()
            && configured.all(|b| matches!(b.outcome, BackendOutcome::Failed(_)))
    }
}

pub struct Aggregator {
    backends: Vec<Arc<dyn SearchBackend>>,
    tuning: SearchTuning,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(backends: Vec<Arc<dyn SearchBackend>>, tuning: SearchTuning, timeout: Duration) -> Self {
        Self {
            backends,
            tuning,
            timeout,
        }
    }

    pub fn tuning(&self) -> &SearchTuning {
        &self.tuning
    }

    pub async fn search(&self, image: &SearchImage) -> SearchReport {
        let queries = self.backends.iter().map(|backend| {
            let backend = Arc::clone(backend);
            async move {
                let result = match tokio::time::timeout(self.timeout, backend.query(image)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Transient(format!(
                        "timed out after {}s",
                        self.timeout.as_secs()
                    ))),
                };
                (backend.name(), backend.source(), result)
            }
        });
        let results = join_all(queries).await;

        let mut reports = Vec::with_capacity(results.len());
        let mut raw = Vec::new();
        for (name, source, result) in results {
            let outcome = match result {
                Ok(matches) => {
                    info!(image_id = %image.image_id, backend = name, count = matches.len(), "Backend returned matches");
                    let outcome = BackendOutcome::Matched(matches.len());
                    raw.extend(matches.into_iter().map(|m| (source, m)));
                    outcome
                }
                Err(BackendError::NoMatches) => {
                    info!(image_id = %image.image_id, backend = name, "Backend found no matches");
                    BackendOutcome::NoMatches
                }
                Err(BackendError::NotConfigured(why)) => {
                    info!(image_id = %image.image_id, backend = name, reason = %why, "Backend not configured");
                    BackendOutcome::NotConfigured(why)
                }
                Err(e @ BackendError::Permanent(_)) => {
                    error!(image_id = %image.image_id, backend = name, error = %e, "Backend failed");
                    BackendOutcome::Failed(e)
                }
                Err(e) => {
                    warn!(image_id = %image.image_id, backend = name, error = %e, "Backend failed");
                    BackendOutcome::Failed(e)
                }
            };
            reports.push(BackendReport {
                backend: name,
                outcome,
            });
        }

        let candidates = self.rank(raw);
        info!(image_id = %image.image_id, count = candidates.len(), "Search complete");
        SearchReport {
            candidates,
            backends: reports,
        }
    }

    /// Steps 2 to 6 on already-collected matches.
    pub fn rank(&self, matches: Vec<(SearchSource, BackendMatch)>) -> Vec<UrlCandidate> {
        // URLs only ever reported as image files. A URL that also shows up
        // as a page is a page.
        let mut image_files = HashSet::new();
        let mut pages = HashSet::new();
        for (_, m) in &matches {
            let key = dedup_key(m.url());
            if m.is_image_file() {
                image_files.insert(key);
            } else {
                pages.insert(key);
            }
        }
        image_files.retain(|key| !pages.contains(key));

        let candidates: Vec<UrlCandidate> = matches
            .into_iter()
            .filter_map(|(source, m)| self.normalize(source, m))
            .collect();
        let candidates = dedup(candidates);

        let mut exact = Vec::new();
        let mut partial = Vec::new();
        let mut related = Vec::new();
        for c in candidates {
            match c.search_method {
                SearchMethod::Exact | SearchMethod::LensExact => exact.push(c),
                SearchMethod::Partial => partial.push(c),
                SearchMethod::RelatedPage => related.push(c),
            }
        }

        let partial = adaptive_filter(partial, self.tuning.partial_cutoff);
        let mut related = adaptive_filter(related, self.tuning.related_cutoff);
        related.truncate(self.tuning.related_top_n);

        let mut rest: Vec<UrlCandidate> = partial.into_iter().chain(related).collect();
        if exact.len() + rest.len() > self.tuning.target_count {
            sort_by_score(&mut rest);
            rest.truncate(self.tuning.target_count.saturating_sub(exact.len()));
        }

        let is_image_file = |c: &UrlCandidate| image_files.contains(&dedup_key(&c.url));
        let mut ranked: Vec<UrlCandidate> = exact.into_iter().chain(rest).collect();
        ranked.sort_by(|a, b| {
            a.search_method
                .rank()
                .cmp(&b.search_method.rank())
                .then(is_image_file(a).cmp(&is_image_file(b)))
                .then(b.score.total_cmp(&a.score))
        });
        ranked
    }

    fn normalize(&self, source: SearchSource, m: BackendMatch) -> Option<UrlCandidate> {
        let url = m.url().trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return None;
        }
        let search_method = m.search_method();
        let score = m.score();
        let confidence = match search_method {
            SearchMethod::Exact | SearchMethod::LensExact => Confidence::High,
            SearchMethod::Partial => tier_confidence(score, self.tuning.partial_cutoff),
            SearchMethod::RelatedPage => tier_confidence(score, self.tuning.related_cutoff),
        };
        Some(UrlCandidate {
            title: m.title().map(str::to_string),
            url,
            search_method,
            source,
            score,
            confidence,
        })
    }
}

/// Keep one candidate per normalized URL. Lens results win over the
/// similarity backend; within a source the stronger method, then the higher
/// score wins.
pub fn dedup(mut candidates: Vec<UrlCandidate>) -> Vec<UrlCandidate> {
    candidates.sort_by(|a, b| {
        source_priority(a.source)
            .cmp(&source_priority(b.source))
            .then(a.search_method.rank().cmp(&b.search_method.rank()))
            .then(b.score.total_cmp(&a.score))
    });
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(dedup_key(&c.url)));
    candidates
}

fn source_priority(source: SearchSource) -> u8 {
    match source {
        SearchSource::Lens => 0,
        SearchSource::Vision => 1,
    }
}

/// Scheme, host and path; no query, no fragment, no trailing slash.
pub fn dedup_key(raw: &str) -> String {
    match url::Url::parse(raw.trim()) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
            let path = parsed.path().trim_end_matches('/');
            format!("{}://{}{}", parsed.scheme(), host, path)
        }
        Err(_) => raw.trim().trim_end_matches('/').to_lowercase(),
    }
}
