// Adaptive score thresholds for the non-exact tiers.
//
// Backends score on scales that drift between images: for some images every
// partial match sits well below any sensible fixed cutoff. When a whole tier
// scores under its cutoff the tier is kept as-is, so a tier that went in
// non-empty always comes out non-empty.

use bookleak_common::{Confidence, UrlCandidate};

/// Tunable search parameters. The defaults are starting points, not contracts.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTuning {
    pub partial_cutoff: f32,
    pub related_cutoff: f32,
    /// Related pages kept after thresholding.
    pub related_top_n: usize,
    /// Soft cap on candidates per image; exact matches may exceed it.
    pub target_count: usize,
    /// Results requested from each backend.
    pub max_backend_results: u32,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            partial_cutoff: 0.5,
            related_cutoff: 0.5,
            related_top_n: 10,
            target_count: 20,
            max_backend_results: 50,
        }
    }
}

/// Keep candidates at or above `cutoff`, unless the tier's best score is
/// itself below it, in which case keep the whole tier. Output is sorted by
/// score, highest first.
pub fn adaptive_filter(mut tier: Vec<UrlCandidate>, cutoff: f32) -> Vec<UrlCandidate> {
    sort_by_score(&mut tier);
    let Some(max) = tier.first().map(|c| c.score) else {
        return tier;
    };
    if max < cutoff {
        return tier;
    }
    tier.retain(|c| c.score >= cutoff);
    tier
}

/// Confidence for a non-exact candidate relative to its tier cutoff.
pub fn tier_confidence(score: f32, cutoff: f32) -> Confidence {
    if score >= cutoff {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

pub(crate) fn sort_by_score(candidates: &mut [UrlCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use bookleak_common::{SearchMethod, SearchSource};

    use super::*;

    fn candidate(url: &str, score: f32) -> UrlCandidate {
        UrlCandidate {
            url: url.into(),
            search_method: SearchMethod::Partial,
            source: SearchSource::Vision,
            score,
            confidence: Confidence::Low,
            title: None,
        }
    }

    #[test]
    fn filters_when_tier_reaches_cutoff() {
        let kept = adaptive_filter(
            vec![candidate("a", 0.2), candidate("b", 0.9), candidate("c", 0.5)],
            0.5,
        );
        let urls: Vec<_> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["b", "c"]);
    }

    #[test]
    fn low_scoring_tier_is_kept_whole() {
        let kept = adaptive_filter(
            vec![candidate("a", 0.1), candidate("b", 0.3), candidate("c", 0.2)],
            0.5,
        );
        let urls: Vec<_> = kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["b", "c", "a"]);
    }

    #[test]
    fn non_empty_in_means_non_empty_out() {
        for cutoff in [0.0, 0.25, 0.5, 0.99, 1.0, 2.0] {
            for scores in [vec![0.0], vec![0.4, 0.6], vec![1.0, 0.0, 0.5]] {
                let tier = scores.iter().map(|s| candidate("u", *s)).collect();
                assert!(!adaptive_filter(tier, cutoff).is_empty());
            }
        }
        assert!(adaptive_filter(Vec::new(), 0.5).is_empty());
    }

    #[test]
    fn confidence_relative_to_cutoff() {
        assert_eq!(tier_confidence(0.7, 0.5), Confidence::Medium);
        assert_eq!(tier_confidence(0.2, 0.5), Confidence::Low);
    }
}
