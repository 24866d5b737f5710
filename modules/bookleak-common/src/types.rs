use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::content_hash;

/// Hard cap on verdict reasons, in characters.
pub const MAX_REASON_CHARS: usize = 300;

// --- Enums ---

/// How a candidate URL was matched to the submitted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Full-image match from the similarity backend.
    Exact,
    /// Crop or composite match.
    Partial,
    /// Page containing a matching image without itself matching.
    RelatedPage,
    /// Exact match from the independent visual-match backend.
    LensExact,
}

impl SearchMethod {
    /// Lower ranks are considered first.
    pub fn rank(self) -> u8 {
        match self {
            SearchMethod::LensExact => 0,
            SearchMethod::Exact => 1,
            SearchMethod::Partial => 2,
            SearchMethod::RelatedPage => 3,
        }
    }

    pub fn is_exact(self) -> bool {
        matches!(self, SearchMethod::Exact | SearchMethod::LensExact)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchMethod::Exact => "exact",
            SearchMethod::Partial => "partial",
            SearchMethod::RelatedPage => "related_page",
            SearchMethod::LensExact => "lens_exact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Vision,
    Lens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    Safe,
    Danger,
    Unknown,
    Error,
}

impl Judgment {
    /// Compact marker used in reports: ○ safe, × danger, ？ unknown, ！ error.
    pub fn symbol(self) -> &'static str {
        match self {
            Judgment::Safe => "○",
            Judgment::Danger => "×",
            Judgment::Unknown => "？",
            Judgment::Error => "！",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Judgment::Safe => "safe",
            Judgment::Danger => "danger",
            Judgment::Unknown => "unknown",
            Judgment::Error => "error",
        }
    }

    /// Whether the verdict is an actual classification rather than a gap.
    pub fn is_conclusive(self) -> bool {
        matches!(self, Judgment::Safe | Judgment::Danger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    TrustedDomain,
    PlatformApi,
    ScrapeAndJudge,
}

/// Where platform content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformSource {
    Api,
    MetaTags,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetadata {
    pub platform: String,
    pub source: PlatformSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<i64>,
}

// --- Submission ---

/// An uploaded image. Bytes are shared, the hash is computed on first use.
#[derive(Debug, Clone)]
pub struct ImageSubmission {
    pub id: Uuid,
    pub bytes: Arc<[u8]>,
    pub received_at: DateTime<Utc>,
    hash: Arc<OnceLock<String>>,
}

impl ImageSubmission {
    pub fn new(id: Uuid, bytes: impl Into<Arc<[u8]>>, received_at: DateTime<Utc>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
            received_at,
            hash: Arc::new(OnceLock::new()),
        }
    }

    /// Construct with an already-known hash (e.g. loaded from a record).
    pub fn with_hash(mut self, hash: String) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(hash);
        self.hash = Arc::new(cell);
        self
    }

    pub fn content_hash(&self) -> &str {
        self.hash.get_or_init(|| content_hash(&self.bytes))
    }

    pub fn hash_computed(&self) -> bool {
        self.hash.get().is_some()
    }
}

// --- Search & verdicts ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlCandidate {
    pub url: String,
    pub search_method: SearchMethod,
    pub source: SearchSource,
    pub score: f32,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlVerdict {
    pub url: String,
    pub judgment: Judgment,
    pub reason: String,
    pub confidence: Confidence,
    pub analysis_type: AnalysisType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_method: Option<SearchMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformMetadata>,
}

/// What a completed pass amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// At least one URL got a conclusive judgment.
    Completed,
    /// Search ran, nothing matched.
    NoCandidates,
    /// Every configured backend failed; nothing was searched.
    SearchFailed,
    /// Candidates were found but none could be classified.
    AllUnclassified,
    /// No search backend is configured.
    ProviderNotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub image_id: Uuid,
    pub image_hash: String,
    pub analyzed_at: DateTime<Utc>,
    pub outcome: AnalysisOutcome,
    pub verdicts: Vec<UrlVerdict>,
    pub total_found: usize,
    pub total_processed: usize,
}

impl AnalysisResult {
    pub fn count(&self, judgment: Judgment) -> usize {
        self.verdicts.iter().filter(|v| v.judgment == judgment).count()
    }
}

// --- History ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: Uuid,
    pub image_id: Uuid,
    pub image_hash: String,
    pub created_at: DateTime<Utc>,
    pub verdicts: Vec<UrlVerdict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRef {
    pub url: String,
    pub judgment: Judgment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentChange {
    pub url: String,
    pub previous: Judgment,
    pub current: Judgment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryDiff {
    pub previous_history_id: Uuid,
    pub previous_created_at: DateTime<Utc>,
    pub new: Vec<VerdictRef>,
    pub disappeared: Vec<VerdictRef>,
    pub changed: Vec<JudgmentChange>,
    pub has_changes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiffReport {
    NoPriorHistory,
    Compared(HistoryDiff),
}

// --- Uploads ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    NotStarted,
    Processing,
    Completed,
    Failed,
}

/// Metadata stored alongside an uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: usize,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub analysis_status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub found_urls_count: usize,
    #[serde(default)]
    pub processed_results_count: usize,
}

impl UploadRecord {
    pub fn new(original_filename: impl Into<String>, content_type: impl Into<String>, file_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            file_size,
            uploaded_at: Utc::now(),
            content_hash: None,
            analysis_status: AnalysisStatus::NotStarted,
            analysis_error: None,
            analysis_time: None,
            found_urls_count: 0,
            processed_results_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_hash_is_lazy_and_stable() {
        let sub = ImageSubmission::new(Uuid::new_v4(), b"cover".to_vec(), Utc::now());
        assert!(!sub.hash_computed());
        let first = sub.content_hash().to_string();
        assert!(sub.hash_computed());
        assert_eq!(sub.content_hash(), first);
        assert_eq!(first, content_hash(b"cover"));
    }

    #[test]
    fn submission_clone_shares_hash() {
        let sub = ImageSubmission::new(Uuid::new_v4(), b"x".to_vec(), Utc::now());
        let copy = sub.clone();
        let _ = sub.content_hash();
        assert!(copy.hash_computed());
    }

    #[test]
    fn exact_methods_rank_first() {
        assert!(SearchMethod::LensExact.rank() < SearchMethod::Exact.rank());
        assert!(SearchMethod::Exact.rank() < SearchMethod::Partial.rank());
        assert!(SearchMethod::Partial.rank() < SearchMethod::RelatedPage.rank());
        assert!(SearchMethod::LensExact.is_exact());
        assert!(!SearchMethod::RelatedPage.is_exact());
    }

    #[test]
    fn diff_report_serializes_with_status_tag() {
        let json = serde_json::to_value(DiffReport::NoPriorHistory).unwrap();
        assert_eq!(json["status"], "no_prior_history");
    }

    #[test]
    fn verdict_omits_empty_optionals() {
        let v = UrlVerdict {
            url: "https://a.example".into(),
            judgment: Judgment::Safe,
            reason: "ok".into(),
            confidence: Confidence::High,
            analysis_type: AnalysisType::TrustedDomain,
            search_method: None,
            platform: None,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("platform").is_none());
        assert_eq!(json["analysis_type"], "trusted_domain");
    }
}
