//! Content judging through a natural-language oracle.
//!
//! The oracle is asked for two labelled lines, `判定：` (one of ○ × ？) and
//! `理由：`, and the parser tolerates the usual drift: ASCII colons, brackets,
//! English labels and tokens, code fences. Judging never fails: a missing
//! oracle, a provider error or an unparseable reply all become verdicts.

use std::sync::{Arc, LazyLock};

use ai_client::{AiError, AiErrorKind, Oracle};
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use bookleak_common::{Judgment, MAX_REASON_CHARS};

use crate::domains::{DomainCategory, Platform};

pub const REASON_NOT_CONFIGURED: &str = "AI judge is not configured";
pub const REASON_UNPARSEABLE: &str = "Could not parse the AI response";
pub const REASON_MISSING: &str = "AI response gave no reason";

const ELLIPSIS: char = '…';

/// Page text beyond this is not sent to the oracle.
const MAX_PROMPT_CONTENT_CHARS: usize = 2000;

/// Length of the provider message excerpt kept in generic error reasons.
const ERROR_EXCERPT_CHARS: usize = 50;

/// Context the judge gets besides the page text.
#[derive(Debug, Clone)]
pub struct JudgeContext {
    pub url: String,
    pub category: DomainCategory,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub judgment: Judgment,
    pub reason: String,
}

impl JudgeVerdict {
    pub fn new(judgment: Judgment, reason: impl AsRef<str>) -> Self {
        Self {
            judgment,
            reason: truncate_reason(reason.as_ref()),
        }
    }
}

#[async_trait]
pub trait ContentJudge: Send + Sync {
    async fn judge(&self, content: &str, context: &JudgeContext) -> JudgeVerdict;
}

// ---------------------------------------------------------------------------
// OracleJudge
// ---------------------------------------------------------------------------

pub struct OracleJudge {
    oracle: Option<Arc<dyn Oracle>>,
}

impl OracleJudge {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle: Some(oracle),
        }
    }

    /// A judge with no oracle; every verdict is `unknown`.
    pub fn unconfigured() -> Self {
        Self { oracle: None }
    }

    pub fn is_configured(&self) -> bool {
        self.oracle.is_some()
    }
}

#[async_trait]
impl ContentJudge for OracleJudge {
    async fn judge(&self, content: &str, context: &JudgeContext) -> JudgeVerdict {
        let Some(oracle) = &self.oracle else {
            return JudgeVerdict::new(Judgment::Unknown, REASON_NOT_CONFIGURED);
        };

        let prompt = build_prompt(content, context);
        let reply = match oracle.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(reply) => reply,
            Err(e) => return verdict_for_error(oracle.name(), &context.url, &e),
        };

        match parse_verdict(&reply) {
            Some(verdict) => {
                info!(
                    url = context.url.as_str(),
                    judgment = verdict.judgment.as_str(),
                    "Oracle verdict"
                );
                verdict
            }
            None => {
                warn!(
                    url = context.url.as_str(),
                    oracle = oracle.name(),
                    preview = %preview(&reply),
                    "Unparseable oracle reply"
                );
                JudgeVerdict::new(Judgment::Unknown, REASON_UNPARSEABLE)
            }
        }
    }
}

/// Map a provider failure onto a verdict. Classified failures are `error`;
/// anything else is `unknown` with a short excerpt of the message.
pub fn verdict_for_error(provider: &str, url: &str, err: &AiError) -> JudgeVerdict {
    let kind = err.kind();
    let reason = match kind {
        AiErrorKind::Config => "AI judge configuration error".to_string(),
        AiErrorKind::ModelNotFound => "AI model not found".to_string(),
        AiErrorKind::Auth => "AI authentication error".to_string(),
        AiErrorKind::RateLimited => "AI quota limit reached".to_string(),
        AiErrorKind::Network => "AI network error".to_string(),
        AiErrorKind::Api | AiErrorKind::Parse => {
            let message = err.to_string();
            let excerpt: String = message.chars().take(ERROR_EXCERPT_CHARS).collect();
            warn!(url, provider, error = %err, "Oracle call failed");
            return JudgeVerdict::new(Judgment::Unknown, format!("AI judgment error: {excerpt}..."));
        }
    };

    if err.is_retryable() {
        warn!(url, provider, error = %err, "Oracle call failed, transient");
    } else {
        tracing::error!(url, provider, error = %err, "Oracle call failed");
    }
    JudgeVerdict::new(Judgment::Error, reason)
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You review web pages that were found by reverse image search for \
the cover or pages of a published book or magazine. Decide whether the page is a legitimate \
source or an unauthorized copy. Answer only in the requested format.";

fn build_prompt(content: &str, context: &JudgeContext) -> String {
    let content: String = content.chars().take(MAX_PROMPT_CONTENT_CHARS).collect();
    let source = match context.platform {
        Some(platform) => format!("{} ({platform})", context.category.describe()),
        None => context.category.describe().to_string(),
    };

    format!(
        "URL: {url}\nSource type: {source}\n\n\
[Page content]\n{content}\n\n\
[Criteria]\n\
- Legitimate: publisher, author, official store, review, news article, a reader sharing a photo of a book they own.\n\
- Unauthorized: full text or page scans, free downloads, raw/scanlation chapters, wording that suggests illegal copies.\n\n\
[Answer format]\n\
判定：[○ (legitimate), × (unauthorized) or ？ (cannot tell)]\n\
理由：[one short sentence; if the content is insufficient write \"insufficient information\"]",
        url = context.url,
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static JUDGMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s*#>\-]*(判定|判断|judgment|judgement|verdict)[\s*]*[:：]\s*(.*)$")
        .expect("valid regex")
});

static REASON_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s*#>\-]*(理由|根拠|reason)[\s*]*[:：]\s*(.*)$").expect("valid regex")
});

static ENGLISH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(safe|legitimate|danger|dangerous|unauthorized|pirated|unknown|error)\b")
        .expect("valid regex")
});

/// Parse an oracle reply into a verdict.
///
/// Labelled lines are tried first. Without a judgment line, a loose scan picks
/// up the first marker symbol anywhere in the reply. `None` means neither
/// found anything.
pub fn parse_verdict(reply: &str) -> Option<JudgeVerdict> {
    let text = ai_client::util::strip_code_blocks(reply);

    let mut judgment = None;
    let mut reason = None;
    for line in text.lines() {
        if judgment.is_none() {
            if let Some(caps) = JUDGMENT_LINE.captures(line) {
                judgment = judgment_token(&caps[2]);
                continue;
            }
        }
        if reason.is_none() {
            if let Some(caps) = REASON_LINE.captures(line) {
                let value = strip_brackets(&caps[2]);
                if !value.is_empty() {
                    reason = Some(value.to_string());
                }
            }
        }
    }

    let judgment = match judgment {
        Some(j) => j,
        None => loose_scan(text)?,
    };
    let reason = reason.unwrap_or_else(|| REASON_MISSING.to_string());
    Some(JudgeVerdict::new(judgment, reason))
}

/// Interpret the value part of a judgment line.
fn judgment_token(raw: &str) -> Option<Judgment> {
    let token = strip_brackets(raw);
    if let Some(j) = token.chars().find_map(symbol_judgment) {
        return Some(j);
    }
    let lower = token.to_lowercase();
    match lower.trim() {
        "x" => return Some(Judgment::Danger),
        "o" => return Some(Judgment::Safe),
        "?" => return Some(Judgment::Unknown),
        "!" => return Some(Judgment::Error),
        _ => {}
    }
    ENGLISH_TOKEN
        .captures(&lower)
        .and_then(|caps| english_judgment(&caps[1]))
}

fn symbol_judgment(c: char) -> Option<Judgment> {
    match c {
        '○' | '◯' | '〇' => Some(Judgment::Safe),
        '×' | '✕' | '✖' | '✗' | '☓' => Some(Judgment::Danger),
        '？' => Some(Judgment::Unknown),
        '！' => Some(Judgment::Error),
        _ => None,
    }
}

fn english_judgment(word: &str) -> Option<Judgment> {
    match word {
        "safe" | "legitimate" => Some(Judgment::Safe),
        "danger" | "dangerous" | "unauthorized" | "pirated" => Some(Judgment::Danger),
        "unknown" => Some(Judgment::Unknown),
        "error" => Some(Judgment::Error),
        _ => None,
    }
}

/// First full-width marker anywhere in the reply. ASCII `x` and `?` are too
/// common in prose to count here.
fn loose_scan(text: &str) -> Option<Judgment> {
    text.chars()
        .find_map(|c| match c {
            '○' | '◯' | '〇' => Some(Judgment::Safe),
            '×' | '✕' | '✖' => Some(Judgment::Danger),
            _ => None,
        })
}

fn strip_brackets(s: &str) -> &str {
    s.trim().trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '[' | ']' | '【' | '】' | '「' | '」' | '(' | ')' | '（' | '）' | '*' | '`')
    })
}

/// Cap a reason at `MAX_REASON_CHARS` characters, marking the cut with `…`.
pub fn truncate_reason(reason: &str) -> String {
    let reason = reason.trim();
    if reason.chars().count() <= MAX_REASON_CHARS {
        return reason.to_string();
    }
    let mut out: String = reason.chars().take(MAX_REASON_CHARS - 1).collect();
    out.push(ELLIPSIS);
    out
}

fn preview(reply: &str) -> String {
    reply.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedOracle {
        reply: std::result::Result<String, fn() -> AiError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn complete(&self, _system: &str, _prompt: &str) -> ai_client::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn context() -> JudgeContext {
        JudgeContext {
            url: "https://raw-manga.example/ch1".into(),
            category: DomainCategory::Other,
            platform: None,
        }
    }

    #[test]
    fn parses_canonical_format() {
        let v = parse_verdict("判定：×\n理由：全ページが無断掲載されている").unwrap();
        assert_eq!(v.judgment, Judgment::Danger);
        assert_eq!(v.reason, "全ページが無断掲載されている");
    }

    #[test]
    fn tolerates_ascii_colon_brackets_and_fences() {
        let v = parse_verdict("```\n判定: [○]\n理由: [出版社の公式ページ]\n```").unwrap();
        assert_eq!(v.judgment, Judgment::Safe);
        assert_eq!(v.reason, "出版社の公式ページ");
    }

    #[test]
    fn accepts_english_labels_and_tokens() {
        let v = parse_verdict("**Judgment:** Danger\nReason: offers a free PDF download").unwrap();
        assert_eq!(v.judgment, Judgment::Danger);
        assert_eq!(v.reason, "offers a free PDF download");

        let v = parse_verdict("Verdict: safe").unwrap();
        assert_eq!(v.judgment, Judgment::Safe);
        assert_eq!(v.reason, REASON_MISSING);

        let v = parse_verdict("判定：？\n理由：情報不足のため判断不能").unwrap();
        assert_eq!(v.judgment, Judgment::Unknown);
    }

    #[test]
    fn loose_scan_fallback() {
        let v = parse_verdict("This looks like a scanlation site, so ×.").unwrap();
        assert_eq!(v.judgment, Judgment::Danger);
    }

    #[test]
    fn unparseable_reply_is_none() {
        assert!(parse_verdict("I cannot help with that.").is_none());
        assert!(parse_verdict("").is_none());
    }

    #[test]
    fn reason_is_capped_with_marker() {
        let long = "あ".repeat(MAX_REASON_CHARS + 50);
        let capped = truncate_reason(&long);
        assert_eq!(capped.chars().count(), MAX_REASON_CHARS);
        assert!(capped.ends_with('…'));

        let exact = "a".repeat(MAX_REASON_CHARS);
        assert_eq!(truncate_reason(&exact), exact);

        let v = parse_verdict(&format!("判定：×\n理由：{long}")).unwrap();
        assert!(v.reason.chars().count() <= MAX_REASON_CHARS);
        assert!(v.reason.ends_with('…'));
    }

    #[test]
    fn error_kinds_map_to_distinct_reasons() {
        let url = "https://a.example";
        let cases = [
            (AiError::from_status(401, "bad key".into()), "AI authentication error"),
            (AiError::from_status(429, "slow".into()), "AI quota limit reached"),
            (AiError::ModelNotFound("gemini-x".into()), "AI model not found"),
            (AiError::Network("connection reset".into()), "AI network error"),
            (AiError::Config("no key".into()), "AI judge configuration error"),
        ];
        for (err, reason) in cases {
            let v = verdict_for_error("gemini", url, &err);
            assert_eq!(v.judgment, Judgment::Error);
            assert_eq!(v.reason, reason);
        }

        let v = verdict_for_error("gemini", url, &AiError::from_status(500, "x".repeat(200)));
        assert_eq!(v.judgment, Judgment::Unknown);
        assert!(v.reason.starts_with("AI judgment error: "));
        assert!(v.reason.chars().count() < 80);
    }

    #[tokio::test]
    async fn unconfigured_judge_returns_unknown() {
        let judge = OracleJudge::unconfigured();
        assert!(!judge.is_configured());
        let v = judge.judge("Title: x", &context()).await;
        assert_eq!(v.judgment, Judgment::Unknown);
        assert_eq!(v.reason, REASON_NOT_CONFIGURED);
    }

    #[tokio::test]
    async fn oracle_reply_flows_through_parser() {
        let oracle = Arc::new(FixedOracle {
            reply: Ok("判定：×\n理由：無料で全話読める".into()),
            calls: AtomicUsize::new(0),
        });
        let judge = OracleJudge::new(oracle.clone());
        let v = judge.judge("Title: raw", &context()).await;
        assert_eq!(v.judgment, Judgment::Danger);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oracle_failure_becomes_error_verdict() {
        let oracle = Arc::new(FixedOracle {
            reply: Err(|| AiError::from_status(403, "forbidden".into())),
            calls: AtomicUsize::new(0),
        });
        let v = OracleJudge::new(oracle).judge("Title: raw", &context()).await;
        assert_eq!(v.judgment, Judgment::Error);
        assert_eq!(v.reason, "AI authentication error");
    }

    #[test]
    fn prompt_names_platform_and_format() {
        let ctx = JudgeContext {
            url: "https://x.com/u/status/1".into(),
            category: DomainCategory::SocialMedia,
            platform: Some(Platform::X),
        };
        let prompt = build_prompt(&"長".repeat(3000), &ctx);
        assert!(prompt.contains("Source type: social media post (x)"));
        assert!(prompt.contains("判定："));
        assert!(prompt.contains("理由："));
        assert_eq!(prompt.matches('長').count(), MAX_PROMPT_CONTENT_CHARS);
    }
}
