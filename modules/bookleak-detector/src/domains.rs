//! Host classification: trust tiers, content categories, and platform routing.
//!
//! All lists live in one versioned TOML table (`config/domains.toml`), embedded
//! at compile time and overridable from disk. Classification is a pure
//! function of the URL string and the table.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

const BUILTIN_TABLE: &str = include_str!("../config/domains.toml");

/// Content category of a non-trusted host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainCategory {
    SocialMedia,
    Blog,
    FileSharing,
    Forum,
    Other,
}

impl DomainCategory {
    /// Short description handed to the judge as context.
    pub fn describe(self) -> &'static str {
        match self {
            DomainCategory::SocialMedia => "social media post",
            DomainCategory::Blog => "personal blog",
            DomainCategory::FileSharing => "file-sharing service",
            DomainCategory::Forum => "discussion forum",
            DomainCategory::Other => "general website",
        }
    }
}

/// Social platforms with dedicated extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Instagram,
    Facebook,
    X,
    Tiktok,
    Threads,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::X => "x",
            Platform::Tiktok => "tiktok",
            Platform::Threads => "threads",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainClass {
    pub is_trusted: bool,
    pub category: DomainCategory,
}

// --- Table ---

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainTable {
    pub version: u32,
    pub trusted: TrustedHosts,
    pub categories: CategoryHosts,
    #[serde(default)]
    pub platforms: PlatformHosts,
    pub scrape: ScrapeRules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustedHosts {
    pub hosts: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryHosts {
    #[serde(default)]
    pub social: Vec<String>,
    #[serde(default)]
    pub blog: Vec<String>,
    #[serde(default)]
    pub file_sharing: Vec<String>,
    #[serde(default)]
    pub forum: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformHosts {
    #[serde(default)]
    pub instagram: Vec<String>,
    #[serde(default)]
    pub facebook: Vec<String>,
    #[serde(default)]
    pub x: Vec<String>,
    #[serde(default)]
    pub tiktok: Vec<String>,
    #[serde(default)]
    pub threads: Vec<String>,
}

impl PlatformHosts {
    fn entries(&self) -> [(Platform, &[String]); 5] {
        [
            (Platform::Instagram, self.instagram.as_slice()),
            (Platform::Facebook, self.facebook.as_slice()),
            (Platform::X, self.x.as_slice()),
            (Platform::Tiktok, self.tiktok.as_slice()),
            (Platform::Threads, self.threads.as_slice()),
        ]
    }

    fn entries_mut(&mut self) -> [&mut Vec<String>; 5] {
        [
            &mut self.instagram,
            &mut self.facebook,
            &mut self.x,
            &mut self.tiktok,
            &mut self.threads,
        ]
    }

    pub fn hosts(&self, platform: Platform) -> &[String] {
        self.entries()
            .into_iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, hosts)| hosts)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeRules {
    #[serde(default)]
    pub image_cdn_hosts: Vec<String>,
    #[serde(default)]
    pub skip_extensions: Vec<String>,
}

impl DomainTable {
    /// The table compiled into the binary.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_TABLE).expect("embedded domain table is valid")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read domain table: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse domain table: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut table: DomainTable = toml::from_str(content)?;
        table.normalize();
        Ok(table)
    }

    fn normalize(&mut self) {
        fn lower(list: &mut [String]) {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
        }
        lower(&mut self.trusted.hosts);
        lower(&mut self.trusted.patterns);
        lower(&mut self.categories.social);
        lower(&mut self.categories.blog);
        lower(&mut self.categories.file_sharing);
        lower(&mut self.categories.forum);
        lower(&mut self.scrape.image_cdn_hosts);
        lower(&mut self.scrape.skip_extensions);
        for hosts in self.platforms.entries_mut() {
            lower(hosts);
        }
    }
}

// --- Classifier ---

#[derive(Debug, Clone)]
pub struct DomainClassifier {
    table: Arc<DomainTable>,
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::new(DomainTable::builtin())
    }
}

impl DomainClassifier {
    pub fn new(table: DomainTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table_version(&self) -> u32 {
        self.table.version
    }

    pub fn classify(&self, url: &str) -> DomainClass {
        let Some(host) = host_of(url) else {
            return DomainClass {
                is_trusted: false,
                category: DomainCategory::Other,
            };
        };

        let is_trusted = self
            .table
            .trusted
            .hosts
            .iter()
            .any(|h| host_matches(&host, h))
            || self
                .table
                .trusted
                .patterns
                .iter()
                .any(|p| host.contains(p.as_str()));

        let categories = &self.table.categories;
        let category = if any_host(&host, &categories.social) {
            DomainCategory::SocialMedia
        } else if any_host(&host, &categories.file_sharing) {
            DomainCategory::FileSharing
        } else if any_host(&host, &categories.forum) {
            DomainCategory::Forum
        } else if any_host(&host, &categories.blog) {
            DomainCategory::Blog
        } else {
            DomainCategory::Other
        };

        DomainClass {
            is_trusted,
            category,
        }
    }

    /// The platform needing dedicated extraction, if any.
    pub fn platform(&self, url: &str) -> Option<Platform> {
        let host = host_of(url)?;
        self.table
            .platforms
            .entries()
            .into_iter()
            .find(|(_, hosts)| any_host(&host, hosts))
            .map(|(platform, _)| platform)
    }

    pub fn is_image_cdn(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| any_host(&host, &self.table.scrape.image_cdn_hosts))
    }

    /// Whether the URL path ends in a binary/image extension.
    pub fn has_skipped_extension(&self, url: &str) -> bool {
        let path = match url::Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => url.to_lowercase(),
        };
        self.table
            .scrape
            .skip_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }
}

/// Lowercased host without a leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Exact host or subdomain of `domain`.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn any_host(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| host_matches(host, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> DomainClassifier {
        DomainClassifier::default()
    }

    #[test]
    fn builtin_table_parses() {
        let table = DomainTable::builtin();
        assert!(table.version >= 1);
        assert!(!table.trusted.hosts.is_empty());
        assert!(!table.platforms.hosts(Platform::Instagram).is_empty());
    }

    #[test]
    fn trusted_exact_and_subdomain() {
        let c = classifier();
        assert!(c.classify("https://www.kodansha.co.jp/book/123").is_trusted);
        assert!(c.classify("https://jumpplus.shueisha.co.jp/episode/1").is_trusted);
        assert!(c.classify("https://ja.wikipedia.org/wiki/X").is_trusted);
    }

    #[test]
    fn suffix_match_requires_label_boundary() {
        let c = classifier();
        assert!(!c.classify("https://fakekodansha.co.jp/free").is_trusted);
        assert!(!c.classify("https://notnatalie.mu/").is_trusted);
    }

    #[test]
    fn marketplace_patterns_match_substrings() {
        let c = classifier();
        assert!(c.classify("https://www.amazon.de/dp/1").is_trusted);
        assert!(c.classify("https://item.rakuten.co.jp/shop/1").is_trusted);
        assert!(c.classify("https://jp.mercari.com/item/m1").is_trusted);
    }

    #[test]
    fn categories_for_untrusted_hosts() {
        let c = classifier();
        let class = c.classify("https://x.com/user/status/1");
        assert!(!class.is_trusted);
        assert_eq!(class.category, DomainCategory::SocialMedia);
        assert_eq!(c.classify("https://someone.hatenablog.com/entry/1").category, DomainCategory::Blog);
        assert_eq!(c.classify("https://mega.nz/file/abc").category, DomainCategory::FileSharing);
        assert_eq!(c.classify("https://theqoo.net/square/1").category, DomainCategory::Forum);
        assert_eq!(c.classify("https://raw-manga.example/ch1").category, DomainCategory::Other);
    }

    #[test]
    fn unparseable_url_is_untrusted_other() {
        let class = classifier().classify("not a url");
        assert!(!class.is_trusted);
        assert_eq!(class.category, DomainCategory::Other);
    }

    #[test]
    fn platform_detection() {
        let c = classifier();
        assert_eq!(c.platform("https://www.instagram.com/p/abc/"), Some(Platform::Instagram));
        assert_eq!(c.platform("https://twitter.com/u/status/1"), Some(Platform::X));
        assert_eq!(c.platform("https://mobile.x.com/u/status/1"), Some(Platform::X));
        assert_eq!(c.platform("https://www.threads.net/@u/post/1"), Some(Platform::Threads));
        assert_eq!(c.platform("https://box.com/x"), None);
    }

    #[test]
    fn scrape_skip_rules() {
        let c = classifier();
        assert!(c.is_image_cdn("https://pbs.twimg.com/media/abc?format=jpg"));
        assert!(c.is_image_cdn("https://scontent.cdninstagram.com/v/t51/1.jpg"));
        assert!(!c.is_image_cdn("https://twitter.com/u"));
        assert!(c.has_skipped_extension("https://a.example/covers/1.JPG"));
        assert!(c.has_skipped_extension("https://a.example/x.webp?w=100"));
        assert!(!c.has_skipped_extension("https://a.example/read/chapter-1"));
    }

    #[test]
    fn custom_table_overrides() {
        let toml = r#"
            version = 99
            [trusted]
            hosts = ["Example.COM"]
            [categories]
            forum = ["board.example"]
            [scrape]
        "#;
        let c = DomainClassifier::new(DomainTable::parse(toml).unwrap());
        assert_eq!(c.table_version(), 99);
        assert!(c.classify("https://shop.example.com/").is_trusted);
        assert_eq!(c.classify("https://board.example/t/1").category, DomainCategory::Forum);
        assert_eq!(c.platform("https://instagram.com/p/1"), None);
    }

    #[test]
    fn unknown_keys_rejected() {
        let toml = r#"
            version = 1
            bogus = true
            [trusted]
            hosts = []
            [categories]
            [scrape]
        "#;
        assert!(DomainTable::parse(toml).is_err());
    }
}
