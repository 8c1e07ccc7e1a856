use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::lookup::IdentityLookup;
use crate::error::LookupError;
use crate::models::MpIdentity;

static PARTY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*\|[ \t]*(?:siyasi[ _]partisi|partisi|parti)[ \t]*=[ \t]*(.*)$")
        .expect("valid party field regex")
});
static REF_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<ref[^>]*/>|<ref[^>]*>.*?</ref>").expect("valid ref tag regex")
});
static LINE_BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid br regex"));
static TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").expect("valid template regex"));
static WIKI_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[(?:[^|\]]*\|)?([^\]]*)\]\]").expect("valid wiki link regex")
});
static FOOTNOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("valid footnote regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));
static TERM_CATEGORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TBMM\s+(\d+)\.\s*dönem").expect("valid term category regex"));

/// Configuration for the Wikipedia identity lookup
#[derive(Debug, Clone)]
pub struct WikipediaConfig {
    /// MediaWiki action API endpoint
    pub api_url: String,
    pub user_agent: String,
    /// Minimum spacing between two requests
    pub min_interval: Duration,
    /// Retries after the first attempt, for transient failures only
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry
    pub backoff_base: Duration,
    pub timeout: Duration,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            api_url: "https://tr.wikipedia.org/w/api.php".to_string(),
            user_agent: concat!("tutanak/", env!("CARGO_PKG_VERSION")).to_string(),
            min_interval: Duration::from_millis(1000),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl WikipediaConfig {
    /// Defaults, with the endpoint overridable through WIKIPEDIA_API_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("WIKIPEDIA_API_URL") {
            config.api_url = url;
        }
        config
    }
}

/// Looks up party and terms on Turkish Wikipedia: the top search hit's
/// infobox gives the party, its "TBMM N. dönem" categories give the terms.
pub struct WikipediaLookup {
    client: Client,
    config: WikipediaConfig,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    query: Option<PageQuery>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    revisions: Vec<Revision>,
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    slots: Slots,
}

#[derive(Debug, Deserialize)]
struct Slots {
    main: Slot,
}

#[derive(Debug, Deserialize)]
struct Slot {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Category {
    title: String,
}

impl WikipediaLookup {
    pub fn new(config: WikipediaConfig) -> Result<Self, LookupError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Wait until `min_interval` has passed since the previous request
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.config.min_interval {
                tokio::time::sleep(self.config.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, LookupError> {
        self.throttle().await;

        let response = self
            .client
            .get(&self.config.api_url)
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Status { status, body });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| LookupError::Payload(e.to_string()))
    }

    /// Issue a request, retrying transient failures with exponential backoff
    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, LookupError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.backoff_base * 2u32.saturating_pow(attempt - 1);
                debug!("Lookup retry {} of {} in {:?}", attempt, self.config.max_retries, delay);
                tokio::time::sleep(delay).await;
            }

            match self.request(params).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!("Lookup attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LookupError::Payload("no attempt made".to_string())))
    }

    async fn search(&self, name: &str) -> Result<Option<String>, LookupError> {
        let query = format!("{} milletvekili", name);
        let response: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query.as_str()),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .await?;

        Ok(response
            .query
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title))
    }

    async fn fetch_page(&self, title: &str) -> Result<Option<(String, Vec<String>)>, LookupError> {
        let response: PageResponse = self
            .get(&[
                ("action", "query"),
                ("prop", "revisions|categories"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("cllimit", "max"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;

        let Some(page) = response.query.and_then(|q| q.pages.into_iter().next()) else {
            return Ok(None);
        };
        if page.missing {
            return Ok(None);
        }

        let wikitext = page
            .revisions
            .into_iter()
            .next()
            .map(|r| r.slots.main.content)
            .unwrap_or_default();
        let categories = page.categories.into_iter().map(|c| c.title).collect();

        Ok(Some((wikitext, categories)))
    }
}

impl IdentityLookup for WikipediaLookup {
    async fn lookup(&self, name: &str) -> Result<Option<MpIdentity>, LookupError> {
        let Some(title) = self.search(name).await? else {
            debug!("No Wikipedia article for {:?}", name);
            return Ok(None);
        };
        let Some((wikitext, categories)) = self.fetch_page(&title).await? else {
            return Ok(None);
        };

        let party = parse_party(&wikitext);
        let terms = parse_term_categories(categories.iter().map(String::as_str));
        debug!(
            "Wikipedia {:?} -> {:?}: party {:?}, terms {:?}",
            name, title, party, terms
        );

        Ok(Some(MpIdentity::new(party, terms)))
    }
}

/// Party from the infobox's `parti`/`partisi` field, with markup removed.
/// Several parties separated by line breaks are joined with commas.
pub fn parse_party(wikitext: &str) -> Option<String> {
    let raw = PARTY_FIELD.captures(wikitext)?.get(1)?.as_str();

    let text = REF_TAG.replace_all(raw, "");
    let text = LINE_BREAK_TAG.replace_all(&text, ", ");
    let text = TEMPLATE.replace_all(&text, "");
    let text = WIKI_LINK.replace_all(&text, "$1");
    let text = FOOTNOTE.replace_all(&text, "");
    let text = HTML_TAG.replace_all(&text, "");

    let parts: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Term numbers from category titles such as
/// `Kategori:TBMM 24. dönem İstanbul milletvekilleri`
pub fn parse_term_categories<'a>(categories: impl IntoIterator<Item = &'a str>) -> Vec<u32> {
    let mut terms: Vec<u32> = categories
        .into_iter()
        .filter_map(|c| TERM_CATEGORY.captures(c))
        .filter_map(|caps| caps[1].parse().ok())
        .collect();
    terms.sort_unstable();
    terms.dedup();
    terms
}
