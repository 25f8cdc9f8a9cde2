use anyhow::{Context, Result, bail};
use std::str::FromStr;
use std::time::Duration;

use crate::literature::{self, PubMedSettings};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LLM_MODEL: &str = "google/gemini-2.0-flash-001";
pub const DEFAULT_TRANSLATE_BASE_URL: &str = "https://translate.googleapis.com";

/// Service configuration, read from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub http_timeout: Duration,
    pub port: u16,
    pub translate_base_url: String,
    pub pubmed_base_url: String,
    pub pubmed_api_key: Option<String>,
    pub pubmed_sort_relevance: bool,
    pub pubmed_max_fetch_ids: usize,
    pub abstract_max_chars: usize,
    pub extract_cache_ttl: Duration,
    pub extract_cache_max_entries: usize,
    pub search_cache_ttl: Duration,
    pub search_cache_max_entries: usize,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(openrouter_api_key) = get("OPENROUTER_API_KEY") else {
            bail!("OPENROUTER_API_KEY environment variable is required");
        };

        // An unusable PORT falls back to the default rather than refusing to start.
        let port = get("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            openrouter_api_key,
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 20)?),
            port,
            translate_base_url: get("TRANSLATE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TRANSLATE_BASE_URL.to_string()),
            pubmed_base_url: get("PUBMED_BASE_URL")
                .unwrap_or_else(|| literature::DEFAULT_BASE_URL.to_string()),
            pubmed_api_key: get("PUBMED_API_KEY"),
            pubmed_sort_relevance: parse_or(&get, "PUBMED_SORT_RELEVANCE", true)?,
            pubmed_max_fetch_ids: parse_or(&get, "PUBMED_MAX_FETCH_IDS", 10)?,
            abstract_max_chars: parse_or(&get, "ABSTRACT_MAX_CHARS", 500)?,
            extract_cache_ttl: Duration::from_secs(parse_or(&get, "EXTRACT_CACHE_TTL_SECS", 1800)?),
            extract_cache_max_entries: parse_or(&get, "EXTRACT_CACHE_MAX_ENTRIES", 5)?,
            search_cache_ttl: Duration::from_secs(parse_or(&get, "SEARCH_CACHE_TTL_SECS", 3600)?),
            search_cache_max_entries: parse_or(&get, "SEARCH_CACHE_MAX_ENTRIES", 64)?,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
        };

        if config.pubmed_max_fetch_ids == 0 {
            bail!("PUBMED_MAX_FETCH_IDS must be at least 1");
        }
        Ok(config)
    }

    pub fn pubmed_settings(&self) -> PubMedSettings {
        PubMedSettings {
            base_url: self.pubmed_base_url.clone(),
            api_key: self.pubmed_api_key.clone(),
            sort_by_relevance: self.pubmed_sort_relevance,
            max_fetch_ids: self.pubmed_max_fetch_ids,
            abstract_max_chars: self.abstract_max_chars,
            timeout: self.http_timeout,
            cache_ttl: self.search_cache_ttl,
            cache_max_entries: self.search_cache_max_entries,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid value '{value}' for {key}")),
        None => Ok(default),
    }
}
