use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{ReportError, Result};

pub const AUTO_DETECT: &str = "auto";

/// Languages a summary can be delivered in. Summaries are generated in English,
/// so English never goes through the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputLanguage {
    #[default]
    English,
    Hindi,
    Telugu,
    Spanish,
    French,
    German,
    Chinese,
}

impl OutputLanguage {
    pub const ALL: [OutputLanguage; 7] = [
        OutputLanguage::English,
        OutputLanguage::Hindi,
        OutputLanguage::Telugu,
        OutputLanguage::Spanish,
        OutputLanguage::French,
        OutputLanguage::German,
        OutputLanguage::Chinese,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputLanguage::English => "English",
            OutputLanguage::Hindi => "Hindi",
            OutputLanguage::Telugu => "Telugu",
            OutputLanguage::Spanish => "Spanish",
            OutputLanguage::French => "French",
            OutputLanguage::German => "German",
            OutputLanguage::Chinese => "Chinese",
        }
    }

    /// Language code understood by the translation endpoint
    pub fn code(self) -> &'static str {
        match self {
            OutputLanguage::English => "en",
            OutputLanguage::Hindi => "hi",
            OutputLanguage::Telugu => "te",
            OutputLanguage::Spanish => "es",
            OutputLanguage::French => "fr",
            OutputLanguage::German => "de",
            OutputLanguage::Chinese => "zh-CN",
        }
    }

    pub fn needs_translation(self) -> bool {
        self != OutputLanguage::English
    }
}

impl fmt::Display for OutputLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputLanguage {
    type Err = ReportError;

    /// Accepts the display name or the language code, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        OutputLanguage::ALL
            .into_iter()
            .find(|lang| {
                lang.name().eq_ignore_ascii_case(wanted) || lang.code().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| {
                ReportError::InvalidInput(format!("unsupported output language '{wanted}'"))
            })
    }
}

impl TryFrom<String> for OutputLanguage {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<OutputLanguage> for String {
    fn from(value: OutputLanguage) -> Self {
        value.name().to_string()
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` (a language code or [`AUTO_DETECT`]) into `target`
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Client for Google's public translate endpoint
pub struct GoogleTranslator {
    client: Client,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        info!(
            "Translating {} characters from {} to {}",
            text.len(),
            source,
            target
        );

        let url = format!("{}/translate_a/single", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("client", "gtx"), ("sl", source), ("tl", target), ("dt", "t")])
            .form(&[("q", text)])
            .send()
            .await
            .map_err(|e| {
                error!("Translation request failed: {}", e);
                ReportError::TranslationFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(ReportError::TranslationFailed(format!(
                "translation service returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReportError::TranslationFailed(format!("unreadable response: {e}")))?;

        parse_translation(&body)
    }
}

/// The endpoint answers with nested arrays; the first element lists translated segments,
/// each of which starts with the translated text.
fn parse_translation(body: &Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| ReportError::TranslationFailed("unexpected response format".to_string()))?;

    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();

    if translated.trim().is_empty() {
        return Err(ReportError::TranslationFailed(
            "translation service returned no text".to_string(),
        ));
    }
    Ok(translated)
}
