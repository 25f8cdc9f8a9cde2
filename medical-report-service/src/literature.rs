//! PubMed literature lookup through the NCBI E-utilities.
//!
//! A search is two round-trips: `esearch` resolves a topic to PMIDs, then `efetch` returns
//! the article XML for those PMIDs. Both responses are memoized in [`TtlCache`]s. Failures
//! never escape as faults: [`PubMedClient::search`] returns a [`SearchOutcome`] holding
//! whatever records were recovered plus the error of the step that failed.

use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use serde_json::Value;
use session_flow::TtlCache;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{ReportError, Result};
use crate::models::{LiteratureRecord, SearchOutcome};

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const ARTICLE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";
pub const NO_TITLE: &str = "No title";
pub const NO_ABSTRACT: &str = "No abstract available";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone)]
pub struct PubMedSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub sort_by_relevance: bool,
    /// Upper bound on PMIDs sent in a single efetch request
    pub max_fetch_ids: usize,
    pub abstract_max_chars: usize,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
}

impl Default for PubMedSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            sort_by_relevance: true,
            max_fetch_ids: 10,
            abstract_max_chars: 500,
            timeout: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(3600),
            cache_max_entries: 64,
        }
    }
}

pub struct PubMedClient {
    client: Client,
    settings: PubMedSettings,
    id_cache: TtlCache<(String, usize), Vec<String>>,
    record_cache: TtlCache<String, String>,
}

impl PubMedClient {
    pub fn new(settings: PubMedSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let id_cache = TtlCache::new(
            "pubmed_esearch",
            settings.cache_ttl,
            settings.cache_max_entries,
        );
        let record_cache = TtlCache::new(
            "pubmed_efetch",
            settings.cache_ttl,
            settings.cache_max_entries,
        );

        Ok(Self {
            client,
            settings: PubMedSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
            id_cache,
            record_cache,
        })
    }

    pub fn settings(&self) -> &PubMedSettings {
        &self.settings
    }

    /// Full two-step search. An empty identifier list ends the search without fetching.
    pub async fn search(&self, topic: &str, max_results: usize) -> SearchOutcome {
        info!("Searching PubMed for '{}' (max {} results)", topic, max_results);

        let ids = match self.search_ids(topic, max_results).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("PubMed identifier lookup failed: {}", e);
                return SearchOutcome::failed(e);
            }
        };

        if ids.is_empty() {
            info!("PubMed returned no identifiers for '{}'", topic);
            return SearchOutcome::default();
        }

        let xml = match self.fetch_records(&ids).await {
            Ok(xml) => xml,
            Err(e) => {
                error!("PubMed record fetch failed: {}", e);
                return SearchOutcome::failed(e);
            }
        };

        let outcome = parse_pubmed_xml(&xml, self.settings.abstract_max_chars);
        if let Some(e) = &outcome.error {
            warn!(
                "PubMed payload partially parsed ({} records kept): {}",
                outcome.records.len(),
                e
            );
        }
        info!("Parsed {} PubMed records", outcome.records.len());
        outcome
    }

    /// Step 1: resolve `topic` to an ordered list of PMIDs
    pub async fn search_ids(&self, topic: &str, max_results: usize) -> Result<Vec<String>> {
        let term = topic.trim();
        let key = (normalize_query(term), max_results);

        self.id_cache
            .get_or_try_compute(key, || self.request_ids(term, max_results))
            .await
    }

    async fn request_ids(&self, term: &str, max_results: usize) -> Result<Vec<String>> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retmax", max_results.to_string()),
            ("retmode", "json".to_string()),
        ];
        if self.settings.sort_by_relevance {
            params.push(("sort", "relevance".to_string()));
        }
        self.push_api_key(&mut params);

        let url = format!("{}/esearch.fcgi", self.settings.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ReportError::SearchTransport(format!("esearch request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ReportError::SearchTransport(format!(
                "esearch returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReportError::SearchParse(format!("esearch response is not JSON: {e}")))?;

        let ids = parse_id_list(&body);
        info!("PubMed esearch returned {} identifiers", ids.len());
        Ok(ids)
    }

    /// Step 2: fetch article XML for at most `max_fetch_ids` of `ids`
    pub async fn fetch_records(&self, ids: &[String]) -> Result<String> {
        let capped = &ids[..ids.len().min(self.settings.max_fetch_ids)];
        if capped.len() < ids.len() {
            info!(
                "Capping efetch request from {} to {} identifiers",
                ids.len(),
                capped.len()
            );
        }
        let joined = capped.join(",");

        self.record_cache
            .get_or_try_compute(joined.clone(), || self.request_records(joined))
            .await
    }

    async fn request_records(&self, joined_ids: String) -> Result<String> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", joined_ids),
            ("retmode", "xml".to_string()),
        ];
        self.push_api_key(&mut params);

        let url = format!("{}/efetch.fcgi", self.settings.base_url);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ReportError::SearchTransport(format!("efetch request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ReportError::SearchTransport(format!(
                "efetch returned {}",
                response.status()
            )));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| ReportError::SearchTransport(format!("efetch body unreadable: {e}")))?;
        info!("PubMed efetch returned {} bytes", xml.len());
        Ok(xml)
    }

    /// Identifier lookup for several queries. A failing query maps to an empty list.
    pub async fn search_ids_batch(
        &self,
        queries: &[String],
        max_results: usize,
    ) -> HashMap<String, Vec<String>> {
        let mut results = HashMap::with_capacity(queries.len());
        for query in queries {
            let ids = match self.search_ids(query, max_results).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Batch lookup for '{}' failed: {}", query, e);
                    Vec::new()
                }
            };
            results.insert(query.clone(), ids);
        }
        results
    }

    pub fn clear_caches(&self) {
        self.id_cache.clear();
        self.record_cache.clear();
    }

    fn push_api_key(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(key) = &self.settings.api_key {
            params.push(("api_key", key.clone()));
        }
    }
}

fn normalize_query(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `esearchresult.idlist`; a missing path means no hits
fn parse_id_list(body: &Value) -> Vec<String> {
    body.get("esearchresult")
        .and_then(|result| result.get("idlist"))
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Nothing,
    Pmid,
    Title,
    AbstractSection,
}

#[derive(Debug, Default)]
struct ArticleDraft {
    pmid: Option<String>,
    pmid_buf: String,
    title: String,
    abstract_sections: Vec<String>,
    in_abstract: bool,
}

impl ArticleDraft {
    fn finish(self, abstract_max_chars: usize) -> LiteratureRecord {
        let title = collapse_whitespace(&self.title);
        let abstract_text = collapse_whitespace(&self.abstract_sections.join(" "));

        LiteratureRecord {
            url: self
                .pmid
                .as_ref()
                .map(|pmid| format!("{ARTICLE_URL_BASE}/{pmid}/")),
            pmid: self.pmid,
            title: if title.is_empty() {
                NO_TITLE.to_string()
            } else {
                title
            },
            abstract_text: if abstract_text.is_empty() {
                NO_ABSTRACT.to_string()
            } else {
                truncate_chars(&abstract_text, abstract_max_chars)
            },
        }
    }
}

/// Walk an efetch payload and build one record per `PubmedArticle`.
///
/// Missing fields fall back to placeholders. An article whose markup is broken is skipped and
/// the walk resumes at the next `PubmedArticle`; the first such fault is reported in `error`.
pub fn parse_pubmed_xml(xml: &str, abstract_max_chars: usize) -> SearchOutcome {
    let mut reader = Reader::from_str(xml);
    // Nesting is tracked here so a bad close tag only costs the article it appears in.
    reader.config_mut().check_end_names = false;

    let mut records = Vec::new();
    let mut error: Option<ReportError> = None;
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut draft: Option<ArticleDraft> = None;
    let mut capture = Capture::Nothing;
    let mut last_error_at: Option<u64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                open.push(e.name().as_ref().to_vec());
                match e.name().as_ref() {
                    b"PubmedArticle" => {
                        if draft.is_some() {
                            note_fault(&mut error, "article opened before the previous one closed");
                        }
                        draft = Some(ArticleDraft::default());
                        capture = Capture::Nothing;
                    }
                    b"PMID" => {
                        if let Some(d) = draft.as_mut() {
                            if d.pmid.is_none() {
                                d.pmid_buf.clear();
                                capture = Capture::Pmid;
                            }
                        }
                    }
                    b"ArticleTitle" if draft.is_some() => capture = Capture::Title,
                    b"Abstract" => {
                        if let Some(d) = draft.as_mut() {
                            d.in_abstract = true;
                        }
                    }
                    b"AbstractText" => {
                        if let Some(d) = draft.as_mut() {
                            if d.in_abstract {
                                d.abstract_sections.push(String::new());
                                capture = Capture::AbstractSection;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(err) => {
                        warn!("Keeping raw text after unescape failure: {}", err);
                        String::from_utf8_lossy(&e).into_owned()
                    }
                };
                append_captured(draft.as_mut(), capture, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                append_captured(draft.as_mut(), capture, &text);
            }
            Ok(Event::End(e)) => {
                let name = e.name().as_ref().to_vec();
                if open.last() != Some(&name) {
                    let expected = open
                        .last()
                        .map(|n| String::from_utf8_lossy(n).into_owned())
                        .unwrap_or_default();
                    note_fault(
                        &mut error,
                        &format!(
                            "expected </{}>, found </{}> at byte {}",
                            expected,
                            String::from_utf8_lossy(&name),
                            reader.buffer_position()
                        ),
                    );
                    if draft.take().is_some() {
                        warn!("Skipping PubMed article with mismatched markup");
                    }
                    capture = Capture::Nothing;
                    // Resynchronise on the element being closed, if it is open at all.
                    if let Some(depth) = open.iter().rposition(|n| *n == name) {
                        open.truncate(depth);
                    }
                    continue;
                }
                open.pop();

                match name.as_slice() {
                    b"PMID" if capture == Capture::Pmid => {
                        if let Some(d) = draft.as_mut() {
                            let pmid = d.pmid_buf.trim().to_string();
                            if !pmid.is_empty() {
                                d.pmid = Some(pmid);
                            }
                        }
                        capture = Capture::Nothing;
                    }
                    b"ArticleTitle" if capture == Capture::Title => capture = Capture::Nothing,
                    b"AbstractText" if capture == Capture::AbstractSection => {
                        capture = Capture::Nothing
                    }
                    b"Abstract" => {
                        if let Some(d) = draft.as_mut() {
                            d.in_abstract = false;
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(d) = draft.take() {
                            records.push(d.finish(abstract_max_chars));
                        }
                        capture = Capture::Nothing;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => {
                if draft.is_some() {
                    note_fault(&mut error, "payload ended inside an unfinished article");
                }
                break;
            }
            Err(e) => {
                let position = reader.buffer_position();
                note_fault(
                    &mut error,
                    &format!("malformed XML at byte {}: {}", position, e),
                );
                draft = None;
                capture = Capture::Nothing;
                // The reader made no progress past the fault, so nothing more can be read.
                if last_error_at == Some(position) {
                    break;
                }
                last_error_at = Some(position);
            }
            _ => {}
        }
    }

    SearchOutcome { records, error }
}

/// Keep the first fault; later ones are only logged
fn note_fault(error: &mut Option<ReportError>, message: &str) {
    warn!("Malformed PubMed payload: {}", message);
    if error.is_none() {
        *error = Some(ReportError::SearchParse(message.to_string()));
    }
}

fn append_captured(draft: Option<&mut ArticleDraft>, capture: Capture, text: &str) {
    let Some(d) = draft else {
        return;
    };
    match capture {
        Capture::Nothing => {}
        Capture::Pmid => d.pmid_buf.push_str(text),
        Capture::Title => d.title.push_str(text),
        Capture::AbstractSection => {
            if let Some(section) = d.abstract_sections.last_mut() {
                section.push_str(text);
            }
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn article(pmid: &str, title: &str, abstract_text: &str) -> String {
        format!(
            "<PubmedArticle><MedlineCitation><PMID Version=\"1\">{pmid}</PMID><Article>\
             <ArticleTitle>{title}</ArticleTitle>\
             <Abstract><AbstractText>{abstract_text}</AbstractText></Abstract>\
             </Article></MedlineCitation></PubmedArticle>"
        )
    }

    fn article_set(articles: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<PubmedArticleSet>{}</PubmedArticleSet>",
            articles.concat()
        )
    }

    fn client_for(server: &ServerGuard) -> PubMedClient {
        PubMedClient::new(PubMedSettings {
            base_url: server.url(),
            timeout: Duration::from_secs(5),
            ..PubMedSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_well_formed_articles() {
        let xml = article_set(&[
            article("1", "Metformin outcomes", "Metformin lowers HbA1c."),
            article("2", "Insulin titration", "Basal insulin study."),
        ]);
        let outcome = parse_pubmed_xml(&xml, 500);

        assert!(outcome.error.is_none());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].pmid.as_deref(), Some("1"));
        assert_eq!(outcome.records[0].title, "Metformin outcomes");
        assert_eq!(
            outcome.records[1].url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/2/")
        );
    }

    #[test]
    fn test_missing_fields_get_placeholders_without_touching_neighbours() {
        let broken = "<PubmedArticle><MedlineCitation><PMID>2</PMID><Article>\
                      </Article></MedlineCitation></PubmedArticle>"
            .to_string();
        let xml = article_set(&[
            article("1", "First", "Abstract one."),
            broken,
            article("3", "Third", "Abstract three."),
        ]);
        let outcome = parse_pubmed_xml(&xml, 500);

        assert!(outcome.error.is_none());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[1].title, NO_TITLE);
        assert_eq!(outcome.records[1].abstract_text, NO_ABSTRACT);
        assert_eq!(outcome.records[1].pmid.as_deref(), Some("2"));
        assert_eq!(outcome.records[0].title, "First");
        assert_eq!(outcome.records[2].abstract_text, "Abstract three.");
    }

    #[test]
    fn test_article_without_pmid_has_no_url() {
        let xml = article_set(&[
            "<PubmedArticle><MedlineCitation><Article><ArticleTitle>Orphan</ArticleTitle>\
             </Article></MedlineCitation></PubmedArticle>"
                .to_string(),
        ]);
        let outcome = parse_pubmed_xml(&xml, 500);

        assert_eq!(outcome.records[0].title, "Orphan");
        assert!(outcome.records[0].pmid.is_none());
        assert!(outcome.records[0].url.is_none());
    }

    #[test]
    fn test_malformed_tail_keeps_completed_records() {
        let xml = format!(
            "<PubmedArticleSet>{}{}<PubmedArticle><MedlineCitation><PMID>3</PMID></Oops>",
            article("1", "One", "A."),
            article("2", "Two", "B.")
        );
        let outcome = parse_pubmed_xml(&xml, 500);

        assert_eq!(outcome.records.len(), 2);
        assert!(matches!(outcome.error, Some(ReportError::SearchParse(_))));
    }

    #[test]
    fn test_broken_article_in_the_middle_keeps_later_ones() {
        let broken = "<PubmedArticle><MedlineCitation><PMID>2</PMID><Article>\
                      <ArticleTitle>Broken</ArticleTytle>\
                      <Abstract><AbstractText>Lost.</AbstractText></Abstract>\
                      </Article></MedlineCitation></PubmedArticle>"
            .to_string();
        let xml = article_set(&[
            article("1", "First", "Abstract one."),
            broken,
            article("3", "Third", "Abstract three."),
        ]);
        let outcome = parse_pubmed_xml(&xml, 500);

        let pmids: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.pmid.as_deref())
            .collect();
        assert_eq!(pmids, vec![Some("1"), Some("3")]);
        assert_eq!(outcome.records[1].title, "Third");
        assert_eq!(outcome.records[1].abstract_text, "Abstract three.");
        assert!(matches!(
            outcome.error,
            Some(ReportError::SearchParse(msg)) if msg.contains("ArticleTytle")
        ));
    }

    #[test]
    fn test_truncated_payload_reports_parse_error() {
        let xml = format!(
            "<PubmedArticleSet>{}<PubmedArticle><MedlineCitation><PMID>9</PMID>",
            article("1", "One", "A.")
        );
        let outcome = parse_pubmed_xml(&xml, 500);

        assert_eq!(outcome.records.len(), 1);
        assert!(matches!(outcome.error, Some(ReportError::SearchParse(_))));
    }

    #[test]
    fn test_nested_markup_and_structured_abstracts_are_flattened() {
        let xml = article_set(&["<PubmedArticle><MedlineCitation><PMID>7</PMID><Article>\
             <ArticleTitle>Role of <i>HbA1c</i> &amp; glucose</ArticleTitle>\
             <Abstract>\
               <AbstractText Label=\"BACKGROUND\">Diabetes is common.</AbstractText>\
               <AbstractText Label=\"RESULTS\">Control improved.</AbstractText>\
             </Abstract>\
             </Article><CommentsCorrectionsList><CommentsCorrections>\
             <PMID>999</PMID></CommentsCorrections></CommentsCorrectionsList>\
             </MedlineCitation></PubmedArticle>"
            .to_string()]);
        let record = &parse_pubmed_xml(&xml, 500).records[0];

        assert_eq!(record.title, "Role of HbA1c & glucose");
        assert_eq!(record.abstract_text, "Diabetes is common. Control improved.");
        assert_eq!(record.pmid.as_deref(), Some("7"));
    }

    #[test]
    fn test_long_abstract_is_truncated_with_ellipsis() {
        let long = "a".repeat(520);
        let xml = article_set(&[article("1", "Long", &long)]);
        let record = &parse_pubmed_xml(&xml, 500).records[0];

        assert_eq!(record.abstract_text.chars().count(), 503);
        assert!(record.abstract_text.ends_with("..."));
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("short", 5), "short");
    }

    #[test]
    fn test_parse_id_list_missing_path_is_empty() {
        assert!(parse_id_list(&serde_json::json!({"header": {}})).is_empty());
        assert_eq!(
            parse_id_list(&serde_json::json!({"esearchresult": {"idlist": ["5", 6, "7"]}})),
            vec!["5".to_string(), "7".to_string()]
        );
    }

    #[tokio::test]
    async fn test_search_two_step_returns_records_with_urls() {
        let mut server = Server::new_async().await;
        let esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "pubmed".into()),
                Matcher::UrlEncoded("term".into(), "diabetes".into()),
                Matcher::UrlEncoded("retmax".into(), "3".into()),
                Matcher::UrlEncoded("retmode".into(), "json".into()),
                Matcher::UrlEncoded("sort".into(), "relevance".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"esearchresult": {"count": "3", "idlist": ["1", "2", "3"]}}"#)
            .expect(1)
            .create_async()
            .await;
        let efetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "1,2,3".into()),
                Matcher::UrlEncoded("retmode".into(), "xml".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(article_set(&[
                article("1", "One", "A."),
                article("2", "Two", "B."),
                article("3", "Three", "C."),
            ]))
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let outcome = client.search("diabetes", 3).await;

        assert!(outcome.error.is_none());
        let urls: Vec<_> = outcome
            .records
            .iter()
            .map(|r| r.url.clone().unwrap())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/1/",
                "https://pubmed.ncbi.nlm.nih.gov/2/",
                "https://pubmed.ncbi.nlm.nih.gov/3/",
            ]
        );

        // Same search again is served from the caches.
        let again = client.search("  Diabetes ", 3).await;
        assert_eq!(again.records.len(), 3);
        esearch.assert_async().await;
        efetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_zero_identifiers_skip_fetch() {
        let mut server = Server::new_async().await;
        let _esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"esearchresult": {"count": "0", "idlist": []}}"#)
            .create_async()
            .await;
        let efetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let outcome = client_for(&server).search("xyzzy-no-such-topic", 5).await;

        assert_eq!(outcome, SearchOutcome::default());
        efetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_is_capped_at_max_ids() {
        let mut server = Server::new_async().await;
        let ids: Vec<String> = (1..=15).map(|i| format!("\"{i}\"")).collect();
        let _esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"esearchresult": {{"idlist": [{}]}}}}"#, ids.join(",")))
            .create_async()
            .await;
        let efetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded(
                "id".into(),
                "1,2,3,4,5,6,7,8,9,10".into(),
            ))
            .with_status(200)
            .with_body(article_set(&[article("1", "One", "A.")]))
            .expect(1)
            .create_async()
            .await;

        let outcome = client_for(&server).search("asthma", 15).await;

        assert_eq!(outcome.records.len(), 1);
        efetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let mut server = Server::new_async().await;
        let _esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let outcome = client_for(&server).search("cancer", 5).await;

        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.error,
            Some(ReportError::SearchTransport(msg)) if msg.contains("500")
        ));
    }

    #[tokio::test]
    async fn test_non_json_esearch_is_parse_failure() {
        let mut server = Server::new_async().await;
        let _esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let outcome = client_for(&server).search("cancer", 5).await;

        assert!(matches!(outcome.error, Some(ReportError::SearchParse(_))));
    }

    #[tokio::test]
    async fn test_batch_lookup_maps_failures_to_empty() {
        let mut server = Server::new_async().await;
        let _ok = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::UrlEncoded("term".into(), "covid".into()))
            .with_status(200)
            .with_body(r#"{"esearchresult": {"idlist": ["11", "12"]}}"#)
            .create_async()
            .await;
        let _bad = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::UrlEncoded("term".into(), "flu".into()))
            .with_status(502)
            .create_async()
            .await;

        let results = client_for(&server)
            .search_ids_batch(&["covid".to_string(), "flu".to_string()], 2)
            .await;

        assert_eq!(results["covid"], vec!["11".to_string(), "12".to_string()]);
        assert!(results["flu"].is_empty());
    }
}
