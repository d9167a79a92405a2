//! Web-search fallback boundary. A provider takes a free-text query and
//! returns short text snippets, possibly none; failures degrade to an
//! empty list and never propagate into the pipeline.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::SearchConfig;
use crate::http;

pub trait SearchProvider: Send {
    fn search(&self, query: &str) -> Vec<String>;
}

/// Disabled search: always empty.
#[derive(Debug, Default)]
pub struct NullSearch;

impl SearchProvider for NullSearch {
    fn search(&self, _query: &str) -> Vec<String> {
        Vec::new()
    }
}

lazy_static! {
    static ref RESULT_ANCHOR: Regex =
        Regex::new(r#"<a[^>]*class="[^"]*result__a[^"]*"[^>]*>(.*?)</a>"#).unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// Scrapes result anchors out of the html.duckduckgo.com endpoint shape,
/// served from a configurable plain-HTTP host.
#[derive(Debug)]
pub struct HtmlSearch {
    host: String,
    timeout_ms: u64,
    verbose: u8,
}

impl HtmlSearch {
    pub fn new(config: &SearchConfig, verbose: u8) -> Self {
        Self {
            host: config.host.clone(),
            timeout_ms: config.timeout_ms,
            verbose,
        }
    }
}

impl SearchProvider for HtmlSearch {
    fn search(&self, query: &str) -> Vec<String> {
        let path = format!("/html/?q={}", query.replace(' ', "+"));
        let html = match http::get(&self.host, &path, self.timeout_ms) {
            Ok(body) => body,
            Err(err) => {
                if self.verbose > 0 {
                    eprintln!("[search] request failed: {err}");
                }
                return Vec::new();
            }
        };
        extract_snippets(&html)
    }
}

fn extract_snippets(html: &str) -> Vec<String> {
    RESULT_ANCHOR
        .captures_iter(html)
        .map(|caps| TAG.replace_all(&caps[1], "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_come_out_in_document_order() {
        let html = r#"
            <a rel="nofollow" class="result__a" href="u1">First <b>hit</b></a>
            <a class="other">noise</a>
            <a class="result__a" href="u2">Second hit</a>
        "#;
        assert_eq!(extract_snippets(html), vec!["First hit", "Second hit"]);
    }

    #[test]
    fn no_results_yields_empty_list() {
        assert!(extract_snippets("<html><body>nothing</body></html>").is_empty());
    }

    #[test]
    fn null_search_is_always_empty() {
        assert!(NullSearch.search("anything").is_empty());
    }
}
