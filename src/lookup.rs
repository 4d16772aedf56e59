//! Stream lookup: finds a playable reference for a live event
//!
//! The listing only depends on the [`StreamLookup`] trait. [`ScrapeLookup`]
//! is the real implementation; tests and the EPG-only mode use the others.

use crate::error::{EpgError, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// A page the scraper may find events on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    /// Resolver name understood by the media center add-on
    pub resolver: String,
    pub url: String,
}

/// Playable reference, rendered as `resolver@@url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub resolver: String,
    pub url: String,
}

impl StreamRef {
    pub fn new(resolver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            resolver: resolver.into(),
            url: url.into(),
        }
    }

    pub fn myresolve(&self) -> String {
        format!("{}@@{}", self.resolver, self.url)
    }
}

pub trait StreamLookup {
    /// `Ok(None)` means no stream; `Err` is a failed lookup, which callers
    /// are expected to treat the same way after logging it
    fn lookup(&self, event_title: &str, channel_name: &str) -> Result<Option<StreamRef>>;
}

/// Never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl StreamLookup for NoLookup {
    fn lookup(&self, _event_title: &str, _channel_name: &str) -> Result<Option<StreamRef>> {
        Ok(None)
    }
}

/// Fixed answers keyed by event title
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    entries: HashMap<String, StreamRef>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, event_title: &str, stream: StreamRef) -> Self {
        self.entries.insert(event_title.to_lowercase(), stream);
        self
    }
}

impl StreamLookup for StaticLookup {
    fn lookup(&self, event_title: &str, _channel_name: &str) -> Result<Option<StreamRef>> {
        Ok(self.entries.get(&event_title.to_lowercase()).cloned())
    }
}

/// Words too common in fixture titles to identify an event
const STOP_WORDS: &[&str] = &["live", "diretta", "highlights", "replay", "partita"];

/// Distinctive lower-cased words of an event title: "Juventus vs Milan" -> [juventus, milan]
pub fn event_terms(title: &str) -> Vec<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 4 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Whether a scraped page mentions every distinctive word of the title
pub fn page_mentions(page: &str, title: &str) -> bool {
    let terms = event_terms(title);
    if terms.is_empty() {
        return false;
    }
    let page = page.to_lowercase();
    terms.iter().all(|t| page.contains(t.as_str()))
}

/// Scrapes the configured source pages over HTTP. Each page is fetched at
/// most once per instance; a failed fetch is remembered as failed.
pub struct ScrapeLookup {
    agent: ureq::Agent,
    sources: Vec<StreamSource>,
    user_agent: String,
    pages: RefCell<HashMap<String, std::result::Result<String, String>>>,
}

impl ScrapeLookup {
    pub fn new(sources: Vec<StreamSource>, user_agent: &str, timeout_secs: u64) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(timeout_secs)))
            .build()
            .new_agent();

        Self {
            agent,
            sources,
            user_agent: user_agent.to_string(),
            pages: RefCell::new(HashMap::new()),
        }
    }

    fn fetch_page(&self, url: &str) -> std::result::Result<String, String> {
        if let Some(cached) = self.pages.borrow().get(url) {
            return cached.clone();
        }

        debug!(url, "fetching stream source page");
        let result = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| format!("Request failed: {}", e))
            .and_then(|mut response| {
                response
                    .body_mut()
                    .read_to_string()
                    .map_err(|e| format!("Read failed: {}", e))
            });

        if let Err(ref e) = result {
            warn!(url, error = %e, "stream source unavailable");
        }
        self.pages.borrow_mut().insert(url.to_string(), result.clone());
        result
    }
}

impl StreamLookup for ScrapeLookup {
    fn lookup(&self, event_title: &str, channel_name: &str) -> Result<Option<StreamRef>> {
        let mut last_error = None;
        let mut reachable = 0;

        for source in &self.sources {
            match self.fetch_page(&source.url) {
                Ok(page) => {
                    reachable += 1;
                    if page_mentions(&page, event_title) {
                        debug!(event = event_title, channel = channel_name, resolver = %source.resolver, "stream found");
                        return Ok(Some(StreamRef::new(&source.resolver, &source.url)));
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if reachable == 0 => Err(EpgError::Http(e)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_myresolve_format() {
        let stream = StreamRef::new("platin", "https://www.platinsport.com/");
        assert_eq!(stream.myresolve(), "platin@@https://www.platinsport.com/");
    }

    #[test]
    fn test_event_terms() {
        assert_eq!(event_terms("Juventus vs Milan"), ["juventus", "milan"]);
        assert_eq!(event_terms("LIVE: Inter - Roma"), ["inter", "roma"]);
        assert!(event_terms("F1 GP").is_empty());
    }

    #[test]
    fn test_page_mentions() {
        let page = "<li>20:45 JUVENTUS - AC Milan</li><li>Napoli vs Lazio</li>";
        assert!(page_mentions(page, "Juventus vs Milan"));
        assert!(page_mentions(page, "Napoli - Lazio live"));
        assert!(!page_mentions(page, "Roma vs Torino"));
        assert!(!page_mentions(page, "vs"));
    }

    #[test]
    fn test_static_lookup_is_case_insensitive() {
        let lookup = StaticLookup::new().with(
            "Juventus vs Milan",
            StreamRef::new("platin", "https://www.platinsport.com/"),
        );
        let hit = lookup.lookup("JUVENTUS VS MILAN", "SkySport24").unwrap();
        assert_eq!(hit.unwrap().resolver, "platin");
        assert!(lookup.lookup("Roma vs Lazio", "SkySport24").unwrap().is_none());
    }

    #[test]
    fn test_no_lookup() {
        assert!(NoLookup.lookup("Juventus vs Milan", "SkySport24").unwrap().is_none());
    }

    #[test]
    fn test_scrape_lookup_without_sources_finds_nothing() {
        let lookup = ScrapeLookup::new(Vec::new(), "test", 1);
        assert!(lookup.lookup("Juventus vs Milan", "SkySport24").unwrap().is_none());
    }

    #[test]
    fn test_scrape_lookup_all_sources_unreachable() {
        let sources = vec![
            StreamSource {
                resolver: "platin".to_string(),
                url: "http://127.0.0.1:1/".to_string(),
            },
            StreamSource {
                resolver: "backup".to_string(),
                url: "http://127.0.0.1:1/backup".to_string(),
            },
        ];
        let lookup = ScrapeLookup::new(sources, "test", 1);

        let err = lookup.lookup("Juventus vs Milan", "SkySport24").unwrap_err();
        assert!(matches!(err, EpgError::Http(_)));

        // failures are cached per page, the second event fails the same way
        let err = lookup.lookup("Napoli vs Lazio", "SkySport24").unwrap_err();
        assert!(matches!(err, EpgError::Http(_)));
        assert_eq!(lookup.pages.borrow().len(), 2);
        assert!(lookup.pages.borrow().values().all(|page| page.is_err()));
    }
}
