//! One generation run: cached feed in, listing JSON out

use crate::classify::{ChannelClassifier, SportMatcher};
use crate::config::AppConfig;
use crate::epg::{EpgDocument, EpgParser, Schedule};
use crate::error::{EpgError, Result};
use crate::listing::{ListingBuilder, ListingDocument, ListingMode, ListingOptions, ListingStats};
use crate::lookup::{NoLookup, ScrapeLookup, StreamLookup};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Counters for one run, logged at the end
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub output: PathBuf,
    pub channels: usize,
    pub programmes: usize,
    pub skipped: usize,
    pub current: usize,
    pub next: usize,
    pub listing: ListingStats,
}

/// The lookup a mode needs: EPG-only never looks anything up
pub fn lookup_for(config: &AppConfig) -> Box<dyn StreamLookup> {
    match config.mode {
        ListingMode::EpgOnly => Box::new(NoLookup),
        ListingMode::Complete => Box::new(ScrapeLookup::new(
            config.stream_sources.clone(),
            &config.user_agent,
            config.lookup_timeout_secs,
        )),
    }
}

/// Parse `input`, resolve it against `now` and write the listing to `output`.
///
/// `now` is used for both the current and the next window. On any error the
/// previous output file is left untouched.
pub fn generate(
    config: &AppConfig,
    lookup: &dyn StreamLookup,
    input: &Path,
    output: &Path,
    now: NaiveDateTime,
) -> Result<GenerationReport> {
    if !input.exists() {
        error!(path = %input.display(), "EPG not found, run fetch first");
        return Err(EpgError::MissingInput(input.to_path_buf()));
    }

    info!(path = %input.display(), "parsing EPG");
    let doc = EpgParser::parse_file(input)?;
    info!(
        channels = doc.channels.len(),
        programmes = doc.programmes.len(),
        "EPG parsed"
    );
    if doc.skipped > 0 {
        warn!(skipped = doc.skipped, "programmes skipped for bad start/stop");
    }

    if config.snapshot {
        let path = config.snapshot_path();
        if let Err(e) = write_snapshot(&doc, &path) {
            warn!(path = %path.display(), error = %e, "could not write EPG snapshot");
        }
    }

    let schedule = Schedule::resolve(&doc.programmes, now, config.next_policy);
    info!(current = schedule.current.len(), next = schedule.next.len(), "now/next resolved");

    let classifier = ChannelClassifier::new(&config.categories);
    let sport = SportMatcher::new(&config.sport_keywords);
    let builder = ListingBuilder::new(ListingOptions::from_config(config), &classifier, &sport, lookup);
    let listing = builder.build(&doc.channels, &schedule, now);

    write_document(&listing.document, output)?;

    let report = GenerationReport {
        output: output.to_path_buf(),
        channels: doc.channels.len(),
        programmes: doc.programmes.len(),
        skipped: doc.skipped,
        current: schedule.current.len(),
        next: schedule.next.len(),
        listing: listing.stats,
    };

    info!(
        output = %report.output.display(),
        items = report.listing.total,
        with_stream = report.listing.with_stream,
        epg_only = report.listing.epg_only,
        lookup_failures = report.listing.lookup_failures,
        "listing written"
    );

    Ok(report)
}

fn write_snapshot(doc: &EpgDocument, path: &Path) -> Result<()> {
    write_json_atomic(doc, path)
}

pub fn write_document(document: &ListingDocument, path: &Path) -> Result<()> {
    write_json_atomic(document, path)
}

/// Serialize to a sibling temp file and rename it over `path`
fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| EpgError::io(dir, e))?;
    }

    let content = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, content).map_err(|e| EpgError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| EpgError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{StaticLookup, StreamRef};
    use chrono::NaiveDate;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="rainews.it"><display-name>RaiNews</display-name></channel>
  <channel id="skysport24.it"><display-name>SkySport24</display-name><icon src="http://logo/ss24.png"/></channel>
  <programme start="20240115090000 +0100" stop="20240115100000 +0100" channel="rainews.it">
    <title>TG</title>
  </programme>
  <programme start="20240115090000 +0100" stop="20240115110000 +0100" channel="skysport24.it">
    <title>Juventus vs Milan</title>
  </programme>
  <programme start="bogus" stop="20240115110000 +0100" channel="skysport24.it">
    <title>Broken</title>
  </programme>
</tv>"#;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn platin() -> StaticLookup {
        StaticLookup::new().with(
            "Juventus vs Milan",
            StreamRef::new("platin", "https://www.platinsport.com/"),
        )
    }

    #[test]
    fn test_generate_writes_listing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("epg_raw.xml");
        let output = dir.path().join("out").join("lastminute.json");
        fs::write(&input, FEED).unwrap();

        let config = AppConfig::default();
        let report = generate(&config, &platin(), &input, &output, at(9, 30)).unwrap();

        assert_eq!(report.channels, 2);
        assert_eq!(report.programmes, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.current, 2);
        assert_eq!(report.listing.total, 2);
        assert_eq!(report.listing.with_stream, 1);
        assert_eq!(report.listing.epg_only, 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["SetViewMode"], "51");
        assert_eq!(json["RefreshList"], "10800");
        let items = json["items"].as_array().unwrap();
        assert!(items
            .iter()
            .any(|i| i["myresolve"] == "platin@@https://www.platinsport.com/"));
        assert!(!dir.path().join("out").join("lastminute.json.tmp").exists());
    }

    #[test]
    fn test_missing_input_keeps_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("lastminute.json");
        fs::write(&output, "stale").unwrap();

        let err = generate(
            &AppConfig::default(),
            &NoLookup,
            &dir.path().join("missing.xml"),
            &output,
            at(9, 30),
        )
        .unwrap_err();

        assert!(matches!(err, EpgError::MissingInput(_)));
        assert_eq!(fs::read_to_string(&output).unwrap(), "stale");
    }

    #[test]
    fn test_malformed_input_keeps_stale_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("epg_raw.xml");
        let output = dir.path().join("lastminute.json");
        fs::write(&input, "<tv><channel id=\"x\">").unwrap();
        fs::write(&output, "stale").unwrap();

        let err = generate(&AppConfig::default(), &NoLookup, &input, &output, at(9, 30)).unwrap_err();

        assert!(matches!(err, EpgError::Malformed { .. }));
        assert_eq!(fs::read_to_string(&output).unwrap(), "stale");
    }

    #[test]
    fn test_snapshot_is_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("epg_raw.xml");
        fs::write(&input, FEED).unwrap();

        let config = AppConfig {
            snapshot: true,
            cache_dir: dir.path().join("cache"),
            ..AppConfig::default()
        };
        generate(&config, &NoLookup, &input, &dir.path().join("out.json"), at(9, 30)).unwrap();

        let snapshot: EpgDocument =
            serde_json::from_str(&fs::read_to_string(config.snapshot_path()).unwrap()).unwrap();
        assert_eq!(snapshot.channels.len(), 2);
        assert_eq!(snapshot.skipped, 1);
    }

    #[test]
    fn test_lookup_for_mode() {
        // EPG-only never produces a stream, whatever the title
        let config = AppConfig {
            mode: ListingMode::EpgOnly,
            ..AppConfig::default()
        };
        let lookup = lookup_for(&config);
        assert!(lookup.lookup("Juventus vs Milan", "SkySport24").unwrap().is_none());
    }
}
